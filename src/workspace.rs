// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Workspace materialization.
//!
//! All state lives in one cache directory tree. The tree is deterministic, so
//! a second run finds everything the first one produced at the same place:
//!
//! ```text
//! <cache root>/
//! ├── depot_tools/
//! │   └── .electron-codecs-bootstrapped
//! ├── .git_cache/
//! ├── electron/
//! │   └── src/                      # Chromium checkout
//! │       ├── electron/             # Electron checkout
//! │       └── third_party/ffmpeg/   # FFmpeg checkout
//! └── electron-chromium-codecs/
//!     └── <electron version>/       # patch set for the pinned release
//! ```
//!
//! Whether a repository is already materialized is decided purely by the
//! presence of its directory.

use crate::{
    config::ProvisionConfig,
    exec::Runner,
    path::{ensure_directory, Result as PathResult},
    provision::{Context, ProvisionError, Result},
};

use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Resolved locations of the cache directory tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub cache_root: PathBuf,
    pub depot_tools: PathBuf,
    pub git_cache: PathBuf,
    pub electron: PathBuf,
    pub electron_src: PathBuf,
    pub electron_checkout: PathBuf,
    pub ffmpeg: PathBuf,
    pub codecs_repo: PathBuf,
    pub codecs_patches: PathBuf,
}

impl Layout {
    /// Derive layout from cache root without touching the filesystem.
    pub fn new(cache_root: impl Into<PathBuf>, electron_version: &str) -> Self {
        let cache_root = cache_root.into();
        let electron = cache_root.join("electron");
        let electron_src = electron.join("src");
        let codecs_repo = cache_root.join("electron-chromium-codecs");

        Self {
            depot_tools: cache_root.join("depot_tools"),
            git_cache: cache_root.join(".git_cache"),
            electron_checkout: electron_src.join("electron"),
            ffmpeg: electron_src.join("third_party").join("ffmpeg"),
            codecs_patches: codecs_repo.join(electron_version),
            codecs_repo,
            electron_src,
            electron,
            cache_root,
        }
    }

    /// Create cache root, Git object cache, and Electron directory.
    ///
    /// Everything else in the tree is produced by the tools that fill it.
    ///
    /// # Errors
    ///
    /// - Return [`PathError`](crate::path::PathError) if a directory cannot be
    ///   created.
    pub fn materialize(config: &ProvisionConfig) -> PathResult<Self> {
        let cache_root = ensure_directory(&config.workspace.cache_root)?;
        let layout = Self::new(cache_root, &config.versions.electron);
        ensure_directory(&layout.git_cache)?;
        ensure_directory(&layout.electron)?;

        Ok(layout)
    }

    /// Marker written once depot_tools finished bootstrapping.
    pub fn depot_tools_stamp(&self) -> PathBuf {
        self.depot_tools.join(".electron-codecs-bootstrapped")
    }

    /// Location to download target archive URL to.
    pub fn download_path(&self, url: &str) -> PathBuf {
        let name = url
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("download");
        self.cache_root.join(name)
    }
}

/// What [`ensure_repository`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoAction {
    /// Fresh shallow clone.
    Cloned,

    /// Existing checkout pulled.
    Pulled,
}

/// Decide how to materialize repository at target path.
pub fn plan_repository(local: &Path) -> RepoAction {
    if local.exists() {
        RepoAction::Pulled
    } else {
        RepoAction::Cloned
    }
}

/// Ensure repository is present at target path.
///
/// Pulls latest changes if the path already exists. Otherwise performs a
/// shallow clone, optionally of a specific branch or tag. Never both.
///
/// # Errors
///
/// - Return [`ProvisionError::CheckoutFailed`] if Git fails.
/// - Return [`ProvisionError::Path`] if the parent directory cannot be
///   created.
#[instrument(skip(ctx, remote, local, branch), level = "debug")]
pub fn ensure_repository<R: Runner>(
    ctx: &Context<R>,
    remote: &str,
    local: &Path,
    branch: Option<&str>,
) -> Result<RepoAction> {
    let action = plan_repository(local);
    let command = match action {
        RepoAction::Pulled => {
            info!(
                "{} already cloned, pulling latest changes",
                local.display()
            );
            ctx.command("git").arg("-C").arg(local).arg("pull")
        }
        RepoAction::Cloned => {
            if let Some(parent) = local.parent() {
                ensure_directory(parent)?;
            }

            let mut command = ctx.command("git").args(["clone", "--depth", "1"]);
            if let Some(branch) = branch {
                command = command.args(["--branch", branch]);
            }
            command.arg(remote).arg(local)
        }
    };

    ctx.run(&command)
        .map_err(|source| ProvisionError::CheckoutFailed {
            repository: remote.into(),
            source,
        })?;

    Ok(action)
}

/// Check out Electron at pinned release and sync its dependencies.
///
/// Two phases: register the Electron checkout with gclient and shallow clone
/// the release tag, then let gclient sync the Chromium tree around it. The
/// first phase is skipped if the Electron checkout already exists. The sync
/// always runs.
///
/// # Errors
///
/// - Return [`ProvisionError::CheckoutFailed`] if gclient or Git fail.
#[instrument(skip(ctx), level = "debug")]
pub fn checkout_electron<R: Runner>(ctx: &Context<R>) -> Result<()> {
    let layout = &ctx.layout;
    let remote = ctx.config.sources.electron.as_str();
    let failed = |source| ProvisionError::CheckoutFailed {
        repository: remote.into(),
        source,
    };

    if layout.electron_checkout.exists() {
        info!(
            "electron already checked out at {}, skipping clone",
            layout.electron_checkout.display()
        );
    } else {
        let config = ctx
            .command("gclient")
            .args(["config", "--name", "src/electron", "--unmanaged", remote])
            .current_dir(&layout.electron)
            .via_cmd();
        ctx.run(&config).map_err(failed)?;

        let clone = ctx
            .command("git")
            .args(["clone", "--depth", "1", "--branch"])
            .arg(&ctx.config.versions.electron)
            .arg(remote)
            .arg(&layout.electron_checkout)
            .current_dir(&layout.electron);
        ctx.run(&clone).map_err(failed)?;
    }

    let sync = ctx
        .command("gclient")
        .args(["sync", "-f"])
        .current_dir(&layout.electron_checkout)
        .via_cmd();
    ctx.run(&sync).map_err(failed)?;
    info!("electron {} checked out", ctx.config.versions.electron);

    Ok(())
}

/// Ensure the codecs patch repository is present and current.
///
/// # Errors
///
/// - Return [`ProvisionError::CheckoutFailed`] if Git fails.
pub fn fetch_codecs<R: Runner>(ctx: &Context<R>) -> Result<RepoAction> {
    ensure_repository(
        ctx,
        &ctx.config.sources.codecs,
        &ctx.layout.codecs_repo,
        None,
    )
}
