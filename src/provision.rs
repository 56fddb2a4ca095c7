// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Provisioning sequence.
//!
//! Prepare a Windows host to build Electron with proprietary codec patches,
//! then build it. The sequence is strictly linear:
//!
//! 1. Verify elevated privileges.
//! 2. Install the compiler toolchain, Git, Node.js, and depot_tools.
//! 3. Materialize the Electron checkout and the codecs patch repository.
//! 4. Relocate and apply the codec patches.
//! 5. Generate build files and compile.
//!
//! Each step either succeeds or the whole sequence aborts at the first
//! failing external command. There is no retry. Re-running the sequence is
//! the recovery path, so every step checks what is already in place before
//! doing anything.
//!
//! # Process State
//!
//! Nothing here mutates process-wide state. The environment variables the
//! toolchain expects travel on every [`ExternalCommand`] produced through
//! [`Context::command`], and every command carries its own working
//! directory. The current directory of this process never changes.

use crate::{
    build::{self, BuildStep},
    config::ProvisionConfig,
    exec::{ExecError, ExternalCommand, Runner},
    install,
    patch::{self, PatchError},
    path::PathError,
    workspace::{self, Layout},
};

use std::{
    env::JoinPathsError,
    ffi::{OsStr, OsString},
    path::PathBuf,
};
use tracing::{info, instrument, warn};

/// Environment handed to every child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    vars: Vec<(OsString, OsString)>,
}

impl Environment {
    /// Construct environment for target layout.
    ///
    /// Prepends depot_tools to the inherited search path so its entry points
    /// win over anything else installed on the host.
    ///
    /// # Errors
    ///
    /// - Return [`JoinPathsError`] if a path contains the search path
    ///   separator.
    pub fn new(layout: &Layout, inherited_path: Option<OsString>) -> Result<Self, JoinPathsError> {
        let mut search = vec![layout.depot_tools.clone()];
        if let Some(inherited) = inherited_path.as_deref() {
            search.extend(std::env::split_paths(inherited));
        }

        let vars = vec![
            ("GIT_CACHE_PATH".into(), layout.git_cache.clone().into_os_string()),
            ("PATH".into(), std::env::join_paths(search)?),
            (
                "CHROMIUM_BUILDTOOLS_PATH".into(),
                layout.electron_src.join("buildtools").into_os_string(),
            ),
            ("DEPOT_TOOLS_WIN_TOOLCHAIN".into(), "0".into()),
        ];

        Ok(Self { vars })
    }

    /// Look up value of target variable.
    pub fn get(&self, key: impl AsRef<OsStr>) -> Option<&OsStr> {
        self.vars
            .iter()
            .find(|(name, _)| name.as_os_str() == key.as_ref())
            .map(|(_, value)| value.as_os_str())
    }

    pub fn vars(&self) -> &[(OsString, OsString)] {
        &self.vars
    }
}

/// Everything a provisioning step needs.
///
/// Threaded through every step in place of global state.
#[derive(Debug)]
pub struct Context<R>
where
    R: Runner,
{
    pub config: ProvisionConfig,
    pub layout: Layout,
    pub env: Environment,
    runner: R,
}

impl<R> Context<R>
where
    R: Runner,
{
    /// Construct new context.
    ///
    /// Materializes the fixed part of the cache directory tree.
    ///
    /// # Errors
    ///
    /// - Return [`ProvisionError::Path`] if cache directories cannot be
    ///   created.
    /// - Return [`ProvisionError::Environment`] if the search path cannot be
    ///   assembled.
    pub fn new(config: ProvisionConfig, runner: R) -> Result<Self> {
        let layout = Layout::materialize(&config)?;
        let env = Environment::new(&layout, std::env::var_os("PATH"))?;

        Ok(Self {
            config,
            layout,
            env,
            runner,
        })
    }

    /// Start command for target program with provisioning environment set.
    pub fn command(&self, program: impl Into<OsString>) -> ExternalCommand {
        ExternalCommand::new(program).envs(self.env.vars().iter().cloned())
    }

    /// Run command through context's runner.
    pub fn run(&self, command: &ExternalCommand) -> Result<String, ExecError> {
        self.runner.run(command)
    }
}

/// Verify that process runs with administrative privileges.
///
/// `net session` only succeeds for elevated processes on Windows.
///
/// # Errors
///
/// - Return [`ProvisionError::NotElevated`] if privilege probe fails.
#[instrument(skip(ctx), level = "debug")]
pub fn ensure_elevated<R: Runner>(ctx: &Context<R>) -> Result<()> {
    let probe = ctx.command("net").arg("session").capture();
    ctx.run(&probe).map_err(|_| ProvisionError::NotElevated)?;

    Ok(())
}

/// Run full provisioning sequence.
///
/// # Errors
///
/// - Return first [`ProvisionError`] encountered. Nothing after the failing
///   step runs.
#[instrument(skip(ctx), level = "debug")]
pub fn provision<R: Runner>(ctx: &Context<R>) -> Result<()> {
    ensure_elevated(ctx)?;
    warn!("provisioning is experimental, use at your own risk");

    install::install_toolchain(ctx)?;
    install::install_depot_tools(ctx)?;

    workspace::checkout_electron(ctx)?;
    workspace::fetch_codecs(ctx)?;

    patch::apply_codec_patches(ctx)?;

    build::build_electron(ctx)?;
    info!(
        "electron {} built into {}",
        ctx.config.versions.electron,
        ctx.layout.electron_src.join(&ctx.config.build.out_dir).display()
    );

    Ok(())
}

/// All possible provisioning failures.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// Process lacks administrative privileges.
    #[error("administrative privileges are required, run from an elevated shell")]
    NotElevated,

    /// Presence probe for a dependency failed.
    ///
    /// Recoverable. Treated as the dependency not being installed.
    #[error("probe for {tool} failed")]
    ProbeFailed {
        tool: String,
        #[source]
        source: ExecError,
    },

    /// Dependency installation failed.
    #[error("failed to install {tool}")]
    InstallFailed {
        tool: String,
        #[source]
        source: ExecError,
    },

    /// Repository clone, pull, or sync failed.
    #[error("failed to check out {repository}")]
    CheckoutFailed {
        repository: String,
        #[source]
        source: ExecError,
    },

    /// Patch relocation, preparation, or application failed.
    #[error("failed to patch with {patch}")]
    PatchFailed {
        patch: String,
        #[source]
        source: PatchError,
    },

    /// Build configuration generation or compilation failed.
    #[error("build step `{step}` failed")]
    BuildFailed {
        step: BuildStep,
        #[source]
        source: ExecError,
    },

    /// Filesystem manipulation failed outside of patching.
    #[error("filesystem operation on {:?} failed", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Cache directory creation or resolution failed.
    #[error(transparent)]
    Path(#[from] PathError),

    /// Child process search path cannot be assembled.
    #[error(transparent)]
    Environment(#[from] JoinPathsError),
}

impl ProvisionError {
    /// Whether error leaves the host in a state worth rolling back.
    ///
    /// Failing the privilege check happens before anything is touched.
    pub fn wants_rollback(&self) -> bool {
        !matches!(self, Self::NotElevated)
    }

    /// Whether error only means "not installed" rather than a failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ProbeFailed { .. })
    }
}

/// Friendly result alias :3
pub type Result<T, E = ProvisionError> = std::result::Result<T, E>;
