// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Codec patch application.
//!
//! The codecs repository ships one directory per Electron release, each
//! holding three patches: one for Chromium, one for Electron itself, and one
//! for FFmpeg. Every patch must be applied from the root of the checkout it
//! targets, so the patches are first moved next to their targets.
//!
//! Before applying, a handful of IDL files get their line endings normalized
//! because the Windows checkout produces CRLF and the patches expect LF. One
//! FFmpeg source file referenced by the patched build files is missing from
//! the checkout, so a shim including the real source is written in its place.
//!
//! Patches are treated as opaque. They are moved and applied verbatim.

use crate::{
    exec::{ExecError, Runner},
    provision::{Context, ProvisionError, Result as ProvisionResult},
    workspace::Layout,
};

use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Checkout a patch is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchTarget {
    Chromium,
    Electron,
    Ffmpeg,
}

impl PatchTarget {
    /// Root directory of target checkout.
    pub fn dir(self, layout: &Layout) -> &Path {
        match self {
            Self::Chromium => &layout.electron_src,
            Self::Electron => &layout.electron_checkout,
            Self::Ffmpeg => &layout.ffmpeg,
        }
    }
}

/// Named patch scoped to exactly one checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecPatch {
    pub filename: &'static str,
    pub target: PatchTarget,
}

/// Patch set, in application order.
pub const CODEC_PATCHES: [CodecPatch; 3] = [
    CodecPatch {
        filename: "look_chromium_hevc_ac3.patch",
        target: PatchTarget::Chromium,
    },
    CodecPatch {
        filename: "look_electron_hevc_ac3.patch",
        target: PatchTarget::Electron,
    },
    CodecPatch {
        filename: "look_ffmpeg_hevc_ac3.patch",
        target: PatchTarget::Ffmpeg,
    },
];

/// Files whose line endings must be normalized, relative to Chromium root.
pub const LINE_ENDING_FIXUPS: [&str; 4] = [
    "electron/shell/common/extensions/api/resources_private.idl",
    "electron/shell/common/extensions/api/cryptotoken_private.idl",
    "chrome/shell/common/extensions/api/resources_private.idl",
    "chrome/shell/common/extensions/api/cryptotoken_private.idl",
];

/// Missing FFmpeg source, relative to FFmpeg root.
pub const BSWAPDSP_SHIM_PATH: &str = "libavcodec/autorename_libavcodec_bswapdsp.c";

/// Contents of the missing FFmpeg source.
pub const BSWAPDSP_SHIM: &str = "#include \"bswapdsp.c\"";

/// What [`relocate`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relocation {
    Moved,
    AlreadyInPlace,
}

/// Move patch file from source directory into destination directory.
///
/// Creates destination directory if needed. A patch that is missing from the
/// source but already present at the destination was moved by an earlier
/// run, and is left alone.
///
/// # Errors
///
/// - Return [`PatchError::Missing`] if patch exists in neither place.
/// - Return [`PatchError::Move`] if the move itself fails.
pub fn relocate(filename: &str, source_dir: &Path, dest_dir: &Path) -> Result<Relocation> {
    let from = source_dir.join(filename);
    let to = dest_dir.join(filename);

    if !from.exists() {
        if to.exists() {
            debug!("{} already in place", to.display());
            return Ok(Relocation::AlreadyInPlace);
        }

        return Err(PatchError::Missing {
            filename: filename.into(),
            source_dir: source_dir.to_path_buf(),
        });
    }

    fs::create_dir_all(dest_dir).map_err(|source| PatchError::Move {
        source,
        from: from.clone(),
        to: to.clone(),
    })?;
    fs::rename(&from, &to).map_err(|source| PatchError::Move {
        source,
        from: from.clone(),
        to: to.clone(),
    })?;
    info!("moved {} to {}", filename, dest_dir.display());

    Ok(Relocation::Moved)
}

/// Move every codec patch next to the checkout it targets.
///
/// # Errors
///
/// - Return [`ProvisionError::PatchFailed`] for the first patch that cannot
///   be moved.
pub fn relocate_patches(layout: &Layout) -> ProvisionResult<()> {
    for patch in CODEC_PATCHES {
        relocate(
            patch.filename,
            &layout.codecs_patches,
            patch.target.dir(layout),
        )
        .map_err(|source| ProvisionError::PatchFailed {
            patch: patch.filename.into(),
            source,
        })?;
    }

    Ok(())
}

/// Rewrite CRLF line endings of target file to LF in place.
///
/// Lone carriage returns are kept. Returns whether the file changed. Files
/// that already use LF are not rewritten.
///
/// # Errors
///
/// - Return [`PatchError::Read`] if the file cannot be read.
/// - Return [`PatchError::Write`] if the file cannot be written.
pub fn normalize_line_endings(path: &Path) -> Result<bool> {
    let data = fs::read(path).map_err(|source| PatchError::Read {
        source,
        path: path.to_path_buf(),
    })?;

    let mut normalized = Vec::with_capacity(data.len());
    let mut bytes = data.iter().copied().peekable();
    while let Some(byte) = bytes.next() {
        // INVARIANT: Only drop CR when it starts a CRLF pair.
        if byte == b'\r' && bytes.peek() == Some(&b'\n') {
            continue;
        }
        normalized.push(byte);
    }

    if normalized.len() == data.len() {
        return Ok(false);
    }

    fs::write(path, normalized).map_err(|source| PatchError::Write {
        source,
        path: path.to_path_buf(),
    })?;

    Ok(true)
}

/// Write FFmpeg source shim the patched build files expect.
///
/// # Errors
///
/// - Return [`PatchError::Write`] if the shim cannot be written.
pub fn write_bswapdsp_shim(ffmpeg_dir: &Path) -> Result<PathBuf> {
    let path = ffmpeg_dir.join(BSWAPDSP_SHIM_PATH);
    let write = |path: &Path| -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, BSWAPDSP_SHIM)
    };

    write(&path).map_err(|source| PatchError::Write {
        source,
        path: path.clone(),
    })?;

    Ok(path)
}

/// What [`apply_patch`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyAction {
    Applied,
    AlreadyApplied,
}

/// Apply patch from root of target checkout.
///
/// A patch whose reverse applies cleanly is already in the tree, and is
/// skipped. Anything else is applied exactly once with no retry.
///
/// # Errors
///
/// - Return [`ProvisionError::PatchFailed`] if the patch does not apply.
#[instrument(skip(ctx, dir), level = "debug")]
pub fn apply_patch<R: Runner>(ctx: &Context<R>, dir: &Path, filename: &str) -> ProvisionResult<ApplyAction> {
    let check = ctx
        .command("git")
        .args(["apply", "--check", "--reverse", filename])
        .current_dir(dir)
        .capture();
    if ctx.run(&check).is_ok() {
        info!("{filename} already applied in {}", dir.display());
        return Ok(ApplyAction::AlreadyApplied);
    }

    let apply = ctx
        .command("git")
        .args(["apply", filename])
        .current_dir(dir);
    ctx.run(&apply)
        .map_err(|source| ProvisionError::PatchFailed {
            patch: filename.into(),
            source: PatchError::Apply(source),
        })?;
    info!("applied {filename} in {}", dir.display());

    Ok(ApplyAction::Applied)
}

/// Relocate, prepare, and apply the whole codec patch set.
///
/// # Errors
///
/// - Return [`ProvisionError::PatchFailed`] at the first failing step.
#[instrument(skip(ctx), level = "debug")]
pub fn apply_codec_patches<R: Runner>(ctx: &Context<R>) -> ProvisionResult<()> {
    let layout = &ctx.layout;
    relocate_patches(layout)?;

    for relative in LINE_ENDING_FIXUPS {
        let path = layout.electron_src.join(relative);
        if !path.exists() {
            warn!("{} does not exist, skipping line ending fixup", path.display());
            continue;
        }

        let changed = normalize_line_endings(&path).map_err(|source| ProvisionError::PatchFailed {
            patch: relative.into(),
            source,
        })?;
        if changed {
            info!("converted {} to LF line endings", path.display());
        }
    }

    let shim = write_bswapdsp_shim(&layout.ffmpeg).map_err(|source| ProvisionError::PatchFailed {
        patch: BSWAPDSP_SHIM_PATH.into(),
        source,
    })?;
    debug!("wrote {}", shim.display());

    for patch in CODEC_PATCHES {
        apply_patch(ctx, patch.target.dir(layout), patch.filename)?;
    }

    Ok(())
}

/// All possible patching errors.
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// Patch exists neither in the codecs repository nor at its target.
    #[error("patch {filename} not found in {:?}", source_dir.display())]
    Missing { filename: String, source_dir: PathBuf },

    /// Patch cannot be moved to its target.
    #[error("failed to move {:?} to {:?}", from.display(), to.display())]
    Move {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },

    /// File cannot be read.
    #[error("failed to read {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// File cannot be written.
    #[error("failed to write {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Git refused to apply the patch.
    #[error(transparent)]
    Apply(#[from] ExecError),
}

/// Friendly result alias :3
pub type Result<T, E = PatchError> = std::result::Result<T, E>;
