// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for files and directories that the
//! provisioning sequence needs to create, or read in some way.

use std::path::{Path, PathBuf};

/// Ensure that target directory exists.
///
/// Creates the directory along with any missing ancestors. Does nothing if it
/// already exists. The returned path is always absolute, relative paths being
/// resolved against the current directory. This is the only primitive used to
/// create directories in the cache tree.
///
/// # Errors
///
/// - Return [`PathError::CreateDirectory`] if directory creation fails.
/// - Return [`PathError::Resolve`] if the absolute path cannot be determined.
pub fn ensure_directory(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    mkdirp::mkdirp(path).map_err(|source| PathError::CreateDirectory {
        source,
        path: path.to_path_buf(),
    })?;

    std::path::absolute(path).map_err(|source| PathError::Resolve {
        source,
        path: path.to_path_buf(),
    })
}

/// Determine default absolute path to the configuration file.
///
/// Uses `$XDG_CONFIG_HOME/electron-codecs/config.toml` on Unix-like systems,
/// and `{FOLDERID_RoamingAppData}\electron-codecs\config.toml` on Windows.
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`PathError::NoConfigDir`] if configuration directory cannot be
///   determined.
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("electron-codecs").join("config.toml"))
        .ok_or(PathError::NoConfigDir)
}

/// All possible path resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// No way to determine user's configuration directory.
    #[error("cannot determine absolute path to user's configuration directory")]
    NoConfigDir,

    /// Directory or one of its ancestors cannot be created.
    #[error("failed to create directory {:?}", path.display())]
    CreateDirectory {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Absolute form of path cannot be determined.
    #[error("failed to resolve absolute path of {:?}", path.display())]
    Resolve {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = PathError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test]
    fn ensure_directory_is_idempotent() -> anyhow::Result<()> {
        let first = ensure_directory(".cache/electron")?;
        let second = ensure_directory(".cache/electron")?;

        assert_eq!(first, second);
        assert!(first.is_absolute());
        assert!(first.is_dir());
        assert!(first.ends_with(".cache/electron"));

        Ok(())
    }

    #[sealed_test]
    fn ensure_directory_creates_ancestors() -> anyhow::Result<()> {
        let path = ensure_directory("a/b/c/d")?;
        assert!(path.is_dir());
        assert!(Path::new("a/b/c").is_dir());

        Ok(())
    }

    #[sealed_test]
    fn ensure_directory_rejects_file() -> anyhow::Result<()> {
        std::fs::write("occupied", "not a directory")?;
        let result = ensure_directory("occupied/child");
        assert!(matches!(result, Err(PathError::CreateDirectory { .. })));

        Ok(())
    }
}
