// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the configuration file that pins every version, URL,
//! and build argument the provisioning sequence relies on. Every key is
//! optional. Missing keys fall back to the pinned defaults, so running without
//! any configuration file at all is the normal case. File I/O is left to the
//! caller to figure out.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
};

/// Default Electron release tag to build.
pub const DEFAULT_ELECTRON_VERSION: &str = "v29.1.4";

/// Default Node.js version the build expects to be active.
pub const DEFAULT_NODE_VERSION: &str = "v20.9.0";

/// Provisioning configuration layout.
///
/// # General Layout
///
/// The configuration is split into four tables: pinned versions, remote
/// sources, workspace placement, and build arguments. Each table can be left
/// out entirely.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Pinned tool and source versions.
    pub versions: Versions,

    /// Remote locations to fetch from.
    pub sources: Sources,

    /// Placement of the cache directory tree.
    pub workspace: WorkspaceSettings,

    /// Arguments handed to the native build toolchain.
    pub build: BuildSettings,
}

impl FromStr for ProvisionConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: ProvisionConfig =
            toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on cache root field.
        config.workspace.cache_root = PathBuf::from(
            shellexpand::full(config.workspace.cache_root.to_string_lossy().as_ref())
                .map_err(ConfigError::ShellExpansion)?
                .into_owned(),
        );

        Ok(config)
    }
}

impl Display for ProvisionConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Pinned versions.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Versions {
    /// Electron release tag to check out, e.g., "v29.1.4".
    ///
    /// Also names the directory inside the codecs repository that holds the
    /// matching patch set.
    pub electron: String,

    /// Node.js version that must be active through the version manager.
    pub node: String,
}

impl Default for Versions {
    fn default() -> Self {
        Self {
            electron: DEFAULT_ELECTRON_VERSION.into(),
            node: DEFAULT_NODE_VERSION.into(),
        }
    }
}

/// Remote sources.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Sources {
    /// Electron source repository.
    pub electron: String,

    /// Companion repository holding codec patches per Electron release.
    pub codecs: String,

    /// Archive of Chromium's depot_tools.
    pub depot_tools: String,
}

impl Default for Sources {
    fn default() -> Self {
        Self {
            electron: "https://github.com/electron/electron".into(),
            codecs: "https://github.com/ThaUnknown/electron-chromium-codecs".into(),
            depot_tools: "https://storage.googleapis.com/chrome-infra/depot_tools.zip".into(),
        }
    }
}

/// Workspace placement.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkspaceSettings {
    /// Root of the cache directory tree. Relative paths resolve against the
    /// current directory.
    pub cache_root: PathBuf,
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from(".cache"),
        }
    }
}

/// Native build arguments.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BuildSettings {
    /// Build output directory relative to the source root.
    pub out_dir: String,

    /// GN argument file imported into the generated build configuration.
    pub args_file: String,

    /// Ninja target to compile.
    pub target: String,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            out_dir: "out/Release".into(),
            args_file: "//electron/build/args/release.gn".into(),
            target: "electron".into(),
        }
    }
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}
