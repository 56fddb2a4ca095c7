// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Provision a Windows host and build Electron with proprietary codecs.
//!
//! The whole tool is one linear sequence of external commands wrapped in
//! enough bookkeeping to make re-running it after a failure safe. See
//! [`provision`] for the sequence itself and [`recovery`] for what happens
//! when it fails.

pub mod build;
pub mod config;
pub mod exec;
pub mod install;
pub mod patch;
pub mod path;
pub mod provision;
pub mod recovery;
pub mod workspace;

pub use config::ProvisionConfig;
pub use exec::{ExecError, ExternalCommand, Runner, SystemRunner};
pub use provision::{provision, Context, ProvisionError};
pub use recovery::{run_guarded, Report, RollbackOutcome};
pub use workspace::Layout;
