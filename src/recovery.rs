// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Failure recovery.
//!
//! Provisioning switches the active Node.js version through NVM. If anything
//! fails afterwards the host should not be left on a different Node.js than
//! the user had before, so the previously active version is recorded up front
//! and restored on failure.
//!
//! Restoration is best effort. If it fails, that failure is logged and
//! nothing else happens. The original error still decides the outcome.

use crate::{
    exec::Runner,
    provision::{Context, ProvisionError, Result},
};

use std::error::Error as StdError;
use tracing::{error, info, instrument};

/// Node.js version active before provisioning started.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RuntimeSnapshot {
    node_version: Option<String>,
}

impl RuntimeSnapshot {
    /// Construct snapshot from known version.
    pub fn new(node_version: Option<String>) -> Self {
        Self { node_version }
    }

    /// Record currently active Node.js version.
    ///
    /// No Node.js, or one that cannot report its version, yields an empty
    /// snapshot.
    pub fn capture<R: Runner>(ctx: &Context<R>) -> Self {
        let probe = ctx.command("node").arg("--version").capture();
        let node_version = ctx
            .run(&probe)
            .ok()
            .map(|output| output.trim().to_string())
            .filter(|version| !version.is_empty());

        Self { node_version }
    }

    pub fn node_version(&self) -> Option<&str> {
        self.node_version.as_deref()
    }
}

/// Result of attempting to restore the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// Provisioning succeeded, or failed before touching anything.
    NotAttempted,

    /// Version manager is not installed.
    NoVersionManager,

    /// No previous version was recorded.
    NothingToRestore,

    /// Previous version is active again.
    Restored(String),

    /// Restoration itself failed.
    Failed(String),
}

/// Restore previously active Node.js version.
///
/// Never fails. Every problem is reported through [`RollbackOutcome`].
#[instrument(skip(ctx, snapshot), level = "debug")]
pub fn restore_runtime<R: Runner>(ctx: &Context<R>, snapshot: &RuntimeSnapshot) -> RollbackOutcome {
    let probe = ctx.command("nvm").arg("--version").capture();
    if ctx.run(&probe).is_err() {
        info!("no version manager present, nothing to revert");
        return RollbackOutcome::NoVersionManager;
    }

    let Some(previous) = snapshot.node_version() else {
        info!("no previous node version recorded, nothing to revert");
        return RollbackOutcome::NothingToRestore;
    };

    info!("fatal error encountered, reverting node version to {previous} before exiting");
    let revert = ctx.command("nvm").args(["use", previous]);
    match ctx.run(&revert) {
        Ok(_) => RollbackOutcome::Restored(previous.into()),
        Err(error) => {
            error!("failed to revert node version: {error}");
            RollbackOutcome::Failed(error.to_string())
        }
    }
}

/// Outcome of a guarded provisioning run.
#[derive(Debug)]
pub struct Report {
    pub error: Option<ProvisionError>,
    pub rollback: RollbackOutcome,
}

impl Report {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Process exit status: `0` on success, `1` on any failure.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

/// Run procedure inside the single top-level failure boundary.
///
/// Records the active runtime, runs the procedure, and on failure restores
/// the runtime once (unless the error says nothing was touched) before
/// logging the error.
pub fn run_guarded<R, F>(ctx: &Context<R>, procedure: F) -> Report
where
    R: Runner,
    F: FnOnce(&Context<R>) -> Result<()>,
{
    let snapshot = RuntimeSnapshot::capture(ctx);
    let error = match procedure(ctx) {
        Ok(()) => {
            info!("provisioning finished successfully");
            return Report {
                error: None,
                rollback: RollbackOutcome::NotAttempted,
            };
        }
        Err(error) => error,
    };

    let rollback = if error.wants_rollback() {
        restore_runtime(ctx, &snapshot)
    } else {
        RollbackOutcome::NotAttempted
    };

    error!("fatal error: {}", error_chain(&error));

    Report {
        error: Some(error),
        rollback,
    }
}

fn error_chain(error: &dyn StdError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(&format!("\n  caused by: {cause}"));
        source = cause.source();
    }

    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ProvisionConfig, exec::fixture::ScriptedRunner, exec::ExecError};
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    fn install_failure() -> ProvisionError {
        ProvisionError::InstallFailed {
            tool: "Git.Git".into(),
            source: ExecError::Failed {
                command: "winget install -e --id Git.Git".into(),
                status: "exit code: 1".into(),
                message: "no network".into(),
            },
        }
    }

    #[sealed_test]
    fn snapshot_records_active_version() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new().reply("node --version", "v18.19.1");
        let ctx = Context::new(ProvisionConfig::default(), &runner)?;

        let snapshot = RuntimeSnapshot::capture(&ctx);
        assert_eq!(snapshot.node_version(), Some("v18.19.1"));

        Ok(())
    }

    #[sealed_test]
    fn snapshot_without_node_is_empty() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new().fail("node --version");
        let ctx = Context::new(ProvisionConfig::default(), &runner)?;

        assert_eq!(RuntimeSnapshot::capture(&ctx), RuntimeSnapshot::default());

        Ok(())
    }

    #[sealed_test]
    fn previous_version_is_restored() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new();
        let ctx = Context::new(ProvisionConfig::default(), &runner)?;
        let snapshot = RuntimeSnapshot::new(Some("v18.19.1".into()));

        let outcome = restore_runtime(&ctx, &snapshot);
        assert_eq!(outcome, RollbackOutcome::Restored("v18.19.1".into()));
        assert_eq!(runner.lines(), vec!["nvm --version", "nvm use v18.19.1"]);

        Ok(())
    }

    #[sealed_test]
    fn missing_version_manager_skips_restore() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new().fail("nvm --version");
        let ctx = Context::new(ProvisionConfig::default(), &runner)?;
        let snapshot = RuntimeSnapshot::new(Some("v18.19.1".into()));

        assert_eq!(
            restore_runtime(&ctx, &snapshot),
            RollbackOutcome::NoVersionManager
        );
        assert_eq!(runner.count("nvm use"), 0);

        Ok(())
    }

    #[sealed_test]
    fn failed_restore_keeps_original_error() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new()
            .reply("node --version", "v18.19.1")
            .fail("nvm use");
        let ctx = Context::new(ProvisionConfig::default(), &runner)?;

        let report = run_guarded(&ctx, |_| Err(install_failure()));
        assert_eq!(report.exit_code(), 1);
        assert!(matches!(
            report.error,
            Some(ProvisionError::InstallFailed { .. })
        ));
        assert!(matches!(report.rollback, RollbackOutcome::Failed(_)));

        Ok(())
    }

    #[sealed_test]
    fn privilege_failure_exits_without_rollback() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new();
        let ctx = Context::new(ProvisionConfig::default(), &runner)?;

        let report = run_guarded(&ctx, |_| Err(ProvisionError::NotElevated));
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.rollback, RollbackOutcome::NotAttempted);
        assert_eq!(runner.count("nvm"), 0);

        Ok(())
    }

    #[sealed_test]
    fn success_exits_zero() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new();
        let ctx = Context::new(ProvisionConfig::default(), &runner)?;

        let report = run_guarded(&ctx, |_| Ok(()));
        assert!(report.is_success());
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.rollback, RollbackOutcome::NotAttempted);

        Ok(())
    }

    #[test]
    fn error_chain_lists_causes() {
        let message = error_chain(&install_failure());
        assert_eq!(
            message,
            "failed to install Git.Git\n  caused by: command `winget install -e --id Git.Git` failed with exit code: 1:\nno network"
        );
    }
}
