// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Dependency installation.
//!
//! Every external tool is handled the same way: run a read-only __probe__,
//! judge its output, and only invoke the installer when the probe says the
//! tool is missing or unacceptable. Probes never fail the run. A probe that
//! cannot even be spawned simply means the tool is not installed. Installers
//! on the other hand are fatal when they fail, with no retry.
//!
//! Nothing records what was installed. Idempotency is re-derived on every
//! run by probing again. The one exception is depot_tools, which has no probe
//! of its own and leaves a stamp once bootstrapped.

use crate::{
    exec::{ExternalCommand, Runner},
    path::ensure_directory,
    provision::{Context, ProvisionError, Result},
};

use std::{io::ErrorKind, path::PathBuf};
use tracing::{debug, info, instrument, warn};

/// Judgement of probe output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acceptance {
    /// Successful exit status is enough.
    Succeeds,

    /// Output must contain something besides whitespace.
    NonEmpty,

    /// Output must contain target text.
    Contains(String),
}

impl Acceptance {
    pub fn accepts(&self, output: &str) -> bool {
        match self {
            Self::Succeeds => true,
            Self::NonEmpty => !output.trim().is_empty(),
            Self::Contains(text) => output.contains(text.as_str()),
        }
    }
}

/// Read-only presence check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub command: ExternalCommand,
    pub acceptance: Acceptance,
}

/// Observed state of a dependency.
#[derive(Debug)]
pub enum ProbeState {
    /// Present and acceptable.
    Accepted,

    /// Present, but output was rejected, e.g., wrong version.
    Rejected { output: String },

    /// Probe itself failed to run or exited unsuccessfully.
    Failed(ProvisionError),
}

/// Decision derived from probe state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Skip,
    Install,
}

/// Decide whether dependency needs installing.
pub fn plan(state: &ProbeState) -> Action {
    match state {
        ProbeState::Accepted => Action::Skip,
        ProbeState::Rejected { .. } | ProbeState::Failed(_) => Action::Install,
    }
}

/// Run probe and classify the result.
pub fn observe<R: Runner>(ctx: &Context<R>, tool: &str, probe: &Probe) -> ProbeState {
    match ctx.run(&probe.command) {
        Ok(output) if probe.acceptance.accepts(&output) => ProbeState::Accepted,
        Ok(output) => ProbeState::Rejected { output },
        Err(source) => ProbeState::Failed(ProvisionError::ProbeFailed {
            tool: tool.into(),
            source,
        }),
    }
}

/// External tool installable through a package manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub probe: Probe,
    pub installer: ExternalCommand,
}

/// Install dependency unless its probe accepts what is already there.
///
/// # Errors
///
/// - Return [`ProvisionError::InstallFailed`] if the installer fails.
#[instrument(skip(ctx, dependency), fields(tool = %dependency.name), level = "debug")]
pub fn ensure_installed<R: Runner>(ctx: &Context<R>, dependency: &Dependency) -> Result<Action> {
    let state = observe(ctx, &dependency.name, &dependency.probe);
    match &state {
        ProbeState::Rejected { output } => debug!("probe output rejected: {output:?}"),
        ProbeState::Failed(error) if error.is_recoverable() => {
            debug!("{error}, treating as not installed")
        }
        ProbeState::Failed(error) => warn!("{error}, treating as not installed"),
        ProbeState::Accepted => {}
    }

    let action = plan(&state);
    match action {
        Action::Skip => info!("{} is already installed", dependency.name),
        Action::Install => {
            info!("{} is NOT installed, installing", dependency.name);
            ctx.run(&dependency.installer)
                .map_err(|source| ProvisionError::InstallFailed {
                    tool: dependency.name.clone(),
                    source,
                })?;
            info!("{} installed", dependency.name);
        }
    }

    Ok(action)
}

fn winget<R: Runner>(ctx: &Context<R>, id: &str) -> ExternalCommand {
    ctx.command("winget").args(["install", "-e", "--id", id])
}

/// Visual Studio with the C++ toolchain, located through vswhere.
pub fn visual_studio<R: Runner>(ctx: &Context<R>) -> Dependency {
    let program_files = std::env::var_os("ProgramFiles(x86)")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(r"C:\Program Files (x86)"));
    let vswhere = program_files
        .join("Microsoft Visual Studio")
        .join("Installer")
        .join("vswhere.exe");

    Dependency {
        name: "Microsoft.VisualStudio.2022.Community".into(),
        probe: Probe {
            command: ctx
                .command(vswhere)
                .args(["-latest", "-property", "installationPath"])
                .capture(),
            acceptance: Acceptance::NonEmpty,
        },
        installer: winget(ctx, "Microsoft.VisualStudio.2022.Community"),
    }
}

pub fn git<R: Runner>(ctx: &Context<R>) -> Dependency {
    Dependency {
        name: "Git.Git".into(),
        probe: Probe {
            command: ctx.command("git").arg("--version").capture(),
            acceptance: Acceptance::Succeeds,
        },
        installer: winget(ctx, "Git.Git"),
    }
}

/// NVM for Windows, the Node.js version manager.
pub fn nvm<R: Runner>(ctx: &Context<R>) -> Dependency {
    Dependency {
        name: "CoreyButler.NVMforWindows".into(),
        probe: Probe {
            command: ctx.command("nvm").arg("--version").capture(),
            acceptance: Acceptance::Succeeds,
        },
        installer: winget(ctx, "CoreyButler.NVMforWindows"),
    }
}

/// Ensure pinned Node.js version is the active one.
///
/// Node.js is never installed directly. The version manager is installed if
/// needed, then asked to install and activate the pinned version.
///
/// # Errors
///
/// - Return [`ProvisionError::InstallFailed`] if the version manager or the
///   pinned version cannot be installed or activated.
#[instrument(skip(ctx), level = "debug")]
pub fn ensure_node<R: Runner>(ctx: &Context<R>) -> Result<Action> {
    let version = ctx.config.versions.node.as_str();
    let probe = Probe {
        command: ctx.command("node").arg("--version").capture(),
        acceptance: Acceptance::Contains(version.into()),
    };

    let tool = format!("Node.js {version}");
    if plan(&observe(ctx, &tool, &probe)) == Action::Skip {
        info!("{tool} is already installed");
        return Ok(Action::Skip);
    }

    ensure_installed(ctx, &nvm(ctx))?;
    for subcommand in ["install", "use"] {
        let command = ctx.command("nvm").args([subcommand, version]);
        ctx.run(&command)
            .map_err(|source| ProvisionError::InstallFailed {
                tool: tool.clone(),
                source,
            })?;
    }
    info!("{tool} installed and active");

    Ok(Action::Install)
}

/// Install compiler toolchain, version control, and runtime, in that order.
///
/// # Errors
///
/// - Return [`ProvisionError::InstallFailed`] at the first failing install.
pub fn install_toolchain<R: Runner>(ctx: &Context<R>) -> Result<()> {
    ensure_installed(ctx, &visual_studio(ctx))?;
    ensure_installed(ctx, &git(ctx))?;
    ensure_node(ctx)?;

    Ok(())
}

/// Download, extract, and bootstrap depot_tools.
///
/// Skipped entirely if an earlier run finished the bootstrap, which is marked
/// by [`Layout::depot_tools_stamp`](crate::workspace::Layout::depot_tools_stamp).
/// A depot_tools directory without the stamp is left over from an interrupted
/// run, and is downloaded and extracted over again.
///
/// # Errors
///
/// - Return [`ProvisionError::InstallFailed`] if download, extraction, or
///   bootstrap fail.
/// - Return [`ProvisionError::Filesystem`] if the archive cannot be removed,
///   or the bootstrap stamp cannot be written.
#[instrument(skip(ctx), level = "debug")]
pub fn install_depot_tools<R: Runner>(ctx: &Context<R>) -> Result<Action> {
    let depot_tools = &ctx.layout.depot_tools;
    let stamp = ctx.layout.depot_tools_stamp();
    if stamp.exists() {
        info!("depot_tools is already installed");
        return Ok(Action::Skip);
    }
    if depot_tools.exists() {
        warn!(
            "{} is incomplete, installing depot_tools again",
            depot_tools.display()
        );
    }

    let url = ctx.config.sources.depot_tools.as_str();
    let archive = ctx.layout.download_path(url);
    let failed = |source| ProvisionError::InstallFailed {
        tool: "depot_tools".into(),
        source,
    };

    let download = ctx
        .command("curl")
        .args(["--fail", "--location", url, "--output"])
        .arg(&archive);
    ctx.run(&download).map_err(failed)?;

    let target = ensure_directory(depot_tools)?;
    info!("extracting {} to {}", archive.display(), target.display());
    let extract = ctx
        .command("tar")
        .arg("-xf")
        .arg(&archive)
        .arg("-C")
        .arg(&target);
    ctx.run(&extract).map_err(failed)?;

    match std::fs::remove_file(&archive) {
        Ok(()) => {}
        Err(error) if error.kind() == ErrorKind::NotFound => {
            warn!("archive {} already gone", archive.display());
        }
        Err(source) => {
            return Err(ProvisionError::Filesystem {
                path: archive,
                source,
            })
        }
    }

    let bootstrap = ctx.command("gclient").current_dir(&target).via_cmd();
    ctx.run(&bootstrap).map_err(failed)?;

    // INVARIANT: Stamp only after bootstrap succeeded.
    std::fs::write(&stamp, ctx.config.sources.depot_tools.as_bytes()).map_err(|source| {
        ProvisionError::Filesystem {
            path: stamp.clone(),
            source,
        }
    })?;
    info!("depot_tools installed");

    Ok(Action::Install)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ProvisionConfig, exec::fixture::ScriptedRunner};
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;

    #[test_case(Acceptance::Succeeds, "", true; "succeeds accepts empty output")]
    #[test_case(Acceptance::NonEmpty, "  \r\n", false; "non empty rejects whitespace")]
    #[test_case(Acceptance::NonEmpty, r"C:\VS\2022", true; "non empty accepts path")]
    #[test_case(Acceptance::Contains("v20.9.0".into()), "v20.9.0", true; "contains accepts pinned version")]
    #[test_case(Acceptance::Contains("v20.9.0".into()), "v18.19.1", false; "contains rejects other version")]
    #[test]
    fn acceptance_judges_output(acceptance: Acceptance, output: &str, expect: bool) {
        pretty_assertions::assert_eq!(acceptance.accepts(output), expect);
    }

    #[test]
    fn plan_only_skips_accepted_probes() {
        assert_eq!(plan(&ProbeState::Accepted), Action::Skip);
        assert_eq!(
            plan(&ProbeState::Rejected {
                output: "v18.19.1".into()
            }),
            Action::Install
        );
        assert_eq!(
            plan(&ProbeState::Failed(ProvisionError::NotElevated)),
            Action::Install
        );
    }

    #[sealed_test]
    fn accepted_probe_never_invokes_installer() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new().reply("git --version", "git version 2.44.0.windows.1");
        let ctx = Context::new(ProvisionConfig::default(), &runner)?;

        let action = ensure_installed(&ctx, &git(&ctx))?;
        assert_eq!(action, Action::Skip);
        assert_eq!(runner.lines(), vec!["git --version"]);
        assert_eq!(runner.count("winget"), 0);

        Ok(())
    }

    #[sealed_test]
    fn failed_probe_means_not_installed() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new().fail("git --version");
        let ctx = Context::new(ProvisionConfig::default(), &runner)?;

        let action = ensure_installed(&ctx, &git(&ctx))?;
        assert_eq!(action, Action::Install);
        assert_eq!(
            runner.lines(),
            vec!["git --version", "winget install -e --id Git.Git"]
        );

        Ok(())
    }

    #[sealed_test]
    fn failed_presence_check_is_recoverable() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new().fail("git --version");
        let ctx = Context::new(ProvisionConfig::default(), &runner)?;
        let dependency = git(&ctx);

        let state = observe(&ctx, &dependency.name, &dependency.probe);
        assert!(matches!(
            state,
            ProbeState::Failed(ref error) if error.is_recoverable()
        ));
        assert_eq!(plan(&state), Action::Install);

        Ok(())
    }

    #[sealed_test]
    fn failed_installer_is_fatal() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new().fail("vswhere").fail("winget");
        let ctx = Context::new(ProvisionConfig::default(), &runner)?;

        let result = ensure_installed(&ctx, &visual_studio(&ctx));
        assert!(matches!(
            result,
            Err(ProvisionError::InstallFailed { ref tool, .. })
                if tool == "Microsoft.VisualStudio.2022.Community"
        ));
        assert_eq!(runner.count("winget"), 1);

        Ok(())
    }

    #[sealed_test]
    fn empty_vswhere_output_triggers_install() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new().reply("vswhere", "");
        let ctx = Context::new(ProvisionConfig::default(), &runner)?;

        let action = ensure_installed(&ctx, &visual_studio(&ctx))?;
        assert_eq!(action, Action::Install);
        assert_eq!(
            runner.count("winget install -e --id Microsoft.VisualStudio.2022.Community"),
            1
        );

        Ok(())
    }

    #[sealed_test]
    fn pinned_node_is_left_alone() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new().reply("node --version", "v20.9.0");
        let ctx = Context::new(ProvisionConfig::default(), &runner)?;

        assert_eq!(ensure_node(&ctx)?, Action::Skip);
        assert_eq!(runner.lines(), vec!["node --version"]);

        Ok(())
    }

    #[sealed_test]
    fn wrong_node_version_goes_through_nvm() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new()
            .reply("node --version", "v18.19.1")
            .reply("nvm --version", "1.1.12");
        let ctx = Context::new(ProvisionConfig::default(), &runner)?;

        assert_eq!(ensure_node(&ctx)?, Action::Install);
        assert_eq!(
            runner.lines(),
            vec![
                "node --version",
                "nvm --version",
                "nvm install v20.9.0",
                "nvm use v20.9.0",
            ]
        );

        Ok(())
    }

    #[sealed_test]
    fn existing_depot_tools_is_skipped() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new();
        let ctx = Context::new(ProvisionConfig::default(), &runner)?;
        ensure_directory(&ctx.layout.depot_tools)?;
        std::fs::write(ctx.layout.depot_tools_stamp(), "")?;

        assert_eq!(install_depot_tools(&ctx)?, Action::Skip);
        assert!(runner.lines().is_empty());

        Ok(())
    }

    #[sealed_test]
    fn interrupted_extraction_is_redone() -> anyhow::Result<()> {
        let broken = ScriptedRunner::new().fail("tar -xf");
        let ctx = Context::new(ProvisionConfig::default(), &broken)?;
        assert!(matches!(
            install_depot_tools(&ctx),
            Err(ProvisionError::InstallFailed { ref tool, .. }) if tool == "depot_tools"
        ));
        assert!(ctx.layout.depot_tools.is_dir());
        assert!(!ctx.layout.depot_tools_stamp().exists());

        let runner = ScriptedRunner::new();
        let ctx = Context::new(ProvisionConfig::default(), &runner)?;
        assert_eq!(install_depot_tools(&ctx)?, Action::Install);
        assert_eq!(runner.count("curl"), 1);
        assert_eq!(runner.count("tar -xf"), 1);
        assert_eq!(runner.count("cmd /c gclient"), 1);
        assert!(ctx.layout.depot_tools_stamp().is_file());

        Ok(())
    }

    #[sealed_test]
    fn failed_bootstrap_leaves_no_stamp() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new().fail("cmd /c gclient");
        let ctx = Context::new(ProvisionConfig::default(), &runner)?;

        assert!(install_depot_tools(&ctx).is_err());
        assert!(!ctx.layout.depot_tools_stamp().exists());

        Ok(())
    }

    #[sealed_test]
    fn depot_tools_download_extract_bootstrap() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new();
        let ctx = Context::new(ProvisionConfig::default(), &runner)?;
        let archive = ctx.layout.cache_root.join("depot_tools.zip");
        std::fs::write(&archive, "zip")?;

        assert_eq!(install_depot_tools(&ctx)?, Action::Install);
        assert!(!archive.exists());
        assert!(ctx.layout.depot_tools.is_dir());
        assert!(ctx.layout.depot_tools_stamp().is_file());

        let lines = runner.lines();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("curl --fail --location https://storage.googleapis.com/chrome-infra/depot_tools.zip --output"));
        assert!(lines[1].starts_with("tar -xf"));
        assert_eq!(lines[2], "cmd /c gclient");

        Ok(())
    }
}
