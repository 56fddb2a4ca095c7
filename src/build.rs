// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Native build invocation.
//!
//! Generate Ninja files with GN, then compile the target with Ninja. Both run
//! from the Chromium root in the foreground, streaming their output. Their
//! exit status is the only success signal.

use crate::{
    exec::{ExternalCommand, Runner},
    provision::{Context, ProvisionError, Result},
};

use std::fmt::{Display, Formatter, Result as FmtResult};
use tracing::{info, instrument};

/// Stage of the native build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStep {
    /// Build configuration generation through GN.
    Generate,

    /// Compilation through Ninja.
    Compile,
}

impl Display for BuildStep {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Generate => fmt.write_str("gn gen"),
            Self::Compile => fmt.write_str("ninja"),
        }
    }
}

/// Command that generates build configuration.
pub fn generate_command<R: Runner>(ctx: &Context<R>) -> ExternalCommand {
    let build = &ctx.config.build;
    ctx.command("gn")
        .args(["gen", build.out_dir.as_str()])
        .arg(format!("--args=import(\"{}\")", build.args_file))
        .current_dir(&ctx.layout.electron_src)
        .via_cmd()
}

/// Command that compiles the build target.
pub fn compile_command<R: Runner>(ctx: &Context<R>) -> ExternalCommand {
    let build = &ctx.config.build;
    ctx.command("ninja")
        .args(["-C", build.out_dir.as_str(), build.target.as_str()])
        .current_dir(&ctx.layout.electron_src)
        .via_cmd()
}

/// Generate build configuration, then compile.
///
/// # Errors
///
/// - Return [`ProvisionError::BuildFailed`] naming the failing step.
#[instrument(skip(ctx), level = "debug")]
pub fn build_electron<R: Runner>(ctx: &Context<R>) -> Result<()> {
    for (step, command) in [
        (BuildStep::Generate, generate_command(ctx)),
        (BuildStep::Compile, compile_command(ctx)),
    ] {
        info!("running {step}");
        ctx.run(&command)
            .map_err(|source| ProvisionError::BuildFailed { step, source })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ProvisionConfig, exec::fixture::ScriptedRunner};
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test]
    fn build_generates_then_compiles() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new();
        let ctx = Context::new(ProvisionConfig::default(), &runner)?;

        build_electron(&ctx)?;
        assert_eq!(
            runner.lines(),
            vec![
                r#"cmd /c gn gen out/Release --args=import("//electron/build/args/release.gn")"#,
                "cmd /c ninja -C out/Release electron",
            ]
        );
        for command in runner.commands() {
            assert_eq!(
                command.get_current_dir(),
                Some(ctx.layout.electron_src.as_path())
            );
        }

        Ok(())
    }

    #[sealed_test]
    fn failed_generation_stops_before_compile() -> anyhow::Result<()> {
        let runner = ScriptedRunner::new().fail("gn gen");
        let ctx = Context::new(ProvisionConfig::default(), &runner)?;

        let result = build_electron(&ctx);
        assert!(matches!(
            result,
            Err(ProvisionError::BuildFailed {
                step: BuildStep::Generate,
                ..
            })
        ));
        assert_eq!(runner.count("ninja"), 0);

        Ok(())
    }

    #[test]
    fn build_step_names() {
        assert_eq!(BuildStep::Generate.to_string(), "gn gen");
        assert_eq!(BuildStep::Compile.to_string(), "ninja");
    }
}
