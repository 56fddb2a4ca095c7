// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External command execution.
//!
//! Every interaction with the outside world, e.g., package managers, Git,
//! depot_tools, the native build toolchain, goes through a typed
//! [`ExternalCommand`] handed to a [`Runner`]. The runner is the only place
//! that spawns processes, which lets the provisioning sequence be exercised
//! against a fake runner without touching a real tool.
//!
//! # Output Modes
//!
//! Commands either inherit the terminal, streaming their output straight to
//! the user, or have their standard output captured for inspection. Probes
//! capture. Installers, clones, and builds inherit.

use indicatif::{ProgressBar, ProgressStyle};
use std::{
    ffi::{OsStr, OsString},
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    time::Duration,
};
use tracing::{debug, info, instrument};

/// What to do with the standard output of a command.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Stream output to the terminal.
    #[default]
    Inherit,

    /// Collect standard output and hand it back to the caller.
    Capture,
}

/// Typed descriptor of one external process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    program: OsString,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
    envs: Vec<(OsString, OsString)>,
    mode: OutputMode,
}

impl ExternalCommand {
    /// Construct new command for target program.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            envs: Vec::new(),
            mode: OutputMode::default(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append a series of arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run command inside target directory instead of the current one.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Set series of environment variables for the child process.
    pub fn envs(
        mut self,
        vars: impl IntoIterator<Item = (impl Into<OsString>, impl Into<OsString>)>,
    ) -> Self {
        self.envs
            .extend(vars.into_iter().map(|(key, value)| (key.into(), value.into())));
        self
    }

    /// Capture standard output instead of streaming it.
    pub fn capture(mut self) -> Self {
        self.mode = OutputMode::Capture;
        self
    }

    /// Route command through `cmd /c`.
    ///
    /// The depot_tools entry points (gclient, gn, ninja) are batch scripts on
    /// Windows, which cannot be spawned directly.
    pub fn via_cmd(self) -> Self {
        let mut args = vec![OsString::from("/c"), self.program];
        args.extend(self.args);

        Self {
            program: OsString::from("cmd"),
            args,
            ..self
        }
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    pub fn get_current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    pub fn get_envs(&self) -> &[(OsString, OsString)] {
        &self.envs
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }
}

impl Display for ExternalCommand {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write_quoted(fmt, &self.program)?;
        for arg in &self.args {
            fmt.write_str(" ")?;
            write_quoted(fmt, arg)?;
        }

        Ok(())
    }
}

fn write_quoted(fmt: &mut Formatter<'_>, word: &OsStr) -> FmtResult {
    let word = word.to_string_lossy();
    if word.is_empty() || word.contains(char::is_whitespace) {
        write!(fmt, "\"{word}\"")
    } else {
        fmt.write_str(&word)
    }
}

/// Layer of indirection for spawning external processes.
pub trait Runner {
    /// Run command to completion.
    ///
    /// Returns trimmed standard output for [`OutputMode::Capture`] commands,
    /// and an empty string for [`OutputMode::Inherit`] commands.
    ///
    /// # Errors
    ///
    /// - Return [`ExecError::Spawn`] if the process cannot be started.
    /// - Return [`ExecError::Failed`] if the process exits unsuccessfully.
    fn run(&self, command: &ExternalCommand) -> Result<String>;
}

impl<R> Runner for &R
where
    R: Runner + ?Sized,
{
    fn run(&self, command: &ExternalCommand) -> Result<String> {
        (**self).run(command)
    }
}

/// Runner backed by real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    fn build(command: &ExternalCommand) -> Command {
        let mut process = Command::new(command.program());
        process
            .args(command.get_args())
            .envs(command.get_envs().iter().map(|(key, value)| (key, value)));
        if let Some(dir) = command.get_current_dir() {
            process.current_dir(dir);
        }

        process
    }

    fn run_interactive(command: &ExternalCommand) -> Result<String> {
        let status = Self::build(command)
            .status()
            .map_err(|source| ExecError::Spawn {
                command: command.to_string(),
                source,
            })?;

        if !status.success() {
            return Err(ExecError::Failed {
                command: command.to_string(),
                status: status.to_string(),
                message: String::new(),
            });
        }

        Ok(String::new())
    }

    fn run_non_interactive(command: &ExternalCommand) -> Result<String> {
        let style = ProgressStyle::with_template("{spinner:.green} {elapsed_precise:.green}  {msg}")?;
        let bar = ProgressBar::new_spinner();
        bar.set_style(style);
        bar.set_message(command.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));

        let output = Self::build(command).stdin(Stdio::null()).output();
        bar.finish_and_clear();
        let output = output.map_err(|source| ExecError::Spawn {
            command: command.to_string(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
        let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();
        if !output.status.success() {
            return Err(ExecError::Failed {
                command: command.to_string(),
                status: output.status.to_string(),
                message: chomp(stderr),
            });
        }

        Ok(chomp(stdout))
    }
}

impl Runner for SystemRunner {
    #[instrument(skip(self, command), level = "debug")]
    fn run(&self, command: &ExternalCommand) -> Result<String> {
        info!("{command}");
        if let Some(dir) = command.get_current_dir() {
            debug!("working directory: {}", dir.display());
        }

        match command.mode() {
            OutputMode::Inherit => Self::run_interactive(command),
            OutputMode::Capture => Self::run_non_interactive(command),
        }
    }
}

// INVARIANT: Chomp trailing whitespace, including Windows line endings.
fn chomp(message: String) -> String {
    let trimmed = message.trim_end();
    if trimmed.len() == message.len() {
        message
    } else {
        trimmed.to_string()
    }
}

fn details(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(":\n{message}")
    }
}

/// External command error types.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// Process could not be started at all.
    #[error("failed to spawn `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Process ran but exited unsuccessfully.
    #[error("command `{command}` failed with {status}{}", details(.message))]
    Failed {
        command: String,
        status: String,
        message: String,
    },

    /// Style template cannot be set for progress spinner.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),
}

/// Friendly result alias :3
pub type Result<T, E = ExecError> = std::result::Result<T, E>;

#[cfg(test)]
#[path = "../test/fixture.rs"]
pub(crate) mod fixture;
