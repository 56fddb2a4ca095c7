// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use electron_codecs::{
    path::default_config_path, provision, run_guarded, Context, ProvisionConfig, SystemRunner,
};

use anyhow::{Context as _, Result};
use clap::Parser;
use std::{path::PathBuf, process::exit};
use tracing::{debug, error};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Provision this host and build Electron with proprietary codecs.
///
/// Installs Visual Studio, Git, Node.js, and depot_tools when missing, checks
/// out the pinned Electron release, applies the codec patches, and builds.
/// Must run from an elevated shell. Safe to re-run after a failure.
#[derive(Debug, Clone, Parser)]
#[command(about, long_about, version)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Root of the cache directory tree, overriding configuration.
    #[arg(long, value_name = "path")]
    pub cache_root: Option<PathBuf>,
}

impl Cli {
    fn load_config(&self) -> Result<ProvisionConfig> {
        let path = match &self.config {
            Some(path) => Some(path.clone()),
            None => default_config_path().ok().filter(|path| path.exists()),
        };

        let mut config = match path {
            Some(path) => {
                debug!("load configuration from {}", path.display());
                std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?
                    .parse::<ProvisionConfig>()
                    .with_context(|| format!("invalid configuration in {}", path.display()))?
            }
            None => ProvisionConfig::default(),
        };

        if let Some(cache_root) = &self.cache_root {
            config.workspace.cache_root = cache_root.clone();
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    match run().await {
        Ok(code) => exit(code),
        Err(error) => {
            error!("{error:?}");
            exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    let config = Cli::parse().load_config()?;

    // INVARIANT: The whole sequence runs once, blocking, behind this boundary.
    tokio::task::spawn_blocking(move || -> Result<i32> {
        let ctx = Context::new(config, SystemRunner)?;
        let report = run_guarded(&ctx, provision);
        Ok(report.exit_code())
    })
    .await?
}
