//! paramscan - parameter sweep coordinator for batch simulation campaigns
//!
//! Expands parameter ranges into experiment directories, submits every new
//! configuration to the batch scheduler exactly once, and cancels the jobs
//! of a sweep on request.

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use paramscan::cli::{commands, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = commands::load_config(&cli);

    // Initialize logging
    let level = if cli.verbose {
        "debug"
    } else {
        config
            .as_ref()
            .map(|c| c.general.log_level.as_str())
            .unwrap_or("info")
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(
            EnvFilter::from_default_env().add_directive(
                format!("paramscan={level}")
                    .parse()
                    .with_context(|| format!("Invalid log level: {level}"))?,
            ),
        )
        .init();

    commands::run(&cli, config)
}
