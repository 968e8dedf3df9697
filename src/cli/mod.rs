//! CLI module - Command line interface definitions and handlers

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// paramscan - parameter sweep coordinator for batch simulation campaigns
///
/// Expands parameter ranges into experiments, submits each new
/// configuration once, links repeats to the experiment that already ran,
/// and cancels the jobs of a sweep.
#[derive(Parser, Debug)]
#[command(name = "paramscan")]
#[command(version)]
#[command(about = "Parameter sweep coordinator for batch simulations", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (default: platform config dir, config.toml)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Registry root, overrides `registry.root` from the config
    #[arg(long, short, global = true)]
    pub root: Option<PathBuf>,

    /// Verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a sweep from a ranges file and submit its experiments
    Submit(SubmitArgs),

    /// Cancel every queued job of a sweep
    Abort(SweepArgs),

    /// List sweeps with their experiment counts
    List,

    /// Show the job state of every experiment of a sweep
    Status(SweepArgs),

    /// Look up an existing experiment with the given parameters
    Find(FindArgs),

    /// Manage the configuration file
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Clone, Parser)]
pub struct SubmitArgs {
    /// JSON file mapping each parameter to its list of values
    #[arg(required = true)]
    pub ranges: PathBuf,

    /// Only report what would be submitted or linked
    #[arg(long, short = 'n')]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Parser)]
pub struct SweepArgs {
    /// Sweep directory name, e.g. scan_0003
    #[arg(required = true)]
    pub sweep: String,
}

#[derive(Debug, Clone, Parser)]
pub struct FindArgs {
    /// JSON file with one value per parameter
    #[arg(required = true)]
    pub params: PathBuf,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommand {
    /// Write a commented sample config
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,

    /// Print the config file location
    Path,
}
