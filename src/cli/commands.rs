//! Command handlers - load config, build components, print results

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;

use super::{Cli, Commands, ConfigCommand, FindArgs, SubmitArgs, SweepArgs};
use crate::config::{generate_sample_config, Config};
use crate::dedup::ExperimentIndex;
use crate::lifecycle::{
    job_state, read_sentinel, sentinel_time, AbortOutcome, JobPhase, JobState,
    LifecycleTracker, Sentinel,
};
use crate::params::ParameterSet;
use crate::registry::Registry;
use crate::scheduler::BatchScheduler;
use crate::sweep::{ExperimentOutcome, SweepOrchestrator};

/// Config file the CLI reads: `--config` or the platform default
pub fn config_path(cli: &Cli) -> PathBuf {
    cli.config.clone().unwrap_or_else(Config::default_path)
}

/// Load the effective configuration.
///
/// An explicit `--config` must exist; the default location may be absent,
/// in which case defaults apply. `--root` overrides `registry.root`.
pub fn load_config(cli: &Cli) -> Result<Config> {
    let path = config_path(cli);
    let mut config = if cli.config.is_some() || path.exists() {
        Config::load_from(&path)?
    } else {
        Config::default()
    };

    if let Some(root) = &cli.root {
        config.registry.root = root.clone();
    }
    Ok(config)
}

/// Dispatch a parsed command line
pub fn run(cli: &Cli, config: Result<Config>) -> Result<()> {
    if let Commands::Config(command) = &cli.command {
        return run_config(cli, command, config);
    }

    let config = config?;
    let registry = Registry::new(config.registry.clone()).context("Invalid [registry] config")?;

    match &cli.command {
        Commands::Submit(args) if args.dry_run => dry_run(cli, &registry, args),
        Commands::Submit(args) => {
            let scheduler = BatchScheduler::new(config.scheduler.clone(), config.cancel.clone())
                .context("Invalid scheduler config")?;
            submit(cli, &registry, &scheduler, args)
        }
        Commands::Abort(args) => {
            let scheduler = BatchScheduler::new(config.scheduler.clone(), config.cancel.clone())
                .context("Invalid scheduler config")?;
            abort(cli, &registry, &scheduler, args)
        }
        Commands::List => list(cli, &registry),
        Commands::Status(args) => status(cli, &registry, args),
        Commands::Find(args) => find(cli, &registry, args),
        Commands::Config(_) => Ok(()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_ranges(path: &Path) -> Result<ParameterSet> {
    let ranges = ParameterSet::read(path)
        .with_context(|| format!("Failed to read ranges: {}", path.display()))?;
    if ranges.is_empty() {
        bail!("{} declares no parameters", path.display());
    }
    Ok(ranges)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn submit(
    cli: &Cli,
    registry: &Registry,
    scheduler: &BatchScheduler,
    args: &SubmitArgs,
) -> Result<()> {
    let ranges = read_ranges(&args.ranges)?;
    let report = SweepOrchestrator::new(registry, scheduler)
        .submit_sweep(&ranges)
        .context("Sweep submission failed")?;

    if cli.json {
        return print_json(&report);
    }

    println!(
        "{} {} ({})",
        "Created sweep".green(),
        report.name.bold(),
        report.path.display()
    );
    for (config, outcome) in &report.experiments {
        let node = file_name(outcome.node());
        match outcome {
            ExperimentOutcome::Submitted { .. } => {
                println!("  {} {} {}", "submitted".green(), node, config);
            }
            ExperimentOutcome::Linked { target, .. } => {
                println!(
                    "  {} {} -> {}",
                    "linked".cyan(),
                    node,
                    target.display().to_string().dimmed()
                );
            }
        }
    }
    println!(
        "{} submitted, {} linked to existing experiments",
        report.submitted(),
        report.linked()
    );
    Ok(())
}

#[derive(Serialize)]
struct PlannedExperiment {
    params: ParameterSet,
    fingerprint: String,
    existing: Option<PathBuf>,
}

fn dry_run(cli: &Cli, registry: &Registry, args: &SubmitArgs) -> Result<()> {
    let ranges = read_ranges(&args.ranges)?;
    let pairs = if registry.root().exists() {
        ExperimentIndex::new(registry).plan(&ranges)?
    } else {
        ranges.cross_product().into_iter().map(|p| (p, None)).collect()
    };
    let plan: Vec<PlannedExperiment> = pairs
        .into_iter()
        .map(|(params, existing)| PlannedExperiment {
            fingerprint: params.fingerprint(),
            params,
            existing,
        })
        .collect();

    if cli.json {
        return print_json(&plan);
    }

    println!(
        "{} {} configurations (dry run)",
        "Would create".yellow(),
        plan.len()
    );
    for item in &plan {
        match &item.existing {
            Some(path) => println!(
                "  {} {} -> {}",
                "link".cyan(),
                item.params,
                path.display().to_string().dimmed()
            ),
            None => println!("  {} {}", "submit".green(), item.params),
        }
    }
    Ok(())
}

fn abort(cli: &Cli, registry: &Registry, scheduler: &BatchScheduler, args: &SweepArgs) -> Result<()> {
    let report = LifecycleTracker::new(registry, scheduler)
        .abort_sweep(&args.sweep)
        .with_context(|| format!("Failed to abort {}", args.sweep))?;

    if cli.json {
        return print_json(&report);
    }

    if report.nodes.is_empty() {
        println!("{} nothing to abort in {}", "note:".yellow(), args.sweep);
        return Ok(());
    }

    for node in &report.nodes {
        let line = match &node.outcome {
            AbortOutcome::RunCancelled { job_id } => {
                format!("{} running job {}", "deleted".red(), job_id)
            }
            AbortOutcome::AlreadyFinished { job_id } => {
                format!("{} (job {})", "already finished".dimmed(), job_id)
            }
            AbortOutcome::CompileCancelled { job_id } => {
                format!("{} compile job {}", "deleted".red(), job_id)
            }
            AbortOutcome::RunCancelRequested {
                compile_job_id,
                run_job_id,
            } => format!(
                "{} running job {} (compile job {} had finished)",
                "deleting".red(),
                run_job_id,
                compile_job_id
            ),
            AbortOutcome::CompileRaced { job_id } => format!(
                "{} compile job {} could not be deleted",
                "warning:".yellow(),
                job_id
            ),
            AbortOutcome::NotSubmitted => "not submitted".dimmed().to_string(),
        };
        println!("  {} {}", node.name.bold(), line);
    }
    println!("{} jobs cancelled", report.cancelled());
    Ok(())
}

#[derive(Serialize)]
struct SweepSummary {
    name: String,
    path: PathBuf,
    experiments: usize,
    aliases: usize,
    dangling: usize,
}

fn sweep_summaries(registry: &Registry) -> Result<Vec<SweepSummary>> {
    let mut summaries = Vec::new();
    for sweep in registry
        .sweeps()
        .with_context(|| format!("Failed to list {}", registry.root().display()))?
        .into_iter()
        .filter(|sweep| !sweep.dangling)
    {
        let experiments = registry.experiments(&sweep.path)?;
        summaries.push(SweepSummary {
            aliases: experiments.iter().filter(|e| e.alias).count(),
            dangling: experiments.iter().filter(|e| e.dangling).count(),
            experiments: experiments.len(),
            name: sweep.name,
            path: sweep.path,
        });
    }
    Ok(summaries)
}

fn list(cli: &Cli, registry: &Registry) -> Result<()> {
    let summaries = sweep_summaries(registry)?;
    if cli.json {
        return print_json(&summaries);
    }

    if summaries.is_empty() {
        println!("No sweeps in {}", registry.root().display());
        return Ok(());
    }
    for summary in &summaries {
        print!(
            "{}  {} experiments ({} linked)",
            summary.name.bold(),
            summary.experiments,
            summary.aliases
        );
        if summary.dangling > 0 {
            print!("  {} {} dangling", "warning:".yellow(), summary.dangling);
        }
        println!();
    }
    Ok(())
}

#[derive(Serialize)]
struct ExperimentStatus {
    name: String,
    state: JobState,
    since: Option<DateTime<Utc>>,
    alias_of: Option<PathBuf>,
    dangling: bool,
    fingerprint: Option<String>,
    unreadable: Vec<String>,
}

fn status_rows(registry: &Registry, sweep: &str) -> Result<Vec<ExperimentStatus>> {
    if !registry.sweep_naming().matches(sweep) {
        bail!("{} is not a sweep name", sweep);
    }

    let records = ExperimentIndex::new(registry)
        .sweep_records(sweep)
        .with_context(|| format!("Failed to read sweep {}", sweep))?;

    let rows = records
        .into_iter()
        .map(|record| {
            let state = job_state(&record.path);
            let since = match &state {
                JobState::NotSubmitted => None,
                JobState::Compiling { .. } => sentinel_time(&record.path, JobPhase::Compiling),
                JobState::Running { .. } => sentinel_time(&record.path, JobPhase::Running),
            };
            let unreadable = [JobPhase::Compiling, JobPhase::Running]
                .into_iter()
                .filter_map(|phase| match read_sentinel(&record.path, phase) {
                    Sentinel::Unreadable(reason) => Some(reason),
                    _ => None,
                })
                .collect();

            ExperimentStatus {
                name: record.name,
                state,
                since,
                alias_of: record.alias_of,
                dangling: record.dangling,
                fingerprint: record.params.as_ref().map(ParameterSet::fingerprint),
                unreadable,
            }
        })
        .collect();
    Ok(rows)
}

fn status(cli: &Cli, registry: &Registry, args: &SweepArgs) -> Result<()> {
    let rows = status_rows(registry, &args.sweep)?;
    if cli.json {
        return print_json(&rows);
    }

    let now = Utc::now();
    for row in &rows {
        let state = match &row.state {
            JobState::NotSubmitted => row.state.to_string().dimmed(),
            JobState::Compiling { .. } => row.state.to_string().yellow(),
            JobState::Running { .. } => row.state.to_string().green(),
        };
        let age = row
            .since
            .map(|t| format!(" for {}", format_age(now - t)))
            .unwrap_or_default();
        let fingerprint = row.fingerprint.as_deref().unwrap_or("--------");

        print!("{}  {}  {}{}", row.name.bold(), fingerprint.dimmed(), state, age);
        if let Some(target) = &row.alias_of {
            print!("  -> {}", target.display());
            if row.dangling {
                print!(" {}", "(missing)".red());
            }
        }
        println!();
        for reason in &row.unreadable {
            println!("    {} unreadable sentinel {}", "warning:".yellow(), reason);
        }
    }
    Ok(())
}

fn format_age(age: chrono::Duration) -> String {
    let minutes = age.num_minutes().max(0);
    match minutes {
        0 => format!("{}s", age.num_seconds().max(0)),
        1..=59 => format!("{minutes}m"),
        60..=1439 => format!("{}h {}m", minutes / 60, minutes % 60),
        _ => format!("{}d {}h", minutes / 1440, (minutes % 1440) / 60),
    }
}

#[derive(Serialize)]
struct FindResult {
    params: ParameterSet,
    fingerprint: String,
    existing: Option<PathBuf>,
}

fn find(cli: &Cli, registry: &Registry, args: &FindArgs) -> Result<()> {
    let params = ParameterSet::read(&args.params)
        .with_context(|| format!("Failed to read parameters: {}", args.params.display()))?;
    if !params.is_single() {
        tracing::warn!(
            "{} holds value lists; only an identical descriptor will match",
            args.params.display()
        );
    }

    let existing = ExperimentIndex::new(registry).find_match(&params)?;
    let result = FindResult {
        fingerprint: params.fingerprint(),
        params,
        existing,
    };

    if cli.json {
        return print_json(&result);
    }

    match &result.existing {
        Some(path) => println!("{} {}", "found".green(), path.display()),
        None => println!(
            "{} no experiment with [{}] ({})",
            "missing".yellow(),
            result.params,
            result.fingerprint
        ),
    }
    Ok(())
}

fn run_config(cli: &Cli, command: &ConfigCommand, config: Result<Config>) -> Result<()> {
    let path = config_path(cli);
    match command {
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            fs::write(&path, generate_sample_config())
                .with_context(|| format!("Failed to write config: {}", path.display()))?;
            println!("{} {}", "Wrote".green(), path.display());
        }
        ConfigCommand::Show => {
            let config = config?;
            if cli.json {
                return print_json(&config);
            }
            print!("{}", toml::to_string_pretty(&config).context("Failed to serialize config")?);
            if let Err(e) = config.validate() {
                println!("{} {}", "warning:".yellow(), e);
            }
        }
        ConfigCommand::Path => println!("{}", path.display()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(chrono::Duration::seconds(42)), "42s");
        assert_eq!(format_age(chrono::Duration::minutes(5)), "5m");
        assert_eq!(format_age(chrono::Duration::minutes(125)), "2h 5m");
        assert_eq!(format_age(chrono::Duration::hours(50)), "2d 2h");
        assert_eq!(format_age(chrono::Duration::seconds(-3)), "0s");
    }

    #[test]
    fn test_root_flag_overrides_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, generate_sample_config()).unwrap();

        let cli = Cli::parse_from([
            "paramscan",
            "--config",
            path.to_str().unwrap(),
            "--root",
            "/elsewhere",
            "list",
        ]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.registry.root, PathBuf::from("/elsewhere"));
        assert_eq!(config.cancel.remote_host, "hypnos4");
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("none.toml");
        let cli = Cli::parse_from(["paramscan", "--config", missing.to_str().unwrap(), "list"]);
        assert!(load_config(&cli).is_err());
    }

    #[test]
    fn test_config_init_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("conf").join("config.toml");
        let args = ["paramscan", "--config", path.to_str().unwrap(), "config", "init"];

        let cli = Cli::parse_from(args);
        run(&cli, load_config(&cli)).unwrap();
        assert!(Config::load_from(&path).is_ok());

        let cli = Cli::parse_from(args);
        assert!(run(&cli, load_config(&cli)).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_alias_is_reported() {
        let dir = TempDir::new().unwrap();
        let real = dir.path().join("scan_0001").join("sim_0001");
        fs::create_dir_all(&real).unwrap();
        let sweep = dir.path().join("scan_0002");
        fs::create_dir_all(&sweep).unwrap();
        std::os::unix::fs::symlink(&real, sweep.join("sim_0001")).unwrap();
        fs::remove_dir_all(&real).unwrap();

        let registry =
            Registry::new(crate::config::RegistryConfig::with_root(dir.path())).unwrap();

        let summaries = sweep_summaries(&registry).unwrap();
        assert_eq!(summaries[1].experiments, 1);
        assert_eq!(summaries[1].dangling, 1);

        let rows = status_rows(&registry, "scan_0002").unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].dangling);
        assert_eq!(rows[0].state, JobState::NotSubmitted);
    }

    #[test]
    fn test_read_ranges_rejects_empty_map() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ranges.json");
        fs::write(&path, "{}").unwrap();
        assert!(read_ranges(&path).is_err());
    }
}
