//! Job lifecycle tracking and sweep cancellation
//!
//! The batch system records each phase of an experiment by writing its job
//! id to a sentinel file: `<experiment>/jobid` once the compile job is
//! queued, `<experiment>/run/jobid` once the run job is queued. The state of
//! an experiment is derived from which sentinels exist; nothing here writes
//! them.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ScanResult;
use crate::registry::Registry;
use crate::scheduler::Scheduler;

/// Sentinel file name written by the scheduler wrapper
pub const SENTINEL_FILE: &str = "jobid";

/// Subdirectory holding the run phase
pub const RUN_DIR: &str = "run";

/// Scheduler phase of an experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Compiling,
    Running,
}

impl JobPhase {
    /// Sentinel location for this phase inside an experiment directory
    pub fn sentinel_path(self, experiment_dir: &Path) -> PathBuf {
        match self {
            JobPhase::Compiling => experiment_dir.join(SENTINEL_FILE),
            JobPhase::Running => experiment_dir.join(RUN_DIR).join(SENTINEL_FILE),
        }
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobPhase::Compiling => write!(f, "compiling"),
            JobPhase::Running => write!(f, "running"),
        }
    }
}

/// Result of reading a sentinel file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sentinel {
    /// Not written yet (or written empty, i.e. mid-write)
    Absent,
    Present(String),
    /// Exists but could not be read
    Unreadable(String),
}

/// Read the sentinel of `phase`, keeping "absent" and "unreadable" apart
pub fn read_sentinel(experiment_dir: &Path, phase: JobPhase) -> Sentinel {
    let path = phase.sentinel_path(experiment_dir);
    match fs::read_to_string(&path) {
        Ok(content) => {
            let id = content.trim();
            if id.is_empty() {
                Sentinel::Absent
            } else {
                Sentinel::Present(id.to_string())
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Sentinel::Absent,
        Err(e) => Sentinel::Unreadable(format!("{}: {}", path.display(), e)),
    }
}

/// Job id recorded for `phase`, if any. Unreadable sentinels are logged.
pub fn job_id(experiment_dir: &Path, phase: JobPhase) -> Option<String> {
    match read_sentinel(experiment_dir, phase) {
        Sentinel::Present(id) => Some(id),
        Sentinel::Absent => None,
        Sentinel::Unreadable(reason) => {
            tracing::warn!("Unreadable {} sentinel: {}", phase, reason);
            None
        }
    }
}

/// When the sentinel of `phase` was last written
pub fn sentinel_time(experiment_dir: &Path, phase: JobPhase) -> Option<DateTime<Utc>> {
    fs::metadata(phase.sentinel_path(experiment_dir))
        .and_then(|meta| meta.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

/// State of an experiment as far as sentinels tell.
///
/// Whether a queued job has finished is only known to the batch system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    NotSubmitted,
    Compiling { job_id: String },
    Running { job_id: String },
}

pub fn job_state(experiment_dir: &Path) -> JobState {
    if let Some(job_id) = job_id(experiment_dir, JobPhase::Running) {
        JobState::Running { job_id }
    } else if let Some(job_id) = job_id(experiment_dir, JobPhase::Compiling) {
        JobState::Compiling { job_id }
    } else {
        JobState::NotSubmitted
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::NotSubmitted => write!(f, "not submitted"),
            JobState::Compiling { job_id } => write!(f, "compiling ({job_id})"),
            JobState::Running { job_id } => write!(f, "running ({job_id})"),
        }
    }
}

/// What an abort did to one experiment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AbortOutcome {
    /// The run job was cancelled
    RunCancelled { job_id: String },
    /// The run job refused cancellation, so it is over already
    AlreadyFinished { job_id: String },
    /// The compile job was cancelled before the run started
    CompileCancelled { job_id: String },
    /// Compile cancellation lost the race; a cancellation of the run job
    /// that replaced it was issued without waiting
    RunCancelRequested {
        compile_job_id: String,
        run_job_id: String,
    },
    /// Compile cancellation failed and no run job has appeared
    CompileRaced { job_id: String },
    /// Nothing reached the scheduler yet
    NotSubmitted,
}

/// Per-node result of an abort
#[derive(Debug, Clone, Serialize)]
pub struct NodeAbort {
    pub name: String,
    pub path: PathBuf,
    pub outcome: AbortOutcome,
}

/// Result of aborting a sweep
#[derive(Debug, Clone, Default, Serialize)]
pub struct AbortReport {
    pub sweep: String,
    pub nodes: Vec<NodeAbort>,
}

impl AbortReport {
    /// Number of synchronous cancellations that succeeded
    pub fn cancelled(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| {
                matches!(
                    n.outcome,
                    AbortOutcome::RunCancelled { .. } | AbortOutcome::CompileCancelled { .. }
                )
            })
            .count()
    }
}

/// Cancels the jobs of a sweep through a [`Scheduler`]
pub struct LifecycleTracker<'a, S: Scheduler + ?Sized> {
    registry: &'a Registry,
    scheduler: &'a S,
}

impl<'a, S: Scheduler + ?Sized> LifecycleTracker<'a, S> {
    pub fn new(registry: &'a Registry, scheduler: &'a S) -> Self {
        Self {
            registry,
            scheduler,
        }
    }

    /// Cancel every unfinished job of `sweep`.
    ///
    /// Names outside the sweep naming convention are ignored and yield an
    /// empty report. Refused cancellations are read as "already finished".
    pub fn abort_sweep(&self, sweep: &str) -> ScanResult<AbortReport> {
        let mut report = AbortReport {
            sweep: sweep.to_string(),
            nodes: Vec::new(),
        };

        let is_path = sweep.contains(|c: char| c == '/' || c == '\\');
        if !self.registry.sweep_naming().matches(sweep) || is_path {
            tracing::debug!("Not a sweep name, nothing to abort: {:?}", sweep);
            return Ok(report);
        }

        let sweep_dir = self.registry.sweep_path(sweep);
        for node in self.registry.experiments(&sweep_dir)? {
            let outcome = self.abort_experiment(&node.path);
            report.nodes.push(NodeAbort {
                name: node.name,
                path: node.path,
                outcome,
            });
        }

        Ok(report)
    }

    /// Cancel whatever job `experiment_dir` currently has queued
    pub fn abort_experiment(&self, experiment_dir: &Path) -> AbortOutcome {
        let name = experiment_dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if let Some(run_id) = job_id(experiment_dir, JobPhase::Running) {
            if self.cancel(&run_id) {
                tracing::info!("Deleted running job {} of {}", run_id, name);
                return AbortOutcome::RunCancelled { job_id: run_id };
            }
            tracing::info!("{} has already finished and can't be aborted", name);
            return AbortOutcome::AlreadyFinished { job_id: run_id };
        }

        let Some(compile_id) = job_id(experiment_dir, JobPhase::Compiling) else {
            return AbortOutcome::NotSubmitted;
        };

        if self.cancel(&compile_id) {
            tracing::info!("Deleted compile job {} of {}", compile_id, name);
            return AbortOutcome::CompileCancelled { job_id: compile_id };
        }

        // Compilation finished meanwhile and the run job took over
        match job_id(experiment_dir, JobPhase::Running) {
            Some(run_id) => {
                if let Err(e) = self.scheduler.cancel_detached(&run_id) {
                    tracing::warn!("Could not request deletion of job {}: {}", run_id, e);
                } else {
                    tracing::info!("Deleting running job {} of {}", run_id, name);
                }
                AbortOutcome::RunCancelRequested {
                    compile_job_id: compile_id,
                    run_job_id: run_id,
                }
            }
            None => {
                tracing::warn!(
                    "Compile job {} of {} could not be deleted and no run job is recorded",
                    compile_id,
                    name
                );
                AbortOutcome::CompileRaced { job_id: compile_id }
            }
        }
    }

    fn cancel(&self, job_id: &str) -> bool {
        self.scheduler.cancel(job_id).unwrap_or_else(|e| {
            tracing::warn!("Cancellation of job {} failed to run: {}", job_id, e);
            false
        })
    }
}
