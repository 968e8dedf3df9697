//! Sweep orchestration - expand ranges and submit or link each experiment
//!
//! A sweep gets a fresh `<sweep_prefix>_NNNN` directory holding its range
//! descriptor. Every configuration of the cross-product then becomes one
//! experiment node in that directory: a real experiment submitted to the
//! scheduler, or an alias to an identical experiment recorded earlier.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::dedup::ExperimentIndex;
use crate::error::{ScanError, ScanResult};
use crate::lock::RegistryLock;
use crate::params::ParameterSet;
use crate::registry::Registry;
use crate::scheduler::Scheduler;

/// What happened to one configuration of a sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExperimentOutcome {
    /// A new experiment directory was created and handed to the scheduler
    Submitted { node: PathBuf },
    /// An alias node now points at an experiment that already existed
    Linked { node: PathBuf, target: PathBuf },
}

impl ExperimentOutcome {
    /// Node created in the current sweep
    pub fn node(&self) -> &Path {
        match self {
            ExperimentOutcome::Submitted { node } | ExperimentOutcome::Linked { node, .. } => node,
        }
    }

    /// Existing experiment the node links to, if any
    pub fn existing(&self) -> Option<&Path> {
        match self {
            ExperimentOutcome::Submitted { .. } => None,
            ExperimentOutcome::Linked { target, .. } => Some(target),
        }
    }
}

/// Result of a sweep submission
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub id: u32,
    /// Sweep directory name, e.g. `scan_0003`
    pub name: String,
    pub path: PathBuf,
    pub experiments: Vec<(ParameterSet, ExperimentOutcome)>,
}

impl SweepReport {
    pub fn submitted(&self) -> usize {
        self.experiments
            .iter()
            .filter(|(_, o)| matches!(o, ExperimentOutcome::Submitted { .. }))
            .count()
    }

    pub fn linked(&self) -> usize {
        self.experiments.len() - self.submitted()
    }
}

/// Drives sweep submission against one registry and one scheduler
pub struct SweepOrchestrator<'a, S: Scheduler + ?Sized> {
    registry: &'a Registry,
    scheduler: &'a S,
}

impl<'a, S: Scheduler + ?Sized> SweepOrchestrator<'a, S> {
    pub fn new(registry: &'a Registry, scheduler: &'a S) -> Self {
        Self {
            registry,
            scheduler,
        }
    }

    /// Create a sweep for `ranges` and submit or link every configuration.
    ///
    /// Holds the registry lock throughout. A submission failure stops the
    /// sweep; nodes created so far stay on disk for inspection.
    pub fn submit_sweep(&self, ranges: &ParameterSet) -> ScanResult<SweepReport> {
        if ranges.is_empty() {
            return Err(ScanError::format(
                self.registry.root(),
                "sweep ranges declare no parameters",
            ));
        }

        let root = self.registry.root();
        fs::create_dir_all(root).map_err(|e| ScanError::io(root, e))?;
        let _lock = RegistryLock::acquire(&self.registry.lock_path())?;

        // 1. Allocate the sweep directory
        let id = self.registry.next_sweep_id()?;
        let name = self.registry.sweep_naming().dir_name(id);
        let path = root.join(&name);
        fs::create_dir(&path).map_err(|e| ScanError::create_dir(&path, e))?;
        tracing::info!(
            "Created sweep {} ({} configurations)",
            name,
            ranges.combination_count()
        );

        // 2. Persist the full ranges
        ranges.write(&self.registry.ranges_path(&path))?;

        // 3. Submit or link each configuration
        let mut experiments = Vec::with_capacity(ranges.combination_count());
        for config in ranges.cross_product() {
            let outcome = self.submit_experiment(&path, &config)?;
            experiments.push((config, outcome));
        }

        Ok(SweepReport {
            id,
            name,
            path,
            experiments,
        })
    }

    /// Add one experiment node for `config` to `sweep_dir`.
    ///
    /// If an identical configuration exists anywhere in the registry the
    /// node becomes an alias to it and nothing is submitted. Otherwise a
    /// real node is created, its descriptor written, and the scheduler
    /// invoked exactly once. Callers other than [`submit_sweep`](Self::submit_sweep)
    /// must hold the registry lock themselves.
    pub fn submit_experiment(
        &self,
        sweep_dir: &Path,
        config: &ParameterSet,
    ) -> ScanResult<ExperimentOutcome> {
        let existing = ExperimentIndex::new(self.registry).find_match(config)?;

        let id = self.registry.next_experiment_id(sweep_dir)?;
        let node = sweep_dir.join(self.registry.experiment_naming().dir_name(id));

        if let Some(target) = existing {
            link_experiment(&target, &node)?;
            tracing::info!(
                "Configuration [{}] already exists at {}, linked {}",
                config,
                target.display(),
                node.display()
            );
            return Ok(ExperimentOutcome::Linked { node, target });
        }

        fs::create_dir(&node).map_err(|e| ScanError::create_dir(&node, e))?;
        config.write(&self.registry.params_path(&node))?;

        self.scheduler.submit(&node)?;
        tracing::info!(
            "Submitted [{}] as {} ({})",
            config,
            node.display(),
            config.fingerprint()
        );

        Ok(ExperimentOutcome::Submitted { node })
    }
}

#[cfg(unix)]
fn link_experiment(target: &Path, node: &Path) -> ScanResult<()> {
    std::os::unix::fs::symlink(target, node).map_err(|e| ScanError::create_dir(node, e))
}

#[cfg(windows)]
fn link_experiment(target: &Path, node: &Path) -> ScanResult<()> {
    std::os::windows::fs::symlink_dir(target, node).map_err(|e| ScanError::create_dir(node, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RegistryConfig;
    use serde_json::json;
    use std::cell::RefCell;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        submitted: RefCell<Vec<PathBuf>>,
        fail_with: Option<String>,
    }

    impl Scheduler for Recorder {
        fn submit(&self, experiment_dir: &Path) -> ScanResult<()> {
            self.submitted.borrow_mut().push(experiment_dir.to_path_buf());
            match &self.fail_with {
                Some(diagnostic) => Err(ScanError::Submission {
                    path: experiment_dir.to_path_buf(),
                    diagnostic: diagnostic.clone(),
                }),
                None => Ok(()),
            }
        }

        fn cancel(&self, _job_id: &str) -> ScanResult<bool> {
            Ok(true)
        }

        fn cancel_detached(&self, _job_id: &str) -> ScanResult<()> {
            Ok(())
        }
    }

    fn ranges() -> ParameterSet {
        ParameterSet::new()
            .with("a", vec![json!(1), json!(2)])
            .with("b", vec![json!(10)])
    }

    #[test]
    fn test_first_sweep_submits_everything() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::new(RegistryConfig::with_root(dir.path())).unwrap();
        let scheduler = Recorder::default();

        let report = SweepOrchestrator::new(&registry, &scheduler)
            .submit_sweep(&ranges())
            .unwrap();

        assert_eq!(report.name, "scan_0001");
        assert_eq!(report.submitted(), 2);
        assert_eq!(report.linked(), 0);
        assert_eq!(scheduler.submitted.borrow().len(), 2);
        assert!(report.path.join("scan_ranges.json").is_file());
        assert_eq!(
            ParameterSet::read(&report.path.join("scan_ranges.json")).unwrap(),
            ranges()
        );

        let second = report.path.join("sim_0002").join("params.json");
        assert_eq!(
            ParameterSet::read(&second).unwrap(),
            ParameterSet::new()
                .with("a", vec![json!(2)])
                .with("b", vec![json!(10)])
        );
    }

    #[test]
    fn test_duplicate_configuration_within_sweep_is_linked() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::new(RegistryConfig::with_root(dir.path())).unwrap();
        let scheduler = Recorder::default();
        let ranges = ParameterSet::new().with("a", vec![json!(1), json!(1)]);

        let report = SweepOrchestrator::new(&registry, &scheduler)
            .submit_sweep(&ranges)
            .unwrap();

        assert_eq!(report.submitted(), 1);
        assert_eq!(report.linked(), 1);
        assert_eq!(
            report.experiments[1].1.existing(),
            Some(report.path.join("sim_0001").as_path())
        );
    }

    #[test]
    fn test_submission_failure_keeps_node() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::new(RegistryConfig::with_root(dir.path())).unwrap();
        let scheduler = Recorder {
            fail_with: Some("tbg: no such template".to_string()),
            ..Recorder::default()
        };

        let err = SweepOrchestrator::new(&registry, &scheduler)
            .submit_sweep(&ranges())
            .unwrap_err();

        match err {
            ScanError::Submission { diagnostic, .. } => {
                assert!(diagnostic.contains("no such template"))
            }
            other => panic!("unexpected error: {other}"),
        }
        let node = dir.path().join("scan_0001").join("sim_0001");
        assert!(node.join("params.json").is_file());
        assert_eq!(scheduler.submitted.borrow().len(), 1);

        // The written descriptor still deduplicates
        let index = ExperimentIndex::new(&registry);
        let first = ParameterSet::new()
            .with("a", vec![json!(1)])
            .with("b", vec![json!(10)]);
        assert_eq!(index.find_match(&first).unwrap(), Some(node));
    }

    #[test]
    fn test_empty_ranges_rejected() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::new(RegistryConfig::with_root(dir.path())).unwrap();
        let scheduler = Recorder::default();

        let err = SweepOrchestrator::new(&registry, &scheduler)
            .submit_sweep(&ParameterSet::new())
            .unwrap_err();
        assert!(err.is_format());
        assert!(registry.sweeps().unwrap().is_empty());
    }

    #[test]
    fn test_experiment_id_collision_is_already_exists() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::new(RegistryConfig::with_root(dir.path())).unwrap();
        let scheduler = Recorder::default();
        let orchestrator = SweepOrchestrator::new(&registry, &scheduler);

        let sweep = dir.path().join("scan_0001");
        fs::create_dir(&sweep).unwrap();
        fs::write(sweep.join("sim_0001"), b"stray file, not a node").unwrap();

        let config = ParameterSet::new().with("a", vec![json!(7)]);
        let err = orchestrator.submit_experiment(&sweep, &config).unwrap_err();
        assert!(matches!(err, ScanError::AlreadyExists { .. }));
    }
}
