//! Experiment deduplication index
//!
//! Answers "has this exact configuration been run before, anywhere in the
//! registry?" by walking every real experiment node and comparing its
//! descriptor. Traversal order is sweep ascending, then experiment
//! ascending, so the oldest real node is always the one returned.

use std::fs;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::ScanResult;
use crate::params::ParameterSet;
use crate::registry::Registry;

/// One experiment node as seen by a registry scan
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentRecord {
    /// Owning sweep directory name
    pub sweep: String,
    /// Experiment directory name
    pub name: String,
    pub path: PathBuf,
    /// Link target when the node is an alias
    pub alias_of: Option<PathBuf>,
    /// Alias whose target is gone
    pub dangling: bool,
    /// Descriptor, if it could be read and parsed
    pub params: Option<ParameterSet>,
}

impl ExperimentRecord {
    pub fn is_alias(&self) -> bool {
        self.alias_of.is_some()
    }
}

/// Registry-wide lookup of previously recorded configurations
pub struct ExperimentIndex<'a> {
    registry: &'a Registry,
}

impl<'a> ExperimentIndex<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Path of the first real experiment whose descriptor equals `target`.
    ///
    /// Alias nodes are never returned. Descriptors that fail to read or
    /// parse count as "no match" for that node; failing to list the
    /// registry root is an error.
    pub fn find_match(&self, target: &ParameterSet) -> ScanResult<Option<PathBuf>> {
        for sweep in self.registry.sweeps()? {
            let experiments = match self.registry.experiments(&sweep.path) {
                Ok(experiments) => experiments,
                Err(e) => {
                    tracing::warn!("Skipping sweep {}: {}", sweep.name, e);
                    continue;
                }
            };

            for node in experiments.into_iter().filter(|n| !n.alias) {
                let descriptor = self.registry.params_path(&node.path);
                match ParameterSet::read(&descriptor) {
                    Ok(params) if params == *target => {
                        tracing::debug!(
                            "Configuration {} already recorded at {}",
                            target.fingerprint(),
                            node.path.display()
                        );
                        return Ok(Some(node.path));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("Ignoring unreadable descriptor: {}", e);
                    }
                }
            }
        }

        Ok(None)
    }

    /// Configurations of `ranges` paired with any existing match.
    ///
    /// Nothing is created or submitted; this is what a sweep would do.
    pub fn plan(&self, ranges: &ParameterSet) -> ScanResult<Vec<(ParameterSet, Option<PathBuf>)>> {
        ranges
            .cross_product()
            .into_iter()
            .map(|config| {
                let existing = self.find_match(&config)?;
                Ok((config, existing))
            })
            .collect()
    }

    /// Every experiment node of every sweep, in traversal order
    pub fn records(&self) -> ScanResult<Vec<ExperimentRecord>> {
        let mut records = Vec::new();
        for sweep in self.registry.sweeps()?.into_iter().filter(|s| !s.dangling) {
            records.extend(self.sweep_records(&sweep.name)?);
        }
        Ok(records)
    }

    /// Experiment nodes of one sweep
    pub fn sweep_records(&self, sweep: &str) -> ScanResult<Vec<ExperimentRecord>> {
        let sweep_dir = self.registry.sweep_path(sweep);
        let mut records = Vec::new();

        for node in self.registry.experiments(&sweep_dir)? {
            let alias_of = if node.alias {
                fs::read_link(&node.path).ok()
            } else {
                None
            };
            let params = ParameterSet::read(&self.registry.params_path(&node.path)).ok();

            records.push(ExperimentRecord {
                sweep: sweep.to_string(),
                name: node.name,
                path: node.path,
                alias_of,
                dangling: node.dangling,
                params,
            });
        }

        Ok(records)
    }
}
