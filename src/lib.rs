//! paramscan library
//!
//! Coordinates parameter sweeps of batch simulations on a shared
//! filesystem registry.
//!
//! # Features
//!
//! - **Sweep expansion**: a ranges descriptor becomes one experiment per
//!   combination of values, first parameter varying slowest
//! - **Deduplication**: a configuration recorded anywhere in the registry is
//!   linked, never resubmitted
//! - **Cancellation**: jobs are aborted from their on-disk sentinels, with
//!   the compile-to-run handoff race handled
//!
//! # Example
//!
//! ```no_run
//! use paramscan::{BatchScheduler, Config, ParameterSet, Registry, SweepOrchestrator};
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load();
//!     let registry = Registry::new(config.registry.clone())?;
//!     let scheduler = BatchScheduler::new(config.scheduler.clone(), config.cancel.clone())?;
//!
//!     let ranges = ParameterSet::read(Path::new("scan_ranges.json"))?;
//!     let report = SweepOrchestrator::new(&registry, &scheduler).submit_sweep(&ranges)?;
//!
//!     println!("{}: {} submitted, {} linked", report.name, report.submitted(), report.linked());
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod dedup;
pub mod error;
pub mod lifecycle;
pub mod lock;
pub mod params;
pub mod registry;
pub mod scheduler;
pub mod sweep;
pub mod viz;

// Re-export commonly used types
pub use config::Config;
pub use dedup::{ExperimentIndex, ExperimentRecord};
pub use error::{ScanError, ScanResult};
pub use lifecycle::{AbortOutcome, AbortReport, JobPhase, JobState, LifecycleTracker};
pub use params::ParameterSet;
pub use registry::{NamingScheme, Registry};
pub use scheduler::{BatchScheduler, Scheduler};
pub use sweep::{ExperimentOutcome, SweepOrchestrator, SweepReport};
pub use viz::{Canvas, DataReader, Plot, Visualizer};
