//! Configuration Module - Registry and cluster settings from config.toml
//!
//! Supports:
//! - Registry root and on-disk naming (prefixes, descriptor file names)
//! - Scheduler submission tool and its templates
//! - Remote cancellation host and command
//!
//! Every component receives its section at construction and validates it
//! there; nothing is looked up lazily.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{ScanError, ScanResult};

/// paramscan configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Registry layout
    pub registry: RegistryConfig,
    /// Batch submission settings
    pub scheduler: SchedulerConfig,
    /// Remote cancellation settings
    pub cancel: CancelConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Registry layout settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Directory holding all sweep trees
    pub root: PathBuf,
    /// Prefix of sweep directories (`<prefix>_NNNN`)
    pub sweep_prefix: String,
    /// Prefix of experiment directories inside a sweep
    pub experiment_prefix: String,
    /// Range descriptor written once per sweep
    pub ranges_file: String,
    /// Single-configuration descriptor written once per experiment
    pub params_file: String,
    /// Advisory lock file, relative to the root
    pub lock_file: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            sweep_prefix: "scan".to_string(),
            experiment_prefix: "sim".to_string(),
            ranges_file: "scan_ranges.json".to_string(),
            params_file: "params.json".to_string(),
            lock_file: ".paramscan.lock".to_string(),
        }
    }
}

impl RegistryConfig {
    /// Registry settings rooted at `root` with default naming
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> ScanResult<()> {
        if self.root.as_os_str().is_empty() {
            return Err(ScanError::Config("registry.root is required".into()));
        }
        for (field, value) in [
            ("registry.sweep_prefix", &self.sweep_prefix),
            ("registry.experiment_prefix", &self.experiment_prefix),
        ] {
            if value.is_empty() || value.contains('_') || value.contains('/') {
                return Err(ScanError::Config(format!(
                    "{field} must be non-empty and contain no '_' or '/': {value:?}"
                )));
            }
        }
        if self.sweep_prefix == self.experiment_prefix {
            return Err(ScanError::Config(
                "registry.sweep_prefix and registry.experiment_prefix must differ".into(),
            ));
        }
        for (field, value) in [
            ("registry.ranges_file", &self.ranges_file),
            ("registry.params_file", &self.params_file),
            ("registry.lock_file", &self.lock_file),
        ] {
            if value.is_empty() {
                return Err(ScanError::Config(format!("{field} is required")));
            }
        }
        Ok(())
    }
}

/// Batch submission tool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Submission program (defaults to `tbg`)
    pub submit_program: String,
    /// Compile configuration passed with `-c`
    pub compile_config: PathBuf,
    /// Job template passed with `-t`
    pub template: PathBuf,
    /// Source tree override passed as `-o TBG_job_src=<job_src>`
    pub job_src: PathBuf,
}

impl SchedulerConfig {
    pub fn validate(&self) -> ScanResult<()> {
        if self.submit_program.is_empty() {
            return Err(ScanError::Config("scheduler.submit_program is required".into()));
        }
        for (field, value) in [
            ("scheduler.compile_config", &self.compile_config),
            ("scheduler.template", &self.template),
            ("scheduler.job_src", &self.job_src),
        ] {
            if value.as_os_str().is_empty() {
                return Err(ScanError::Config(format!("{field} is required")));
            }
        }
        Ok(())
    }
}

/// Remote cancellation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CancelConfig {
    /// Remote shell program (defaults to `ssh`)
    pub remote_program: String,
    /// Host where the queue commands run
    pub remote_host: String,
    /// Cancellation command on the remote host, e.g. `/opt/torque/bin/qdel`
    pub cancel_command: String,
}

impl CancelConfig {
    pub fn validate(&self) -> ScanResult<()> {
        for (field, value) in [
            ("cancel.remote_program", &self.remote_program),
            ("cancel.remote_host", &self.remote_host),
            ("cancel.cancel_command", &self.cancel_command),
        ] {
            if value.trim().is_empty() {
                return Err(ScanError::Config(format!("{field} is required")));
            }
        }
        Ok(())
    }
}

impl Config {
    /// Load config from default path or return defaults
    pub fn load() -> Self {
        Self::load_from(&Self::default_path()).unwrap_or_default()
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;

        Ok(config)
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("org", "paramscan", "paramscan")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".paramscan")
                    .join("config.toml")
            })
    }

    /// Validate every section
    pub fn validate(&self) -> ScanResult<()> {
        self.registry.validate()?;
        self.scheduler.validate()?;
        self.cancel.validate()
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            submit_program: "tbg".to_string(),
            compile_config: PathBuf::new(),
            template: PathBuf::new(),
            job_src: PathBuf::new(),
        }
    }
}

impl Default for CancelConfig {
    fn default() -> Self {
        Self {
            remote_program: "ssh".to_string(),
            remote_host: String::new(),
            cancel_command: String::new(),
        }
    }
}

/// Generate a sample config file with comments
pub fn generate_sample_config() -> String {
    r#"# paramscan configuration

[general]
# Log level: trace, debug, info, warn, error
log_level = "info"

[registry]
# Directory holding every sweep tree (required)
root = "/bigdata/user/scans"

# Sweep directories are <sweep_prefix>_NNNN, experiments <experiment_prefix>_NNNN
sweep_prefix = "scan"
experiment_prefix = "sim"

# Descriptor file names
ranges_file = "scan_ranges.json"
params_file = "params.json"

# Advisory lock held while a sweep is submitted
lock_file = ".paramscan.lock"

[scheduler]
# Submission tool, invoked as:
#   <submit_program> -s --force -c <compile_config> -t <template> -o TBG_job_src=<job_src> <experiment dir>
submit_program = "tbg"
compile_config = "/opt/campaign/etc/picongpu/compile.cfg"
template = "/opt/campaign/etc/picongpu/hypnos-hzdr/compile_laser.tpl"
job_src = "/opt/campaign/src"

[cancel]
# Cancellation runs as: <remote_program> <remote_host> <cancel_command> <job id>
remote_program = "ssh"
remote_host = "hypnos4"
cancel_command = "/opt/torque/bin/qdel"
"#
    .to_string()
}
