//! Scheduler boundary - batch submission and remote cancellation
//!
//! The cluster's tools are opaque processes. [`BatchScheduler`] shells out
//! to them; tests substitute their own [`Scheduler`].

use std::path::Path;
use std::process::{Command, Stdio};

use crate::config::{CancelConfig, SchedulerConfig};
use crate::error::{ScanError, ScanResult};

/// Operations the registry needs from the batch system
pub trait Scheduler {
    /// Submit the compile/run chain for an experiment directory.
    ///
    /// Blocks until the submission tool exits; diagnostics on its error
    /// stream become [`ScanError::Submission`].
    fn submit(&self, experiment_dir: &Path) -> ScanResult<()>;

    /// Cancel a queued job and wait for the answer.
    ///
    /// `Ok(true)` means the queue accepted the cancellation, `Ok(false)`
    /// that it refused (typically because the job is gone).
    fn cancel(&self, job_id: &str) -> ScanResult<bool>;

    /// Request a cancellation without waiting for its outcome
    fn cancel_detached(&self, job_id: &str) -> ScanResult<()>;
}

/// [`Scheduler`] backed by the submission tool and a remote queue command
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    submit: SchedulerConfig,
    cancel: CancelConfig,
}

impl BatchScheduler {
    /// Both sections are validated here, before any job is touched
    pub fn new(submit: SchedulerConfig, cancel: CancelConfig) -> ScanResult<Self> {
        submit.validate()?;
        cancel.validate()?;
        Ok(Self { submit, cancel })
    }

    fn submit_command(&self, experiment_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.submit.submit_program);
        cmd.arg("-s")
            .arg("--force")
            .arg("-c")
            .arg(&self.submit.compile_config)
            .arg("-t")
            .arg(&self.submit.template)
            .arg("-o")
            .arg(format!("TBG_job_src={}", self.submit.job_src.display()))
            .arg(experiment_dir);
        cmd
    }

    fn cancel_command(&self, job_id: &str) -> Command {
        let mut cmd = Command::new(&self.cancel.remote_program);
        cmd.arg(&self.cancel.remote_host)
            .arg(&self.cancel.cancel_command)
            .arg(job_id);
        cmd
    }
}

impl Scheduler for BatchScheduler {
    fn submit(&self, experiment_dir: &Path) -> ScanResult<()> {
        let output = self
            .submit_command(experiment_dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ScanError::Submission {
                path: experiment_dir.to_path_buf(),
                diagnostic: format!("failed to run {}: {}", self.submit.submit_program, e),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            return Err(ScanError::Submission {
                path: experiment_dir.to_path_buf(),
                diagnostic: stderr.trim().to_string(),
            });
        }
        if !output.status.success() {
            return Err(ScanError::Submission {
                path: experiment_dir.to_path_buf(),
                diagnostic: format!("{} exited with {}", self.submit.submit_program, output.status),
            });
        }

        tracing::debug!(
            "{} accepted {}: {}",
            self.submit.submit_program,
            experiment_dir.display(),
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }

    fn cancel(&self, job_id: &str) -> ScanResult<bool> {
        let status = self
            .cancel_command(job_id)
            .stdin(Stdio::null())
            .status()
            .map_err(|e| ScanError::io(&self.cancel.remote_program, e))?;
        Ok(status.success())
    }

    fn cancel_detached(&self, job_id: &str) -> ScanResult<()> {
        self.cancel_command(job_id)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ScanError::io(&self.cancel.remote_program, e))?;
        Ok(())
    }
}
