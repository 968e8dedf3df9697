//! Error types for registry, submission, and cancellation operations

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised by the sweep registry
#[derive(Error, Debug)]
pub enum ScanError {
    /// A descriptor or directory name could not be parsed (corrupt or partial write)
    #[error("format error in {}: {reason}", path.display())]
    Format { path: PathBuf, reason: String },

    /// Directory creation collided with an existing id
    #[error("already exists: {}", path.display())]
    AlreadyExists { path: PathBuf },

    /// The scheduler submission tool reported diagnostics
    #[error("submission failed for {}: {diagnostic}", path.display())]
    Submission { path: PathBuf, diagnostic: String },

    /// A required handle was missing at construction
    #[error("lookup error: {0}")]
    Lookup(String),

    /// Missing or invalid configuration field
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The registry lock could not be taken
    #[error("failed to lock registry at {}: {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type ScanResult<T> = Result<T, ScanError>;

impl ScanError {
    pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        ScanError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn format(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        ScanError::Format {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Map a directory-creation failure, keeping id collisions distinct
    pub(crate) fn create_dir(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::AlreadyExists {
            ScanError::AlreadyExists {
                path: path.as_ref().to_path_buf(),
            }
        } else {
            ScanError::io(path, source)
        }
    }

    /// True for errors caused by a damaged descriptor or name
    pub fn is_format(&self) -> bool {
        matches!(self, ScanError::Format { .. } | ScanError::Json(_))
    }
}
