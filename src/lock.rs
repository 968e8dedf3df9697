//! Advisory lock serializing writers of one registry root

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{ScanError, ScanResult};

/// Exclusive lock on the registry lock file, released on drop
#[derive(Debug)]
pub struct RegistryLock {
    file: File,
    path: PathBuf,
}

impl RegistryLock {
    /// Block until the exclusive lock on `path` is held
    pub fn acquire(path: &Path) -> ScanResult<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| ScanError::io(path, e))?;

        if file.try_lock_exclusive().is_err() {
            tracing::info!("Waiting for registry lock {}", path.display());
            file.lock_exclusive().map_err(|source| ScanError::Lock {
                path: path.to_path_buf(),
                source,
            })?;
        }
        tracing::debug!("Acquired registry lock {}", path.display());

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        tracing::debug!("Released registry lock {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_is_exclusive_until_dropped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".lock");

        let held = RegistryLock::acquire(&path).unwrap();
        let other = File::open(&path).unwrap();
        assert!(other.try_lock_exclusive().is_err());

        drop(held);
        assert!(other.try_lock_exclusive().is_ok());
    }
}
