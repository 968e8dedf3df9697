//! Directory registry - naming, listing and id allocation for sweep trees
//!
//! Sweeps live directly under the registry root as `<sweep_prefix>_NNNN`.
//! Experiments live inside their sweep as `<experiment_prefix>_NNNN`; an
//! experiment entry is either a real directory or a symlink (alias) to a
//! real experiment elsewhere in the registry.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::RegistryConfig;
use crate::error::{ScanError, ScanResult};

/// Zero-padding width of sequence numbers
pub const ID_WIDTH: usize = 4;

/// Separator between prefix and sequence number
pub const SEPARATOR: char = '_';

/// `<prefix>_NNNN` naming for one kind of registry directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingScheme {
    prefix: String,
}

impl NamingScheme {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Prefix including the trailing separator, e.g. `scan_`
    pub fn stem(&self) -> String {
        format!("{}{}", self.prefix, SEPARATOR)
    }

    /// Directory name for a sequence number, e.g. `scan_0007`
    pub fn dir_name(&self, id: u32) -> String {
        format!("{}{}{:0width$}", self.prefix, SEPARATOR, id, width = ID_WIDTH)
    }

    /// Does `name` follow this naming convention?
    pub fn matches(&self, name: &str) -> bool {
        name.starts_with(&self.stem())
    }

    /// Sequence number of `name`; `None` if it is not ours or not numeric
    pub fn parse_id(&self, name: &str) -> Option<u32> {
        name.strip_prefix(&self.stem())?.parse().ok()
    }
}

/// A listed registry directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeEntry {
    /// Directory name (`sim_0003`)
    pub name: String,
    /// Full path, not resolved through symlinks
    pub path: PathBuf,
    /// True when the entry is a symlink to another experiment
    pub alias: bool,
    /// Alias whose target no longer exists
    pub dangling: bool,
}

/// List directories of `path` whose name starts with `prefix`, sorted by name.
///
/// Symlinks to directories count as directories, and so do dangling
/// symlinks: their names stay taken. Failure to read `path` itself is
/// returned.
pub fn list_prefixed(path: &Path, prefix: &str) -> ScanResult<Vec<String>> {
    Ok(list_entries(path, prefix)?
        .into_iter()
        .map(|entry| entry.name)
        .collect())
}

fn list_entries(path: &Path, prefix: &str) -> ScanResult<Vec<NodeEntry>> {
    let walker = WalkDir::new(path)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();

    let mut entries = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                let source = err
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "walk failed"));
                return Err(ScanError::io(path, source));
            }
            Err(err) => {
                tracing::debug!("Skipping unreadable entry in {}: {}", path.display(), err);
                continue;
            }
        };

        let file_type = entry.file_type();
        let (alias, dangling) = if file_type.is_dir() {
            (false, false)
        } else if file_type.is_symlink() {
            match fs::metadata(entry.path()) {
                Ok(meta) if meta.is_dir() => (true, false),
                Ok(_) => continue,
                Err(err) => {
                    tracing::debug!("Dangling link {}: {}", entry.path().display(), err);
                    (true, true)
                }
            }
        } else {
            continue;
        };

        let name = entry.file_name().to_string_lossy().to_string();
        if !name.starts_with(prefix) {
            continue;
        }

        entries.push(NodeEntry {
            path: entry.path().to_path_buf(),
            name,
            alias,
            dangling,
        });
    }

    Ok(entries)
}

/// Largest sequence number among `names`, or 0 for an empty listing.
///
/// Each name must carry a numeric suffix after its first separator.
pub fn highest_id<S: AsRef<str>>(names: &[S]) -> ScanResult<u32> {
    let mut highest = 0;
    for name in names {
        let name = name.as_ref();
        let suffix = name
            .split_once(SEPARATOR)
            .map(|(_, suffix)| suffix)
            .ok_or_else(|| ScanError::format(name, "missing sequence separator"))?;
        let id: u32 = suffix
            .parse()
            .map_err(|_| ScanError::format(name, format!("non-numeric sequence {suffix:?}")))?;
        highest = highest.max(id);
    }
    Ok(highest)
}

/// Filesystem view of a sweep registry
#[derive(Debug, Clone)]
pub struct Registry {
    config: RegistryConfig,
    sweeps: NamingScheme,
    experiments: NamingScheme,
}

impl Registry {
    /// Validate `config` and anchor a relative root at the working directory
    pub fn new(mut config: RegistryConfig) -> ScanResult<Self> {
        config.validate()?;
        config.root =
            std::path::absolute(&config.root).map_err(|e| ScanError::io(&config.root, e))?;
        Ok(Self {
            sweeps: NamingScheme::new(&config.sweep_prefix),
            experiments: NamingScheme::new(&config.experiment_prefix),
            config,
        })
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn sweep_naming(&self) -> &NamingScheme {
        &self.sweeps
    }

    pub fn experiment_naming(&self) -> &NamingScheme {
        &self.experiments
    }

    /// All sweep trees in ascending name order
    pub fn sweeps(&self) -> ScanResult<Vec<NodeEntry>> {
        list_entries(self.root(), &self.sweeps.stem())
    }

    /// All experiment nodes of a sweep in ascending name order
    pub fn experiments(&self, sweep_dir: &Path) -> ScanResult<Vec<NodeEntry>> {
        list_entries(sweep_dir, &self.experiments.stem())
    }

    pub fn sweep_path(&self, name: &str) -> PathBuf {
        self.root().join(name)
    }

    pub fn ranges_path(&self, sweep_dir: &Path) -> PathBuf {
        sweep_dir.join(&self.config.ranges_file)
    }

    pub fn params_path(&self, experiment_dir: &Path) -> PathBuf {
        experiment_dir.join(&self.config.params_file)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root().join(&self.config.lock_file)
    }

    /// Next free sweep number under the root
    pub fn next_sweep_id(&self) -> ScanResult<u32> {
        let names: Vec<String> = self.sweeps()?.into_iter().map(|e| e.name).collect();
        Ok(highest_id(&names)? + 1)
    }

    /// Next free experiment number inside `sweep_dir`
    pub fn next_experiment_id(&self, sweep_dir: &Path) -> ScanResult<u32> {
        let names: Vec<String> = self
            .experiments(sweep_dir)?
            .into_iter()
            .map(|e| e.name)
            .collect();
        Ok(highest_id(&names)? + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_dir_name_padding() {
        let naming = NamingScheme::new("scan");
        assert_eq!(naming.dir_name(1), "scan_0001");
        assert_eq!(naming.dir_name(42), "scan_0042");
        assert_eq!(naming.dir_name(12345), "scan_12345");
        assert_eq!(naming.parse_id("scan_0042"), Some(42));
        assert_eq!(naming.parse_id("sim_0042"), None);
        assert!(naming.matches("scan_0001"));
        assert!(!naming.matches("scanner"));
    }

    #[test]
    fn test_highest_id() {
        let empty: Vec<String> = Vec::new();
        assert_eq!(highest_id(&empty).unwrap(), 0);
        assert_eq!(highest_id(&["x_0001", "x_0003"]).unwrap(), 3);
        assert_eq!(highest_id(&["x_0010", "x_0002"]).unwrap(), 10);
    }

    #[test]
    fn test_highest_id_rejects_garbage() {
        assert!(highest_id(&["x_0001", "x_old"]).unwrap_err().is_format());
        assert!(highest_id(&["x0001"]).unwrap_err().is_format());
    }

    #[test]
    fn test_list_prefixed_only_directories_sorted() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("scan_0002")).unwrap();
        fs::create_dir(dir.path().join("scan_0001")).unwrap();
        fs::create_dir(dir.path().join("other_0001")).unwrap();
        fs::write(dir.path().join("scan_0003"), b"not a dir").unwrap();

        let names = list_prefixed(dir.path(), "scan_").unwrap();
        assert_eq!(names, vec!["scan_0001", "scan_0002"]);
    }

    #[test]
    fn test_list_prefixed_missing_root() {
        let dir = TempDir::new().unwrap();
        let err = list_prefixed(&dir.path().join("nope"), "scan_").unwrap_err();
        assert!(matches!(err, ScanError::Io { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directories_are_listed_as_aliases() {
        let dir = TempDir::new().unwrap();
        let real = dir.path().join("sim_0001");
        fs::create_dir(&real).unwrap();
        std::os::unix::fs::symlink(&real, dir.path().join("sim_0002")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("sim_0003"))
            .unwrap();

        let entries = list_entries(dir.path(), "sim_").unwrap();
        assert_eq!(entries.len(), 3);
        assert!(!entries[0].alias);
        assert!(entries[1].alias && !entries[1].dangling);
        assert!(entries[2].alias && entries[2].dangling);
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_alias_keeps_its_id() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::new(RegistryConfig::with_root(dir.path())).unwrap();
        let sweep = dir.path().join("scan_0002");
        fs::create_dir(&sweep).unwrap();
        std::os::unix::fs::symlink(
            dir.path().join("scan_0001").join("sim_0001"),
            sweep.join("sim_0001"),
        )
        .unwrap();

        assert_eq!(registry.experiments(&sweep).unwrap().len(), 1);
        assert_eq!(registry.next_experiment_id(&sweep).unwrap(), 2);
    }

    #[test]
    fn test_relative_root_is_made_absolute() {
        let registry = Registry::new(RegistryConfig::with_root("scans")).unwrap();
        assert!(registry.root().is_absolute());
        assert_eq!(
            registry.root(),
            std::env::current_dir().unwrap().join("scans")
        );
    }

    #[test]
    fn test_registry_next_ids() {
        let dir = TempDir::new().unwrap();
        let registry = Registry::new(RegistryConfig::with_root(dir.path())).unwrap();

        assert_eq!(registry.next_sweep_id().unwrap(), 1);

        let sweep = dir.path().join("scan_0004");
        fs::create_dir_all(sweep.join("sim_0002")).unwrap();
        assert_eq!(registry.next_sweep_id().unwrap(), 5);
        assert_eq!(registry.next_experiment_id(&sweep).unwrap(), 3);
    }

    #[test]
    fn test_registry_requires_root() {
        let err = Registry::new(RegistryConfig::default()).unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
    }
}
