use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::consts::{BLASTDB_ENV, DEFAULT_CHUNK_SIZE, DEFAULT_MEMORY_BOUND};
use crate::errors::{Result, SeqDbError};

/// Runtime settings for opening databases.
///
/// Every field has a default, so a TOML file only needs the values it
/// changes:
///
/// ```toml
/// use_mmap = false
/// search_paths = ["/data/blast"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SeqDbConfig {
    /// Memory-map database files; when false all reads are buffered.
    pub use_mmap: bool,
    /// Directories searched for database names that are not found as given.
    pub search_paths: Vec<PathBuf>,
    /// Bytes the region atlas may hold before it flushes unused regions.
    pub memory_bound: u64,
    /// Number of OIDs per chunk when a caller does not ask for a size.
    pub default_chunk_size: usize,
}

impl Default for SeqDbConfig {
    fn default() -> Self {
        SeqDbConfig {
            use_mmap: true,
            search_paths: Vec::new(),
            memory_bound: DEFAULT_MEMORY_BOUND,
            default_chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl SeqDbConfig {
    /// Default settings with search paths taken from the `BLASTDB`
    /// environment variable.
    pub fn from_env() -> Self {
        SeqDbConfig {
            search_paths: get_default_search_paths(),
            ..Default::default()
        }
    }

    /// Reads settings from a TOML file.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| SeqDbError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| SeqDbError::Config(e.to_string()))
    }

    /// Search path rendered the way error messages show it.
    pub fn search_path_string(&self) -> String {
        self.search_paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(":")
    }
}

/// Get the database search path from the environment variable, if set.
///
/// # Returns
/// - directories listed in `BLASTDB`, in order
pub fn get_default_search_paths() -> Vec<PathBuf> {
    match env::var(BLASTDB_ENV) {
        Ok(val) => split_search_path(&val),
        Err(_) => Vec::new(),
    }
}

fn split_search_path(value: &str) -> Vec<PathBuf> {
    value
        .split([':', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_split_search_path() {
        assert_eq!(
            split_search_path("/a/b:/c; /d ::"),
            vec![
                PathBuf::from("/a/b"),
                PathBuf::from("/c"),
                PathBuf::from("/d")
            ]
        );
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SeqDbConfig::from_toml_str("use_mmap = false\nsearch_paths = [\"/data\"]\n")
            .unwrap();
        assert!(!config.use_mmap);
        assert_eq!(config.search_paths, vec![PathBuf::from("/data")]);
        assert_eq!(config.memory_bound, DEFAULT_MEMORY_BOUND);
        assert_eq!(config.default_chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_toml_file_and_bad_value() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_chunk_size = 16").unwrap();
        let config = SeqDbConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.default_chunk_size, 16);

        let err = SeqDbConfig::from_toml_str("use_mmap = \"sometimes\"").unwrap_err();
        assert!(matches!(err, SeqDbError::Config(_)));
    }
}
