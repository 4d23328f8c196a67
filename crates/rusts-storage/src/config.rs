//! Table store configuration
//!
//! Loaded from the `[store]` table of a TOML file or built in code.

use crate::error::{Result, StorageError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Table store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the table files
    pub dir: PathBuf,
    /// File name prefix; tables are named `{prefix}_{number:08}.rtsk`
    pub file_prefix: String,
    /// fsync table files before publishing them
    pub sync_on_commit: bool,
    /// Tables at least this large are memory-mapped, smaller ones are read
    /// onto the heap
    pub mmap_threshold: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data/index"),
            file_prefix: "table".to_string(),
            sync_on_commit: true,
            mmap_threshold: 64 * 1024, // 64KB
        }
    }
}

impl StoreConfig {
    /// Configuration for `dir` with every other setting at its default
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| StorageError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| StorageError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.file_prefix.is_empty() {
            return Err(StorageError::Config("file_prefix must not be empty".to_string()));
        }
        if self
            .file_prefix
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '.' || c == '_')
        {
            return Err(StorageError::Config(format!(
                "file_prefix '{}' must not contain path separators, '.' or '_'",
                self.file_prefix
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.file_prefix, "table");
        assert!(config.sync_on_commit);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let config = StoreConfig::from_toml(
            r#"
            dir = "/var/lib/rusts/index"
            file_prefix = "inverted"
            sync_on_commit = false
            "#,
        )
        .unwrap();
        assert_eq!(config.dir, PathBuf::from("/var/lib/rusts/index"));
        assert_eq!(config.file_prefix, "inverted");
        assert!(!config.sync_on_commit);
        assert_eq!(config.mmap_threshold, 64 * 1024);
    }

    #[test]
    fn test_invalid_prefix() {
        assert!(StoreConfig::from_toml(r#"file_prefix = "a_b""#).is_err());
        assert!(StoreConfig::from_toml(r#"file_prefix = """#).is_err());
        assert!(StoreConfig::from_toml("dir = 5").is_err());
    }
}
