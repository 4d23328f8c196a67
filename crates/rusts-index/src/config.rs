//! Index configuration
//!
//! Loaded from a TOML file or built in code. Every setting has a default so
//! an empty file is a valid configuration.

use crate::error::{IndexError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Number of strings per Snappy-compressed dictionary group in forward
    /// index blocks
    pub dict_block_size: usize,
    /// Reset flusher state after every tag key / metric. Turning this off
    /// keeps the last built trie around for inspection in tests.
    pub auto_reset: bool,
    /// Verify block checksums when reading
    pub verify_checksums: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dict_block_size: 256,
            auto_reset: true,
            verify_checksums: true,
        }
    }
}

impl IndexConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| IndexError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| IndexError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.dict_block_size == 0 {
            return Err(IndexError::Config("dict_block_size must be > 0".to_string()));
        }
        if self.dict_block_size > u32::MAX as usize {
            return Err(IndexError::Config(format!(
                "dict_block_size {} exceeds {}",
                self.dict_block_size,
                u32::MAX
            )));
        }
        Ok(())
    }

    /// Builder-style toggle for `auto_reset`
    pub fn with_auto_reset(mut self, auto_reset: bool) -> Self {
        self.auto_reset = auto_reset;
        self
    }

    /// Builder-style setter for `dict_block_size`
    pub fn with_dict_block_size(mut self, size: usize) -> Self {
        self.dict_block_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IndexConfig::default();
        assert_eq!(config.dict_block_size, 256);
        assert!(config.auto_reset);
        assert!(config.verify_checksums);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let config = IndexConfig::from_toml("dict_block_size = 16\nverify_checksums = false").unwrap();
        assert_eq!(config.dict_block_size, 16);
        assert!(!config.verify_checksums);
        assert!(config.auto_reset);

        assert!(IndexConfig::from_toml("").is_ok());
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            IndexConfig::from_toml("dict_block_size = 0"),
            Err(IndexError::Config(_))
        ));
        assert!(matches!(
            IndexConfig::from_toml("dict_block_size = \"big\""),
            Err(IndexError::Config(_))
        ));
    }
}
