//! Storage engine configuration.
//!
//! Loaded from TOML. Every field has a default, so an empty document is a
//! valid configuration:
//!
//! ```toml
//! endpoints_root = "/var/lib/teilpunkt/endpoints"
//! max_readers = 32
//! chunk_size = 65536
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::vfs::DEFAULT_NAME_MAX_LEN;

/// Errors from loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid storage config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Parent of all per-endpoint directories.
    pub endpoints_root: PathBuf,

    /// Read buffers per datastore; bounds concurrent readers.
    pub max_readers: usize,

    /// Bytes per chunk when streaming a read.
    pub chunk_size: usize,

    /// Maximum entry name length in bytes.
    pub name_max_len: usize,

    /// Unix mode for backing objects.
    pub file_mode: u32,

    /// Unix mode for endpoint and datastore directories.
    pub dir_mode: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoints_root: PathBuf::from("./endpoints"),
            max_readers: 16,
            chunk_size: 64 * 1024,
            name_max_len: DEFAULT_NAME_MAX_LEN,
            file_mode: 0o600,
            dir_mode: 0o700,
        }
    }
}

impl StorageConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Same config with a different endpoints root.
    pub fn with_endpoints_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.endpoints_root = root.into();
        self
    }

    /// Directory holding everything of one endpoint.
    pub fn endpoint_dir(&self, endpoint: teilpunkt_types::EndpointId) -> PathBuf {
        self.endpoints_root.join(endpoint.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = StorageConfig::from_toml_str("").unwrap();
        assert_eq!(config, StorageConfig::default());
        assert_eq!(config.max_readers, 16);
        assert_eq!(config.name_max_len, 56);
    }

    #[test]
    fn test_partial_override() {
        let config =
            StorageConfig::from_toml_str("max_readers = 2\nendpoints_root = \"/srv/ep\"").unwrap();
        assert_eq!(config.max_readers, 2);
        assert_eq!(config.endpoints_root, PathBuf::from("/srv/ep"));
        assert_eq!(config.chunk_size, 64 * 1024);
    }

    #[test]
    fn test_parse_error() {
        let err = StorageConfig::from_toml_str("max_readers = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "chunk_size = 4096").unwrap();
        let config = StorageConfig::load(file.path()).unwrap();
        assert_eq!(config.chunk_size, 4096);

        let missing = StorageConfig::load("/nonexistent/teilpunkt.toml");
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_endpoint_dir() {
        let config = StorageConfig::default().with_endpoints_root("/data");
        assert_eq!(
            config.endpoint_dir(teilpunkt_types::EndpointId::new(3)),
            PathBuf::from("/data/3")
        );
    }
}
