//! Application configuration, loaded from YAML.
//!
//! ```yaml
//! storage:
//!   bucket: entry_files
//!   public_url_base: https://files.example.com/public
//!   documents_prefix: collection_documents
//! sync:
//!   notice_capacity: 64
//! display:
//!   untitled_label: Untitled
//!   empty_cell: "-"
//!   date_format: "%Y-%m-%d"
//!   card_preview_fields: 2
//! logging:
//!   filter: info
//!   ansi: true
//! ```
//!
//! Every key is optional; missing keys take the defaults shown above.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorkboardConfig {
    pub storage: StorageConfig,
    pub sync: SyncConfig,
    pub display: DisplayConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Bucket (path prefix) uploaded files are stored under.
    pub bucket: String,
    /// Base URL for public file links. Without it files have no public URL.
    pub public_url_base: Option<String>,
    /// Path prefix for collection and entry documents, kept apart from field uploads.
    pub documents_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: "entry_files".to_string(),
            public_url_base: None,
            documents_prefix: "collection_documents".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Buffered notices per surface before slow subscribers start lagging.
    pub notice_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            notice_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub untitled_label: String,
    pub empty_cell: String,
    /// chrono format string for dates in read-only views.
    pub date_format: String,
    /// Number of fields after the title shown on a board card.
    pub card_preview_fields: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            untitled_label: "Untitled".to_string(),
            empty_cell: "-".to_string(),
            date_format: "%Y-%m-%d".to_string(),
            card_preview_fields: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is not set.
    pub filter: String,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            ansi: true,
        }
    }
}

impl CorkboardConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e)
        })?;

        Self::from_yaml_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config {}: {}", path.display(), e))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: CorkboardConfig = serde_yaml::from_str(content)?;
        if config.sync.notice_capacity == 0 {
            anyhow::bail!("sync.notice_capacity must be at least 1");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = CorkboardConfig::from_yaml_str(
            "display:\n  untitled_label: (no title)\nstorage:\n  public_url_base: https://cdn.test\n",
        )
        .unwrap();

        assert_eq!(config.display.untitled_label, "(no title)");
        assert_eq!(config.display.empty_cell, "-");
        assert_eq!(config.storage.bucket, "entry_files");
        assert_eq!(config.storage.documents_prefix, "collection_documents");
        assert_eq!(
            config.storage.public_url_base.as_deref(),
            Some("https://cdn.test")
        );
        assert_eq!(config.sync.notice_capacity, 64);
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(
            CorkboardConfig::from_yaml_str("").unwrap(),
            CorkboardConfig::default()
        );
    }

    #[test]
    fn test_zero_notice_capacity_is_rejected() {
        assert!(CorkboardConfig::from_yaml_str("sync:\n  notice_capacity: 0\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "logging:\n  filter: corkboard=debug\n  ansi: false").unwrap();

        let config = CorkboardConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.logging.filter, "corkboard=debug");
        assert!(!config.logging.ansi);

        let missing = CorkboardConfig::load_from_file(Path::new("/nonexistent/corkboard.yaml"));
        assert!(missing.is_err());
    }
}
