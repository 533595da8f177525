use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strand_events::{EventStoreConfig, SnapshotPolicy};

use crate::error::{SdkError, SdkResult};

/// Configuration for an on-disk store.
///
/// Every field has a default, so an empty TOML document is a valid
/// configuration:
///
/// ```toml
/// data_dir = "/var/lib/strand"
///
/// [events]
/// max_segment_bytes = 67108864
/// sync_mode = "every-write"
///
/// [snapshots]
/// every = 100
///
/// [search]
/// queue_capacity = 1024
/// embedding_dimensions = 256
/// semantic = true
///
/// [ingest]
/// future_tolerance_secs = 300
/// write_mirror = false
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrandConfig {
    /// Root directory; holds `events/`, `snapshots/`, `objects/` and
    /// `mirror/`.
    pub data_dir: PathBuf,
    pub events: EventStoreConfig,
    pub snapshots: SnapshotPolicy,
    pub search: SearchConfig,
    pub ingest: IngestConfig,
}

impl Default for StrandConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("strand-data"),
            events: EventStoreConfig::default(),
            snapshots: SnapshotPolicy::default(),
            search: SearchConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

impl StrandConfig {
    /// Defaults rooted at `data_dir`.
    pub fn at(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn load(path: impl AsRef<Path>) -> SdkResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SdkError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> SdkResult<Self> {
        toml::from_str(text).map_err(|e| SdkError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> SdkResult<String> {
        toml::to_string_pretty(self).map_err(|e| SdkError::Config(e.to_string()))
    }

    pub fn events_dir(&self) -> PathBuf {
        self.data_dir.join("events")
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.data_dir.join("snapshots")
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Bound of the indexing queue; a full queue blocks writers.
    pub queue_capacity: usize,
    pub embedding_dimensions: usize,
    /// Maintain the vector index. When off, semantic queries degrade to
    /// lexical results.
    pub semantic: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            embedding_dimensions: 256,
            semantic: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// How far past the current time a message's `created_at` may be.
    pub future_tolerance_secs: u64,
    /// Write a human-readable mirror file for every new message.
    pub write_mirror: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            future_tolerance_secs: 300,
            write_mirror: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_events::SyncMode;

    #[test]
    fn empty_document_is_all_defaults() {
        assert_eq!(StrandConfig::from_toml_str("").unwrap(), StrandConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = StrandConfig::from_toml_str(
            r#"
            data_dir = "/tmp/strand"

            [events]
            sync_mode = "os-default"

            [snapshots]
            every = 10

            [search]
            semantic = false

            [ingest]
            write_mirror = true
            "#,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/strand"));
        assert_eq!(config.events.sync_mode, SyncMode::OsDefault);
        assert_eq!(config.events.lock_retries, EventStoreConfig::default().lock_retries);
        assert_eq!(config.snapshots.every, 10);
        assert!(!config.search.semantic);
        assert_eq!(config.search.queue_capacity, 1024);
        assert!(config.ingest.write_mirror);
        assert_eq!(config.ingest.future_tolerance_secs, 300);
    }

    #[test]
    fn rendered_config_parses_back() {
        let config = StrandConfig::at("/data");
        let text = config.to_toml_string().unwrap();
        assert_eq!(StrandConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn bad_documents_are_config_errors() {
        let err = StrandConfig::from_toml_str("[search]\nqueue_capacity = \"many\"").unwrap_err();
        assert!(matches!(err, SdkError::Config(_)));
        assert!(StrandConfig::load("/definitely/not/here.toml").is_err());
    }
}
