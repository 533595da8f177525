use serde::{Deserialize, Serialize};

/// Flush/sync strategy for segment writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// `fsync` after every batch.
    #[default]
    EveryWrite,
    /// Rely on OS page-cache buffering.
    OsDefault,
}

/// Event store configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventStoreConfig {
    /// Rotate to a new segment before a batch would push the current one past
    /// this size. A single oversized batch still lands in one segment.
    pub max_segment_bytes: u64,
    pub sync_mode: SyncMode,
    /// Extra attempts to take the writer lock before giving up.
    pub lock_retries: u32,
    /// Initial backoff between lock attempts; doubles per attempt.
    pub lock_backoff_ms: u64,
}

impl Default for EventStoreConfig {
    fn default() -> Self {
        Self {
            max_segment_bytes: 64 * 1024 * 1024, // 64 MiB
            sync_mode: SyncMode::default(),
            lock_retries: 5,
            lock_backoff_ms: 20,
        }
    }
}
