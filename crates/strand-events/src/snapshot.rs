use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strand_types::Identifier;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{EventStoreError, Result};
use crate::event::AggregateKind;

/// Checkpoint of one aggregate's state at a stream version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub aggregate_id: Identifier,
    pub kind: AggregateKind,
    /// Stream version the state reflects.
    pub version: u64,
    pub state: serde_json::Value,
    #[serde(with = "strand_types::time::rfc3339_millis")]
    pub taken_at: DateTime<Utc>,
}

/// When to take snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPolicy {
    /// Snapshot every `every` events of a stream; 0 disables snapshots.
    pub every: u64,
}

impl SnapshotPolicy {
    pub fn disabled() -> Self {
        Self { every: 0 }
    }

    pub fn should_snapshot(&self, version: u64) -> bool {
        self.every > 0 && version > 0 && version % self.every == 0
    }
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self { every: 100 }
    }
}

enum Backend {
    Memory(RwLock<HashMap<Identifier, Snapshot>>),
    Disk(PathBuf),
}

/// Latest snapshot per aggregate.
///
/// Snapshots are purely an optimization: every snapshot may be deleted at
/// any time without losing information.
pub struct SnapshotStore {
    backend: Backend,
}

impl SnapshotStore {
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(RwLock::new(HashMap::new())),
        }
    }

    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            backend: Backend::Disk(dir),
        })
    }

    fn path_for(dir: &Path, id: &Identifier) -> PathBuf {
        dir.join(format!("{}-{}.json", id.namespace(), id.digest_hex()))
    }

    /// Store `snapshot`, replacing any older one for the same aggregate.
    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        match &self.backend {
            Backend::Memory(map) => {
                map.write()
                    .expect("lock poisoned")
                    .insert(snapshot.aggregate_id, snapshot.clone());
            }
            Backend::Disk(dir) => {
                let bytes = serde_json::to_vec(snapshot)
                    .map_err(|e| EventStoreError::Serialization(e.to_string()))?;
                let mut tmp = NamedTempFile::new_in(dir)?;
                tmp.write_all(&bytes)?;
                tmp.as_file().sync_all()?;
                tmp.persist(Self::path_for(dir, &snapshot.aggregate_id))
                    .map_err(|e| EventStoreError::Io(e.error))?;
            }
        }
        debug!(aggregate = %snapshot.aggregate_id, version = snapshot.version, "snapshot saved");
        Ok(())
    }

    /// Latest snapshot for an aggregate.
    ///
    /// An unreadable snapshot file is logged and treated as absent, since the
    /// state can always be rebuilt from the log.
    pub fn load(&self, id: &Identifier) -> Result<Option<Snapshot>> {
        match &self.backend {
            Backend::Memory(map) => Ok(map.read().expect("lock poisoned").get(id).cloned()),
            Backend::Disk(dir) => {
                let path = Self::path_for(dir, id);
                let bytes = match fs::read(&path) {
                    Ok(bytes) => bytes,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
                    Err(e) => return Err(e.into()),
                };
                match serde_json::from_slice(&bytes) {
                    Ok(snapshot) => Ok(Some(snapshot)),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "ignoring unreadable snapshot");
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Delete one aggregate's snapshot. Returns `true` if one existed.
    pub fn delete(&self, id: &Identifier) -> Result<bool> {
        match &self.backend {
            Backend::Memory(map) => Ok(map.write().expect("lock poisoned").remove(id).is_some()),
            Backend::Disk(dir) => match fs::remove_file(Self::path_for(dir, id)) {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e.into()),
            },
        }
    }

    /// Delete every snapshot. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        match &self.backend {
            Backend::Memory(map) => {
                let mut map = map.write().expect("lock poisoned");
                let n = map.len();
                map.clear();
                Ok(n)
            }
            Backend::Disk(dir) => {
                let mut removed = 0;
                for entry in fs::read_dir(dir)? {
                    let path = entry?.path();
                    if path.extension().is_some_and(|ext| ext == "json") {
                        fs::remove_file(path)?;
                        removed += 1;
                    }
                }
                Ok(removed)
            }
        }
    }

    pub fn len(&self) -> Result<usize> {
        match &self.backend {
            Backend::Memory(map) => Ok(map.read().expect("lock poisoned").len()),
            Backend::Disk(dir) => Ok(fs::read_dir(dir)?
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
                .count()),
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
