use std::collections::HashMap;
use std::sync::RwLock;

use strand_types::Identifier;
use tracing::error;

use crate::error::{StoreError, StoreResult};
use crate::traits::ContentStore;

/// In-memory, HashMap-based content store.
///
/// Intended for tests and embedding. Objects are held behind a `RwLock` and
/// cloned on read.
pub struct InMemoryContentStore {
    objects: RwLock<HashMap<Identifier, Vec<u8>>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored objects.
    pub fn total_bytes(&self) -> u64 {
        self.objects
            .read()
            .expect("lock poisoned")
            .values()
            .map(|b| b.len() as u64)
            .sum()
    }

    /// Overwrite an object's bytes in place, bypassing the conflict check.
    ///
    /// Only useful for simulating corruption.
    #[cfg(any(test, feature = "test-support"))]
    pub fn tamper(&self, id: &Identifier, bytes: Vec<u8>) {
        self.objects
            .write()
            .expect("lock poisoned")
            .insert(*id, bytes);
    }
}

impl Default for InMemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentStore for InMemoryContentStore {
    fn put(&self, id: &Identifier, bytes: &[u8]) -> StoreResult<bool> {
        let mut map = self.objects.write().expect("lock poisoned");
        match map.get(id) {
            Some(existing) if existing.as_slice() == bytes => Ok(false),
            Some(_) => {
                error!(id = %id, "refusing to overwrite object with different bytes");
                Err(StoreError::Conflict(*id))
            }
            None => {
                map.insert(*id, bytes.to_vec());
                Ok(true)
            }
        }
    }

    fn get(&self, id: &Identifier) -> StoreResult<Vec<u8>> {
        let map = self.objects.read().expect("lock poisoned");
        map.get(id).cloned().ok_or(StoreError::NotFound(*id))
    }

    fn exists(&self, id: &Identifier) -> StoreResult<bool> {
        Ok(self.objects.read().expect("lock poisoned").contains_key(id))
    }

    fn delete(&self, id: &Identifier) -> StoreResult<bool> {
        Ok(self
            .objects
            .write()
            .expect("lock poisoned")
            .remove(id)
            .is_some())
    }
}

impl std::fmt::Debug for InMemoryContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryContentStore")
            .field("object_count", &self.len())
            .finish()
    }
}
