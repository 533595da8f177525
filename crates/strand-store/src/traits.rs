use strand_types::Identifier;

use crate::error::StoreResult;

/// Content-addressed byte store.
///
/// All implementations must satisfy these invariants:
/// - `put` with bytes identical to what is stored is a no-op.
/// - `put` with different bytes under a stored id fails with
///   [`StoreError::Conflict`](crate::StoreError::Conflict) and leaves the
///   stored bytes untouched.
/// - Concurrent reads are always safe.
pub trait ContentStore: Send + Sync {
    /// Store `bytes` under `id`. Returns `true` if the object was newly
    /// written.
    fn put(&self, id: &Identifier, bytes: &[u8]) -> StoreResult<bool>;

    /// Read an object.
    ///
    /// Returns [`StoreError::NotFound`](crate::StoreError::NotFound) if absent.
    fn get(&self, id: &Identifier) -> StoreResult<Vec<u8>>;

    fn exists(&self, id: &Identifier) -> StoreResult<bool>;

    /// Delete an object. Returns `true` if it existed.
    ///
    /// Intended for garbage collection only.
    fn delete(&self, id: &Identifier) -> StoreResult<bool>;

    /// Read several objects. Missing objects are `None`.
    fn get_batch(&self, ids: &[Identifier]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        ids.iter()
            .map(|id| {
                if self.exists(id)? {
                    self.get(id).map(Some)
                } else {
                    Ok(None)
                }
            })
            .collect()
    }

    /// Store several objects; stops at the first error.
    fn put_batch(&self, objects: &[(Identifier, Vec<u8>)]) -> StoreResult<Vec<bool>> {
        objects.iter().map(|(id, bytes)| self.put(id, bytes)).collect()
    }
}
