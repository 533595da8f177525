use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use strand_types::Identifier;
use tempfile::NamedTempFile;
use tracing::{debug, error};

use crate::error::{StoreError, StoreResult};
use crate::traits::ContentStore;

/// Sharded on-disk content store.
///
/// Objects live at `<root>/objects/<first 2 hex>/<remaining 62 hex>` of the
/// identifier digest. Writes go to a temporary file in the shard directory
/// and are renamed into place, so a reader never observes a partial object.
#[derive(Debug, Clone)]
pub struct FsContentStore {
    objects: PathBuf,
}

impl FsContentStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let objects = root.as_ref().join("objects");
        fs::create_dir_all(&objects)?;
        Ok(Self { objects })
    }

    /// Path where `id` is (or would be) stored.
    pub fn object_path(&self, id: &Identifier) -> PathBuf {
        let hex = id.digest_hex();
        self.objects.join(&hex[..2]).join(&hex[2..])
    }

    fn check_existing(&self, id: &Identifier, path: &Path, bytes: &[u8]) -> StoreResult<bool> {
        let existing = fs::read(path)?;
        if existing == bytes {
            debug!(id = %id, "object already present");
            Ok(false)
        } else {
            error!(id = %id, path = %path.display(), "refusing to overwrite object with different bytes");
            Err(StoreError::Conflict(*id))
        }
    }
}

impl ContentStore for FsContentStore {
    fn put(&self, id: &Identifier, bytes: &[u8]) -> StoreResult<bool> {
        let path = self.object_path(id);
        if path.exists() {
            return self.check_existing(id, &path, bytes);
        }

        let shard = path.parent().unwrap_or(&self.objects);
        fs::create_dir_all(shard)?;
        let mut tmp = NamedTempFile::new_in(shard)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;

        match tmp.persist_noclobber(&path) {
            Ok(_) => {
                debug!(id = %id, size = bytes.len(), "object written");
                Ok(true)
            }
            // Lost a race with a concurrent writer of the same id.
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                self.check_existing(id, &path, bytes)
            }
            Err(e) => Err(StoreError::Io(e.error)),
        }
    }

    fn get(&self, id: &Identifier) -> StoreResult<Vec<u8>> {
        match fs::read(self.object_path(id)) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound(*id)),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, id: &Identifier) -> StoreResult<bool> {
        Ok(self.object_path(id).is_file())
    }

    fn delete(&self, id: &Identifier) -> StoreResult<bool> {
        match fs::remove_file(self.object_path(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
