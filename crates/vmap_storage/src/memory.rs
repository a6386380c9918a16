//! In-memory storage backend for testing.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// An in-memory storage backend.
///
/// Clones share the same buffer, so a test can hand one clone to a store
/// and keep another to inspect or corrupt the bytes it wrote.
///
/// # Example
///
/// ```rust
/// use vmap_storage::{StorageBackend, InMemoryBackend};
///
/// let mut backend = InMemoryBackend::new();
/// let observer = backend.clone();
/// backend.append(b"test data").unwrap();
/// assert_eq!(observer.data(), b"test data");
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Vec<u8>>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory backend with pre-existing data.
    ///
    /// Used to replay a captured (possibly truncated) journal.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns a copy of all data in the backend.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Overwrites one byte in place.
    ///
    /// Returns false if `offset` is out of range.
    pub fn corrupt_byte(&self, offset: usize, value: u8) -> bool {
        match self.data.write().get_mut(offset) {
            Some(byte) => {
                *byte = value;
                true
            }
            None => false,
        }
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.data.read();
        let size = data.len() as u64;
        let start = offset as usize;
        let end = start.saturating_add(len);

        if offset > size || end > data.len() {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(data[start..end].to_vec())
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn append_group(&mut self, chunks: &[&[u8]]) -> StorageResult<u64> {
        // One lock for the whole group: observers never see half of it.
        let mut data = self.data.write();
        let offset = data.len() as u64;
        for chunk in chunks {
            data.extend_from_slice(chunk);
        }
        Ok(offset)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.read().len() as u64)
    }

    fn rewind(&mut self, offset: u64) -> StorageResult<()> {
        let mut data = self.data.write();
        let size = data.len() as u64;
        if offset > size {
            return Err(StorageError::InvalidRewind { offset, size });
        }
        data.truncate(offset as usize);
        Ok(())
    }
}
