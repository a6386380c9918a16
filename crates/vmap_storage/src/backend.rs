//! Storage backend trait definition.

use crate::error::{StorageError, StorageResult};

/// A low-level, append-only byte store.
///
/// The durable map backend writes one commit group per revision and relies
/// on the store to either keep the whole group or none of it.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `read_at` returns exactly the bytes previously written at that offset
/// - `append_group` leaves the store either extended by every chunk or at
///   its previous size; otherwise it reports [`StorageError::Torn`]
/// - `sync` makes everything appended so far durable
/// - `rewind` only ever shrinks the store
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
/// - [`super::FaultyBackend`] - Failure injection around another backend
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadPastEnd`] if the range extends beyond the
    /// current size, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the storage.
    ///
    /// Returns the offset where the data was written.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs. The store may then hold a
    /// prefix of `data`.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Makes all appended data durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the current size of the storage in bytes.
    ///
    /// This is the offset where the next `append` will write.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Discards every byte at or after `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidRewind`] if `offset` is past the end,
    /// or an I/O error.
    fn rewind(&mut self, offset: u64) -> StorageResult<()>;

    /// Appends `chunks` back to back as one group.
    ///
    /// On failure the store is rewound to where the group started, so a
    /// failed group leaves no bytes behind. If that rewind fails too the
    /// result is [`StorageError::Torn`].
    ///
    /// # Errors
    ///
    /// Returns the append error, or [`StorageError::Torn`].
    fn append_group(&mut self, chunks: &[&[u8]]) -> StorageResult<u64> {
        let start = self.size()?;
        for chunk in chunks {
            if let Err(err) = self.append(chunk) {
                return match self.rewind(start) {
                    Ok(()) => Err(err),
                    Err(rewind_err) => Err(StorageError::Torn {
                        offset: start,
                        reason: format!("{err}; rewind failed: {rewind_err}"),
                    }),
                };
            }
        }
        Ok(start)
    }

    /// Returns true if nothing has been appended.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.size()? == 0)
    }
}
