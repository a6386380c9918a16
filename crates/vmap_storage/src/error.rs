//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of storage.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// Attempted to rewind to an offset past the end of storage.
    #[error("cannot rewind to offset {offset}: storage is only {size} bytes")]
    InvalidRewind {
        /// The requested rewind offset.
        offset: u64,
        /// The current storage size.
        size: u64,
    },

    /// A group append failed and the partial bytes could not be removed.
    ///
    /// The store now ends with an incomplete group starting at `offset`.
    #[error("torn group append at offset {offset}: {reason}")]
    Torn {
        /// Offset where the incomplete group starts.
        offset: u64,
        /// The failure that interrupted the append.
        reason: String,
    },

    /// A failure injected by [`crate::FaultyBackend`].
    #[error("injected fault: {0}")]
    Injected(&'static str),
}

impl StorageError {
    /// Returns true if the error came from fault injection.
    #[must_use]
    pub fn is_injected(&self) -> bool {
        matches!(self, Self::Injected(_))
    }
}
