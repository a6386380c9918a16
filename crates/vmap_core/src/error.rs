//! Error types for vmap core.
//!
//! Every [`MapError`] maps to exactly one [`ErrorKind`]. The kinds form the
//! stable taxonomy a service layer translates into transport status codes.

use crate::types::{Revision, TreeId};
use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type MapResult<T> = Result<T, MapError>;

/// The finite set of error kinds callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The requested item does not exist at the requested revision.
    NotFound,
    /// The requested revision is negative or above the view's ceiling.
    InvalidRevision,
    /// The tree has no committed revisions.
    NoRootsYet,
    /// A root was staged twice in one session.
    DuplicateRoot,
    /// A commit was attempted without a staged root.
    MissingRoot,
    /// The session or view is no longer open.
    Closed,
    /// Another writer holds the tree.
    Busy,
    /// A configured limit was exceeded.
    ResourceExhausted,
    /// The backend failed.
    Storage,
}

impl ErrorKind {
    /// Returns true if retrying the whole operation may succeed.
    ///
    /// Storage failures never leave partial state behind, so the operation
    /// can be restarted from `begin`/`snapshot`.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Busy | Self::Storage)
    }

    /// Returns a stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidRevision => "invalid_revision",
            Self::NoRootsYet => "no_roots_yet",
            Self::DuplicateRoot => "duplicate_root",
            Self::MissingRoot => "missing_root",
            Self::Closed => "closed",
            Self::Busy => "busy",
            Self::ResourceExhausted => "resource_exhausted",
            Self::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in vmap core operations.
#[derive(Debug, Error)]
pub enum MapError {
    /// Nothing exists at the requested revision.
    #[error("not found at revision {revision}")]
    NotFound {
        /// The revision that was queried.
        revision: u64,
    },

    /// The requested revision is not readable by this view.
    #[error("invalid revision {requested}: visible ceiling is {ceiling}")]
    InvalidRevision {
        /// The revision that was requested.
        requested: i64,
        /// The highest revision this view may read.
        ceiling: u64,
    },

    /// A staged root is tagged with the wrong revision.
    #[error("root is for revision {actual}, but this commit produces revision {expected}")]
    RootRevisionMismatch {
        /// The revision the commit will produce.
        expected: u64,
        /// The revision carried by the root.
        actual: u64,
    },

    /// The tree has never been written.
    #[error("{tree} has no committed roots yet")]
    NoRootsYet {
        /// The empty tree.
        tree: TreeId,
    },

    /// A root was already staged in this session.
    #[error("a root is already staged in this session")]
    DuplicateRoot,

    /// Commit was attempted without a staged root.
    #[error("commit requires a staged root")]
    MissingRoot,

    /// The session or view was committed, rolled back or closed.
    #[error("session is closed")]
    Closed,

    /// Another write session holds the tree.
    #[error("{tree} already has an open write session")]
    Busy {
        /// The contended tree.
        tree: TreeId,
    },

    /// A configured limit was exceeded.
    #[error("resource exhausted: {message}")]
    ResourceExhausted {
        /// Which limit was hit.
        message: String,
    },

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] vmap_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The journal is corrupted.
    #[error("journal corruption: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },

    /// A failed commit could not be undone; the journal refuses appends.
    #[error("journal is poisoned by an unrecoverable write failure; reopen the store")]
    JournalPoisoned,

    /// The store was closed.
    #[error("store is closed")]
    StoreClosed,

    /// Another process holds the store directory.
    #[error("store locked: another process has exclusive access")]
    Locked,

    /// Invalid store layout.
    #[error("invalid store format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },
}

impl MapError {
    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidRevision { .. } | Self::RootRevisionMismatch { .. } => {
                ErrorKind::InvalidRevision
            }
            Self::NoRootsYet { .. } => ErrorKind::NoRootsYet,
            Self::DuplicateRoot => ErrorKind::DuplicateRoot,
            Self::MissingRoot => ErrorKind::MissingRoot,
            Self::Closed => ErrorKind::Closed,
            Self::Busy { .. } | Self::Locked => ErrorKind::Busy,
            Self::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            Self::Storage(_)
            | Self::Io(_)
            | Self::Corruption { .. }
            | Self::JournalPoisoned
            | Self::StoreClosed
            | Self::InvalidFormat { .. } => ErrorKind::Storage,
        }
    }

    /// Creates an invalid revision error.
    pub fn invalid_revision(requested: i64, ceiling: Revision) -> Self {
        Self::InvalidRevision {
            requested,
            ceiling: ceiling.as_u64(),
        }
    }

    /// Creates a resource exhausted error.
    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            message: message.into(),
        }
    }

    /// Creates a journal corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }
}
