//! Commit logs: where a committed revision goes before it becomes visible.
//!
//! A [`MapStore`](crate::MapStore) is generic over its log. The in-memory
//! reference backend uses [`NullLog`]; the durable backend uses
//! [`Journal`](crate::journal::Journal).

use crate::error::MapResult;
use crate::leaf::MapLeaf;
use crate::root::SignedMapRoot;
use crate::types::{Revision, TreeId};

/// Everything one successful commit publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    /// The tree that was written.
    pub tree: TreeId,
    /// The revision the commit produced.
    pub revision: Revision,
    /// Staged writes, sorted by key.
    pub leaves: Vec<(Vec<u8>, MapLeaf)>,
    /// The root of `revision`.
    pub root: SignedMapRoot,
}

/// Durable sink for commit records.
pub trait CommitLog: Send + Sync + 'static {
    /// Persists `record`.
    ///
    /// On error nothing of `record` may survive a later
    /// [`CommitLog::recover`].
    ///
    /// # Errors
    ///
    /// Any storage-kind error.
    fn append(&self, record: &CommitRecord) -> MapResult<()>;

    /// Returns every persisted record, in commit order.
    ///
    /// # Errors
    ///
    /// Any storage-kind error, including corruption.
    fn recover(&self) -> MapResult<Vec<CommitRecord>>;

    /// Makes every appended record durable.
    ///
    /// # Errors
    ///
    /// Any storage-kind error.
    fn sync(&self) -> MapResult<()>;
}

/// A log that keeps nothing. Commits live only in memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLog;

impl CommitLog for NullLog {
    fn append(&self, _record: &CommitRecord) -> MapResult<()> {
        Ok(())
    }

    fn recover(&self) -> MapResult<Vec<CommitRecord>> {
        Ok(Vec::new())
    }

    fn sync(&self) -> MapResult<()> {
        Ok(())
    }
}
