//! The storage contract: reader, session and factory traits.
//!
//! Every backend exposes the same capability split:
//!
//! - [`ReadOnlyMapStorage::snapshot`] opens a [`ReadOnlyMapTx`] fixed at the
//!   latest committed revision
//! - [`MapStorage::begin`] opens a [`MapTx`], the tree's single writer
//!
//! Both session kinds share the [`MapReader`] surface.

use crate::error::MapResult;
use crate::leaf::MapLeaf;
use crate::root::SignedMapRoot;
use crate::types::{Revision, TreeId};

/// Read operations shared by snapshots and write sessions.
pub trait MapReader: Send {
    /// The tree this view reads.
    fn tree_id(&self) -> TreeId;

    /// The latest committed revision this view can see. Fixed at creation.
    fn read_revision(&self) -> Revision;

    /// Reads `key` as of `revision`.
    ///
    /// `revision` is either [`crate::LATEST_REVISION`] or an explicit
    /// revision no greater than the view's ceiling. Returns `Ok(None)` if
    /// no revision up to the requested one set the key.
    ///
    /// # Errors
    ///
    /// `InvalidRevision` for a negative revision other than the sentinel or
    /// one above the ceiling; `Closed` after close, commit or rollback.
    fn get(&self, revision: i64, key: &[u8]) -> MapResult<Option<MapLeaf>>;

    /// Returns the root of [`MapReader::read_revision`].
    ///
    /// # Errors
    ///
    /// `NoRootsYet` if the tree had no commits when the view was opened.
    fn latest_signed_map_root(&self) -> MapResult<SignedMapRoot>;

    /// Returns the root of a committed revision within the view's ceiling.
    ///
    /// # Errors
    ///
    /// `NoRootsYet` for an empty tree, `NotFound` for revision 0 and
    /// `InvalidRevision` above the ceiling.
    fn signed_map_root_at(&self, revision: i64) -> MapResult<SignedMapRoot>;
}

/// A read-only snapshot of one tree.
///
/// Dropping a snapshot closes it.
pub trait ReadOnlyMapTx: MapReader {
    /// Closes the snapshot. Later calls fail with `Closed`.
    ///
    /// # Errors
    ///
    /// `Closed` if already closed.
    fn close(&mut self) -> MapResult<()>;

    /// Returns true until the snapshot is closed.
    fn is_open(&self) -> bool;
}

/// A write session: the single writer of one tree.
///
/// Staged writes are invisible to everyone else until [`MapTx::commit`]
/// returns. Dropping an open session rolls it back.
pub trait MapTx: MapReader {
    /// The revision a successful commit will produce.
    fn write_revision(&self) -> Revision;

    /// Stages `leaf` under `key`. The last write to a key wins.
    ///
    /// # Errors
    ///
    /// `Closed` after commit or rollback; `ResourceExhausted` if a
    /// configured limit is exceeded.
    fn set(&mut self, key: &[u8], leaf: MapLeaf) -> MapResult<()>;

    /// Stages the root for [`MapTx::write_revision`].
    ///
    /// # Errors
    ///
    /// `DuplicateRoot` if a root is already staged; `InvalidRevision` if
    /// `root.map_revision` is not the write revision.
    fn store_signed_map_root(&mut self, root: SignedMapRoot) -> MapResult<()>;

    /// Atomically publishes the staged writes and root as a new revision.
    ///
    /// # Errors
    ///
    /// `MissingRoot` leaves the session open. A backend failure rolls the
    /// session back and consumes no revision.
    fn commit(&mut self) -> MapResult<Revision>;

    /// Discards staged writes and releases the tree.
    ///
    /// # Errors
    ///
    /// `Closed` if the session already committed or rolled back.
    fn rollback(&mut self) -> MapResult<()>;

    /// Returns true until the session commits or rolls back.
    fn is_open(&self) -> bool;

    /// Number of distinct keys staged so far.
    fn pending_writes(&self) -> usize;
}

/// Factory for read-only snapshots.
pub trait ReadOnlyMapStorage: Send + Sync {
    /// Opens a snapshot of `tree` at its latest committed revision.
    ///
    /// Never waits for writers.
    ///
    /// # Errors
    ///
    /// A storage-kind error if the store is closed or unavailable.
    fn snapshot(&self, tree: TreeId) -> MapResult<Box<dyn ReadOnlyMapTx>>;
}

/// Factory for write sessions.
pub trait MapStorage: ReadOnlyMapStorage {
    /// Opens a write session on `tree`.
    ///
    /// At most one session per tree is open at a time; what happens to a
    /// second caller depends on the configured [`crate::WriterPolicy`].
    ///
    /// # Errors
    ///
    /// `Busy` under the non-blocking policies, or a storage-kind error.
    fn begin(&self, tree: TreeId) -> MapResult<Box<dyn MapTx>>;
}

/// Runs `f` inside a write session on `tree`.
///
/// The session commits if `f` returns `Ok` and rolls back otherwise.
/// Returns the committed revision together with `f`'s value.
///
/// # Errors
///
/// Whatever `begin`, `f` or `commit` returns.
///
/// # Example
///
/// ```rust
/// use vmap_core::{with_write_session, MapLeaf, MapStore, SignedMapRoot, TreeId};
///
/// let store = MapStore::in_memory();
/// let (revision, ()) = with_write_session(&store, TreeId(1), |tx| {
///     tx.set(b"key", MapLeaf::new(b"value".as_slice()))?;
///     tx.store_signed_map_root(SignedMapRoot::new(tx.write_revision(), vec![0xAB]))
/// })
/// .unwrap();
/// assert_eq!(revision.as_u64(), 1);
/// ```
pub fn with_write_session<S, T, F>(storage: &S, tree: TreeId, f: F) -> MapResult<(Revision, T)>
where
    S: MapStorage + ?Sized,
    F: FnOnce(&mut dyn MapTx) -> MapResult<T>,
{
    let mut tx = storage.begin(tree)?;
    match f(tx.as_mut()) {
        Ok(value) => {
            let revision = tx.commit()?;
            Ok((revision, value))
        }
        Err(err) => {
            if tx.is_open() {
                tx.rollback()?;
            }
            Err(err)
        }
    }
}
