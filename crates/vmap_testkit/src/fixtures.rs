//! Test fixtures and store helpers.
//!
//! Provides stores over every backend, deterministic roots and leaves, and
//! one-call commit helpers.

use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use vmap_core::{
    with_write_session, Config, MapLeaf, MapResult, MapStorage, MapStore, Revision,
    SignedMapRoot, TreeId,
};
use vmap_storage::InMemoryBackend;

/// The backend behind a [`TestStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// `MapStore<NullLog>`.
    Memory,
    /// `MapStore<Journal>` over an in-memory device.
    Journal,
    /// `MapStore<Journal>` in a temporary directory.
    File,
}

/// A test store with automatic cleanup.
pub struct TestStore {
    storage: Arc<dyn MapStorage>,
    kind: StoreKind,
    device: Option<InMemoryBackend>,
    temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates a new in-memory test store.
    pub fn memory() -> Self {
        Self {
            storage: Arc::new(MapStore::in_memory()),
            kind: StoreKind::Memory,
            device: None,
            temp_dir: None,
        }
    }

    /// Creates a journaled test store over an in-memory device.
    pub fn journal() -> Self {
        Self::journal_over(InMemoryBackend::new())
    }

    fn journal_over(device: InMemoryBackend) -> Self {
        let store = MapStore::open_with_backend(Config::default(), Box::new(device.clone()))
            .expect("Failed to open journaled store");
        Self {
            storage: Arc::new(store),
            kind: StoreKind::Journal,
            device: Some(device),
            temp_dir: None,
        }
    }

    /// Creates a durable test store in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = MapStore::open(temp_dir.path()).expect("Failed to open file store");
        Self {
            storage: Arc::new(store),
            kind: StoreKind::File,
            device: None,
            temp_dir: Some(temp_dir),
        }
    }

    /// One store of every kind.
    pub fn all() -> Vec<Self> {
        vec![Self::memory(), Self::journal(), Self::file()]
    }

    /// Returns the backend kind.
    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    /// Returns a shared handle to the store.
    pub fn storage(&self) -> Arc<dyn MapStorage> {
        Arc::clone(&self.storage)
    }

    /// Returns the store directory if file-based.
    pub fn path(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }

    /// Returns a copy of the journal bytes, if the store journals.
    pub fn journal_bytes(&self) -> Option<Vec<u8>> {
        match (&self.device, self.path()) {
            (Some(device), _) => Some(device.data()),
            (None, Some(path)) => std::fs::read(vmap_core::journal_path(path)).ok(),
            (None, None) => None,
        }
    }

    /// Closes the store and opens it again from its journal.
    ///
    /// Returns `None` for in-memory stores, which keep nothing.
    ///
    /// # Panics
    ///
    /// If other handles from [`TestStore::storage`] are still alive, or the
    /// journal cannot be replayed.
    pub fn reopen(self) -> Option<Self> {
        let Self {
            storage,
            kind,
            device,
            temp_dir,
        } = self;
        assert_eq!(
            Arc::strong_count(&storage),
            1,
            "drop every storage handle before reopening"
        );
        drop(storage);

        match kind {
            StoreKind::Memory => None,
            StoreKind::Journal => device.map(Self::journal_over),
            StoreKind::File => {
                let temp_dir = temp_dir?;
                let store = MapStore::open(temp_dir.path()).expect("Failed to reopen file store");
                Some(Self {
                    storage: Arc::new(store),
                    kind,
                    device: None,
                    temp_dir: Some(temp_dir),
                })
            }
        }
    }
}

impl std::ops::Deref for TestStore {
    type Target = dyn MapStorage;

    fn deref(&self) -> &Self::Target {
        &*self.storage
    }
}

impl std::fmt::Debug for TestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestStore")
            .field("kind", &self.kind)
            .field("path", &self.path())
            .finish_non_exhaustive()
    }
}

/// Runs a test with a temporary in-memory store.
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&dyn MapStorage) -> R,
{
    let store = TestStore::memory();
    f(&*store)
}

/// Runs a test with a temporary file-based store.
pub fn with_file_store<F, R>(f: F) -> R
where
    F: FnOnce(&dyn MapStorage, &Path) -> R,
{
    let store = TestStore::file();
    let path = store.path().expect("File store should have a path");
    f(&*store, path)
}

/// A root for `revision` with a hash and signature derived from it.
pub fn test_root(revision: Revision) -> SignedMapRoot {
    let n = revision.as_u64();
    SignedMapRoot::new(revision, n.to_be_bytes().to_vec())
        .with_signature(format!("sig-{n}").into_bytes())
        .with_timestamp_nanos(1_700_000_000_000_000_000 + n)
}

/// A leaf whose hash is the value reversed.
pub fn test_leaf(value: &[u8]) -> MapLeaf {
    let hash: Vec<u8> = value.iter().rev().copied().collect();
    MapLeaf::new(value).with_hash(hash)
}

/// Commits `leaves` with [`test_root`] as one revision.
pub fn commit_leaves(
    storage: &dyn MapStorage,
    tree: TreeId,
    leaves: &[(Vec<u8>, MapLeaf)],
) -> MapResult<Revision> {
    let (revision, ()) = with_write_session(storage, tree, |tx| {
        for (key, leaf) in leaves {
            tx.set(key, leaf.clone())?;
        }
        tx.store_signed_map_root(test_root(tx.write_revision()))
    })?;
    Ok(revision)
}

/// Commits `(key, value)` pairs as [`test_leaf`]s in one revision.
pub fn commit_values(
    storage: &dyn MapStorage,
    tree: TreeId,
    pairs: &[(&[u8], &[u8])],
) -> MapResult<Revision> {
    let leaves: Vec<(Vec<u8>, MapLeaf)> = pairs
        .iter()
        .map(|(key, value)| (key.to_vec(), test_leaf(value)))
        .collect();
    commit_leaves(storage, tree, &leaves)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Key `i` of the populated scenario.
    pub fn key(i: usize) -> Vec<u8> {
        format!("key-{i:04}").into_bytes()
    }

    /// Value written to `key` at `revision` by the populated scenario.
    pub fn value(i: usize, revision: u64) -> Vec<u8> {
        format!("value-{i}@{revision}").into_bytes()
    }

    /// Commits `revisions` revisions to `tree`; revision `r` writes keys
    /// `0..keys_per_revision` shifted by `r - 1`, so history overlaps.
    pub fn populate(
        storage: &dyn MapStorage,
        tree: TreeId,
        revisions: u64,
        keys_per_revision: usize,
    ) -> MapResult<Vec<Revision>> {
        let mut committed = Vec::new();
        for r in 1..=revisions {
            let shift = (r - 1) as usize;
            let leaves: Vec<(Vec<u8>, MapLeaf)> = (shift..shift + keys_per_revision)
                .map(|i| (key(i), test_leaf(&value(i, r))))
                .collect();
            committed.push(commit_leaves(storage, tree, &leaves)?);
        }
        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmap_core::MapReader;

    #[test]
    fn test_every_kind_commits() {
        for store in TestStore::all() {
            let revision = commit_values(&*store, TreeId(1), &[(b"a", b"1")]).unwrap();
            assert_eq!(revision, Revision::new(1), "{:?}", store.kind());
        }
    }

    #[test]
    fn test_reopen_keeps_history() {
        for store in [TestStore::journal(), TestStore::file()] {
            scenarios::populate(&*store, TreeId(3), 3, 2).unwrap();
            let reopened = store.reopen().unwrap();
            let snapshot = reopened.snapshot(TreeId(3)).unwrap();
            assert_eq!(snapshot.read_revision(), Revision::new(3));
            assert_eq!(
                snapshot.signed_map_root_at(2).unwrap(),
                test_root(Revision::new(2))
            );
        }
    }

    #[test]
    fn test_memory_does_not_reopen() {
        assert!(TestStore::memory().reopen().is_none());
    }

    #[test]
    fn test_with_temp_store() {
        with_temp_store(|storage| {
            let revisions = scenarios::populate(storage, TreeId(1), 2, 3).unwrap();
            assert_eq!(revisions, vec![Revision::new(1), Revision::new(2)]);
        });
    }

    #[test]
    fn test_journal_bytes() {
        assert!(TestStore::memory().journal_bytes().is_none());
        let store = TestStore::journal();
        assert_eq!(store.journal_bytes().unwrap().len(), 0);
        commit_values(&*store, TreeId(1), &[(b"a", b"1")]).unwrap();
        assert!(!store.journal_bytes().unwrap().is_empty());
    }
}
