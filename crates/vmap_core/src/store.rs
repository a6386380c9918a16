//! The map store: session factory and tree registry.

use crate::config::Config;
use crate::dir::MapDir;
use crate::error::{MapError, MapResult};
use crate::journal::Journal;
use crate::log::{CommitLog, NullLog};
use crate::map::{MapStorage, MapTx, ReadOnlyMapStorage, ReadOnlyMapTx};
use crate::session::{Snapshot, WriteSession};
use crate::tree::TreeSlot;
use crate::types::{Revision, TreeId};
use parking_lot::{RwLock, RwLockReadGuard};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use vmap_storage::{FileBackend, StorageBackend};

/// State shared by a store and its write sessions.
pub(crate) struct Shared<L> {
    config: Config,
    log: L,
    open: AtomicBool,
    commit_gate: RwLock<()>,
}

impl<L> Shared<L> {
    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn log(&self) -> &L {
        &self.log
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Held by a commit from its open check until its log append returns.
    pub(crate) fn commit_gate(&self) -> RwLockReadGuard<'_, ()> {
        self.commit_gate.read()
    }
}

/// Summary of one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeStats {
    /// The tree.
    pub tree: TreeId,
    /// Latest committed revision.
    pub latest_revision: Revision,
    /// Distinct keys ever written.
    pub keys: usize,
    /// Stored (key, revision) versions.
    pub versions: usize,
}

/// A revisioned map store.
///
/// `MapStore<NullLog>` keeps everything in memory; `MapStore<Journal>`
/// journals every commit before publishing it and replays the journal on
/// open. Both hand out sessions through [`MapStorage`] and
/// [`ReadOnlyMapStorage`].
///
/// # Example
///
/// ```rust
/// use vmap_core::{MapLeaf, MapReader, MapStorage, MapStore, ReadOnlyMapStorage, SignedMapRoot, TreeId};
///
/// let store = MapStore::in_memory();
/// let tree = TreeId(1);
///
/// let mut tx = store.begin(tree).unwrap();
/// tx.set(b"a", MapLeaf::new(b"v1".as_slice())).unwrap();
/// tx.store_signed_map_root(SignedMapRoot::new(tx.write_revision(), vec![0x01])).unwrap();
/// assert_eq!(tx.commit().unwrap().as_u64(), 1);
///
/// let snapshot = store.snapshot(tree).unwrap();
/// assert_eq!(snapshot.get(-1, b"a").unwrap().unwrap().leaf_value, b"v1");
/// assert_eq!(snapshot.get(0, b"a").unwrap(), None);
/// ```
pub struct MapStore<L: CommitLog = NullLog> {
    shared: Arc<Shared<L>>,
    trees: RwLock<HashMap<TreeId, Arc<TreeSlot>>>,
    dir: Option<MapDir>,
}

impl MapStore<NullLog> {
    /// Creates an empty in-memory store with default configuration.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::in_memory_with_config(Config::default())
    }

    /// Creates an empty in-memory store.
    #[must_use]
    pub fn in_memory_with_config(config: Config) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                log: NullLog,
                open: AtomicBool::new(true),
                commit_gate: RwLock::new(()),
            }),
            trees: RwLock::new(HashMap::new()),
            dir: None,
        }
    }
}

impl MapStore<Journal> {
    /// Opens a durable store in `path` with default configuration.
    ///
    /// # Errors
    ///
    /// See [`MapStore::open_with_config`].
    pub fn open(path: &Path) -> MapResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens a durable store in `path`.
    ///
    /// Takes the directory lock, then replays `journal.log`.
    ///
    /// # Errors
    ///
    /// `Locked` if another process has the store open, `InvalidFormat` for
    /// a bad directory, or `Corruption` if the journal cannot be replayed.
    pub fn open_with_config(path: &Path, config: Config) -> MapResult<Self> {
        let dir = MapDir::open(path, config.create_if_missing, config.error_if_exists)?;
        let backend = FileBackend::open(&dir.journal_path())?;
        let mut store = Self::open_with_backend(config, Box::new(backend))?;
        store.dir = Some(dir);
        Ok(store)
    }

    /// Opens a durable store over any byte store.
    ///
    /// # Errors
    ///
    /// `Corruption` if the journal cannot be replayed, or a storage error.
    pub fn open_with_backend(config: Config, backend: Box<dyn StorageBackend>) -> MapResult<Self> {
        let journal = Journal::new(backend, config.sync_on_commit);
        Self::with_log(config, journal)
    }

    /// Returns the journal.
    #[must_use]
    pub fn journal(&self) -> &Journal {
        self.shared.log()
    }

    /// Returns the store directory, if opened from a path.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(MapDir::path)
    }
}

impl<L: CommitLog> MapStore<L> {
    /// Creates a store over `log`, publishing every record it recovers.
    ///
    /// # Errors
    ///
    /// Whatever recovery returns, or `Corruption` if the records do not
    /// form a gapless history per tree.
    pub fn with_log(config: Config, log: L) -> MapResult<Self> {
        let mut trees: HashMap<TreeId, Arc<TreeSlot>> = HashMap::new();
        let records = log.recover()?;
        let commits = records.len();

        for record in records {
            let slot = trees
                .entry(record.tree)
                .or_insert_with(|| Arc::new(TreeSlot::new(record.tree)));
            slot.index.write().apply(record)?;
        }
        info!(trees = trees.len(), commits, "store opened");

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                log,
                open: AtomicBool::new(true),
                commit_gate: RwLock::new(()),
            }),
            trees: RwLock::new(trees),
            dir: None,
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        self.shared.config()
    }

    /// Returns true until [`MapStore::close`] is called.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    /// Closes the store.
    ///
    /// Waits for commits already writing to the log. After that, later
    /// `snapshot`/`begin` calls and commits of sessions still open fail
    /// with `StoreClosed`. Snapshots already handed out keep working.
    ///
    /// # Errors
    ///
    /// `StoreClosed` if already closed, or a sync failure.
    pub fn close(&self) -> MapResult<()> {
        {
            let _gate = self.shared.commit_gate.write();
            if !self.shared.open.swap(false, Ordering::AcqRel) {
                return Err(MapError::StoreClosed);
            }
        }
        debug!("store closed");
        self.shared.log().sync()
    }

    /// Returns every tree that was committed to or had a write session, sorted.
    #[must_use]
    pub fn trees(&self) -> Vec<TreeId> {
        let mut trees: Vec<TreeId> = self.trees.read().keys().copied().collect();
        trees.sort();
        trees
    }

    /// Returns the latest committed revision of `tree`.
    ///
    /// A tree that was never written is at [`Revision::ZERO`].
    ///
    /// # Errors
    ///
    /// `StoreClosed` after close.
    pub fn latest_revision(&self, tree: TreeId) -> MapResult<Revision> {
        self.ensure_open()?;
        Ok(self
            .trees
            .read()
            .get(&tree)
            .map_or(Revision::ZERO, |slot| slot.index.read().latest()))
    }

    /// Returns a summary of `tree`.
    ///
    /// # Errors
    ///
    /// `StoreClosed` after close.
    pub fn tree_stats(&self, tree: TreeId) -> MapResult<TreeStats> {
        self.ensure_open()?;
        let trees = self.trees.read();
        let Some(slot) = trees.get(&tree) else {
            return Ok(TreeStats {
                tree,
                latest_revision: Revision::ZERO,
                keys: 0,
                versions: 0,
            });
        };
        let index = slot.index.read();
        Ok(TreeStats {
            tree,
            latest_revision: index.latest(),
            keys: index.key_count(),
            versions: index.version_count(),
        })
    }

    fn ensure_open(&self) -> MapResult<()> {
        if self.shared.is_open() {
            Ok(())
        } else {
            Err(MapError::StoreClosed)
        }
    }

    fn slot(&self, tree: TreeId) -> Arc<TreeSlot> {
        if let Some(slot) = self.trees.read().get(&tree) {
            return Arc::clone(slot);
        }
        let mut trees = self.trees.write();
        Arc::clone(
            trees
                .entry(tree)
                .or_insert_with(|| Arc::new(TreeSlot::new(tree))),
        )
    }
}

impl<L: CommitLog> ReadOnlyMapStorage for MapStore<L> {
    fn snapshot(&self, tree: TreeId) -> MapResult<Box<dyn ReadOnlyMapTx>> {
        self.ensure_open()?;
        // An unknown tree is empty, and a snapshot of it stays empty, so a
        // detached slot serves it without registering the tree.
        let slot = self
            .trees
            .read()
            .get(&tree)
            .cloned()
            .unwrap_or_else(|| Arc::new(TreeSlot::new(tree)));
        Ok(Box::new(Snapshot::new(slot)))
    }
}

impl<L: CommitLog> MapStorage for MapStore<L> {
    fn begin(&self, tree: TreeId) -> MapResult<Box<dyn MapTx>> {
        self.ensure_open()?;
        let slot = self.slot(tree);
        let permit = slot.acquire_writer(self.shared.config().writer_policy)?;
        if !self.shared.is_open() {
            // Closed while this caller was waiting for the writer slot.
            return Err(MapError::StoreClosed);
        }
        Ok(Box::new(WriteSession::new(
            Arc::clone(&self.shared),
            slot,
            permit,
        )))
    }
}

impl<L: CommitLog + std::fmt::Debug> std::fmt::Debug for MapStore<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapStore")
            .field("log", self.shared.log())
            .field("trees", &self.trees.read().len())
            .field("open", &self.is_open())
            .field("path", &self.dir.as_ref().map(MapDir::path))
            .finish()
    }
}
