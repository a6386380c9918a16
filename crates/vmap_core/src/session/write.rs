//! Write sessions.

use super::state::SessionState;
use super::{read_leaf, read_root, resolve};
use crate::error::{MapError, MapResult};
use crate::leaf::MapLeaf;
use crate::log::{CommitLog, CommitRecord};
use crate::map::{MapReader, MapTx};
use crate::root::SignedMapRoot;
use crate::store::Shared;
use crate::tree::{TreeSlot, WriterPermit};
use crate::types::{Revision, TreeId, LATEST_REVISION};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The single writer of one tree.
///
/// Holds the tree's writer permit from `begin` until commit or rollback.
/// Reads see the state committed at `begin` overlaid with this session's
/// own staged writes.
pub struct WriteSession<L: CommitLog> {
    shared: Arc<Shared<L>>,
    slot: Arc<TreeSlot>,
    permit: Option<WriterPermit>,
    read_revision: Revision,
    staged: BTreeMap<Vec<u8>, MapLeaf>,
    root: Option<SignedMapRoot>,
    state: SessionState,
}

impl<L: CommitLog> WriteSession<L> {
    pub(crate) fn new(shared: Arc<Shared<L>>, slot: Arc<TreeSlot>, permit: WriterPermit) -> Self {
        // The permit is held, so no commit can land between here and the
        // session's first read.
        let read_revision = slot.index.read().latest();
        debug!(tree = %slot.tree(), revision = %read_revision, "write session opened");
        Self {
            shared,
            slot,
            permit: Some(permit),
            read_revision,
            staged: BTreeMap::new(),
            root: None,
            state: SessionState::Open,
        }
    }

    fn finish(&mut self, state: SessionState) {
        self.state = state;
        self.staged.clear();
        self.root = None;
        self.permit = None;
    }

    fn check_limits(&self, key: &[u8], leaf: &MapLeaf) -> MapResult<()> {
        let config = self.shared.config();
        if let Some(max) = config.max_leaf_size {
            if leaf.leaf_value.len() > max {
                return Err(MapError::resource_exhausted(format!(
                    "leaf value is {} bytes, limit is {max}",
                    leaf.leaf_value.len()
                )));
            }
        }
        if let Some(max) = config.max_batch_size {
            if !self.staged.contains_key(key) && self.staged.len() >= max {
                return Err(MapError::resource_exhausted(format!(
                    "session already stages {max} keys"
                )));
            }
        }
        Ok(())
    }
}

impl<L: CommitLog> MapReader for WriteSession<L> {
    fn tree_id(&self) -> TreeId {
        self.slot.tree()
    }

    fn read_revision(&self) -> Revision {
        self.read_revision
    }

    fn get(&self, revision: i64, key: &[u8]) -> MapResult<Option<MapLeaf>> {
        self.state.ensure_open()?;
        let write_revision = self.write_revision();
        let overlay = revision == LATEST_REVISION
            || Revision::from_request(revision) == Some(write_revision);
        if overlay {
            if let Some(leaf) = self.staged.get(key) {
                return Ok(Some(leaf.clone()));
            }
            return Ok(read_leaf(&self.slot, key, self.read_revision));
        }
        let at = resolve(revision, self.read_revision)
            .map_err(|_| MapError::invalid_revision(revision, write_revision))?;
        Ok(read_leaf(&self.slot, key, at))
    }

    fn latest_signed_map_root(&self) -> MapResult<SignedMapRoot> {
        self.state.ensure_open()?;
        read_root(&self.slot, LATEST_REVISION, self.read_revision)
    }

    fn signed_map_root_at(&self, revision: i64) -> MapResult<SignedMapRoot> {
        self.state.ensure_open()?;
        read_root(&self.slot, revision, self.read_revision)
    }
}

impl<L: CommitLog> MapTx for WriteSession<L> {
    fn write_revision(&self) -> Revision {
        self.read_revision.next()
    }

    fn set(&mut self, key: &[u8], leaf: MapLeaf) -> MapResult<()> {
        self.state.ensure_open()?;
        self.check_limits(key, &leaf)?;
        self.staged.insert(key.to_vec(), leaf);
        Ok(())
    }

    fn store_signed_map_root(&mut self, root: SignedMapRoot) -> MapResult<()> {
        self.state.ensure_open()?;
        if self.root.is_some() {
            return Err(MapError::DuplicateRoot);
        }
        let expected = self.write_revision();
        if root.map_revision != expected {
            return Err(MapError::RootRevisionMismatch {
                expected: expected.as_u64(),
                actual: root.map_revision.as_u64(),
            });
        }
        self.root = Some(root);
        Ok(())
    }

    fn commit(&mut self) -> MapResult<Revision> {
        self.state.ensure_open()?;
        let Some(root) = self.root.take() else {
            return Err(MapError::MissingRoot);
        };
        let tree = self.slot.tree();
        let revision = self.write_revision();

        let record = CommitRecord {
            tree,
            revision,
            leaves: std::mem::take(&mut self.staged).into_iter().collect(),
            root,
        };
        let leaf_count = record.leaves.len();

        {
            // `close` waits for this guard, so a commit that finds the store
            // open reaches the log before the store closes.
            let shared = Arc::clone(&self.shared);
            let _gate = shared.commit_gate();
            if !shared.is_open() {
                self.finish(SessionState::RolledBack);
                return Err(MapError::StoreClosed);
            }
            if let Err(err) = shared.log().append(&record) {
                warn!(tree = %tree, revision = %revision, error = %err, "commit failed, rolled back");
                self.finish(SessionState::RolledBack);
                return Err(err);
            }
        }

        // Durable from here on; publish under the index lock, then hand the
        // tree to the next writer.
        let published = self.slot.index.write().apply(record);
        self.finish(SessionState::Committed);
        published?;

        info!(tree = %tree, revision = %revision, leaves = leaf_count, "committed");
        Ok(revision)
    }

    fn rollback(&mut self) -> MapResult<()> {
        self.state.ensure_open()?;
        debug!(tree = %self.slot.tree(), staged = self.staged.len(), "rolled back");
        self.finish(SessionState::RolledBack);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.is_open()
    }

    fn pending_writes(&self) -> usize {
        self.staged.len()
    }
}

impl<L: CommitLog> Drop for WriteSession<L> {
    fn drop(&mut self) {
        if self.state.is_open() {
            debug!(tree = %self.slot.tree(), staged = self.staged.len(), "open session dropped, rolling back");
            self.finish(SessionState::RolledBack);
        }
    }
}

impl<L: CommitLog> std::fmt::Debug for WriteSession<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteSession")
            .field("tree", &self.slot.tree())
            .field("read_revision", &self.read_revision)
            .field("staged", &self.staged.len())
            .field("root_staged", &self.root.is_some())
            .field("state", &self.state)
            .finish()
    }
}
