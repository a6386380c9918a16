//! Read-only snapshots.

use super::state::SessionState;
use super::{read_leaf, read_root, resolve};
use crate::error::MapResult;
use crate::leaf::MapLeaf;
use crate::map::{MapReader, ReadOnlyMapTx};
use crate::root::SignedMapRoot;
use crate::tree::TreeSlot;
use crate::types::{Revision, TreeId};
use std::sync::Arc;

/// A read-only view of one tree, fixed at the revision that was latest
/// when it was opened.
#[derive(Debug)]
pub struct Snapshot {
    slot: Arc<TreeSlot>,
    ceiling: Revision,
    state: SessionState,
}

impl Snapshot {
    pub(crate) fn new(slot: Arc<TreeSlot>) -> Self {
        let ceiling = slot.index.read().latest();
        Self {
            slot,
            ceiling,
            state: SessionState::Open,
        }
    }
}

impl MapReader for Snapshot {
    fn tree_id(&self) -> TreeId {
        self.slot.tree()
    }

    fn read_revision(&self) -> Revision {
        self.ceiling
    }

    fn get(&self, revision: i64, key: &[u8]) -> MapResult<Option<MapLeaf>> {
        self.state.ensure_open()?;
        let at = resolve(revision, self.ceiling)?;
        Ok(read_leaf(&self.slot, key, at))
    }

    fn latest_signed_map_root(&self) -> MapResult<SignedMapRoot> {
        self.state.ensure_open()?;
        read_root(&self.slot, crate::LATEST_REVISION, self.ceiling)
    }

    fn signed_map_root_at(&self, revision: i64) -> MapResult<SignedMapRoot> {
        self.state.ensure_open()?;
        read_root(&self.slot, revision, self.ceiling)
    }
}

impl ReadOnlyMapTx for Snapshot {
    fn close(&mut self) -> MapResult<()> {
        self.state.ensure_open()?;
        self.state = SessionState::Closed;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.is_open()
    }
}
