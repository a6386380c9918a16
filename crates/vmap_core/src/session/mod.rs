//! Snapshots and write sessions.
//!
//! Both kinds of session read through a fixed ceiling: the latest revision
//! committed when the session was opened. Revisions published later are
//! above the ceiling and therefore invisible, which is what gives readers
//! repeatable reads without holding any lock between calls.

mod snapshot;
mod state;
mod write;

pub use snapshot::Snapshot;
pub use write::WriteSession;

use crate::error::{MapError, MapResult};
use crate::leaf::MapLeaf;
use crate::root::SignedMapRoot;
use crate::tree::TreeSlot;
use crate::types::{Revision, LATEST_REVISION};

/// Resolves a request revision against a committed ceiling.
fn resolve(requested: i64, ceiling: Revision) -> MapResult<Revision> {
    if requested == LATEST_REVISION {
        return Ok(ceiling);
    }
    match Revision::from_request(requested) {
        Some(revision) if revision <= ceiling => Ok(revision),
        _ => Err(MapError::invalid_revision(requested, ceiling)),
    }
}

fn read_leaf(slot: &TreeSlot, key: &[u8], at: Revision) -> Option<MapLeaf> {
    slot.index.read().get(key, at).cloned()
}

fn read_root(slot: &TreeSlot, requested: i64, ceiling: Revision) -> MapResult<SignedMapRoot> {
    if ceiling == Revision::ZERO {
        return Err(MapError::NoRootsYet { tree: slot.tree() });
    }
    let revision = resolve(requested, ceiling)?;
    slot.index
        .read()
        .root(revision)
        .cloned()
        .ok_or(MapError::NotFound {
            revision: revision.as_u64(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_sentinel_and_bounds() {
        let ceiling = Revision::new(3);
        assert_eq!(resolve(LATEST_REVISION, ceiling).unwrap(), ceiling);
        assert_eq!(resolve(0, ceiling).unwrap(), Revision::ZERO);
        assert_eq!(resolve(3, ceiling).unwrap(), ceiling);
        assert!(matches!(
            resolve(4, ceiling),
            Err(MapError::InvalidRevision {
                requested: 4,
                ceiling: 3
            })
        ));
        assert!(matches!(
            resolve(-2, ceiling),
            Err(MapError::InvalidRevision { requested: -2, .. })
        ));
    }
}
