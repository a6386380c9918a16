//! In-memory versioned index of one tree.

use crate::error::{MapError, MapResult};
use crate::leaf::MapLeaf;
use crate::log::CommitRecord;
use crate::root::SignedMapRoot;
use crate::types::Revision;
use std::collections::HashMap;

/// Every committed version of every key, plus one root per revision.
///
/// Versions of a key are kept in ascending revision order, so a point read
/// is a binary search. `roots[i]` is the root of revision `i + 1`.
#[derive(Debug, Default)]
pub(crate) struct TreeIndex {
    leaves: HashMap<Vec<u8>, Vec<(Revision, MapLeaf)>>,
    roots: Vec<SignedMapRoot>,
    versions: usize,
}

impl TreeIndex {
    /// The latest committed revision.
    pub(crate) fn latest(&self) -> Revision {
        Revision::new(self.roots.len() as u64)
    }

    /// The value of `key` set by the highest revision `<= at`.
    pub(crate) fn get(&self, key: &[u8], at: Revision) -> Option<&MapLeaf> {
        let versions = self.leaves.get(key)?;
        let idx = versions.partition_point(|(revision, _)| *revision <= at);
        idx.checked_sub(1).map(|i| &versions[i].1)
    }

    /// The root of `revision`, if committed.
    pub(crate) fn root(&self, revision: Revision) -> Option<&SignedMapRoot> {
        let idx = usize::try_from(revision.as_u64()).ok()?.checked_sub(1)?;
        self.roots.get(idx)
    }

    /// Number of distinct keys ever written.
    pub(crate) fn key_count(&self) -> usize {
        self.leaves.len()
    }

    /// Number of stored (key, revision) versions.
    pub(crate) fn version_count(&self) -> usize {
        self.versions
    }

    /// Publishes a committed revision.
    ///
    /// The record must be the next revision and carry its own root.
    pub(crate) fn apply(&mut self, record: CommitRecord) -> MapResult<()> {
        let expected = self.latest().next();
        if record.revision != expected {
            return Err(MapError::corruption(format!(
                "{} expected {expected}, got {}",
                record.tree, record.revision
            )));
        }
        if record.root.map_revision != record.revision {
            return Err(MapError::RootRevisionMismatch {
                expected: record.revision.as_u64(),
                actual: record.root.map_revision.as_u64(),
            });
        }

        for (key, leaf) in record.leaves {
            self.leaves
                .entry(key)
                .or_default()
                .push((record.revision, leaf));
            self.versions += 1;
        }
        self.roots.push(record.root);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TreeId;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn record(revision: u64, leaves: &[(&[u8], &[u8])]) -> CommitRecord {
        CommitRecord {
            tree: TreeId(1),
            revision: Revision::new(revision),
            leaves: leaves
                .iter()
                .map(|(k, v)| (k.to_vec(), MapLeaf::new(*v)))
                .collect(),
            root: SignedMapRoot::new(Revision::new(revision), vec![revision as u8]),
        }
    }

    #[test]
    fn reads_highest_version_at_or_below() {
        let mut index = TreeIndex::default();
        index.apply(record(1, &[(b"a", b"1")])).unwrap();
        index.apply(record(2, &[(b"b", b"2")])).unwrap();
        index.apply(record(3, &[(b"a", b"3")])).unwrap();

        assert_eq!(index.get(b"a", Revision::ZERO), None);
        assert_eq!(index.get(b"a", Revision::new(1)).unwrap().leaf_value, b"1");
        assert_eq!(index.get(b"a", Revision::new(2)).unwrap().leaf_value, b"1");
        assert_eq!(index.get(b"a", Revision::new(3)).unwrap().leaf_value, b"3");
        assert_eq!(index.get(b"b", Revision::new(1)), None);
        assert_eq!(index.get(b"missing", Revision::new(3)), None);
        assert_eq!(index.latest(), Revision::new(3));
        assert_eq!(index.key_count(), 2);
        assert_eq!(index.version_count(), 3);
    }

    #[test]
    fn roots_are_indexed_by_revision() {
        let mut index = TreeIndex::default();
        assert!(index.root(Revision::ZERO).is_none());
        index.apply(record(1, &[])).unwrap();
        assert!(index.root(Revision::ZERO).is_none());
        assert_eq!(index.root(Revision::new(1)).unwrap().root_hash, vec![1]);
        assert!(index.root(Revision::new(2)).is_none());
    }

    #[test]
    fn rejects_gaps_and_mismatched_roots() {
        let mut index = TreeIndex::default();
        assert!(matches!(
            index.apply(record(2, &[])),
            Err(MapError::Corruption { .. })
        ));

        let mut bad = record(1, &[]);
        bad.root.map_revision = Revision::new(7);
        assert!(matches!(
            index.apply(bad),
            Err(MapError::RootRevisionMismatch {
                expected: 1,
                actual: 7
            })
        ));
        assert_eq!(index.latest(), Revision::ZERO);
    }

    proptest! {
        #[test]
        fn reads_match_a_linear_scan(
            batches in prop::collection::vec(
                prop::collection::btree_map(0u8..6, any::<u8>(), 0..5),
                1..12,
            ),
        ) {
            let mut index = TreeIndex::default();
            for (i, batch) in batches.iter().enumerate() {
                let revision = Revision::new(i as u64 + 1);
                index.apply(CommitRecord {
                    tree: TreeId(1),
                    revision,
                    leaves: batch
                        .iter()
                        .map(|(k, v)| (vec![*k], MapLeaf::new(vec![*v])))
                        .collect(),
                    root: SignedMapRoot::new(revision, Vec::new()),
                }).unwrap();
            }

            for at in 0..=batches.len() {
                let written: &[BTreeMap<u8, u8>] = &batches[..at];
                for key in 0u8..6 {
                    let expected = written.iter().rev().find_map(|b| b.get(&key)).copied();
                    let actual = index
                        .get(&[key], Revision::new(at as u64))
                        .map(|leaf| leaf.leaf_value[0]);
                    prop_assert_eq!(actual, expected);
                }
            }
            prop_assert_eq!(index.latest(), Revision::new(batches.len() as u64));
        }
    }
}
