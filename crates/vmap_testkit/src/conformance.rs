//! Backend-agnostic conformance suite for [`MapStorage`].
//!
//! Every check takes the storage and a tree it may assume is empty; it
//! panics on the first violation. [`run_all`] runs the whole suite on
//! distinct trees of one store.
//!
//! Checks that need a second writer assume the store blocks (the default
//! [`vmap_core::WriterPolicy::Block`]).

use crate::fixtures::{commit_values, test_leaf, test_root};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use vmap_core::{ErrorKind, MapError, MapLeaf, MapStorage, Revision, TreeId};

/// First tree used by [`run_all`].
pub const FIRST_TREE: i64 = 1_000;

/// Runs every check on its own tree.
pub fn run_all(storage: &dyn MapStorage) {
    let checks: [(&str, fn(&dyn MapStorage, TreeId)); 13] = [
        ("empty_tree", check_empty_tree),
        ("write_then_read", check_write_then_read),
        ("pre_write_read", check_pre_write_read),
        ("monotonic_revisions", check_monotonic_revisions),
        ("snapshot_isolation", check_snapshot_isolation),
        ("rollback_atomicity", check_rollback_atomicity),
        ("root_completeness", check_root_completeness),
        ("root_validation", check_root_validation),
        ("session_lifecycle", check_session_lifecycle),
        ("revision_bounds", check_revision_bounds),
        ("read_your_writes", check_read_your_writes),
        ("single_writer", check_single_writer),
        ("trees_isolated", check_trees_isolated),
    ];
    for (offset, (name, check)) in checks.iter().enumerate() {
        let tree = TreeId(FIRST_TREE + 2 * offset as i64);
        eprintln!("conformance: {name} on {tree}");
        check(storage, tree);
    }
}

/// A tree with no writes has no roots and no keys.
pub fn check_empty_tree(storage: &dyn MapStorage, tree: TreeId) {
    let snapshot = storage.snapshot(tree).expect("Failed to open snapshot");
    assert_eq!(snapshot.read_revision(), Revision::ZERO);
    assert!(matches!(
        snapshot.latest_signed_map_root(),
        Err(MapError::NoRootsYet { .. })
    ));
    assert!(matches!(
        snapshot.signed_map_root_at(0),
        Err(MapError::NoRootsYet { .. })
    ));
    assert_eq!(snapshot.get(-1, b"a").expect("Failed to read"), None);
}

/// The canonical scenario: one write, read back at -1, 1 and 0.
pub fn check_write_then_read(storage: &dyn MapStorage, tree: TreeId) {
    let mut tx = storage.begin(tree).expect("Failed to begin");
    assert_eq!(tx.write_revision(), Revision::new(1));
    tx.set(b"a", MapLeaf::new(b"v1".as_slice()))
        .expect("Failed to set");
    tx.store_signed_map_root(test_root(Revision::new(1)))
        .expect("Failed to store root");
    assert_eq!(tx.commit().expect("Failed to commit"), Revision::new(1));

    let snapshot = storage.snapshot(tree).expect("Failed to open snapshot");
    let latest = snapshot.get(-1, b"a").expect("Failed to read");
    assert_eq!(latest.map(|l| l.leaf_value), Some(b"v1".to_vec()));
    let at_one = snapshot.get(1, b"a").expect("Failed to read");
    assert_eq!(at_one.map(|l| l.leaf_value), Some(b"v1".to_vec()));
    assert_eq!(snapshot.get(0, b"a").expect("Failed to read"), None);
}

/// A key reads as absent at every revision before its first write, and
/// keeps its value through revisions that do not touch it.
pub fn check_pre_write_read(storage: &dyn MapStorage, tree: TreeId) {
    commit_values(storage, tree, &[(b"x", b"1")]).expect("Failed to commit");
    commit_values(storage, tree, &[(b"y", b"2")]).expect("Failed to commit");
    commit_values(storage, tree, &[(b"x", b"3")]).expect("Failed to commit");

    let snapshot = storage.snapshot(tree).expect("Failed to open snapshot");
    assert_eq!(snapshot.get(1, b"y").expect("Failed to read"), None);
    assert_eq!(
        snapshot.get(2, b"y").expect("Failed to read"),
        Some(test_leaf(b"2"))
    );
    assert_eq!(
        snapshot.get(2, b"x").expect("Failed to read"),
        Some(test_leaf(b"1"))
    );
    assert_eq!(
        snapshot.get(3, b"x").expect("Failed to read"),
        Some(test_leaf(b"3"))
    );
    assert_eq!(
        snapshot.get(-1, b"y").expect("Failed to read"),
        Some(test_leaf(b"2"))
    );
}

/// Commits number 1, 2, 3, ... with a failed commit in between.
pub fn check_monotonic_revisions(storage: &dyn MapStorage, tree: TreeId) {
    for expected in 1..=3 {
        let revision = commit_values(storage, tree, &[(b"k", b"v")]).expect("Failed to commit");
        assert_eq!(revision, Revision::new(expected));
    }

    let mut tx = storage.begin(tree).expect("Failed to begin");
    tx.set(b"k", MapLeaf::new(b"lost".as_slice()))
        .expect("Failed to set");
    assert!(matches!(tx.commit(), Err(MapError::MissingRoot)));
    tx.rollback().expect("Failed to roll back");

    let revision = commit_values(storage, tree, &[(b"k", b"v")]).expect("Failed to commit");
    assert_eq!(revision, Revision::new(4));
}

/// A snapshot never sees commits made after it opened.
pub fn check_snapshot_isolation(storage: &dyn MapStorage, tree: TreeId) {
    commit_values(storage, tree, &[(b"a", b"old")]).expect("Failed to commit");
    let before = storage.snapshot(tree).expect("Failed to open snapshot");

    commit_values(storage, tree, &[(b"a", b"new"), (b"b", b"new")]).expect("Failed to commit");

    assert_eq!(before.read_revision(), Revision::new(1));
    assert_eq!(
        before.get(-1, b"a").expect("Failed to read"),
        Some(test_leaf(b"old"))
    );
    assert_eq!(before.get(-1, b"b").expect("Failed to read"), None);
    assert_eq!(
        before
            .latest_signed_map_root()
            .expect("Failed to read root")
            .map_revision,
        Revision::new(1)
    );
    assert_eq!(
        before.get(2, b"a").map_err(|e| e.kind()),
        Err(ErrorKind::InvalidRevision)
    );

    let after = storage.snapshot(tree).expect("Failed to open snapshot");
    assert_eq!(
        after.get(-1, b"a").expect("Failed to read"),
        Some(test_leaf(b"new"))
    );
}

/// Rolled-back and dropped sessions leave no trace and consume no revision.
pub fn check_rollback_atomicity(storage: &dyn MapStorage, tree: TreeId) {
    commit_values(storage, tree, &[(b"a", b"kept")]).expect("Failed to commit");

    let mut tx = storage.begin(tree).expect("Failed to begin");
    tx.set(b"a", MapLeaf::new(b"rolled back".as_slice()))
        .expect("Failed to set");
    tx.set(b"b", MapLeaf::new(b"rolled back".as_slice()))
        .expect("Failed to set");
    tx.store_signed_map_root(test_root(Revision::new(2)))
        .expect("Failed to store root");
    tx.rollback().expect("Failed to roll back");

    {
        let mut dropped = storage.begin(tree).expect("Failed to begin");
        dropped
            .set(b"c", MapLeaf::new(b"dropped".as_slice()))
            .expect("Failed to set");
    }

    let snapshot = storage.snapshot(tree).expect("Failed to open snapshot");
    assert_eq!(snapshot.read_revision(), Revision::new(1));
    assert_eq!(
        snapshot.get(-1, b"a").expect("Failed to read"),
        Some(test_leaf(b"kept"))
    );
    assert_eq!(snapshot.get(-1, b"b").expect("Failed to read"), None);
    assert_eq!(snapshot.get(-1, b"c").expect("Failed to read"), None);

    let revision = commit_values(storage, tree, &[(b"d", b"1")]).expect("Failed to commit");
    assert_eq!(revision, Revision::new(2));
}

/// Commit needs a root; the committed root is returned exactly.
pub fn check_root_completeness(storage: &dyn MapStorage, tree: TreeId) {
    let mut tx = storage.begin(tree).expect("Failed to begin");
    assert!(matches!(tx.commit(), Err(MapError::MissingRoot)));
    assert!(tx.is_open());

    let root = test_root(Revision::new(1)).with_metadata(b"meta".to_vec());
    tx.store_signed_map_root(root.clone())
        .expect("Failed to store root");
    tx.commit().expect("Failed to commit");

    let snapshot = storage.snapshot(tree).expect("Failed to open snapshot");
    assert_eq!(
        snapshot.latest_signed_map_root().expect("Failed to read root"),
        root
    );
    assert_eq!(
        snapshot.signed_map_root_at(1).expect("Failed to read root"),
        root
    );
    assert!(matches!(
        snapshot.signed_map_root_at(0),
        Err(MapError::NotFound { revision: 0 })
    ));
}

/// A second root and a root for the wrong revision are rejected.
pub fn check_root_validation(storage: &dyn MapStorage, tree: TreeId) {
    let mut tx = storage.begin(tree).expect("Failed to begin");
    let err = tx
        .store_signed_map_root(test_root(Revision::new(7)))
        .expect_err("Wrong revision accepted");
    assert_eq!(err.kind(), ErrorKind::InvalidRevision);

    tx.store_signed_map_root(test_root(Revision::new(1)))
        .expect("Failed to store root");
    let err = tx
        .store_signed_map_root(test_root(Revision::new(1)))
        .expect_err("Second root accepted");
    assert_eq!(err.kind(), ErrorKind::DuplicateRoot);
    tx.commit().expect("Failed to commit");
}

/// Sessions refuse every call after commit, rollback or close.
pub fn check_session_lifecycle(storage: &dyn MapStorage, tree: TreeId) {
    let mut tx = storage.begin(tree).expect("Failed to begin");
    tx.store_signed_map_root(test_root(Revision::new(1)))
        .expect("Failed to store root");
    tx.commit().expect("Failed to commit");
    assert!(!tx.is_open());
    assert_eq!(tx.commit().map_err(|e| e.kind()), Err(ErrorKind::Closed));
    assert_eq!(
        tx.set(b"a", MapLeaf::default()).map_err(|e| e.kind()),
        Err(ErrorKind::Closed)
    );
    assert_eq!(tx.rollback().map_err(|e| e.kind()), Err(ErrorKind::Closed));

    let mut tx = storage.begin(tree).expect("Failed to begin");
    tx.rollback().expect("Failed to roll back");
    assert_eq!(
        tx.get(-1, b"a").map_err(|e| e.kind()),
        Err(ErrorKind::Closed)
    );

    let mut snapshot = storage.snapshot(tree).expect("Failed to open snapshot");
    assert!(snapshot.is_open());
    snapshot.close().expect("Failed to close");
    assert!(!snapshot.is_open());
    assert_eq!(
        snapshot.get(-1, b"a").map_err(|e| e.kind()),
        Err(ErrorKind::Closed)
    );
}

/// Revisions above the ceiling or below -1 are invalid.
pub fn check_revision_bounds(storage: &dyn MapStorage, tree: TreeId) {
    commit_values(storage, tree, &[(b"a", b"1")]).expect("Failed to commit");
    let snapshot = storage.snapshot(tree).expect("Failed to open snapshot");
    for bad in [2, 100, -2, i64::MIN] {
        assert_eq!(
            snapshot.get(bad, b"a").map_err(|e| e.kind()),
            Err(ErrorKind::InvalidRevision),
            "revision {bad}"
        );
        assert_eq!(
            snapshot.signed_map_root_at(bad).map_err(|e| e.kind()),
            Err(ErrorKind::InvalidRevision),
            "root {bad}"
        );
    }

    let tx = storage.begin(tree).expect("Failed to begin");
    assert_eq!(
        tx.get(3, b"a").map_err(|e| e.kind()),
        Err(ErrorKind::InvalidRevision)
    );
}

/// A session reads its own staged writes at -1 and its write revision.
pub fn check_read_your_writes(storage: &dyn MapStorage, tree: TreeId) {
    commit_values(storage, tree, &[(b"a", b"1")]).expect("Failed to commit");

    let mut tx = storage.begin(tree).expect("Failed to begin");
    tx.set(b"a", test_leaf(b"2")).expect("Failed to set");
    assert_eq!(tx.pending_writes(), 1);
    assert_eq!(tx.get(-1, b"a").expect("Failed to read"), Some(test_leaf(b"2")));
    assert_eq!(tx.get(2, b"a").expect("Failed to read"), Some(test_leaf(b"2")));
    assert_eq!(tx.get(1, b"a").expect("Failed to read"), Some(test_leaf(b"1")));

    tx.set(b"a", test_leaf(b"3")).expect("Failed to set");
    assert_eq!(tx.pending_writes(), 1);
    tx.store_signed_map_root(test_root(Revision::new(2)))
        .expect("Failed to store root");
    tx.commit().expect("Failed to commit");

    let snapshot = storage.snapshot(tree).expect("Failed to open snapshot");
    assert_eq!(
        snapshot.get(-1, b"a").expect("Failed to read"),
        Some(test_leaf(b"3"))
    );
}

/// A second writer on the same tree waits for the first to finish.
pub fn check_single_writer(storage: &dyn MapStorage, tree: TreeId) {
    let mut first = storage.begin(tree).expect("Failed to begin");
    let (started, begun) = mpsc::channel();

    thread::scope(|scope| {
        scope.spawn(move || {
            let second = storage.begin(tree).expect("Failed to begin second writer");
            started
                .send(second.write_revision())
                .expect("Failed to report");
        });

        assert!(
            begun.recv_timeout(Duration::from_millis(100)).is_err(),
            "second writer began while the first was open"
        );

        first
            .store_signed_map_root(test_root(Revision::new(1)))
            .expect("Failed to store root");
        first.commit().expect("Failed to commit");

        let revision = begun
            .recv_timeout(Duration::from_secs(10))
            .expect("Second writer never began");
        assert_eq!(revision, Revision::new(2));
    });
}

/// Writers on different trees proceed concurrently with their own numbering.
pub fn check_trees_isolated(storage: &dyn MapStorage, tree: TreeId) {
    let other = TreeId(tree.as_i64() + 1);
    let mut first = storage.begin(tree).expect("Failed to begin");
    let mut second = storage.begin(other).expect("Writer blocked by another tree");

    assert_eq!(first.write_revision(), Revision::new(1));
    assert_eq!(second.write_revision(), Revision::new(1));
    first.set(b"k", test_leaf(b"first")).expect("Failed to set");
    second.set(b"k", test_leaf(b"second")).expect("Failed to set");
    second
        .store_signed_map_root(test_root(Revision::new(1)))
        .expect("Failed to store root");
    second.commit().expect("Failed to commit");
    first
        .store_signed_map_root(test_root(Revision::new(1)))
        .expect("Failed to store root");
    first.commit().expect("Failed to commit");

    let snapshot = storage.snapshot(tree).expect("Failed to open snapshot");
    assert_eq!(
        snapshot.get(-1, b"k").expect("Failed to read"),
        Some(test_leaf(b"first"))
    );
    let snapshot = storage.snapshot(other).expect("Failed to open snapshot");
    assert_eq!(
        snapshot.get(-1, b"k").expect("Failed to read"),
        Some(test_leaf(b"second"))
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestStore;

    #[test]
    fn test_memory_conforms() {
        let store = TestStore::memory();
        run_all(&*store);
    }
}
