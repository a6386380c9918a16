//! The conformance suite against every store kind, fresh and reopened.

use vmap_core::{MapReader, ReadOnlyMapStorage, Revision, TreeId};
use vmap_testkit::conformance;
use vmap_testkit::{commit_values, test_leaf, StoreKind, TestStore};

#[test]
fn memory_store_conforms() {
    conformance::run_all(&*TestStore::memory());
}

#[test]
fn journaled_store_conforms() {
    conformance::run_all(&*TestStore::journal());
}

#[test]
fn file_store_conforms() {
    conformance::run_all(&*TestStore::file());
}

#[test]
fn reopened_stores_still_conform() {
    let tree = TreeId(1);
    for store in TestStore::all() {
        let kind = store.kind();
        conformance::check_write_then_read(&*store, tree);

        let Some(reopened) = store.reopen() else {
            assert_eq!(kind, StoreKind::Memory);
            continue;
        };
        let snapshot = reopened.snapshot(tree).unwrap();
        assert_eq!(snapshot.read_revision(), Revision::new(1), "{kind:?}");
        assert_eq!(
            snapshot.get(-1, b"a").unwrap().map(|l| l.leaf_value),
            Some(b"v1".to_vec())
        );

        let revision = commit_values(&*reopened, tree, &[(b"a", b"v2")]).unwrap();
        assert_eq!(revision, Revision::new(2));
        assert_eq!(
            reopened.snapshot(tree).unwrap().get(-1, b"a").unwrap(),
            Some(test_leaf(b"v2"))
        );

        conformance::run_all(&*reopened);
    }
}
