//! Stress runs against every store kind.

use vmap_core::{MapReader, ReadOnlyMapStorage, TreeId};
use vmap_testkit::{
    stress_concurrent_writers, stress_readers_during_writes, stress_sequential_commits,
    stress_snapshot_reads, StressConfig, TestStore,
};

#[test]
fn sequential_commits_on_every_store() {
    let config = StressConfig::small();
    for store in TestStore::all() {
        let result = stress_sequential_commits(&*store, TreeId(1), &config);
        assert!(result.is_clean(), "{:?}: {result:?}", store.kind());
        assert_eq!(result.successful_ops, config.operations);
    }
}

#[test]
fn snapshot_reads_on_every_store() {
    let config = StressConfig::small();
    for store in TestStore::all() {
        let result = stress_snapshot_reads(&*store, TreeId(2), &config);
        assert!(result.is_clean(), "{:?}: {result:?}", store.kind());
    }
}

#[test]
fn concurrent_writers_on_every_store() {
    let config = StressConfig::small();
    let per_thread = config.operations / config.threads;
    for store in TestStore::all() {
        let result = stress_concurrent_writers(&*store, TreeId(3), &config);
        assert!(result.is_clean(), "{:?}: {result:?}", store.kind());
        assert_eq!(result.successful_ops, per_thread * config.threads);
    }
}

#[test]
fn readers_during_writes_on_every_store() {
    let config = StressConfig {
        operations: 50,
        ..StressConfig::small()
    };
    for store in TestStore::all() {
        let result = stress_readers_during_writes(&*store, TreeId(4), &config);
        assert!(result.is_clean(), "{:?}: {result:?}", store.kind());
    }
}

#[test]
fn trees_do_not_interfere_under_load() {
    let store = TestStore::journal();
    let storage = store.storage();
    let config = StressConfig::small();
    std::thread::scope(|scope| {
        for tree in 10..13 {
            let storage = &*storage;
            let config = &config;
            scope.spawn(move || {
                let result = stress_sequential_commits(storage, TreeId(tree), config);
                assert!(result.is_clean(), "{result:?}");
            });
        }
    });
    for tree in 10..13 {
        let snapshot = storage.snapshot(TreeId(tree)).unwrap();
        assert_eq!(snapshot.read_revision().as_u64(), config.operations as u64);
    }
}
