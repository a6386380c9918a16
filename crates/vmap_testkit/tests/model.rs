//! Random histories checked against the reference model.

use proptest::prelude::*;
use vmap_core::TreeId;
use vmap_testkit::{history_strategy, HistoryStep, ModelHarness, PropTestConfig, TestStore};

const TREE: TreeId = TreeId(3);

fn apply(harness: &mut ModelHarness<'_>, steps: &[HistoryStep]) {
    for step in steps {
        match step {
            HistoryStep::Commit(leaves) => {
                harness.commit(leaves);
            }
            HistoryStep::Abort(leaves) => harness.abort(leaves),
        }
    }
}

proptest! {
    #![proptest_config(PropTestConfig::default().to_proptest_config())]

    #[test]
    fn memory_store_matches_model(steps in history_strategy(1, 24, 6)) {
        let store = TestStore::memory();
        let mut harness = ModelHarness::new(&*store, TREE);
        apply(&mut harness, &steps);
        harness.verify_all();
    }
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn journaled_store_matches_model_after_reopen(steps in history_strategy(1, 16, 6)) {
        let store = TestStore::journal();
        let model = {
            let mut harness = ModelHarness::new(&*store, TREE);
            apply(&mut harness, &steps);
            harness.into_model()
        };

        let store = store.reopen().expect("journaled stores reopen");
        let mut harness = ModelHarness::resume(&*store, model);
        harness.verify_all();

        // The reopened store keeps counting from the replayed revision.
        apply(&mut harness, &steps);
        harness.verify_all();
    }

    #[test]
    fn file_store_matches_model_after_reopen(steps in history_strategy(1, 12, 4)) {
        let store = TestStore::file();
        let model = {
            let mut harness = ModelHarness::new(&*store, TREE);
            apply(&mut harness, &steps);
            harness.into_model()
        };

        let store = store.reopen().expect("file stores reopen");
        ModelHarness::resume(&*store, model).verify_all();
    }
}
