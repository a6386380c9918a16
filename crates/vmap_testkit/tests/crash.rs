//! Crash recovery scenarios.

use proptest::prelude::*;
use vmap_testkit::{
    batch_strategy, check_truncation, CrashPoint, CrashRecoveryHarness, JournalImage,
    PropTestConfig,
};

#[test]
fn every_scenario_recovers() {
    let mut harness = CrashRecoveryHarness::new();
    harness.run_all();
    assert!(harness.all_passed(), "{:#?}", harness.results);
    assert_eq!(harness.results.len(), 3 + CrashPoint::ALL.len());
}

#[test]
fn truncating_inside_first_group_loses_everything() {
    let image = JournalImage::sample(2).unwrap();
    for cut in [1, 11, image.group_ends[0] as usize - 1] {
        let result = check_truncation(&image, cut);
        assert!(result.passed, "{result:?}");
        assert_eq!(result.actual_revisions, 0);
    }
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn random_truncation_recovers_committed_prefix(
        batches in prop::collection::vec(batch_strategy(4), 1..6),
        fraction in 0.0f64..=1.0,
    ) {
        let image = JournalImage::build(&batches).unwrap();
        let cut = (image.bytes.len() as f64 * fraction) as usize;
        let result = check_truncation(&image, cut);
        prop_assert!(result.passed, "{:?}", result);
    }
}
