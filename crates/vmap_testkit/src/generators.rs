//! Property-based test generators using proptest.
//!
//! Provides strategies for keys, leaves, batches and whole histories.
//! Keys are drawn from a small alphabet so batches in one history overlap.

use proptest::prelude::*;
use vmap_core::MapLeaf;

/// Strategy for keys from a small key space (`k0`..`k15` plus raw bytes).
pub fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        4 => (0u8..16).prop_map(|i| format!("k{i}").into_bytes()),
        1 => prop::collection::vec(any::<u8>(), 1..8),
    ]
}

/// Strategy for leaf values, hashes and optional extra data.
pub fn leaf_strategy() -> impl Strategy<Value = MapLeaf> {
    (
        prop::collection::vec(any::<u8>(), 0..64),
        prop::collection::vec(any::<u8>(), 0..32),
        prop::option::of(prop::collection::vec(any::<u8>(), 0..16)),
    )
        .prop_map(|(value, hash, extra)| {
            let leaf = MapLeaf::new(value).with_hash(hash);
            match extra {
                Some(extra) => leaf.with_extra_data(extra),
                None => leaf,
            }
        })
}

/// Strategy for one batch: distinct keys with their leaves, in key order.
pub fn batch_strategy(max_leaves: usize) -> impl Strategy<Value = Vec<(Vec<u8>, MapLeaf)>> {
    prop::collection::btree_map(key_strategy(), leaf_strategy(), 0..=max_leaves)
        .prop_map(|leaves| leaves.into_iter().collect())
}

/// One step of a generated history.
#[derive(Debug, Clone)]
pub enum HistoryStep {
    /// Commit the batch as a new revision.
    Commit(Vec<(Vec<u8>, MapLeaf)>),
    /// Stage the batch and a root, then roll back.
    Abort(Vec<(Vec<u8>, MapLeaf)>),
}

/// Strategy for a history step; commits are three times as likely.
pub fn history_step_strategy(max_leaves: usize) -> impl Strategy<Value = HistoryStep> {
    prop_oneof![
        3 => batch_strategy(max_leaves).prop_map(HistoryStep::Commit),
        1 => batch_strategy(max_leaves).prop_map(HistoryStep::Abort),
    ]
}

/// Strategy for a sequence of history steps.
pub fn history_strategy(
    min_steps: usize,
    max_steps: usize,
    max_leaves: usize,
) -> impl Strategy<Value = Vec<HistoryStep>> {
    prop::collection::vec(history_step_strategy(max_leaves), min_steps..max_steps)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 128,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 24,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
