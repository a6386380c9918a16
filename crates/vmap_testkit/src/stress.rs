//! Stress tests for vmap stores.
//!
//! These helpers drive a store under heavy load and concurrent access, and
//! count consistency violations alongside failures.

use crate::fixtures::{commit_leaves, test_leaf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use vmap_core::{MapLeaf, MapStorage, Revision, TreeId};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Reads or histories that broke an invariant.
    pub violations: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, violations: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            violations,
            duration,
            ops_per_second,
        }
    }

    /// Returns true if nothing failed and no invariant was broken.
    pub fn is_clean(&self) -> bool {
        self.failed_ops == 0 && self.violations == 0
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Violations: {}", self.violations);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations to perform.
    pub operations: usize,
    /// Number of concurrent threads (for concurrent tests).
    pub threads: usize,
    /// Size of leaf values in bytes.
    pub value_size: usize,
    /// Number of distinct keys.
    pub keys: usize,
    /// Leaves written per commit.
    pub batch_size: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 2_000,
            threads: 4,
            value_size: 128,
            keys: 256,
            batch_size: 8,
        }
    }
}

impl StressConfig {
    /// A configuration small enough for unit tests.
    pub fn small() -> Self {
        Self {
            operations: 100,
            threads: 3,
            value_size: 16,
            keys: 16,
            batch_size: 4,
        }
    }
}

fn stress_key(i: usize) -> Vec<u8> {
    format!("stress-{i:06}").into_bytes()
}

/// A value that names the revision that wrote it.
fn revision_value(revision: u64, size: usize) -> Vec<u8> {
    let mut value = revision.to_le_bytes().to_vec();
    value.resize(size.max(8), 0xAB);
    value
}

fn written_revision(leaf: &MapLeaf) -> Option<u64> {
    let bytes: [u8; 8] = leaf.leaf_value.get(..8)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

fn batch(start: usize, config: &StressConfig, revision: u64) -> Vec<(Vec<u8>, MapLeaf)> {
    (0..config.batch_size.min(config.keys))
        .map(|j| {
            let key = stress_key((start + j) % config.keys);
            (key, test_leaf(&revision_value(revision, config.value_size)))
        })
        .collect()
}

/// Run a sequential commit stress test.
pub fn stress_sequential_commits(
    storage: &dyn MapStorage,
    tree: TreeId,
    config: &StressConfig,
) -> StressTestResult {
    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;
    let mut violations = 0usize;
    let mut expected = latest_revision(storage, tree);

    for i in 0..config.operations {
        let leaves = batch(i * config.batch_size, config, expected.as_u64() + 1);
        match commit_leaves(storage, tree, &leaves) {
            Ok(revision) => {
                successful += 1;
                expected = expected.next();
                if revision != expected {
                    violations += 1;
                }
            }
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, violations, start.elapsed())
}

/// Run a snapshot read stress test over a populated tree.
pub fn stress_snapshot_reads(
    storage: &dyn MapStorage,
    tree: TreeId,
    config: &StressConfig,
) -> StressTestResult {
    if config.keys == 0 {
        return StressTestResult::new(0, 0, 0, Duration::ZERO);
    }

    // Every key gets written at least once. A failed commit consumes no
    // revision, so the next batch is stamped with the same one.
    let mut failed = 0usize;
    let mut next = latest_revision(storage, tree).next();
    let mut start_key = 0;
    while start_key < config.keys {
        match commit_leaves(storage, tree, &batch(start_key, config, next.as_u64())) {
            Ok(revision) => next = revision.next(),
            Err(_) => failed += 1,
        }
        start_key += config.batch_size.max(1);
    }

    let start = Instant::now();
    let mut successful = 0usize;
    let mut violations = 0usize;

    let snapshot = match storage.snapshot(tree) {
        Ok(snapshot) => snapshot,
        Err(_) => return StressTestResult::new(0, failed + config.operations, 0, start.elapsed()),
    };
    let ceiling = snapshot.read_revision().as_u64();
    for i in 0..config.operations {
        match snapshot.get(-1, &stress_key(i % config.keys)) {
            Ok(Some(leaf)) => {
                successful += 1;
                if written_revision(&leaf).map_or(true, |r| r > ceiling) {
                    violations += 1;
                }
            }
            Ok(None) => {
                successful += 1;
                violations += 1;
            }
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, violations, start.elapsed())
}

/// Run concurrent writers against one tree.
///
/// Afterwards the tree must hold exactly one gapless revision per
/// successful commit, each with its root.
pub fn stress_concurrent_writers(
    storage: &dyn MapStorage,
    tree: TreeId,
    config: &StressConfig,
) -> StressTestResult {
    let base = latest_revision(storage, tree).as_u64();
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let ops_per_thread = config.operations / config.threads.max(1);

    let start = Instant::now();
    thread::scope(|scope| {
        for t in 0..config.threads {
            let successful = &successful;
            let failed = &failed;
            scope.spawn(move || {
                for i in 0..ops_per_thread {
                    let result = vmap_core::with_write_session(storage, tree, |tx| {
                        let revision = tx.write_revision();
                        for (key, leaf) in batch(t * ops_per_thread + i, config, revision.as_u64())
                        {
                            tx.set(&key, leaf)?;
                        }
                        tx.store_signed_map_root(crate::fixtures::test_root(revision))
                    });
                    match result {
                        Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            });
        }
    });
    let duration = start.elapsed();

    let successful = successful.into_inner();
    let mut violations = 0usize;
    match storage.snapshot(tree) {
        Ok(snapshot) => {
            let latest = snapshot.read_revision().as_u64();
            if latest != base + successful as u64 {
                violations += 1;
            }
            for revision in base + 1..=latest {
                let root_ok = i64::try_from(revision)
                    .ok()
                    .and_then(|r| snapshot.signed_map_root_at(r).ok())
                    .is_some_and(|root| root.map_revision.as_u64() == revision);
                if !root_ok {
                    violations += 1;
                }
            }
        }
        Err(_) => violations += 1,
    }

    StressTestResult::new(successful, failed.into_inner(), violations, duration)
}

/// Run readers that check snapshot consistency while one writer commits.
///
/// Every revision rewrites every key, so a consistent snapshot sees each
/// key carrying exactly the snapshot's revision.
pub fn stress_readers_during_writes(
    storage: &dyn MapStorage,
    tree: TreeId,
    config: &StressConfig,
) -> StressTestResult {
    let writing = AtomicBool::new(true);
    let successful = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let violations = AtomicUsize::new(0);
    let full = StressConfig {
        batch_size: config.keys,
        ..config.clone()
    };

    let start = Instant::now();
    thread::scope(|scope| {
        scope.spawn(|| {
            for _ in 0..config.operations {
                let revision = latest_revision(storage, tree).as_u64() + 1;
                match commit_leaves(storage, tree, &batch(0, &full, revision)) {
                    Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                    Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                };
            }
            writing.store(false, Ordering::Release);
        });

        for _ in 1..config.threads.max(2) {
            scope.spawn(|| {
                while writing.load(Ordering::Acquire) {
                    let snapshot = match storage.snapshot(tree) {
                        Ok(snapshot) => snapshot,
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            continue;
                        }
                    };
                    let seen = snapshot.read_revision().as_u64();
                    if seen == 0 {
                        continue;
                    }
                    for k in 0..config.keys {
                        let consistent = snapshot
                            .get(-1, &stress_key(k))
                            .ok()
                            .flatten()
                            .and_then(|leaf| written_revision(&leaf))
                            == Some(seen);
                        if !consistent {
                            violations.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    successful.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
    });

    StressTestResult::new(
        successful.into_inner(),
        failed.into_inner(),
        violations.into_inner(),
        start.elapsed(),
    )
}

fn latest_revision(storage: &dyn MapStorage, tree: TreeId) -> Revision {
    storage
        .snapshot(tree)
        .map_or(Revision::ZERO, |snapshot| snapshot.read_revision())
}
