//! Crash recovery testing for the journal.
//!
//! Simulates crashes at various points of a commit and verifies that the
//! store recovers to exactly its committed revisions.
//!
//! ## Test Strategy
//!
//! 1. **Truncation** - Cut the journal at every byte offset and reopen
//! 2. **Injected faults** - Fail the device before, during and after the
//!    commit write, then check the store and the bytes on the device
//! 3. **Corruption** - Flip a byte inside a committed group; open must fail
//! 4. **Restart** - Committed data survives closing a file store
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vmap_testkit::crash::CrashRecoveryHarness;
//!
//! let mut harness = CrashRecoveryHarness::new();
//! harness.run_all();
//! assert!(harness.all_passed(), "{:#?}", harness.results);
//! ```

use crate::fixtures::{commit_leaves, test_leaf, test_root};
use crate::model::MapModel;
use tempfile::TempDir;
use vmap_core::{
    Config, Journal, MapError, MapLeaf, MapReader, MapResult, MapStore, ReadOnlyMapStorage,
    Revision, TreeId,
};
use vmap_storage::{FaultHandle, FaultyBackend, InMemoryBackend, StorageBackend};

/// Tree written by the harness.
pub const CRASH_TREE: TreeId = TreeId(42);

/// Points at which a commit can be interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// The device refuses the write outright.
    BeforeAppend,
    /// Part of the group reaches the device; cutting it off succeeds.
    DuringAppend,
    /// Part of the group reaches the device and it cannot be cut off.
    DuringAppendUnrecoverable,
    /// The group is written but the sync fails.
    DuringSync,
}

impl CrashPoint {
    /// Every crash point.
    pub const ALL: [CrashPoint; 4] = [
        CrashPoint::BeforeAppend,
        CrashPoint::DuringAppend,
        CrashPoint::DuringAppendUnrecoverable,
        CrashPoint::DuringSync,
    ];

    fn arm(self, faults: &FaultHandle) {
        match self {
            CrashPoint::BeforeAppend => faults.set_fail_appends(true),
            CrashPoint::DuringAppend => faults.tear_next_append(7),
            CrashPoint::DuringAppendUnrecoverable => {
                faults.tear_next_append(7);
                faults.set_fail_rewinds(true);
            }
            CrashPoint::DuringSync => faults.set_fail_syncs(true),
        }
    }

    /// Whether the store keeps accepting commits after the fault heals.
    fn store_survives(self) -> bool {
        self != CrashPoint::DuringAppendUnrecoverable
    }
}

/// Result of a crash recovery test.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Whether the test passed.
    pub passed: bool,
    /// Description of what was tested.
    pub description: String,
    /// Expected revisions after recovery.
    pub expected_revisions: u64,
    /// Actual revisions after recovery.
    pub actual_revisions: u64,
    /// Any error message.
    pub error: Option<String>,
}

impl CrashRecoveryResult {
    /// Creates a passing result.
    pub fn pass(description: &str, revisions: u64) -> Self {
        Self {
            passed: true,
            description: description.to_string(),
            expected_revisions: revisions,
            actual_revisions: revisions,
            error: None,
        }
    }

    /// Creates a failing result.
    pub fn fail(description: &str, expected: u64, actual: u64, error: &str) -> Self {
        Self {
            passed: false,
            description: description.to_string(),
            expected_revisions: expected,
            actual_revisions: actual,
            error: Some(error.to_string()),
        }
    }

    fn from_outcome(description: &str, expected: u64, outcome: MapResult<Self>) -> Self {
        outcome.unwrap_or_else(|e| Self::fail(description, expected, 0, &e.to_string()))
    }
}

/// A journal written by a series of commits, with the offset at which each
/// commit group ends.
#[derive(Debug, Clone)]
pub struct JournalImage {
    /// The journal bytes.
    pub bytes: Vec<u8>,
    /// End offset of each group, in commit order.
    pub group_ends: Vec<u64>,
    /// What the image contains.
    pub model: MapModel,
}

impl JournalImage {
    /// Commits `batches` to [`CRASH_TREE`] of a fresh journal.
    ///
    /// # Errors
    ///
    /// Whatever the store returns.
    pub fn build(batches: &[Vec<(Vec<u8>, MapLeaf)>]) -> MapResult<Self> {
        let device = InMemoryBackend::new();
        let store = MapStore::open_with_backend(Config::default(), Box::new(device.clone()))?;
        let mut model = MapModel::new(CRASH_TREE);
        let mut group_ends = Vec::with_capacity(batches.len());

        for batch in batches {
            let revision = commit_leaves(&store, CRASH_TREE, batch)?;
            model.record(batch, test_root(revision));
            group_ends.push(store.journal().size()?);
        }

        Ok(Self {
            bytes: device.data(),
            group_ends,
            model,
        })
    }

    /// A small image of `revisions` overlapping batches.
    ///
    /// # Errors
    ///
    /// Whatever the store returns.
    pub fn sample(revisions: usize) -> MapResult<Self> {
        let batches: Vec<Vec<(Vec<u8>, MapLeaf)>> = (0..revisions)
            .map(|r| {
                (r..r + 3)
                    .map(|k| {
                        let value = format!("{k}@{r}");
                        (format!("key-{k}").into_bytes(), test_leaf(value.as_bytes()))
                    })
                    .collect()
            })
            .collect();
        Self::build(&batches)
    }

    /// Number of commits whose group ends at or before `cut`.
    pub fn revisions_before(&self, cut: u64) -> u64 {
        self.group_ends.iter().filter(|end| **end <= cut).count() as u64
    }

    /// Reopens the image truncated to `cut` bytes.
    ///
    /// # Errors
    ///
    /// Whatever recovery returns.
    pub fn open_prefix(&self, cut: usize) -> MapResult<(MapStore<Journal>, InMemoryBackend)> {
        let device = InMemoryBackend::with_data(self.bytes[..cut.min(self.bytes.len())].to_vec());
        let store = MapStore::open_with_backend(Config::default(), Box::new(device.clone()))?;
        Ok((store, device))
    }
}

/// Reopens `image` cut at `cut` and checks it recovered exactly the groups
/// that ended before the cut.
pub fn check_truncation(image: &JournalImage, cut: usize) -> CrashRecoveryResult {
    let description = format!("journal truncated at {cut}");
    let expected = image.revisions_before(cut as u64);

    let outcome = (|| -> MapResult<CrashRecoveryResult> {
        let (store, device) = image.open_prefix(cut)?;
        let snapshot = store.snapshot(CRASH_TREE)?;
        let actual = snapshot.read_revision().as_u64();
        if actual != expected {
            return Ok(CrashRecoveryResult::fail(
                &description,
                expected,
                actual,
                "wrong number of revisions recovered",
            ));
        }
        if let Some(mismatch) = image.model.first_mismatch(snapshot.as_ref()) {
            return Ok(CrashRecoveryResult::fail(&description, expected, actual, &mismatch));
        }

        let valid_len = match expected {
            0 => 0,
            n => image.group_ends[n as usize - 1],
        };
        if device.size()? != valid_len {
            return Ok(CrashRecoveryResult::fail(
                &description,
                expected,
                actual,
                "torn tail was not cut from the device",
            ));
        }
        Ok(CrashRecoveryResult::pass(&description, expected))
    })();

    CrashRecoveryResult::from_outcome(&description, expected, outcome)
}

/// Test harness for crash recovery scenarios.
#[derive(Debug, Default)]
pub struct CrashRecoveryHarness {
    /// Results of crash recovery tests.
    pub results: Vec<CrashRecoveryResult>,
}

impl CrashRecoveryHarness {
    /// Creates a new crash recovery harness.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs every scenario.
    pub fn run_all(&mut self) -> &[CrashRecoveryResult] {
        self.test_committed_data_survives();
        self.test_every_truncation(3);
        for point in CrashPoint::ALL {
            self.test_crash_at(point);
        }
        self.test_corruption_refuses_open();
        &self.results
    }

    /// Returns true if every recorded result passed.
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    /// Tests that committed data survives closing and reopening a file store.
    pub fn test_committed_data_survives(&mut self) -> CrashRecoveryResult {
        let description = "Committed data survives restart";
        let outcome = (|| -> MapResult<CrashRecoveryResult> {
            let temp_dir = TempDir::new()?;
            let mut model = MapModel::new(CRASH_TREE);
            {
                let store = MapStore::open(temp_dir.path())?;
                for r in 1..=5u64 {
                    let leaves = vec![(
                        format!("key-{}", r % 3).into_bytes(),
                        test_leaf(&r.to_le_bytes()),
                    )];
                    let revision = commit_leaves(&store, CRASH_TREE, &leaves)?;
                    model.record(&leaves, test_root(revision));
                }
                store.close()?;
            }

            let store = MapStore::open(temp_dir.path())?;
            let snapshot = store.snapshot(CRASH_TREE)?;
            let actual = snapshot.read_revision().as_u64();
            Ok(match model.first_mismatch(snapshot.as_ref()) {
                None if actual == 5 => CrashRecoveryResult::pass(description, 5),
                None => CrashRecoveryResult::fail(description, 5, actual, "revisions lost"),
                Some(mismatch) => CrashRecoveryResult::fail(description, 5, actual, &mismatch),
            })
        })();

        self.record(CrashRecoveryResult::from_outcome(description, 5, outcome))
    }

    /// Cuts a journal of `revisions` commits at every byte offset.
    ///
    /// Records one result: the first failing cut, or a pass.
    pub fn test_every_truncation(&mut self, revisions: usize) -> CrashRecoveryResult {
        let description = "Every truncation recovers a committed prefix";
        let expected = revisions as u64;
        let result = match JournalImage::sample(revisions) {
            Ok(image) => (0..=image.bytes.len())
                .map(|cut| check_truncation(&image, cut))
                .find(|r| !r.passed)
                .unwrap_or_else(|| CrashRecoveryResult::pass(description, expected)),
            Err(e) => CrashRecoveryResult::fail(description, expected, 0, &e.to_string()),
        };
        self.record(result)
    }

    /// Interrupts the third commit at `point`, then checks that the store
    /// and the device hold exactly the first two.
    pub fn test_crash_at(&mut self, point: CrashPoint) -> CrashRecoveryResult {
        let description = format!("Crash {point:?}");
        let outcome = Self::crash_at(point, &description);
        self.record(CrashRecoveryResult::from_outcome(&description, 3, outcome))
    }

    fn crash_at(point: CrashPoint, description: &str) -> MapResult<CrashRecoveryResult> {
        let device = InMemoryBackend::new();
        let (faulty, faults) = FaultyBackend::new(Box::new(device.clone()));
        let store = MapStore::open_with_backend(Config::default(), Box::new(faulty))?;
        let mut model = MapModel::new(CRASH_TREE);

        let batch = |r: u64| vec![(b"key".to_vec(), test_leaf(&r.to_le_bytes()))];
        for r in 1..=2 {
            let revision = commit_leaves(&store, CRASH_TREE, &batch(r))?;
            model.record(&batch(r), test_root(revision));
        }
        let before = device.data();

        point.arm(&faults);
        if commit_leaves(&store, CRASH_TREE, &batch(3)).is_ok() {
            return Ok(CrashRecoveryResult::fail(
                description,
                2,
                3,
                "commit succeeded despite the fault",
            ));
        }
        faults.heal();

        if store.latest_revision(CRASH_TREE)? != Revision::new(2) {
            return Ok(CrashRecoveryResult::fail(
                description,
                2,
                store.latest_revision(CRASH_TREE)?.as_u64(),
                "failed commit was published",
            ));
        }

        if point.store_survives() {
            if device.data() != before {
                return Ok(CrashRecoveryResult::fail(
                    description,
                    2,
                    2,
                    "failed commit left bytes on the device",
                ));
            }
            let revision = commit_leaves(&store, CRASH_TREE, &batch(3))?;
            model.record(&batch(3), test_root(revision));
        } else if !matches!(
            commit_leaves(&store, CRASH_TREE, &batch(3)),
            Err(MapError::JournalPoisoned)
        ) {
            return Ok(CrashRecoveryResult::fail(
                description,
                2,
                2,
                "journal accepted a commit after an unrecoverable fault",
            ));
        }
        drop(store);

        let reopened = MapStore::open_with_backend(Config::default(), Box::new(device))?;
        let snapshot = reopened.snapshot(CRASH_TREE)?;
        let expected = model.latest().as_u64();
        let actual = snapshot.read_revision().as_u64();
        Ok(match model.first_mismatch(snapshot.as_ref()) {
            None if actual == expected => CrashRecoveryResult::pass(description, expected),
            None => CrashRecoveryResult::fail(description, expected, actual, "revision count"),
            Some(mismatch) => CrashRecoveryResult::fail(description, expected, actual, &mismatch),
        })
    }

    /// Tests that a flipped byte inside a committed group refuses to open.
    pub fn test_corruption_refuses_open(&mut self) -> CrashRecoveryResult {
        let description = "Corrupted group refuses to open";
        let result = match JournalImage::sample(2) {
            Ok(image) => {
                let mut bytes = image.bytes.clone();
                let target = (image.group_ends[0] / 2) as usize;
                bytes[target] ^= 0x55;
                let device = InMemoryBackend::with_data(bytes);
                match MapStore::open_with_backend(Config::default(), Box::new(device)) {
                    Err(MapError::Corruption { .. }) => CrashRecoveryResult::pass(description, 0),
                    Err(e) => CrashRecoveryResult::fail(description, 0, 0, &e.to_string()),
                    Ok(_) => CrashRecoveryResult::fail(description, 0, 2, "corruption not detected"),
                }
            }
            Err(e) => CrashRecoveryResult::fail(description, 0, 0, &e.to_string()),
        };
        self.record(result)
    }

    fn record(&mut self, result: CrashRecoveryResult) -> CrashRecoveryResult {
        self.results.push(result.clone());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_group_ends() {
        let image = JournalImage::sample(3).unwrap();
        assert_eq!(image.group_ends.len(), 3);
        assert_eq!(*image.group_ends.last().unwrap(), image.bytes.len() as u64);
        assert_eq!(image.revisions_before(0), 0);
        assert_eq!(image.revisions_before(image.group_ends[1]), 2);
        assert_eq!(image.revisions_before(image.group_ends[1] - 1), 1);
    }

    #[test]
    fn test_truncation_at_group_boundary() {
        let image = JournalImage::sample(2).unwrap();
        let result = check_truncation(&image, image.group_ends[0] as usize);
        assert!(result.passed, "{result:?}");
        assert_eq!(result.actual_revisions, 1);
    }

    #[test]
    fn test_crash_points() {
        let mut harness = CrashRecoveryHarness::new();
        for point in CrashPoint::ALL {
            let result = harness.test_crash_at(point);
            assert!(result.passed, "{result:?}");
        }
    }
}
