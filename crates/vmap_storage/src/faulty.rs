//! Fault-injecting storage backend wrapper.
//!
//! [`FaultyBackend`] forwards every call to an inner backend until a fault
//! is armed through its [`FaultHandle`]. The handle is cheap to clone and
//! stays usable after the backend has been moved into a store, which is
//! how tests make a commit fail half-way through.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

const TEAR_DISARMED: usize = usize::MAX;

#[derive(Debug)]
struct FaultState {
    fail_appends: AtomicBool,
    fail_syncs: AtomicBool,
    fail_rewinds: AtomicBool,
    fail_reads: AtomicBool,
    /// Bytes the next append may write before it fails.
    tear_next_append: AtomicUsize,
    injected: AtomicU64,
}

impl Default for FaultState {
    fn default() -> Self {
        Self {
            fail_appends: AtomicBool::new(false),
            fail_syncs: AtomicBool::new(false),
            fail_rewinds: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            tear_next_append: AtomicUsize::new(TEAR_DISARMED),
            injected: AtomicU64::new(0),
        }
    }
}

/// Controls the faults of a [`FaultyBackend`].
#[derive(Debug, Clone, Default)]
pub struct FaultHandle {
    state: Arc<FaultState>,
}

impl FaultHandle {
    /// Makes every append fail without writing anything.
    pub fn set_fail_appends(&self, on: bool) {
        self.state.fail_appends.store(on, Ordering::SeqCst);
    }

    /// Makes the next append write only `bytes` bytes and then fail.
    pub fn tear_next_append(&self, bytes: usize) {
        self.state.tear_next_append.store(bytes, Ordering::SeqCst);
    }

    /// Makes every sync fail.
    pub fn set_fail_syncs(&self, on: bool) {
        self.state.fail_syncs.store(on, Ordering::SeqCst);
    }

    /// Makes every rewind fail.
    pub fn set_fail_rewinds(&self, on: bool) {
        self.state.fail_rewinds.store(on, Ordering::SeqCst);
    }

    /// Makes every read fail.
    pub fn set_fail_reads(&self, on: bool) {
        self.state.fail_reads.store(on, Ordering::SeqCst);
    }

    /// Disarms all faults.
    pub fn heal(&self) {
        self.set_fail_appends(false);
        self.set_fail_syncs(false);
        self.set_fail_rewinds(false);
        self.set_fail_reads(false);
        self.state
            .tear_next_append
            .store(TEAR_DISARMED, Ordering::SeqCst);
    }

    /// Number of faults injected so far.
    #[must_use]
    pub fn injected(&self) -> u64 {
        self.state.injected.load(Ordering::SeqCst)
    }

    fn trip(&self, what: &'static str) -> StorageError {
        self.state.injected.fetch_add(1, Ordering::SeqCst);
        StorageError::Injected(what)
    }
}

/// A storage backend that fails on command.
///
/// # Example
///
/// ```rust
/// use vmap_storage::{FaultyBackend, InMemoryBackend, StorageBackend};
///
/// let (mut backend, faults) = FaultyBackend::new(Box::new(InMemoryBackend::new()));
/// faults.set_fail_appends(true);
/// assert!(backend.append(b"data").is_err());
/// faults.heal();
/// assert_eq!(backend.append(b"data").unwrap(), 0);
/// ```
pub struct FaultyBackend {
    inner: Box<dyn StorageBackend>,
    faults: FaultHandle,
}

impl FaultyBackend {
    /// Wraps `inner` and returns the handle that arms faults.
    #[must_use]
    pub fn new(inner: Box<dyn StorageBackend>) -> (Self, FaultHandle) {
        let faults = FaultHandle::default();
        let backend = Self {
            inner,
            faults: faults.clone(),
        };
        (backend, faults)
    }

    /// Returns a handle to this backend's faults.
    #[must_use]
    pub fn faults(&self) -> FaultHandle {
        self.faults.clone()
    }
}

impl std::fmt::Debug for FaultyBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultyBackend")
            .field("faults", &self.faults)
            .finish_non_exhaustive()
    }
}

impl StorageBackend for FaultyBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        if self.faults.state.fail_reads.load(Ordering::SeqCst) {
            return Err(self.faults.trip("read"));
        }
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        if self.faults.state.fail_appends.load(Ordering::SeqCst) {
            return Err(self.faults.trip("append"));
        }
        let tear = self
            .faults
            .state
            .tear_next_append
            .swap(TEAR_DISARMED, Ordering::SeqCst);
        if tear != TEAR_DISARMED {
            let keep = tear.min(data.len());
            self.inner.append(&data[..keep])?;
            return Err(self.faults.trip("torn append"));
        }
        self.inner.append(data)
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.faults.state.fail_syncs.load(Ordering::SeqCst) {
            return Err(self.faults.trip("sync"));
        }
        self.inner.sync()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn rewind(&mut self, offset: u64) -> StorageResult<()> {
        if self.faults.state.fail_rewinds.load(Ordering::SeqCst) {
            return Err(self.faults.trip("rewind"));
        }
        self.inner.rewind(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryBackend;

    fn faulty() -> (FaultyBackend, FaultHandle, InMemoryBackend) {
        let inner = InMemoryBackend::new();
        let (backend, faults) = FaultyBackend::new(Box::new(inner.clone()));
        (backend, faults, inner)
    }

    #[test]
    fn passes_through_when_healthy() {
        let (mut backend, faults, inner) = faulty();
        backend.append(b"abc").unwrap();
        backend.sync().unwrap();
        assert_eq!(inner.data(), b"abc");
        assert_eq!(faults.injected(), 0);
    }

    #[test]
    fn torn_append_leaves_prefix() {
        let (mut backend, faults, inner) = faulty();
        faults.tear_next_append(2);
        let err = backend.append(b"abcdef").unwrap_err();
        assert!(err.is_injected());
        assert_eq!(inner.data(), b"ab");
        // One-shot: the following append is whole.
        backend.append(b"cd").unwrap();
        assert_eq!(inner.data(), b"abcd");
    }

    #[test]
    fn failed_group_is_rewound() {
        let (mut backend, faults, inner) = faulty();
        backend.append(b"base").unwrap();
        faults.tear_next_append(1);
        let err = backend
            .append_group(&[b"one".as_slice(), b"two".as_slice()])
            .unwrap_err();
        assert!(err.is_injected());
        assert_eq!(inner.data(), b"base");
    }

    #[test]
    fn failed_group_without_rewind_is_torn() {
        let (mut backend, faults, inner) = faulty();
        faults.tear_next_append(2);
        faults.set_fail_rewinds(true);
        let err = backend.append_group(&[b"xyz".as_slice()]).unwrap_err();
        assert!(matches!(err, StorageError::Torn { offset: 0, .. }));
        assert_eq!(inner.data(), b"xy");
        assert_eq!(faults.injected(), 2);
    }

    #[test]
    fn heal_disarms_everything() {
        let (mut backend, faults, _inner) = faulty();
        faults.set_fail_syncs(true);
        faults.set_fail_reads(true);
        assert!(backend.sync().is_err());
        assert!(backend.read_at(0, 0).is_err());
        faults.heal();
        backend.sync().unwrap();
        assert!(backend.read_at(0, 0).unwrap().is_empty());
    }
}
