//! Journal writer.

use super::reader::replay;
use super::record::JournalRecord;
use crate::error::{MapError, MapResult};
use crate::log::{CommitLog, CommitRecord};
use parking_lot::Mutex;
use tracing::{info, warn};
use vmap_storage::{StorageBackend, StorageError};

struct JournalState {
    backend: Box<dyn StorageBackend>,
    poisoned: bool,
}

/// The durable commit log.
///
/// One journal serves every tree of a store; appends are serialized by an
/// internal mutex.
pub struct Journal {
    state: Mutex<JournalState>,
    sync_on_commit: bool,
}

impl Journal {
    /// Creates a journal over `backend`.
    ///
    /// Call [`CommitLog::recover`] before the first append.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            state: Mutex::new(JournalState {
                backend,
                poisoned: false,
            }),
            sync_on_commit,
        }
    }

    /// Returns the current journal size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend size cannot be determined.
    pub fn size(&self) -> MapResult<u64> {
        Ok(self.state.lock().backend.size()?)
    }

    /// Returns true if a failed commit could not be cut off.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.state.lock().poisoned
    }

    fn encode_group(record: &CommitRecord) -> MapResult<Vec<Vec<u8>>> {
        let leaf_count = u32::try_from(record.leaves.len())
            .map_err(|_| MapError::resource_exhausted("too many leaves in one commit"))?;

        let mut frames = Vec::with_capacity(record.leaves.len() + 3);
        frames.push(
            JournalRecord::Begin {
                tree: record.tree,
                revision: record.revision,
                leaf_count,
            }
            .encode_frame()?,
        );
        for (key, leaf) in &record.leaves {
            frames.push(
                JournalRecord::Set {
                    tree: record.tree,
                    revision: record.revision,
                    key: key.clone(),
                    leaf: leaf.clone(),
                }
                .encode_frame()?,
            );
        }
        frames.push(
            JournalRecord::Root {
                tree: record.tree,
                root: record.root.clone(),
            }
            .encode_frame()?,
        );
        frames.push(
            JournalRecord::Commit {
                tree: record.tree,
                revision: record.revision,
            }
            .encode_frame()?,
        );
        Ok(frames)
    }
}

impl CommitLog for Journal {
    fn append(&self, record: &CommitRecord) -> MapResult<()> {
        let frames = Self::encode_group(record)?;
        let chunks: Vec<&[u8]> = frames.iter().map(Vec::as_slice).collect();

        let mut state = self.state.lock();
        if state.poisoned {
            return Err(MapError::JournalPoisoned);
        }

        let start = match state.backend.append_group(&chunks) {
            Ok(start) => start,
            Err(err) => {
                if matches!(err, StorageError::Torn { .. }) {
                    warn!(tree = %record.tree, revision = %record.revision, error = %err, "journal poisoned");
                    state.poisoned = true;
                }
                return Err(err.into());
            }
        };

        if self.sync_on_commit {
            if let Err(err) = state.backend.sync() {
                if let Err(rewind_err) = state.backend.rewind(start) {
                    warn!(
                        tree = %record.tree,
                        revision = %record.revision,
                        error = %rewind_err,
                        "cannot cut off unsynced commit, journal poisoned"
                    );
                    state.poisoned = true;
                } else {
                    warn!(tree = %record.tree, revision = %record.revision, offset = start, "unsynced commit cut off");
                }
                return Err(err.into());
            }
        }

        Ok(())
    }

    fn recover(&self) -> MapResult<Vec<CommitRecord>> {
        let mut state = self.state.lock();
        let replayed = replay(state.backend.as_ref())?;

        if replayed.discarded_bytes() > 0 {
            warn!(
                valid_len = replayed.valid_len,
                discarded = replayed.discarded_bytes(),
                "discarding incomplete journal tail"
            );
            state.backend.rewind(replayed.valid_len)?;
            state.backend.sync()?;
        }

        info!(
            commits = replayed.commits.len(),
            frames = replayed.frames,
            bytes = replayed.valid_len,
            "journal replayed"
        );
        state.poisoned = false;
        Ok(replayed.commits)
    }

    fn sync(&self) -> MapResult<()> {
        let mut state = self.state.lock();
        if state.poisoned {
            return Err(MapError::JournalPoisoned);
        }
        state.backend.sync()?;
        Ok(())
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("sync_on_commit", &self.sync_on_commit)
            .field("poisoned", &self.is_poisoned())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaf::MapLeaf;
    use crate::root::SignedMapRoot;
    use crate::types::{Revision, TreeId};
    use vmap_storage::{FaultyBackend, InMemoryBackend};

    fn record(revision: u64, keys: &[&[u8]]) -> CommitRecord {
        CommitRecord {
            tree: TreeId(1),
            revision: Revision::new(revision),
            leaves: keys
                .iter()
                .map(|k| (k.to_vec(), MapLeaf::new(*k)))
                .collect(),
            root: SignedMapRoot::new(Revision::new(revision), vec![7]),
        }
    }

    #[test]
    fn append_then_recover() {
        let backend = InMemoryBackend::new();
        let journal = Journal::new(Box::new(backend.clone()), true);
        let first = record(1, &[b"a", b"b"]);
        let second = record(2, &[b"a"]);
        journal.append(&first).unwrap();
        journal.append(&second).unwrap();

        let reopened = Journal::new(Box::new(backend), true);
        assert_eq!(reopened.recover().unwrap(), vec![first, second]);
    }

    #[test]
    fn recover_cuts_torn_tail() {
        let backend = InMemoryBackend::new();
        let journal = Journal::new(Box::new(backend.clone()), false);
        journal.append(&record(1, &[b"a"])).unwrap();
        let good_len = journal.size().unwrap();
        journal.append(&record(2, &[b"b"])).unwrap();

        let mut bytes = backend.data();
        bytes.truncate(bytes.len() - 5);
        let torn = InMemoryBackend::with_data(bytes);

        let reopened = Journal::new(Box::new(torn.clone()), false);
        assert_eq!(reopened.recover().unwrap().len(), 1);
        assert_eq!(torn.size().unwrap(), good_len);
    }

    #[test]
    fn failed_sync_leaves_journal_unchanged() {
        let inner = InMemoryBackend::new();
        let (faulty, faults) = FaultyBackend::new(Box::new(inner.clone()));
        let journal = Journal::new(Box::new(faulty), true);
        journal.append(&record(1, &[b"a"])).unwrap();
        let before = inner.data();

        faults.set_fail_syncs(true);
        assert!(journal.append(&record(2, &[b"b"])).is_err());
        assert_eq!(inner.data(), before);
        assert!(!journal.is_poisoned());

        faults.heal();
        journal.append(&record(2, &[b"b"])).unwrap();
    }

    #[test]
    fn unrecoverable_failure_poisons() {
        let inner = InMemoryBackend::new();
        let (faulty, faults) = FaultyBackend::new(Box::new(inner.clone()));
        let journal = Journal::new(Box::new(faulty), true);

        faults.tear_next_append(3);
        faults.set_fail_rewinds(true);
        assert!(journal.append(&record(1, &[b"a"])).is_err());
        assert!(journal.is_poisoned());

        faults.heal();
        assert!(matches!(
            journal.append(&record(1, &[b"a"])),
            Err(MapError::JournalPoisoned)
        ));

        // Reopening cuts the torn bytes and clears the poison.
        let reopened = Journal::new(Box::new(inner.clone()), true);
        assert!(reopened.recover().unwrap().is_empty());
        assert_eq!(inner.size().unwrap(), 0);
    }
}
