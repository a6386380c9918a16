//! Journal frame scanning and replay.
//!
//! [`JournalReader`] walks frames one by one. [`replay`] groups them into
//! commits and checks the group structure and revision order.

use super::record::{
    JournalRecord, RecordType, CRC_SIZE, HEADER_SIZE, JOURNAL_MAGIC, JOURNAL_VERSION,
};
use crate::error::{MapError, MapResult};
use crate::leaf::MapLeaf;
use crate::log::CommitRecord;
use crate::root::SignedMapRoot;
use crate::types::{Revision, TreeId};
use std::collections::HashMap;
use vmap_storage::StorageBackend;

/// One frame read from the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Offset of the frame's first byte.
    pub offset: u64,
    /// Length of the whole frame, envelope included.
    pub len: u64,
    /// The decoded record.
    pub record: JournalRecord,
}

impl Frame {
    /// Offset just past the frame.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// Streaming iterator over journal frames.
///
/// A truncated header or payload at the end is a torn write and ends
/// iteration cleanly; [`JournalReader::torn_at`] then reports where the
/// torn bytes start. Checksum, magic, type and version errors are returned
/// as corruption and also end iteration.
pub struct JournalReader<'a> {
    backend: &'a dyn StorageBackend,
    size: u64,
    offset: u64,
    torn_at: Option<u64>,
    finished: bool,
}

impl<'a> JournalReader<'a> {
    /// Creates a reader starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend size cannot be determined.
    pub fn new(backend: &'a dyn StorageBackend, offset: u64) -> MapResult<Self> {
        Ok(Self {
            backend,
            size: backend.size()?,
            offset,
            torn_at: None,
            finished: false,
        })
    }

    /// Start of the torn tail, if one was found.
    #[must_use]
    pub fn torn_at(&self) -> Option<u64> {
        self.torn_at
    }

    fn read_next(&mut self) -> MapResult<Option<Frame>> {
        let start = self.offset;
        let remaining = self.size.saturating_sub(start);
        if remaining == 0 {
            return Ok(None);
        }
        if remaining < HEADER_SIZE as u64 {
            self.torn_at = Some(start);
            return Ok(None);
        }

        let header = self.backend.read_at(start, HEADER_SIZE)?;
        if header[0..4] != JOURNAL_MAGIC {
            return Err(MapError::corruption(format!(
                "invalid magic at offset {start}"
            )));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version > JOURNAL_VERSION {
            return Err(MapError::corruption(format!(
                "unsupported version {version} at offset {start}"
            )));
        }

        let type_byte = header[6];
        let record_type = RecordType::from_byte(type_byte).ok_or_else(|| {
            MapError::corruption(format!(
                "unknown record type {type_byte} at offset {start}"
            ))
        })?;

        let payload_len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]);
        let len = (HEADER_SIZE + CRC_SIZE) as u64 + u64::from(payload_len);
        if remaining < len {
            self.torn_at = Some(start);
            return Ok(None);
        }

        let body = self
            .backend
            .read_at(start + HEADER_SIZE as u64, payload_len as usize + CRC_SIZE)?;
        let (payload, crc_bytes) = body.split_at(payload_len as usize);
        let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&header);
        hasher.update(payload);
        let computed = hasher.finalize();
        if stored != computed {
            return Err(MapError::corruption(format!(
                "checksum mismatch at offset {start}: stored {stored:08x}, computed {computed:08x}"
            )));
        }

        let record = JournalRecord::decode_payload(record_type, payload)?;
        self.offset = start + len;
        Ok(Some(Frame {
            offset: start,
            len,
            record,
        }))
    }
}

impl Iterator for JournalReader<'_> {
    type Item = MapResult<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_next() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

/// Result of replaying a journal.
#[derive(Debug, Default)]
pub struct Replay {
    /// Complete commits, in journal order.
    pub commits: Vec<CommitRecord>,
    /// Number of frames read, including any unfinished tail group.
    pub frames: usize,
    /// End of the last complete commit group.
    pub valid_len: u64,
    /// Total journal size.
    pub total_len: u64,
}

impl Replay {
    /// Bytes after the last complete group: a torn frame or an unfinished group.
    #[must_use]
    pub fn discarded_bytes(&self) -> u64 {
        self.total_len - self.valid_len
    }
}

/// A commit group being reassembled.
struct PendingGroup {
    tree: TreeId,
    revision: Revision,
    leaf_count: usize,
    leaves: Vec<(Vec<u8>, MapLeaf)>,
    root: Option<SignedMapRoot>,
}

impl PendingGroup {
    fn accepts_set(&self, tree: TreeId, revision: Revision) -> bool {
        self.tree == tree
            && self.revision == revision
            && self.root.is_none()
            && self.leaves.len() < self.leaf_count
    }

    fn accepts_root(&self, tree: TreeId, revision: Revision) -> bool {
        self.tree == tree
            && self.revision == revision
            && self.root.is_none()
            && self.leaves.len() == self.leaf_count
    }
}

fn unexpected(frame_type: RecordType, tree: TreeId, revision: Revision, offset: u64) -> MapError {
    MapError::corruption(format!(
        "unexpected {frame_type:?} frame for {tree} {revision} at offset {offset}"
    ))
}

/// Reads every complete commit group from `backend`.
///
/// The backend is not modified; a torn or unfinished tail is reported
/// through [`Replay::discarded_bytes`].
///
/// # Errors
///
/// Returns a corruption error for bad frames, malformed groups, or a
/// revision that does not follow its tree's previous one.
pub fn replay(backend: &dyn StorageBackend) -> MapResult<Replay> {
    let mut replay = Replay {
        total_len: backend.size()?,
        ..Replay::default()
    };
    let mut latest: HashMap<TreeId, Revision> = HashMap::new();
    let mut pending: Option<PendingGroup> = None;

    for frame in JournalReader::new(backend, 0)? {
        let frame = frame?;
        let end = frame.end();
        let offset = frame.offset;
        replay.frames += 1;

        match frame.record {
            JournalRecord::Begin {
                tree,
                revision,
                leaf_count,
            } => {
                if pending.is_some() {
                    return Err(unexpected(RecordType::Begin, tree, revision, offset));
                }
                let expected = latest.get(&tree).copied().unwrap_or_default().next();
                if revision != expected {
                    return Err(MapError::corruption(format!(
                        "{tree} jumps to {revision} at offset {offset}, expected {expected}"
                    )));
                }
                pending = Some(PendingGroup {
                    tree,
                    revision,
                    leaf_count: leaf_count as usize,
                    leaves: Vec::new(),
                    root: None,
                });
            }

            JournalRecord::Set {
                tree,
                revision,
                key,
                leaf,
            } => {
                let group = pending
                    .as_mut()
                    .filter(|group| group.accepts_set(tree, revision))
                    .ok_or_else(|| unexpected(RecordType::Set, tree, revision, offset))?;
                group.leaves.push((key, leaf));
            }

            JournalRecord::Root { tree, root } => {
                let revision = root.map_revision;
                let group = pending
                    .as_mut()
                    .filter(|group| group.accepts_root(tree, revision))
                    .ok_or_else(|| unexpected(RecordType::Root, tree, revision, offset))?;
                group.root = Some(root);
            }

            JournalRecord::Commit { tree, revision } => {
                let group = pending
                    .take()
                    .filter(|group| group.tree == tree && group.revision == revision)
                    .ok_or_else(|| unexpected(RecordType::Commit, tree, revision, offset))?;
                let root = group
                    .root
                    .ok_or_else(|| unexpected(RecordType::Commit, tree, revision, offset))?;
                latest.insert(tree, revision);
                replay.commits.push(CommitRecord {
                    tree,
                    revision,
                    leaves: group.leaves,
                    root,
                });
                replay.valid_len = end;
            }
        }
    }

    Ok(replay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmap_storage::InMemoryBackend;

    fn group(tree: i64, revision: u64, keys: &[&[u8]]) -> Vec<JournalRecord> {
        let tree = TreeId(tree);
        let revision = Revision::new(revision);
        let mut frames = vec![JournalRecord::Begin {
            tree,
            revision,
            leaf_count: keys.len() as u32,
        }];
        for key in keys {
            frames.push(JournalRecord::Set {
                tree,
                revision,
                key: key.to_vec(),
                leaf: MapLeaf::new(*key),
            });
        }
        frames.push(JournalRecord::Root {
            tree,
            root: SignedMapRoot::new(revision, vec![1]),
        });
        frames.push(JournalRecord::Commit { tree, revision });
        frames
    }

    fn write(frames: &[JournalRecord]) -> InMemoryBackend {
        let mut backend = InMemoryBackend::new();
        for frame in frames {
            backend.append(&frame.encode_frame().unwrap()).unwrap();
        }
        backend
    }

    #[test]
    fn empty_journal() {
        let backend = InMemoryBackend::new();
        let replay = replay(&backend).unwrap();
        assert!(replay.commits.is_empty());
        assert_eq!(replay.discarded_bytes(), 0);
    }

    #[test]
    fn interleaved_trees_replay_in_order() {
        let mut frames = group(1, 1, &[b"a", b"b"]);
        frames.extend(group(2, 1, &[]));
        frames.extend(group(1, 2, &[b"a"]));
        let backend = write(&frames);

        let replay = replay(&backend).unwrap();
        let order: Vec<_> = replay
            .commits
            .iter()
            .map(|c| (c.tree.as_i64(), c.revision.as_u64(), c.leaves.len()))
            .collect();
        assert_eq!(order, vec![(1, 1, 2), (2, 1, 0), (1, 2, 1)]);
        assert_eq!(replay.frames, 12);
        assert_eq!(replay.valid_len, backend.size().unwrap());
    }

    #[test]
    fn unfinished_group_is_discarded() {
        let mut frames = group(1, 1, &[b"a"]);
        let complete_len = write(&frames).size().unwrap();
        let mut next = group(1, 2, &[b"b"]);
        next.pop();
        frames.extend(next);
        let backend = write(&frames);

        let replay = replay(&backend).unwrap();
        assert_eq!(replay.commits.len(), 1);
        assert_eq!(replay.valid_len, complete_len);
        assert!(replay.discarded_bytes() > 0);
    }

    #[test]
    fn torn_frame_ends_the_log() {
        let frames = group(1, 1, &[b"a"]);
        let backend = write(&frames);
        let full = backend.data();
        let backend = InMemoryBackend::with_data(full[..full.len() - 3].to_vec());

        let mut reader = JournalReader::new(&backend, 0).unwrap();
        let read: Vec<Frame> = reader.by_ref().collect::<MapResult<_>>().unwrap();
        assert_eq!(read.len(), frames.len() - 1);
        assert_eq!(reader.torn_at(), Some(read.last().unwrap().end()));

        let replay = replay(&backend).unwrap();
        assert!(replay.commits.is_empty());
        assert_eq!(replay.valid_len, 0);
    }

    #[test]
    fn checksum_mismatch_is_fatal() {
        let backend = write(&group(1, 1, &[b"a"]));
        assert!(backend.corrupt_byte(HEADER_SIZE + 2, 0xFF));
        assert!(matches!(replay(&backend), Err(MapError::Corruption { .. })));
    }

    #[test]
    fn bad_magic_is_fatal() {
        let backend = write(&group(1, 1, &[]));
        assert!(backend.corrupt_byte(0, b'X'));
        assert!(matches!(replay(&backend), Err(MapError::Corruption { .. })));
    }

    #[test]
    fn revision_gap_is_fatal() {
        let mut frames = group(1, 1, &[]);
        frames.extend(group(1, 3, &[]));
        let backend = write(&frames);
        assert!(matches!(replay(&backend), Err(MapError::Corruption { .. })));
    }

    #[test]
    fn malformed_group_is_fatal() {
        let mut frames = group(1, 1, &[b"a"]);
        // Drop the Set: Root arrives while one leaf is still expected.
        frames.remove(1);
        let backend = write(&frames);
        assert!(matches!(replay(&backend), Err(MapError::Corruption { .. })));
    }
}
