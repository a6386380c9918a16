//! Journal record types and serialization.

use crate::error::{MapError, MapResult};
use crate::leaf::MapLeaf;
use crate::root::SignedMapRoot;
use crate::types::{Revision, TreeId};

/// Magic bytes identifying a journal frame.
pub const JOURNAL_MAGIC: [u8; 4] = *b"VMAP";

/// Current journal format version.
pub const JOURNAL_VERSION: u16 = 1;

/// magic (4) + version (2) + type (1) + length (4)
pub(crate) const HEADER_SIZE: usize = 11;

pub(crate) const CRC_SIZE: usize = 4;

/// Type of journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// Opens a commit group.
    Begin = 1,
    /// One staged leaf.
    Set = 2,
    /// The group's root.
    Root = 3,
    /// Closes a commit group.
    Commit = 4,
}

impl RecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Begin),
            2 => Some(Self::Set),
            3 => Some(Self::Root),
            4 => Some(Self::Commit),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// One frame of the journal.
///
/// A commit is written as `Begin, Set*, Root, Commit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalRecord {
    /// Opens the group for `revision`.
    Begin {
        /// Tree being written.
        tree: TreeId,
        /// Revision the group commits.
        revision: Revision,
        /// Number of `Set` frames that follow.
        leaf_count: u32,
    },

    /// One leaf of the group.
    Set {
        /// Tree being written.
        tree: TreeId,
        /// Revision the leaf belongs to.
        revision: Revision,
        /// Leaf key.
        key: Vec<u8>,
        /// Leaf value.
        leaf: MapLeaf,
    },

    /// The group's root.
    Root {
        /// Tree being written.
        tree: TreeId,
        /// The root; its `map_revision` is the group's revision.
        root: SignedMapRoot,
    },

    /// Closes the group.
    Commit {
        /// Tree being written.
        tree: TreeId,
        /// Revision being committed.
        revision: Revision,
    },
}

impl JournalRecord {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::Begin { .. } => RecordType::Begin,
            Self::Set { .. } => RecordType::Set,
            Self::Root { .. } => RecordType::Root,
            Self::Commit { .. } => RecordType::Commit,
        }
    }

    /// Returns the tree the record belongs to.
    #[must_use]
    pub fn tree(&self) -> TreeId {
        match self {
            Self::Begin { tree, .. }
            | Self::Set { tree, .. }
            | Self::Root { tree, .. }
            | Self::Commit { tree, .. } => *tree,
        }
    }

    /// Returns the revision the record belongs to.
    #[must_use]
    pub fn revision(&self) -> Revision {
        match self {
            Self::Begin { revision, .. }
            | Self::Set { revision, .. }
            | Self::Commit { revision, .. } => *revision,
            Self::Root { root, .. } => root.map_revision,
        }
    }

    /// Serializes the record payload (without envelope).
    ///
    /// # Errors
    ///
    /// Returns an error if a byte field is longer than a `u32` length allows.
    pub fn encode_payload(&self) -> MapResult<Vec<u8>> {
        let mut buf = Vec::new();

        match self {
            Self::Begin {
                tree,
                revision,
                leaf_count,
            } => {
                buf.extend_from_slice(&tree.as_i64().to_le_bytes());
                buf.extend_from_slice(&revision.as_u64().to_le_bytes());
                buf.extend_from_slice(&leaf_count.to_le_bytes());
            }

            Self::Set {
                tree,
                revision,
                key,
                leaf,
            } => {
                buf.extend_from_slice(&tree.as_i64().to_le_bytes());
                buf.extend_from_slice(&revision.as_u64().to_le_bytes());
                put_bytes(&mut buf, key)?;
                put_bytes(&mut buf, &leaf.leaf_value)?;
                put_bytes(&mut buf, &leaf.leaf_hash)?;
                match &leaf.extra_data {
                    Some(extra) => {
                        buf.push(1);
                        put_bytes(&mut buf, extra)?;
                    }
                    None => buf.push(0),
                }
            }

            Self::Root { tree, root } => {
                buf.extend_from_slice(&tree.as_i64().to_le_bytes());
                buf.extend_from_slice(&root.map_revision.as_u64().to_le_bytes());
                buf.extend_from_slice(&root.timestamp_nanos.to_le_bytes());
                put_bytes(&mut buf, &root.root_hash)?;
                put_bytes(&mut buf, &root.signature)?;
                put_bytes(&mut buf, &root.metadata)?;
            }

            Self::Commit { tree, revision } => {
                buf.extend_from_slice(&tree.as_i64().to_le_bytes());
                buf.extend_from_slice(&revision.as_u64().to_le_bytes());
            }
        }

        Ok(buf)
    }

    /// Deserializes a record from its type and payload.
    ///
    /// # Errors
    ///
    /// Returns a corruption error if the payload is short or has trailing
    /// bytes.
    pub fn decode_payload(record_type: RecordType, payload: &[u8]) -> MapResult<Self> {
        let mut reader = PayloadReader::new(payload);

        let record = match record_type {
            RecordType::Begin => Self::Begin {
                tree: TreeId::new(reader.i64()?),
                revision: Revision::new(reader.u64()?),
                leaf_count: reader.u32()?,
            },

            RecordType::Set => {
                let tree = TreeId::new(reader.i64()?);
                let revision = Revision::new(reader.u64()?);
                let key = reader.bytes()?;
                let leaf_value = reader.bytes()?;
                let leaf_hash = reader.bytes()?;
                let extra_data = match reader.u8()? {
                    0 => None,
                    1 => Some(reader.bytes()?),
                    flag => {
                        return Err(MapError::corruption(format!(
                            "invalid extra_data flag {flag}"
                        )))
                    }
                };
                Self::Set {
                    tree,
                    revision,
                    key,
                    leaf: MapLeaf {
                        leaf_value,
                        leaf_hash,
                        extra_data,
                    },
                }
            }

            RecordType::Root => Self::Root {
                tree: TreeId::new(reader.i64()?),
                root: SignedMapRoot {
                    map_revision: Revision::new(reader.u64()?),
                    timestamp_nanos: reader.u64()?,
                    root_hash: reader.bytes()?,
                    signature: reader.bytes()?,
                    metadata: reader.bytes()?,
                },
            },

            RecordType::Commit => Self::Commit {
                tree: TreeId::new(reader.i64()?),
                revision: Revision::new(reader.u64()?),
            },
        };

        reader.finish(record_type)?;
        Ok(record)
    }

    /// Serializes the record with its envelope and checksum.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not fit the length field.
    pub fn encode_frame(&self) -> MapResult<Vec<u8>> {
        let payload = self.encode_payload()?;
        let len = u32::try_from(payload.len())
            .map_err(|_| MapError::resource_exhausted("journal record payload too large"))?;

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        frame.extend_from_slice(&JOURNAL_MAGIC);
        frame.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
        frame.push(self.record_type().as_byte());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&payload);

        // CRC32 over everything before it
        let crc = crc32fast::hash(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        Ok(frame)
    }
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> MapResult<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| MapError::resource_exhausted("journal field longer than 4 GiB"))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

struct PayloadReader<'a> {
    payload: &'a [u8],
    cursor: usize,
}

impl<'a> PayloadReader<'a> {
    fn new(payload: &'a [u8]) -> Self {
        Self { payload, cursor: 0 }
    }

    fn take(&mut self, len: usize) -> MapResult<&'a [u8]> {
        let end = self
            .cursor
            .checked_add(len)
            .filter(|end| *end <= self.payload.len())
            .ok_or_else(|| MapError::corruption("unexpected end of payload"))?;
        let bytes = &self.payload[self.cursor..end];
        self.cursor = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> MapResult<[u8; N]> {
        self.take(N)?
            .try_into()
            .map_err(|_| MapError::corruption("short field"))
    }

    fn u8(&mut self) -> MapResult<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u32(&mut self) -> MapResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> MapResult<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn i64(&mut self) -> MapResult<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    fn bytes(&mut self) -> MapResult<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn finish(self, record_type: RecordType) -> MapResult<()> {
        if self.cursor != self.payload.len() {
            return Err(MapError::corruption(format!(
                "trailing bytes in {record_type:?} record: expected {} bytes, got {}",
                self.cursor,
                self.payload.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_set() -> JournalRecord {
        JournalRecord::Set {
            tree: TreeId(-7),
            revision: Revision::new(3),
            key: b"key".to_vec(),
            leaf: MapLeaf::new(b"value".as_slice())
                .with_hash(vec![0xAB; 32])
                .with_extra_data(Vec::new()),
        }
    }

    #[test]
    fn record_type_from_byte() {
        for t in [
            RecordType::Begin,
            RecordType::Set,
            RecordType::Root,
            RecordType::Commit,
        ] {
            assert_eq!(RecordType::from_byte(t.as_byte()), Some(t));
        }
        assert_eq!(RecordType::from_byte(0), None);
        assert_eq!(RecordType::from_byte(5), None);
    }

    #[test]
    fn set_keeps_empty_extra_data_distinct() {
        let record = sample_set();
        let payload = record.encode_payload().unwrap();
        let decoded = JournalRecord::decode_payload(RecordType::Set, &payload).unwrap();
        assert_eq!(decoded, record);

        let JournalRecord::Set { leaf, .. } = decoded else {
            panic!("expected Set");
        };
        assert_eq!(leaf.extra_data, Some(Vec::new()));
    }

    #[test]
    fn root_payload_carries_every_field() {
        let record = JournalRecord::Root {
            tree: TreeId(1),
            root: SignedMapRoot::new(Revision::new(9), vec![1, 2, 3])
                .with_signature(vec![4])
                .with_timestamp_nanos(123)
                .with_metadata(b"m".as_slice()),
        };
        let payload = record.encode_payload().unwrap();
        let decoded = JournalRecord::decode_payload(RecordType::Root, &payload).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.revision(), Revision::new(9));
    }

    #[test]
    fn trailing_bytes_are_corruption() {
        let record = JournalRecord::Commit {
            tree: TreeId(1),
            revision: Revision::new(1),
        };
        let mut payload = record.encode_payload().unwrap();
        payload.push(0);
        assert!(matches!(
            JournalRecord::decode_payload(RecordType::Commit, &payload),
            Err(MapError::Corruption { .. })
        ));
    }

    #[test]
    fn short_payload_is_corruption() {
        let payload = sample_set().encode_payload().unwrap();
        for cut in [0, 8, 17, payload.len() - 1] {
            assert!(
                JournalRecord::decode_payload(RecordType::Set, &payload[..cut]).is_err(),
                "cut at {cut}"
            );
        }
    }

    #[test]
    fn bad_extra_flag_is_corruption() {
        let mut payload = JournalRecord::Set {
            tree: TreeId(1),
            revision: Revision::new(1),
            key: Vec::new(),
            leaf: MapLeaf::default(),
        }
        .encode_payload()
        .unwrap();
        let last = payload.len() - 1;
        payload[last] = 9;
        assert!(matches!(
            JournalRecord::decode_payload(RecordType::Set, &payload),
            Err(MapError::Corruption { .. })
        ));
    }

    #[test]
    fn frame_layout() {
        let record = JournalRecord::Commit {
            tree: TreeId(2),
            revision: Revision::new(5),
        };
        let frame = record.encode_frame().unwrap();
        assert_eq!(frame.len(), HEADER_SIZE + 16 + CRC_SIZE);
        assert_eq!(&frame[0..4], b"VMAP");
        assert_eq!(u16::from_le_bytes([frame[4], frame[5]]), JOURNAL_VERSION);
        assert_eq!(frame[6], RecordType::Commit.as_byte());
        assert_eq!(u32::from_le_bytes([frame[7], frame[8], frame[9], frame[10]]), 16);
        let crc_at = frame.len() - CRC_SIZE;
        let stored = u32::from_le_bytes(frame[crc_at..].try_into().unwrap());
        assert_eq!(stored, crc32fast::hash(&frame[..crc_at]));
    }
}
