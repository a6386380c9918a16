//! Dump journal command implementation.

use super::{display_bytes, load_journal};
use serde::Serialize;
use std::path::Path;
use vmap_core::journal::{Frame, JournalReader, JournalRecord};

/// Frame representation for output.
#[derive(Debug, Serialize)]
pub struct FrameInfo {
    /// Offset in the journal file.
    pub offset: u64,
    /// Frame length, envelope included.
    pub len: u64,
    /// Record type.
    pub record_type: String,
    /// Tree ID.
    pub tree: i64,
    /// Revision.
    pub revision: u64,
    /// Leaf count (BEGIN only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leaf_count: Option<u32>,
    /// Key (SET only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Leaf value size in bytes (SET only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_size: Option<usize>,
    /// Root hash size in bytes (ROOT only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_hash_size: Option<usize>,
}

impl From<&Frame> for FrameInfo {
    fn from(frame: &Frame) -> Self {
        let mut info = FrameInfo {
            offset: frame.offset,
            len: frame.len,
            record_type: format!("{:?}", frame.record.record_type()).to_uppercase(),
            tree: frame.record.tree().as_i64(),
            revision: frame.record.revision().as_u64(),
            leaf_count: None,
            key: None,
            value_size: None,
            root_hash_size: None,
        };
        match &frame.record {
            JournalRecord::Begin { leaf_count, .. } => info.leaf_count = Some(*leaf_count),
            JournalRecord::Set { key, leaf, .. } => {
                info.key = Some(display_bytes(key));
                info.value_size = Some(leaf.leaf_value.len());
            }
            JournalRecord::Root { root, .. } => info.root_hash_size = Some(root.root_hash.len()),
            JournalRecord::Commit { .. } => {}
        }
        info
    }
}

/// Frames read, and how the scan ended.
#[derive(Debug, Serialize)]
pub struct Dump {
    /// Frames in journal order.
    pub frames: Vec<FrameInfo>,
    /// Start of a torn tail, if the scan hit one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub torn_at: Option<u64>,
    /// The corruption that stopped the scan, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs the dump-journal command.
pub fn run(
    path: &Path,
    limit: Option<usize>,
    start_offset: u64,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let dump = dump(path, limit, start_offset)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&dump)?);
        }
        _ => {
            print_text_output(&dump);
        }
    }

    Ok(())
}

/// Reads up to `limit` frames starting at `start_offset`.
pub fn dump(
    path: &Path,
    limit: Option<usize>,
    start_offset: u64,
) -> Result<Dump, Box<dyn std::error::Error>> {
    let backend = load_journal(path)?;
    let mut reader = JournalReader::new(&backend, start_offset)?;
    let max_frames = limit.unwrap_or(usize::MAX);

    let mut dump = Dump {
        frames: Vec::new(),
        torn_at: None,
        error: None,
    };
    while dump.frames.len() < max_frames {
        match reader.next() {
            Some(Ok(frame)) => dump.frames.push(FrameInfo::from(&frame)),
            Some(Err(err)) => {
                dump.error = Some(err.to_string());
                break;
            }
            None => break,
        }
    }
    dump.torn_at = reader.torn_at();
    Ok(dump)
}

fn print_text_output(dump: &Dump) {
    println!("Journal Frames ({} shown)", dump.frames.len());
    println!("=====================");
    println!();

    for frame in &dump.frames {
        print!(
            "[{:08}] {:7} tree={} rev={}",
            frame.offset, frame.record_type, frame.tree, frame.revision
        );
        if let Some(count) = frame.leaf_count {
            print!(" leaves={count}");
        }
        if let Some(key) = &frame.key {
            print!(" key={key}");
        }
        if let Some(size) = frame.value_size {
            print!(" value={size} bytes");
        }
        if let Some(size) = frame.root_hash_size {
            print!(" hash={size} bytes");
        }
        println!();
    }

    if let Some(offset) = dump.torn_at {
        println!();
        println!("Torn tail at offset {offset}");
    }
    if let Some(error) = &dump.error {
        println!();
        println!("Stopped: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::populate;
    use tempfile::tempdir;

    #[test]
    fn dumps_commit_groups() {
        let dir = tempdir().unwrap();
        populate(dir.path());

        let dump = dump(dir.path(), None, 0).unwrap();
        let types: Vec<&str> = dump.frames.iter().map(|f| f.record_type.as_str()).collect();
        assert_eq!(
            types,
            vec!["BEGIN", "SET", "ROOT", "COMMIT", "BEGIN", "SET", "ROOT", "COMMIT"]
        );
        assert_eq!(dump.frames[1].key.as_deref(), Some("\"user\""));
        assert_eq!(dump.frames[4].revision, 2);
        assert!(dump.torn_at.is_none());
        assert!(dump.error.is_none());
    }

    #[test]
    fn offset_and_limit() {
        let dir = tempdir().unwrap();
        populate(dir.path());

        let all = dump(dir.path(), None, 0).unwrap();
        let second_group = all.frames[4].offset;
        let tail = dump(dir.path(), Some(2), second_group).unwrap();
        assert_eq!(tail.frames.len(), 2);
        assert_eq!(tail.frames[0].record_type, "BEGIN");
        assert_eq!(tail.frames[0].revision, 2);
    }
}
