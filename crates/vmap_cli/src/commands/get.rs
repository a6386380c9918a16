//! Get command implementation.

use super::{display_bytes, hex_encode, load_store};
use serde::Serialize;
use std::path::Path;
use vmap_core::{MapReader, ReadOnlyMapStorage, TreeId};

/// Leaf representation for output.
#[derive(Debug, Serialize)]
pub struct GetResult {
    /// Tree ID.
    pub tree: i64,
    /// Key, hex-encoded.
    pub key: String,
    /// Revision of the root the read was made against.
    pub revision: u64,
    /// Whether the key was found.
    pub found: bool,
    /// Leaf value, hex-encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leaf_value: Option<String>,
    /// Leaf hash, hex-encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leaf_hash: Option<String>,
    /// Extra data, hex-encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_data: Option<String>,
    #[serde(skip)]
    value_text: Option<String>,
}

/// Runs the get command.
pub fn run(
    path: &Path,
    tree: i64,
    key: &[u8],
    revision: i64,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = get(path, TreeId(tree), key, revision)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            let key = display_bytes(key);
            match &result.value_text {
                Some(value) => println!("{key} @ rev {} = {value}", result.revision),
                None => println!("{key} @ rev {}: not found", result.revision),
            }
        }
    }

    Ok(())
}

/// Reads `key` of `tree` at `revision` (`-1` for latest).
pub fn get(
    path: &Path,
    tree: TreeId,
    key: &[u8],
    revision: i64,
) -> Result<GetResult, Box<dyn std::error::Error>> {
    let store = load_store(path)?;
    let snapshot = store.snapshot(tree)?;
    let root = snapshot.signed_map_root_at(revision)?;
    let leaf = snapshot.get(revision, key)?;

    Ok(GetResult {
        tree: tree.as_i64(),
        key: hex_encode(key),
        revision: root.map_revision.as_u64(),
        found: leaf.is_some(),
        leaf_value: leaf.as_ref().map(|l| hex_encode(&l.leaf_value)),
        leaf_hash: leaf.as_ref().map(|l| hex_encode(&l.leaf_hash)),
        extra_data: leaf
            .as_ref()
            .and_then(|l| l.extra_data.as_deref())
            .map(hex_encode),
        value_text: leaf.as_ref().map(|l| display_bytes(&l.leaf_value)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::populate;
    use tempfile::tempdir;

    #[test]
    fn reads_latest_and_history() {
        let dir = tempdir().unwrap();
        populate(dir.path());

        let latest = get(dir.path(), TreeId(1), b"user", -1).unwrap();
        assert!(latest.found);
        assert_eq!(latest.revision, 2);
        assert_eq!(latest.leaf_value.as_deref(), Some("7632"));

        let first = get(dir.path(), TreeId(1), b"user", 1).unwrap();
        assert_eq!(first.leaf_value.as_deref(), Some("7631"));

        let missing = get(dir.path(), TreeId(1), b"other", -1).unwrap();
        assert!(!missing.found);
    }

    #[test]
    fn empty_tree_is_an_error() {
        let dir = tempdir().unwrap();
        populate(dir.path());
        assert!(get(dir.path(), TreeId(2), b"user", -1).is_err());
    }
}
