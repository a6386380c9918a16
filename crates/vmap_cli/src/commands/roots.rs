//! Roots command implementation.

use super::{hex_encode, load_store};
use serde::Serialize;
use std::path::Path;
use vmap_core::{MapReader, ReadOnlyMapStorage, TreeId};

/// Root representation for output.
#[derive(Debug, Serialize)]
pub struct RootInfo {
    /// Revision of the root.
    pub revision: u64,
    /// Root hash, hex-encoded.
    pub root_hash: String,
    /// Signature, hex-encoded.
    pub signature: String,
    /// Commit timestamp in nanoseconds since the Unix epoch.
    pub timestamp_nanos: u64,
    /// Metadata size in bytes.
    pub metadata_size: usize,
}

/// Runs the roots command.
pub fn run(
    path: &Path,
    tree: i64,
    from: u64,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let roots = list_roots(path, TreeId(tree), from, limit)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&roots)?);
        }
        _ => {
            if roots.is_empty() {
                println!("No roots for tree {tree}");
            }
            for root in &roots {
                println!(
                    "rev {:>6}  hash={}  sig={}  ts={}  metadata={} bytes",
                    root.revision,
                    root.root_hash,
                    root.signature,
                    root.timestamp_nanos,
                    root.metadata_size
                );
            }
        }
    }

    Ok(())
}

/// Lists the roots of `tree` starting at revision `from`.
pub fn list_roots(
    path: &Path,
    tree: TreeId,
    from: u64,
    limit: Option<usize>,
) -> Result<Vec<RootInfo>, Box<dyn std::error::Error>> {
    let store = load_store(path)?;
    let snapshot = store.snapshot(tree)?;
    let latest = snapshot.read_revision().as_u64();
    let max_roots = limit.unwrap_or(usize::MAX);

    let mut roots = Vec::new();
    for revision in from.max(1)..=latest {
        if roots.len() >= max_roots {
            break;
        }
        let root = snapshot.signed_map_root_at(i64::try_from(revision)?)?;
        roots.push(RootInfo {
            revision: root.map_revision.as_u64(),
            root_hash: hex_encode(&root.root_hash),
            signature: hex_encode(&root.signature),
            timestamp_nanos: root.timestamp_nanos,
            metadata_size: root.metadata.len(),
        });
    }
    Ok(roots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::populate;
    use tempfile::tempdir;

    #[test]
    fn lists_in_revision_order() {
        let dir = tempdir().unwrap();
        populate(dir.path());

        let roots = list_roots(dir.path(), TreeId(1), 1, None).unwrap();
        let revisions: Vec<u64> = roots.iter().map(|r| r.revision).collect();
        assert_eq!(revisions, vec![1, 2]);
        assert_eq!(roots[0].root_hash, "a1");
        assert_eq!(roots[1].signature, "5a");

        let tail = list_roots(dir.path(), TreeId(1), 2, Some(5)).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(list_roots(dir.path(), TreeId(1), 1, Some(1)).unwrap().len(), 1);
    }

    #[test]
    fn unknown_tree_has_no_roots() {
        let dir = tempdir().unwrap();
        populate(dir.path());
        assert!(list_roots(dir.path(), TreeId(9), 1, None).unwrap().is_empty());
    }
}
