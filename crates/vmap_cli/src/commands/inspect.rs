//! Inspect command implementation.

use super::load_journal;
use serde::Serialize;
use std::path::Path;
use vmap_core::journal::replay;
use vmap_core::{Config, MapStore};
use vmap_storage::StorageBackend;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Journal size in bytes.
    pub journal_size: u64,
    /// Number of frames read.
    pub frames: usize,
    /// Number of complete commits.
    pub commits: usize,
    /// Bytes that would be cut on the next open.
    pub discarded_bytes: u64,
    /// Per-tree summaries, by tree ID.
    pub trees: Vec<TreeSummary>,
}

/// Summary of a single tree.
#[derive(Debug, Serialize)]
pub struct TreeSummary {
    /// Tree ID.
    pub tree: i64,
    /// Latest committed revision.
    pub latest_revision: u64,
    /// Distinct keys ever written.
    pub keys: usize,
    /// Stored (key, revision) versions.
    pub versions: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Collects the inspection result for the store at `path`.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let backend = load_journal(path)?;
    let journal_size = backend.size()?;
    let replayed = replay(&backend)?;

    let store = MapStore::open_with_backend(
        Config::default().sync_on_commit(false),
        Box::new(backend),
    )?;
    let mut trees = Vec::new();
    for tree in store.trees() {
        let stats = store.tree_stats(tree)?;
        trees.push(TreeSummary {
            tree: stats.tree.as_i64(),
            latest_revision: stats.latest_revision.as_u64(),
            keys: stats.keys,
            versions: stats.versions,
        });
    }

    Ok(InspectResult {
        path: path.display().to_string(),
        journal_size,
        frames: replayed.frames,
        commits: replayed.commits.len(),
        discarded_bytes: replayed.discarded_bytes(),
        trees,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("vmap Store Inspection");
    println!("=====================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Journal:");
    println!("  Size:       {}", format_size(result.journal_size));
    println!("  Frames:     {}", result.frames);
    println!("  Commits:    {}", result.commits);
    if result.discarded_bytes > 0 {
        println!(
            "  Torn tail:  {} (cut on next open)",
            format_size(result.discarded_bytes)
        );
    }
    println!();
    println!("Trees:");
    if result.trees.is_empty() {
        println!("  (none)");
    }
    for tree in &result.trees {
        println!(
            "  [{}] revision {}, {} keys, {} versions",
            tree.tree, tree.latest_revision, tree.keys, tree.versions
        );
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::populate;
    use tempfile::tempdir;

    #[test]
    fn summarizes_trees() {
        let dir = tempdir().unwrap();
        populate(dir.path());

        let result = inspect(dir.path()).unwrap();
        assert_eq!(result.commits, 2);
        assert_eq!(result.frames, 8);
        assert_eq!(result.discarded_bytes, 0);
        assert_eq!(result.trees.len(), 1);
        assert_eq!(result.trees[0].latest_revision, 2);
        assert_eq!(result.trees[0].keys, 1);
        assert_eq!(result.trees[0].versions, 2);
    }

    #[test]
    fn sizes() {
        assert_eq!(format_size(12), "12 bytes");
        assert_eq!(format_size(2048), "2.0 KB");
    }
}
