//! Verify command implementation.

use super::load_journal;
use std::path::Path;
use tracing::warn;
use vmap_core::journal::replay;
use vmap_core::MapError;
use vmap_storage::StorageBackend;

/// Verification result.
#[derive(Debug)]
pub struct VerifyResult {
    /// Frames that passed their checksum.
    pub frames_checked: usize,
    /// Complete commit groups.
    pub commits: usize,
    /// Torn or unfinished bytes at the tail.
    pub discarded_bytes: u64,
    /// The corruption found, if any.
    pub error: Option<String>,
}

impl VerifyResult {
    fn is_ok(&self, strict: bool) -> bool {
        self.error.is_none() && (!strict || self.discarded_bytes == 0)
    }
}

/// Runs the verify command.
pub fn run(path: &Path, strict: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying store at {}", path.display());
    println!();

    let result = verify(path)?;
    println!("  Frames checked: {}", result.frames_checked);
    println!("  Commits:        {}", result.commits);
    if result.discarded_bytes > 0 {
        println!(
            "  Tail:           {} bytes torn or unfinished",
            result.discarded_bytes
        );
    }
    if let Some(error) = &result.error {
        println!("  Error:          {error}");
    }

    println!();
    if result.is_ok(strict) {
        println!("✓ Store verification passed");
        Ok(())
    } else {
        println!("✗ Store verification failed");
        Err("Verification failed".into())
    }
}

/// Checks every frame checksum, the group structure and revision order.
pub fn verify(path: &Path) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let backend = load_journal(path)?;
    match replay(&backend) {
        Ok(replayed) => {
            if replayed.discarded_bytes() > 0 {
                warn!(
                    valid_len = replayed.valid_len,
                    discarded = replayed.discarded_bytes(),
                    "journal has a torn tail"
                );
            }
            Ok(VerifyResult {
                frames_checked: replayed.frames,
                commits: replayed.commits.len(),
                discarded_bytes: replayed.discarded_bytes(),
                error: None,
            })
        }
        Err(err @ MapError::Corruption { .. }) => {
            warn!(error = %err, "journal is corrupt");
            Ok(VerifyResult {
                frames_checked: 0,
                commits: 0,
                discarded_bytes: backend.size()?,
                error: Some(err.to_string()),
            })
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::populate;
    use tempfile::tempdir;
    use vmap_core::journal_path;

    #[test]
    fn clean_store_passes() {
        let dir = tempdir().unwrap();
        populate(dir.path());
        let result = verify(dir.path()).unwrap();
        assert!(result.is_ok(true));
        assert_eq!(result.commits, 2);
    }

    #[test]
    fn torn_tail_fails_only_when_strict() {
        let dir = tempdir().unwrap();
        populate(dir.path());
        let journal = journal_path(dir.path());
        let mut bytes = std::fs::read(&journal).unwrap();
        bytes.truncate(bytes.len() - 3);
        std::fs::write(&journal, bytes).unwrap();

        let result = verify(dir.path()).unwrap();
        assert_eq!(result.commits, 1);
        assert!(result.discarded_bytes > 0);
        assert!(result.is_ok(false));
        assert!(!result.is_ok(true));
    }

    #[test]
    fn flipped_byte_is_corruption() {
        let dir = tempdir().unwrap();
        populate(dir.path());
        let journal = journal_path(dir.path());
        let mut bytes = std::fs::read(&journal).unwrap();
        bytes[12] ^= 0xff;
        std::fs::write(&journal, bytes).unwrap();

        let result = verify(dir.path()).unwrap();
        assert!(result.error.unwrap().contains("checksum"));
    }
}
