//! Store directory management.
//!
//! A durable store lives in one directory:
//!
//! ```text
//! <path>/
//! ├─ LOCK          # Advisory lock, one process per store
//! └─ journal.log   # Append-only commit journal
//! ```

use crate::error::{MapError, MapResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const JOURNAL_FILE: &str = "journal.log";

/// Returns the journal path of the store at `path`.
#[must_use]
pub fn journal_path(path: &Path) -> PathBuf {
    path.join(JOURNAL_FILE)
}

/// An opened store directory. Holds the exclusive lock until dropped.
#[derive(Debug)]
pub struct MapDir {
    path: PathBuf,
    _lock_file: File,
}

impl MapDir {
    /// Opens or creates a store directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - The store already has a journal and `error_if_exists` is true
    /// - Another process holds the lock (returns `Locked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool, error_if_exists: bool) -> MapResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(MapError::invalid_format(format!(
                    "store directory does not exist: {}",
                    path.display()
                )));
            }
        } else if error_if_exists && journal_path(path).exists() {
            return Err(MapError::invalid_format(format!(
                "store already exists: {}",
                path.display()
            )));
        }

        if !path.is_dir() {
            return Err(MapError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(MapError::Locked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the journal file.
    #[must_use]
    pub fn journal_path(&self) -> PathBuf {
        journal_path(&self.path)
    }
}
