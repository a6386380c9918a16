//! File-based storage backend for persistent storage.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A file-based storage backend.
///
/// Data survives process restarts. `sync()` calls `File::sync_data()`;
/// `rewind()` truncates the file and syncs it before returning.
///
/// # Example
///
/// ```no_run
/// use vmap_storage::{StorageBackend, FileBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("journal.log")).unwrap();
/// backend.append(b"persistent data").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: RwLock<File>,
    size: RwLock<u64>,
}

impl FileBackend {
    /// Opens or creates a file backend at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
            size: RwLock::new(size),
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let size = *self.size.read();
        let end = offset.saturating_add(len as u64);

        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;

        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut file = self.file.write();
        let mut size = self.size.write();
        let offset = *size;

        if data.is_empty() {
            return Ok(offset);
        }

        file.seek(SeekFrom::Start(offset))?;
        if let Err(err) = file.write_all(data) {
            // Part of `data` may be on disk; track the real length.
            *size = file.metadata().map(|m| m.len()).unwrap_or(offset);
            return Err(err.into());
        }
        *size += data.len() as u64;

        Ok(offset)
    }

    fn sync(&mut self) -> StorageResult<()> {
        let mut file = self.file.write();
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(*self.size.read())
    }

    fn rewind(&mut self, offset: u64) -> StorageResult<()> {
        let file = self.file.write();
        let mut size = self.size.write();

        if offset > *size {
            return Err(StorageError::InvalidRewind {
                offset,
                size: *size,
            });
        }

        file.set_len(offset)?;
        file.sync_all()?;
        *size = offset;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.log");

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(path.exists());
        assert_eq!(backend.path(), path);
    }

    #[test]
    fn file_group_and_read() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("journal.log")).unwrap();

        backend.append(b"head").unwrap();
        let offset = backend
            .append_group(&[b"hello".as_slice(), b" ".as_slice(), b"world".as_slice()])
            .unwrap();
        assert_eq!(offset, 4);
        assert_eq!(backend.size().unwrap(), 15);
        assert_eq!(backend.read_at(offset, 11).unwrap(), b"hello world");
    }

    #[test]
    fn file_read_past_end_fails() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("journal.log")).unwrap();
        backend.append(b"hello").unwrap();

        assert!(matches!(
            backend.read_at(2, 10),
            Err(StorageError::ReadPastEnd { .. })
        ));
        assert!(backend.read_at(2, 0).unwrap().is_empty());
    }

    #[test]
    fn file_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.log");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"persistent data").unwrap();
            backend.sync().unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 15);
        assert_eq!(backend.read_at(0, 15).unwrap(), b"persistent data");
    }

    #[test]
    fn file_rewind_truncates_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.log");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"keep|drop").unwrap();
            backend.rewind(4).unwrap();
            assert!(matches!(
                backend.rewind(5),
                Err(StorageError::InvalidRewind { .. })
            ));
            // Appends continue from the rewound end.
            assert_eq!(backend.append(b"!").unwrap(), 4);
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.read_at(0, 5).unwrap(), b"keep!");
    }

    #[test]
    fn file_open_needs_existing_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("journal.log");

        assert!(matches!(FileBackend::open(&path), Err(StorageError::Io(_))));
        assert!(!path.exists());
    }
}
