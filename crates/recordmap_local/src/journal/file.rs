//! File-backed journal and its directory.
//!
//! ```text
//! <db_path>/
//! ├─ LOCK          # advisory lock, one writer per directory
//! └─ journal.log   # framed commits
//! ```

use super::backend::JournalBackend;
use crate::error::{LocalError, LocalResult};
use fs2::FileExt;
use parking_lot::RwLock;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const JOURNAL_FILE: &str = "journal.log";

/// A database directory held under an exclusive lock.
///
/// The lock is released when the value is dropped.
#[derive(Debug)]
pub struct JournalDir {
    path: PathBuf,
    _lock_file: File,
}

impl JournalDir {
    /// Opens `path`, creating it when `create_if_missing` is set, and takes
    /// the directory lock.
    ///
    /// # Errors
    ///
    /// Returns `MissingDirectory` if the directory is absent and may not be
    /// created, or `Locked` if another process holds the lock.
    pub fn open(path: &Path, create_if_missing: bool) -> LocalResult<Self> {
        if !path.exists() {
            if !create_if_missing {
                return Err(LocalError::MissingDirectory {
                    path: path.to_path_buf(),
                });
            }
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(LocalError::corrupted(format!(
                "not a directory: {}",
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
            return Err(LocalError::Locked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// The directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the journal file.
    #[must_use]
    pub fn journal_path(&self) -> PathBuf {
        self.path.join(JOURNAL_FILE)
    }

    /// Opens the journal file inside this directory.
    pub fn open_journal(&self) -> LocalResult<FileJournal> {
        FileJournal::open(&self.journal_path())
    }
}

/// A journal stored in a single file.
///
/// `flush` pushes data to the OS; `sync` calls `sync_all`.
#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    file: RwLock<File>,
    size: RwLock<u64>,
}

impl FileJournal {
    /// Opens or creates the journal at `path`.
    pub fn open(path: &Path) -> LocalResult<Self> {
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

    /// Path of the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl JournalBackend for FileJournal {
    fn read_at(&self, offset: u64, len: usize) -> LocalResult<Vec<u8>> {
        let size = *self.size.read();
        let end = offset.saturating_add(len as u64);
        if offset > size || end > size {
            return Err(LocalError::ReadPastEnd { offset, len, size });
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

    fn append(&mut self, data: &[u8]) -> LocalResult<u64> {
        let mut file = self.file.write();
        let mut size = self.size.write();
        let offset = *size;
        if data.is_empty() {
            return Ok(offset);
        }

        file.seek(SeekFrom::End(0))?;
        file.write_all(data)?;
        *size += data.len() as u64;
        Ok(offset)
    }

    fn flush(&mut self) -> LocalResult<()> {
        self.file.write().flush()?;
        Ok(())
    }

    fn size(&self) -> LocalResult<u64> {
        Ok(*self.size.read())
    }

    fn sync(&mut self) -> LocalResult<()> {
        self.file.write().sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> LocalResult<()> {
        let file = self.file.write();
        let mut size = self.size.write();
        if new_size > *size {
            return Err(LocalError::ReadPastEnd {
                offset: new_size,
                len: 0,
                size: *size,
            });
        }

        file.set_len(new_size)?;
        file.sync_all()?;
        *size = new_size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn journal_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.log");

        {
            let mut journal = FileJournal::open(&path).unwrap();
            assert_eq!(journal.append(b"first").unwrap(), 0);
            assert_eq!(journal.append(b"second").unwrap(), 5);
            journal.sync().unwrap();
        }

        let journal = FileJournal::open(&path).unwrap();
        assert_eq!(journal.size().unwrap(), 11);
        assert_eq!(journal.read_at(5, 6).unwrap(), b"second");
    }

    #[test]
    fn truncate_shrinks_file() {
        let dir = tempdir().unwrap();
        let mut journal = FileJournal::open(&dir.path().join("journal.log")).unwrap();
        journal.append(b"keep-drop").unwrap();
        journal.truncate(4).unwrap();
        assert_eq!(journal.read_all().unwrap(), b"keep");
        assert!(matches!(
            journal.read_at(0, 5),
            Err(LocalError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn directory_lock_is_exclusive() {
        let dir = tempdir().unwrap();
        let first = JournalDir::open(dir.path(), true).unwrap();
        assert!(matches!(
            JournalDir::open(dir.path(), true),
            Err(LocalError::Locked)
        ));
        drop(first);
        assert!(JournalDir::open(dir.path(), true).is_ok());
    }

    #[test]
    fn missing_directory_is_not_created_on_request() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent");
        assert!(matches!(
            JournalDir::open(&path, false),
            Err(LocalError::MissingDirectory { .. })
        ));
        let opened = JournalDir::open(&path, true).unwrap();
        assert_eq!(opened.journal_path(), path.join("journal.log"));
    }
}
