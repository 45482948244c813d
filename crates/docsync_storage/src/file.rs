//! File-backed log store.

use crate::error::{StorageError, StorageResult};
use crate::store::LogStore;
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A log store backed by a single file.
///
/// The file is locked exclusively for the lifetime of the store so two
/// client sessions never interleave writes into the same cache log.
///
/// # Durability
///
/// - `append` hands bytes to the OS
/// - `sync` calls `File::sync_all()`
/// - `replace` writes a sibling file, syncs it, and renames it over the log
///
/// # Example
///
/// ```no_run
/// use docsync_storage::{FileLog, LogStore};
/// use std::path::Path;
///
/// let mut log = FileLog::open(Path::new("cache.log")).unwrap();
/// log.append(b"frame").unwrap();
/// log.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileLog {
    path: PathBuf,
    file: Mutex<File>,
    len: u64,
}

impl FileLog {
    /// Opens or creates the log at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another process holds the log,
    /// or an I/O error if the file cannot be opened.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = Self::open_locked(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            len,
        })
    }

    /// Returns the path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_locked(path: &Path) -> StorageResult<File> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.try_lock_exclusive()
            .map_err(|_| StorageError::Locked(path.to_path_buf()))?;
        Ok(file)
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".compact");
        PathBuf::from(name)
    }
}

impl LogStore for FileLog {
    fn load(&self) -> StorageResult<Vec<u8>> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(0))?;
        let mut buffer = Vec::with_capacity(self.len as usize);
        file.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let offset = self.len;
        if data.is_empty() {
            return Ok(offset);
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::End(0))?;
        file.write_all(data)?;
        self.len += data.len() as u64;

        Ok(offset)
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(self.len)
    }

    fn truncate(&mut self, new_len: u64) -> StorageResult<()> {
        if new_len > self.len {
            return Err(StorageError::TruncatePastEnd {
                requested: new_len,
                size: self.len,
            });
        }

        let file = self.file.lock();
        file.set_len(new_len)?;
        file.sync_all()?;
        self.len = new_len;
        Ok(())
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        let staging = self.staging_path();
        {
            let mut out = File::create(&staging)?;
            out.write_all(data)?;
            out.sync_all()?;
        }

        let replacement = Self::open_locked(&staging)?;
        fs::rename(&staging, &self.path)?;

        *self.file.lock() = replacement;
        self.len = data.len() as u64;
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_missing_file_and_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.log");

        let log = FileLog::open(&path).unwrap();
        assert_eq!(log.len().unwrap(), 0);
        assert!(path.exists());
        assert_eq!(log.path(), path);
    }

    #[test]
    fn contents_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.log");

        {
            let mut log = FileLog::open(&path).unwrap();
            log.append(b"persistent ").unwrap();
            log.append(b"frames").unwrap();
            log.sync().unwrap();
        }

        let log = FileLog::open(&path).unwrap();
        assert_eq!(log.len().unwrap(), 17);
        assert_eq!(log.load().unwrap(), b"persistent frames");
    }

    #[test]
    fn second_open_is_rejected_while_locked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.log");

        let _held = FileLog::open(&path).unwrap();
        let result = FileLog::open(&path);
        assert!(matches!(result, Err(StorageError::Locked(_))));
    }

    #[test]
    fn truncate_shrinks_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.log");

        let mut log = FileLog::open(&path).unwrap();
        log.append(b"keep-torn").unwrap();
        log.truncate(4).unwrap();

        assert_eq!(log.load().unwrap(), b"keep");
        assert!(log.truncate(100).is_err());
        drop(log);
        assert_eq!(fs::metadata(&path).unwrap().len(), 4);
    }

    #[test]
    fn replace_is_visible_after_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.log");

        {
            let mut log = FileLog::open(&path).unwrap();
            log.append(b"a long history of superseded frames").unwrap();
            log.replace(b"live").unwrap();
            assert_eq!(log.len().unwrap(), 4);
            assert_eq!(log.append(b"+").unwrap(), 4);
            log.sync().unwrap();
        }

        let log = FileLog::open(&path).unwrap();
        assert_eq!(log.load().unwrap(), b"live+");
        assert!(!dir.path().join("cache.log.compact").exists());
    }
}
