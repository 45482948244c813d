//! In-memory log store.

use crate::error::{StorageError, StorageResult};
use crate::store::LogStore;

/// A log store that keeps its bytes in memory.
///
/// Suitable for tests and for sessions that do not need to survive a
/// restart. [`MemoryLog::with_data`] seeds the log, which lets tests
/// replay a log captured from another store, torn tail included.
///
/// # Example
///
/// ```rust
/// use docsync_storage::{LogStore, MemoryLog};
///
/// let mut log = MemoryLog::new();
/// log.append(b"abc").unwrap();
/// log.truncate(1).unwrap();
/// assert_eq!(log.load().unwrap(), b"a");
/// ```
#[derive(Debug, Default, Clone)]
pub struct MemoryLog {
    data: Vec<u8>,
}

impl MemoryLog {
    /// Creates a new empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log holding pre-existing bytes.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Returns a copy of the raw log bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.clone()
    }
}

impl LogStore for MemoryLog {
    fn load(&self) -> StorageResult<Vec<u8>> {
        Ok(self.data.clone())
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let offset = self.data.len() as u64;
        self.data.extend_from_slice(data);
        Ok(offset)
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(self.data.len() as u64)
    }

    fn truncate(&mut self, new_len: u64) -> StorageResult<()> {
        let size = self.data.len() as u64;
        if new_len > size {
            return Err(StorageError::TruncatePastEnd {
                requested: new_len,
                size,
            });
        }
        self.data.truncate(new_len as usize);
        Ok(())
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        self.data = data.to_vec();
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }
}
