//! Log store trait definition.

use crate::error::StorageResult;

/// An append-only byte log.
///
/// # Invariants
///
/// - `append` returns the offset where data was written
/// - `load` returns every byte appended since the last `replace`,
///   minus anything removed by `truncate`
/// - `replace` is atomic: after a crash the log holds either the old
///   or the new contents, never a mix
/// - `sync` makes all appended data durable
pub trait LogStore: Send + Sync {
    /// Returns the full contents of the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read.
    fn load(&self) -> StorageResult<Vec<u8>>;

    /// Appends data to the end of the log and returns its offset.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Returns the current length of the log in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the length cannot be determined.
    fn len(&self) -> StorageResult<u64>;

    /// Returns true if the log holds no bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the length cannot be determined.
    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Cuts the log back to `new_len` bytes.
    ///
    /// Used to drop a torn trailing record after a crash.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::TruncatePastEnd`] if `new_len` is
    /// greater than the current length.
    fn truncate(&mut self, new_len: u64) -> StorageResult<()>;

    /// Atomically replaces the whole log with `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if the new contents cannot be written.
    fn replace(&mut self, data: &[u8]) -> StorageResult<()>;

    /// Flushes appended data to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;
}
