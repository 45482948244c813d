//! Error types for log stores.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while reading or writing a log store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Another process holds the log file.
    #[error("log file {0:?} is locked by another process")]
    Locked(PathBuf),

    /// Truncation target lies beyond the end of the log.
    #[error("cannot truncate log of {size} bytes to {requested} bytes")]
    TruncatePastEnd {
        /// The requested length.
        requested: u64,
        /// The current log length.
        size: u64,
    },
}
