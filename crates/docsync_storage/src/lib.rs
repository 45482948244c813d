//! # DocSync Storage
//!
//! Append-only log stores used to persist the client-side document cache.
//!
//! A log store is an **opaque byte log**: it does not know about cache
//! entries, frames, or CBOR. The cache layer in `docsync_engine` owns the
//! record format and uses a store only to append, reload, truncate a torn
//! tail, and atomically replace the log during compaction.
//!
//! ## Available Stores
//!
//! - [`MemoryLog`] - For tests and ephemeral sessions
//! - [`FileLog`] - Persistent, exclusively locked file
//!
//! ## Example
//!
//! ```rust
//! use docsync_storage::{LogStore, MemoryLog};
//!
//! let mut log = MemoryLog::new();
//! let offset = log.append(b"frame").unwrap();
//! assert_eq!(offset, 0);
//! assert_eq!(log.load().unwrap(), b"frame");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod store;

pub use error::{StorageError, StorageResult};
pub use file::FileLog;
pub use memory::MemoryLog;
pub use store::LogStore;
