//! # DocSync Engine
//!
//! Client-side sync engine for DocSync documents.
//!
//! This crate provides:
//! - Local document cache (in-memory or durable CBOR log)
//! - Pending operation queue (one save per document, bounded, with backoff)
//! - Sync state machine (dirty → syncing → synced, conflict, offline)
//! - Conflict detection and resolution
//! - HTTP transport abstraction
//! - An async driver that runs debounce and retry timers on tokio
//!
//! ## Architecture
//!
//! The engine implements **optimistic concurrency** against a versioned
//! record store:
//! 1. Every edit is written to the local cache first
//! 2. After a quiet period, the latest edit is queued as a save claiming
//!    the version it was based on
//! 3. The server accepts the save only if that version is still current
//! 4. A stale claim surfaces as a conflict the user resolves explicitly
//!
//! ## Key Invariants
//!
//! - Server is authoritative for versions
//! - At most one write is in flight per session
//! - At most one pending save per document, carrying the latest content
//! - Unsynced content survives in the local cache until accepted
//! - A conflict never overwrites either copy without an explicit resolution
//!
//! ## Example
//!
//! ```rust
//! use docsync_engine::{MemoryCache, MockTransport, SyncConfig, SyncCoordinator, SyncState};
//! use docsync_protocol::{DocumentContent, DocumentId};
//! use std::sync::Arc;
//!
//! let remote = Arc::new(MockTransport::new());
//! let id = DocumentId::new("doc");
//! remote.insert(&id, 3, DocumentContent::blank());
//!
//! let coordinator = SyncCoordinator::new(SyncConfig::default(), Arc::clone(&remote), MemoryCache::new());
//! coordinator.open_document(&id).unwrap();
//! coordinator.record_edit(DocumentContent::blank(), None).unwrap();
//!
//! let outcome = coordinator.flush_document(&id).unwrap();
//! assert!(outcome.is_accepted());
//! assert_eq!(coordinator.state(), SyncState::Synced);
//! assert_eq!(remote.record(&id).unwrap().version, 4);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod clock;
mod config;
mod coordinator;
mod driver;
mod error;
mod http;
mod queue;
mod state;
mod transport;

pub use cache::{
    scan_log, CacheError, CacheRecord, CacheResult, CacheStats, CompactStats, CompactionPolicy,
    DurableCache, LocalCache, LocalCacheEntry, LogScan, MemoryCache,
};
pub use clock::{Clock, ManualClock, SystemClock, TokioClock};
pub use config::{RetryConfig, SyncConfig};
pub use coordinator::SyncCoordinator;
pub use driver::{SyncDriver, SyncHandle};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpTransport, LoopbackClient, LoopbackServer};
pub use queue::{Dequeued, OperationKind, PendingOperation, PendingQueue};
pub use state::{
    ConflictContext, DocumentView, Resolution, SyncState, SyncStats, WriteOutcome,
};
pub use transport::{MockFailure, MockTransport, RemoteStore};
