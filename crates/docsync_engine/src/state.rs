//! Sync states and session bookkeeping types.

use docsync_protocol::{DocumentContent, DocumentId, DocumentRecord};
use std::fmt;

/// Sync state of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SyncState {
    /// Nothing open, or nothing to report.
    #[default]
    Idle,
    /// Local changes not yet accepted by the server.
    Dirty,
    /// A write is in flight.
    Syncing,
    /// Local content matches the server.
    Synced,
    /// The server moved ahead of a local edit; waiting for a resolution.
    Conflict,
    /// The server could not be reached; writes will be retried.
    Offline,
    /// The document was deleted or access was revoked.
    Unavailable,
}

impl SyncState {
    /// Returns true if a write is in flight.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Syncing)
    }

    /// Returns true if there may be local changes the server lacks.
    pub fn has_unsynced_changes(&self) -> bool {
        matches!(
            self,
            SyncState::Dirty | SyncState::Syncing | SyncState::Offline | SyncState::Conflict
        )
    }

    /// Returns true if new edits are scheduled for upload in this state.
    pub fn accepts_uploads(&self) -> bool {
        !matches!(self, SyncState::Conflict | SyncState::Unavailable)
    }

    /// Lowercase name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Dirty => "dirty",
            SyncState::Syncing => "syncing",
            SyncState::Synced => "synced",
            SyncState::Conflict => "conflict",
            SyncState::Offline => "offline",
            SyncState::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Details of an unresolved version conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictContext {
    /// Conflicted document.
    pub document_id: DocumentId,
    /// Title at the time of the conflict.
    pub title: String,
    /// Version the local edit was based on.
    pub local_version: u64,
    /// Version the server reported.
    pub server_version: u64,
}

/// How to settle a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Discard local edits and adopt the server's copy.
    ReloadServer,
    /// Write the local copy over the server's version.
    OverwriteServer,
}

/// Counters for a sync session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Writes sent to the server.
    pub writes_attempted: u64,
    /// Writes the server accepted.
    pub writes_accepted: u64,
    /// Version conflicts detected.
    pub conflicts: u64,
    /// Failed writes scheduled for another attempt.
    pub retries: u64,
    /// Operations discarded without being accepted.
    pub dropped: u64,
    /// Last error message, cleared by the next accepted write.
    pub last_error: Option<String>,
}

/// An open document as presented to the editor.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentView {
    /// Document id.
    pub id: DocumentId,
    /// Title.
    pub title: String,
    /// Version the content is based on.
    pub version: u64,
    /// Content to display.
    pub content: DocumentContent,
    /// Sync state.
    pub state: SyncState,
}

impl DocumentView {
    /// View of a server record in the given state.
    pub fn from_record(record: &DocumentRecord, state: SyncState) -> Self {
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            version: record.version,
            content: record.content.clone(),
            state,
        }
    }
}

/// Outcome of one write attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// The server stored the write.
    Accepted(DocumentRecord),
    /// The server was ahead; the document is now in conflict.
    Conflict(ConflictContext),
    /// The write failed and is scheduled again.
    Retrying {
        /// Document being written.
        document_id: DocumentId,
        /// Failed attempts of the queued operation.
        attempt: u32,
        /// When the queued operation runs next.
        next_retry_at: u64,
    },
    /// The write was discarded.
    Dropped {
        /// Document being written.
        document_id: DocumentId,
        /// Why it was discarded.
        reason: String,
    },
}

impl WriteOutcome {
    /// Returns true if the server accepted the write.
    pub fn is_accepted(&self) -> bool {
        matches!(self, WriteOutcome::Accepted(_))
    }
}
