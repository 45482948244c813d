//! Sync coordinator.
//!
//! The coordinator owns the sync state of every document the session has
//! touched. Edits land in the local cache immediately and are parked for
//! the debounce window; once the window passes the latest edit becomes a
//! pending save claiming the version it was based on. Writes are
//! serialized: at most one request is in flight at a time, and network
//! calls are made without holding the session lock.
//!
//! Failure handling per write:
//!
//! | Outcome | Pending operation | State |
//! |---|---|---|
//! | accepted | removed | `Synced` (or `Dirty` if newer edits wait) |
//! | version conflict | discarded | `Conflict` |
//! | transport / 5xx | rescheduled with backoff | `Offline` / `Dirty` |
//! | not found / forbidden | discarded | `Unavailable` |
//! | other rejection | discarded | `Dirty` |
//!
//! Retries continue while the document is open and stop when it is closed.
//! An edit replaces a backed-off save with a fresh one that is due as soon
//! as its debounce window passes, so while offline every debounced edit
//! triggers one new attempt and the state stays `Offline` until a write
//! gets through.

use crate::cache::{LocalCache, LocalCacheEntry};
use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::queue::{PendingOperation, PendingQueue};
use crate::state::{
    ConflictContext, DocumentView, Resolution, SyncState, SyncStats, WriteOutcome,
};
use crate::transport::RemoteStore;
use docsync_protocol::{
    CreateRequest, DocumentContent, DocumentId, DocumentMeta, DocumentRecord, ListQuery, TeamId,
    DEFAULT_TITLE,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-document session data.
#[derive(Debug, Clone)]
struct DocumentSession {
    title: String,
    version: u64,
    state: SyncState,
    open: bool,
}

impl DocumentSession {
    fn from_record(record: &DocumentRecord, state: SyncState, open: bool) -> Self {
        Self {
            title: record.title.clone(),
            version: record.version,
            state,
            open,
        }
    }
}

/// The latest edit, waiting out the debounce window.
#[derive(Debug, Clone)]
struct ParkedEdit {
    document_id: DocumentId,
    title: Option<String>,
    content: DocumentContent,
    due_at: u64,
}

struct Session {
    active: Option<DocumentId>,
    documents: HashMap<DocumentId, DocumentSession>,
    parked: Option<ParkedEdit>,
    queue: PendingQueue,
    conflicts: HashMap<DocumentId, ConflictContext>,
    listing: Vec<DocumentMeta>,
    stats: SyncStats,
}

impl Session {
    fn new(queue_capacity: usize) -> Self {
        Self {
            active: None,
            documents: HashMap::new(),
            parked: None,
            queue: PendingQueue::new(queue_capacity),
            conflicts: HashMap::new(),
            listing: Vec::new(),
            stats: SyncStats::default(),
        }
    }

    fn state_of(&self, id: &DocumentId) -> SyncState {
        self.documents
            .get(id)
            .map(|doc| doc.state)
            .unwrap_or_default()
    }

    fn set_state(&mut self, id: &DocumentId, state: SyncState) {
        if let Some(doc) = self.documents.get_mut(id) {
            doc.state = state;
        }
    }

    fn is_open(&self, id: &DocumentId) -> bool {
        self.documents.get(id).is_some_and(|doc| doc.open)
    }

    fn has_parked(&self, id: &DocumentId) -> bool {
        self.parked
            .as_ref()
            .is_some_and(|parked| &parked.document_id == id)
    }

    fn take_parked_for(&mut self, id: &DocumentId) -> Option<ParkedEdit> {
        if self.has_parked(id) {
            self.parked.take()
        } else {
            None
        }
    }

    fn take_due_parked(&mut self, now: u64) -> Option<ParkedEdit> {
        if self.parked.as_ref().is_some_and(|parked| parked.due_at <= now) {
            self.parked.take()
        } else {
            None
        }
    }

    fn enqueue(&mut self, op: PendingOperation) {
        for dropped in self.queue.enqueue(op) {
            warn!(
                document_id = %dropped.document_id,
                "pending queue full, dropping oldest operation"
            );
            self.stats.dropped += 1;
        }
    }

    /// Turns a parked edit into a pending save against the current version.
    fn admit(&mut self, parked: ParkedEdit, now: u64) {
        let Some(doc) = self.documents.get(&parked.document_id) else {
            return;
        };
        if !doc.state.accepts_uploads() {
            return;
        }
        let op = PendingOperation::save(
            parked.document_id,
            doc.version,
            parked.title,
            parked.content,
            now,
        );
        debug!(
            document_id = %op.document_id,
            version = op.claimed_version,
            "edit queued for upload"
        );
        self.enqueue(op);
    }

    fn discard_pending(&mut self, id: &DocumentId) {
        self.queue.remove(id);
        self.take_parked_for(id);
    }

    fn begin_write(&mut self, id: &DocumentId) {
        self.set_state(id, SyncState::Syncing);
        self.stats.writes_attempted += 1;
    }

    fn record_error(&mut self, err: &SyncError) {
        self.stats.last_error = Some(err.to_string());
    }

    fn known_title(&self, id: &DocumentId) -> Option<String> {
        self.documents
            .get(id)
            .map(|doc| doc.title.clone())
            .or_else(|| {
                self.listing
                    .iter()
                    .find(|meta| &meta.id == id)
                    .map(|meta| meta.title.clone())
            })
    }

    fn upsert_listing(&mut self, meta: DocumentMeta) {
        self.listing.retain(|row| row.id != meta.id);
        self.listing.push(meta);
        self.listing
            .sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
    }

    fn remove_listing(&mut self, id: &DocumentId) {
        self.listing.retain(|row| &row.id != id);
    }
}

/// Coordinates local edits with a remote versioned store.
///
/// All methods are blocking and safe to call from several threads; the
/// async [`crate::SyncDriver`] wraps a coordinator for event-loop use.
pub struct SyncCoordinator<R: RemoteStore, C: LocalCache> {
    config: SyncConfig,
    remote: R,
    cache: C,
    clock: Arc<dyn Clock>,
    session: Mutex<Session>,
    write_gate: Mutex<()>,
}

impl<R: RemoteStore, C: LocalCache> SyncCoordinator<R, C> {
    /// Creates a coordinator using the system clock.
    pub fn new(config: SyncConfig, remote: R, cache: C) -> Self {
        let session = Session::new(config.queue_capacity);
        Self {
            config,
            remote,
            cache,
            clock: Arc::new(SystemClock),
            session: Mutex::new(session),
            write_gate: Mutex::new(()),
        }
    }

    /// Replaces the clock used for debounce and retry deadlines.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the remote store.
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Returns the local cache.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Returns the clock.
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Sync state of the active document, or `Idle` if none is open.
    pub fn state(&self) -> SyncState {
        let session = self.session.lock();
        match &session.active {
            Some(id) => session.state_of(id),
            None => SyncState::Idle,
        }
    }

    /// Sync state of `id`.
    pub fn document_state(&self, id: &DocumentId) -> SyncState {
        self.session.lock().state_of(id)
    }

    /// The open document, if any.
    pub fn active_document(&self) -> Option<DocumentId> {
        self.session.lock().active.clone()
    }

    /// Unresolved conflict on `id`, if any.
    pub fn conflict(&self, id: &DocumentId) -> Option<ConflictContext> {
        self.session.lock().conflicts.get(id).cloned()
    }

    /// Session counters.
    pub fn stats(&self) -> SyncStats {
        self.session.lock().stats.clone()
    }

    /// Last known document listing.
    pub fn listing(&self) -> Vec<DocumentMeta> {
        self.session.lock().listing.clone()
    }

    /// Number of queued operations.
    pub fn pending_len(&self) -> usize {
        self.session.lock().queue.len()
    }

    /// Queued operation for `id`, if any.
    pub fn pending_operation(&self, id: &DocumentId) -> Option<PendingOperation> {
        self.session.lock().queue.get(id).cloned()
    }

    /// Earliest time [`Self::run_ready`] may have work (epoch ms).
    pub fn next_wake_at(&self) -> Option<u64> {
        let session = self.session.lock();
        let parked = session.parked.as_ref().map(|parked| parked.due_at);
        match (parked, session.queue.next_retry_at()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Opens `id` and makes it the active document.
    ///
    /// A different active document is closed first. The server copy is
    /// reconciled with the local cache:
    ///
    /// - no unsynced local edit: the server copy is adopted
    /// - unsynced edit based on the server's version: it is queued again
    /// - unsynced edit based on an older version: the document opens in
    ///   conflict
    ///
    /// If the server cannot be reached the cached copy is opened offline.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] or [`SyncError::Forbidden`] when the
    /// document is out of reach, and transport errors when the server is
    /// unreachable and nothing is cached.
    pub fn open_document(&self, id: &DocumentId) -> SyncResult<DocumentView> {
        let previous = self.session.lock().active.clone();
        if let Some(previous) = previous.filter(|previous| previous != id) {
            self.close_document(&previous);
        }

        let _gate = self.write_gate.lock();
        let local = self.cache_get(id);
        let fetched = self.remote.fetch(id);
        let now = self.clock.now_millis();
        let mut session = self.session.lock();

        let view = match fetched {
            Ok(record) => self.reconcile(&mut session, record, local, now),
            Err(err) if err.is_retryable() => match local {
                Some(entry) => self.open_offline(&mut session, entry, &err, now),
                None => {
                    session.record_error(&err);
                    return Err(err);
                }
            },
            Err(err) => {
                session.record_error(&err);
                if err.is_unavailable() {
                    self.mark_unavailable(&mut session, id);
                }
                warn!(document_id = %id, error = %err, "failed to open document");
                return Err(err);
            }
        };

        session.active = Some(id.clone());
        info!(
            document_id = %id,
            version = view.version,
            state = %view.state,
            "document opened"
        );
        Ok(view)
    }

    /// Records an edit of the active document.
    ///
    /// The content is cached immediately and uploaded once no further edit
    /// arrives for the debounce window. Passing a title renames the
    /// document with the same upload. Returns the resulting state.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidState`] if no document is open.
    pub fn record_edit(
        &self,
        content: DocumentContent,
        title: Option<String>,
    ) -> SyncResult<SyncState> {
        let now = self.clock.now_millis();
        let mut session = self.session.lock();
        let id = session
            .active
            .clone()
            .ok_or_else(|| SyncError::InvalidState("no document is open".into()))?;

        let (version, state) = {
            let doc = session
                .documents
                .get_mut(&id)
                .ok_or_else(|| SyncError::InvalidState(format!("document {id} is not open")))?;
            if let Some(title) = &title {
                doc.title = title.clone();
            }
            (doc.version, doc.state)
        };

        self.cache_put(LocalCacheEntry::dirty(
            id.clone(),
            version,
            content.clone(),
            now,
        ));

        if !state.accepts_uploads() {
            debug!(document_id = %id, %state, "edit kept locally");
            return Ok(state);
        }

        let mut title = title;
        if let Some(previous) = session.parked.take() {
            if previous.document_id != id {
                session.admit(previous, now);
            } else if title.is_none() {
                title = previous.title;
            }
        }

        let due_at = now.saturating_add(self.config.debounce.as_millis() as u64);
        session.parked = Some(ParkedEdit {
            document_id: id.clone(),
            title,
            content,
            due_at,
        });

        let next = match state {
            SyncState::Syncing | SyncState::Offline => state,
            _ => SyncState::Dirty,
        };
        session.set_state(&id, next);
        Ok(next)
    }

    /// Sends the first operation that is ready, if any.
    ///
    /// A parked edit whose debounce window has passed is queued first.
    pub fn run_ready(&self) -> Option<WriteOutcome> {
        let _gate = self.write_gate.lock();
        let op = {
            let mut session = self.session.lock();
            let now = self.clock.now_millis();
            if let Some(parked) = session.take_due_parked(now) {
                session.admit(parked, now);
            }
            let op = session.queue.dequeue_ready(now).operation?;
            session.begin_write(&op.document_id);
            op
        };
        Some(self.execute(op))
    }

    /// Uploads any pending edit of `id` now, ignoring debounce and backoff.
    pub fn flush_document(&self, id: &DocumentId) -> Option<WriteOutcome> {
        let _gate = self.write_gate.lock();
        self.flush_locked(id)
    }

    /// Flushes every document with pending edits once.
    pub fn flush_all(&self) -> Vec<WriteOutcome> {
        let _gate = self.write_gate.lock();
        let ids: Vec<DocumentId> = {
            let mut session = self.session.lock();
            let now = self.clock.now_millis();
            if let Some(parked) = session.parked.take() {
                session.admit(parked, now);
            }
            session.queue.iter().map(|op| op.document_id.clone()).collect()
        };
        ids.iter().filter_map(|id| self.flush_locked(id)).collect()
    }

    /// Closes `id`.
    ///
    /// Pending edits get one final upload attempt; whatever is still
    /// pending afterwards is dropped. The local cache keeps unsynced
    /// content, so reopening the document resumes it.
    pub fn close_document(&self, id: &DocumentId) -> Option<WriteOutcome> {
        let _gate = self.write_gate.lock();
        let outcome = self.flush_locked(id);

        let mut session = self.session.lock();
        if let Some(op) = session.queue.remove(id) {
            session.stats.dropped += 1;
            debug!(document_id = %id, attempt = op.attempt, "pending write dropped on close");
        }
        session.take_parked_for(id);
        if let Some(doc) = session.documents.get_mut(id) {
            doc.open = false;
        }
        if session.active.as_ref() == Some(id) {
            session.active = None;
        }
        info!(document_id = %id, "document closed");
        outcome
    }

    /// Settles a version conflict on `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidState`] if `id` has no conflict, or the
    /// error from fetching the server copy.
    pub fn resolve_conflict(
        &self,
        id: &DocumentId,
        resolution: Resolution,
    ) -> SyncResult<DocumentView> {
        let _gate = self.write_gate.lock();
        let context = self
            .session
            .lock()
            .conflicts
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::InvalidState(format!("document {id} has no conflict")))?;

        match resolution {
            Resolution::ReloadServer => {
                let record = self.remote.fetch(id)?;
                let mut session = self.session.lock();
                session.conflicts.remove(id);
                session.discard_pending(id);
                self.cache_put(LocalCacheEntry::clean(&record));
                let open = session.is_open(id);
                session.documents.insert(
                    id.clone(),
                    DocumentSession::from_record(&record, SyncState::Synced, open),
                );
                session.upsert_listing(record.meta());
                info!(document_id = %id, version = record.version, "conflict resolved with server copy");
                Ok(DocumentView::from_record(&record, SyncState::Synced))
            }
            Resolution::OverwriteServer => {
                let entry = self.cache_get(id).ok_or_else(|| {
                    SyncError::InvalidState(format!("no local copy of document {id}"))
                })?;
                let now = self.clock.now_millis();
                let title = {
                    let mut session = self.session.lock();
                    session.conflicts.remove(id);
                    let title = match session.documents.get_mut(id) {
                        Some(doc) => {
                            doc.version = context.server_version;
                            doc.state = SyncState::Dirty;
                            doc.title.clone()
                        }
                        None => context.title.clone(),
                    };
                    self.cache_put(LocalCacheEntry::dirty(
                        id.clone(),
                        context.server_version,
                        entry.content.clone(),
                        now,
                    ));
                    session.enqueue(PendingOperation::save(
                        id.clone(),
                        context.server_version,
                        None,
                        entry.content.clone(),
                        now,
                    ));
                    title
                };

                let outcome = self.flush_locked(id);
                info!(
                    document_id = %id,
                    server_version = context.server_version,
                    accepted = outcome.as_ref().is_some_and(WriteOutcome::is_accepted),
                    "conflict resolved with local copy"
                );

                let session = self.session.lock();
                let (version, state) = session
                    .documents
                    .get(id)
                    .map(|doc| (doc.version, doc.state))
                    .unwrap_or((context.server_version, SyncState::Dirty));
                Ok(DocumentView {
                    id: id.clone(),
                    title,
                    version,
                    content: entry.content,
                    state,
                })
            }
        }
    }

    /// Creates a document on the server.
    ///
    /// # Errors
    ///
    /// Returns the error from the server.
    pub fn create_document(
        &self,
        title: Option<String>,
        team_id: Option<TeamId>,
    ) -> SyncResult<DocumentRecord> {
        let record = self.remote.create(&CreateRequest {
            title,
            team_id,
            content: None,
        })?;

        let mut session = self.session.lock();
        self.cache_put(LocalCacheEntry::clean(&record));
        session.documents.insert(
            record.id.clone(),
            DocumentSession::from_record(&record, SyncState::Synced, false),
        );
        session.upsert_listing(record.meta());
        info!(document_id = %record.id, "document created");
        Ok(record)
    }

    /// Moves `id` to the trash, uploading pending edits first.
    ///
    /// A document that is already gone counts as deleted.
    ///
    /// # Errors
    ///
    /// Returns the error from the server.
    pub fn delete_document(&self, id: &DocumentId) -> SyncResult<()> {
        let _gate = self.write_gate.lock();
        if let Some(outcome) = self.flush_locked(id) {
            debug!(document_id = %id, ?outcome, "flushed before delete");
        }

        match self.remote.trash(id) {
            Ok(()) | Err(SyncError::NotFound(_)) => {}
            Err(err) => return Err(err),
        }

        let mut session = self.session.lock();
        session.discard_pending(id);
        session.conflicts.remove(id);
        session.documents.remove(id);
        session.remove_listing(id);
        if session.active.as_ref() == Some(id) {
            session.active = None;
        }
        self.cache_delete(id);
        info!(document_id = %id, "document deleted");
        Ok(())
    }

    /// Reloads the document listing.
    ///
    /// # Errors
    ///
    /// Returns the error from the server; the previous listing is kept.
    pub fn refresh_listing(&self, query: &ListQuery) -> SyncResult<Vec<DocumentMeta>> {
        let rows = self.remote.list(query)?;
        let mut session = self.session.lock();
        session.listing = rows;
        Ok(session.listing.clone())
    }

    fn flush_locked(&self, id: &DocumentId) -> Option<WriteOutcome> {
        let op = {
            let mut session = self.session.lock();
            let now = self.clock.now_millis();
            if let Some(parked) = session.take_parked_for(id) {
                session.admit(parked, now);
            }
            let op = session.queue.take(id)?;
            session.begin_write(id);
            op
        };
        Some(self.execute(op))
    }

    fn execute(&self, op: PendingOperation) -> WriteOutcome {
        debug!(
            document_id = %op.document_id,
            version = op.claimed_version,
            attempt = op.attempt,
            "sending save"
        );
        let result = self.remote.save(&op.document_id, &op.to_request());
        let now = self.clock.now_millis();
        let mut session = self.session.lock();

        match result {
            Ok(record) => self.on_accepted(&mut session, &op, record, now),
            Err(SyncError::VersionConflict { current_version }) => {
                self.on_conflict(&mut session, &op, current_version)
            }
            Err(err) if err.is_retryable() => self.on_retryable(&mut session, op, &err, now),
            Err(err) if err.is_unavailable() => {
                session.record_error(&err);
                session.stats.dropped += 1;
                self.mark_unavailable(&mut session, &op.document_id);
                warn!(document_id = %op.document_id, error = %err, "document unavailable");
                WriteOutcome::Dropped {
                    document_id: op.document_id,
                    reason: err.to_string(),
                }
            }
            Err(err) => {
                session.record_error(&err);
                session.stats.dropped += 1;
                session.set_state(&op.document_id, SyncState::Dirty);
                warn!(document_id = %op.document_id, error = %err, "save rejected");
                WriteOutcome::Dropped {
                    document_id: op.document_id,
                    reason: err.to_string(),
                }
            }
        }
    }

    fn on_accepted(
        &self,
        session: &mut Session,
        op: &PendingOperation,
        record: DocumentRecord,
        now: u64,
    ) -> WriteOutcome {
        let id = record.id.clone();
        session.stats.writes_accepted += 1;
        session.stats.last_error = None;

        session.queue.rebase(&id, op.claimed_version, record.version);
        let pending = session.queue.contains(&id) || session.has_parked(&id);
        if pending {
            let entry = match self.cache_get(&id) {
                Some(mut entry) => {
                    entry.version = record.version;
                    entry
                }
                None => LocalCacheEntry::dirty(id.clone(), record.version, op.content.clone(), now),
            };
            self.cache_put(entry);
        } else {
            self.cache_put(LocalCacheEntry::clean(&record));
        }

        let state = if pending {
            SyncState::Dirty
        } else {
            SyncState::Synced
        };
        if let Some(doc) = session.documents.get_mut(&id) {
            doc.version = record.version;
            doc.title = record.title.clone();
            doc.state = state;
        }
        session.upsert_listing(record.meta());
        info!(document_id = %id, version = record.version, "save accepted");
        WriteOutcome::Accepted(record)
    }

    fn on_conflict(
        &self,
        session: &mut Session,
        op: &PendingOperation,
        current_version: u64,
    ) -> WriteOutcome {
        let id = op.document_id.clone();
        session.discard_pending(&id);
        let title = session
            .known_title(&id)
            .or_else(|| op.title.clone())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        let context = ConflictContext {
            document_id: id.clone(),
            title,
            local_version: op.claimed_version,
            server_version: current_version,
        };

        session.set_state(&id, SyncState::Conflict);
        session.conflicts.insert(id.clone(), context.clone());
        session.stats.conflicts += 1;
        session.record_error(&SyncError::VersionConflict { current_version });
        warn!(
            document_id = %id,
            local_version = op.claimed_version,
            server_version = current_version,
            "version conflict"
        );
        WriteOutcome::Conflict(context)
    }

    fn on_retryable(
        &self,
        session: &mut Session,
        mut op: PendingOperation,
        err: &SyncError,
        now: u64,
    ) -> WriteOutcome {
        let id = op.document_id.clone();
        op.mark_for_retry(now, &self.config.retry, err.code());
        session.stats.retries += 1;
        session.record_error(err);

        if !session.is_open(&id) {
            session.stats.dropped += 1;
            session.set_state(&id, SyncState::Dirty);
            debug!(document_id = %id, error = %err, "write to closed document dropped");
            return WriteOutcome::Dropped {
                document_id: id,
                reason: "document closed".into(),
            };
        }

        let state = if err.is_connectivity() {
            SyncState::Offline
        } else {
            SyncState::Dirty
        };
        session.set_state(&id, state);

        let (attempt, next_retry_at) = (op.attempt, op.next_retry_at);
        let (requeued, dropped) = session.queue.requeue(op);
        for dropped in dropped {
            warn!(document_id = %dropped.document_id, "pending queue full, dropping oldest operation");
            session.stats.dropped += 1;
        }
        let (attempt, next_retry_at) = if requeued {
            (attempt, next_retry_at)
        } else {
            session
                .queue
                .get(&id)
                .map(|newer| (newer.attempt, newer.next_retry_at))
                .unwrap_or((attempt, next_retry_at))
        };

        warn!(
            document_id = %id,
            attempt,
            next_retry_at,
            error = %err,
            "save failed, will retry"
        );
        WriteOutcome::Retrying {
            document_id: id,
            attempt,
            next_retry_at,
        }
    }

    fn reconcile(
        &self,
        session: &mut Session,
        record: DocumentRecord,
        local: Option<LocalCacheEntry>,
        now: u64,
    ) -> DocumentView {
        let id = record.id.clone();
        session.conflicts.remove(&id);
        session.upsert_listing(record.meta());

        match local {
            Some(entry) if entry.dirty && entry.version == record.version => {
                session.documents.insert(
                    id.clone(),
                    DocumentSession::from_record(&record, SyncState::Dirty, true),
                );
                session.enqueue(PendingOperation::save(
                    id.clone(),
                    record.version,
                    None,
                    entry.content.clone(),
                    now,
                ));
                debug!(document_id = %id, "resuming unsynced edit");
                DocumentView {
                    id,
                    title: record.title,
                    version: record.version,
                    content: entry.content,
                    state: SyncState::Dirty,
                }
            }
            Some(entry) if entry.dirty => {
                session.discard_pending(&id);
                session.documents.insert(
                    id.clone(),
                    DocumentSession {
                        title: record.title.clone(),
                        version: entry.version,
                        state: SyncState::Conflict,
                        open: true,
                    },
                );
                session.conflicts.insert(
                    id.clone(),
                    ConflictContext {
                        document_id: id.clone(),
                        title: record.title.clone(),
                        local_version: entry.version,
                        server_version: record.version,
                    },
                );
                session.stats.conflicts += 1;
                warn!(
                    document_id = %id,
                    local_version = entry.version,
                    server_version = record.version,
                    "unsynced edit is behind the server"
                );
                DocumentView {
                    id,
                    title: record.title,
                    version: entry.version,
                    content: entry.content,
                    state: SyncState::Conflict,
                }
            }
            _ => {
                self.cache_put(LocalCacheEntry::clean(&record));
                session.documents.insert(
                    id,
                    DocumentSession::from_record(&record, SyncState::Synced, true),
                );
                DocumentView::from_record(&record, SyncState::Synced)
            }
        }
    }

    fn open_offline(
        &self,
        session: &mut Session,
        entry: LocalCacheEntry,
        err: &SyncError,
        now: u64,
    ) -> DocumentView {
        let id = entry.document_id.clone();
        let title = session
            .known_title(&id)
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        session.record_error(err);
        session.documents.insert(
            id.clone(),
            DocumentSession {
                title: title.clone(),
                version: entry.version,
                state: SyncState::Offline,
                open: true,
            },
        );
        if entry.dirty {
            session.enqueue(PendingOperation::save(
                id.clone(),
                entry.version,
                None,
                entry.content.clone(),
                now,
            ));
        }
        warn!(document_id = %id, error = %err, "opened cached copy offline");
        DocumentView {
            id,
            title,
            version: entry.version,
            content: entry.content,
            state: SyncState::Offline,
        }
    }

    fn mark_unavailable(&self, session: &mut Session, id: &DocumentId) {
        session.discard_pending(id);
        session.remove_listing(id);
        let title = session
            .known_title(id)
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());
        let doc = session
            .documents
            .entry(id.clone())
            .or_insert_with(|| DocumentSession {
                title,
                version: 0,
                state: SyncState::Unavailable,
                open: false,
            });
        doc.state = SyncState::Unavailable;
    }

    fn cache_get(&self, id: &DocumentId) -> Option<LocalCacheEntry> {
        match self.cache.get(id) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(document_id = %id, error = %e, "local cache read failed");
                None
            }
        }
    }

    fn cache_put(&self, entry: LocalCacheEntry) {
        let id = entry.document_id.clone();
        if let Err(e) = self.cache.put(entry) {
            warn!(document_id = %id, error = %e, "local cache write failed");
        }
    }

    fn cache_delete(&self, id: &DocumentId) {
        if let Err(e) = self.cache.delete(id) {
            warn!(document_id = %id, error = %e, "local cache delete failed");
        }
    }
}
