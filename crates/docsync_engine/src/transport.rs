//! Remote document store abstraction.

use crate::error::{SyncError, SyncResult};
use docsync_protocol::{
    epoch_millis, CreateRequest, DocumentContent, DocumentId, DocumentMeta, DocumentRecord,
    ListQuery, SaveRequest, UserId, DEFAULT_TITLE,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The server side of document sync.
///
/// Implementations are blocking; the async driver runs them on the
/// blocking pool.
pub trait RemoteStore: Send + Sync {
    /// Creates a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    fn create(&self, request: &CreateRequest) -> SyncResult<DocumentRecord>;

    /// Loads a live document.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] or [`SyncError::Forbidden`] when the
    /// document is out of reach, or a transport error.
    fn fetch(&self, id: &DocumentId) -> SyncResult<DocumentRecord>;

    /// Writes content claiming `request.version`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::VersionConflict`] if the server has moved past
    /// the claimed version.
    fn save(&self, id: &DocumentId, request: &SaveRequest) -> SyncResult<DocumentRecord>;

    /// Moves a document to the trash.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    fn trash(&self, id: &DocumentId) -> SyncResult<()>;

    /// Lists document metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    fn list(&self, query: &ListQuery) -> SyncResult<Vec<DocumentMeta>>;

    /// Returns true if the last exchange with the server succeeded.
    fn is_connected(&self) -> bool;
}

impl<R: RemoteStore + ?Sized> RemoteStore for Arc<R> {
    fn create(&self, request: &CreateRequest) -> SyncResult<DocumentRecord> {
        (**self).create(request)
    }

    fn fetch(&self, id: &DocumentId) -> SyncResult<DocumentRecord> {
        (**self).fetch(id)
    }

    fn save(&self, id: &DocumentId, request: &SaveRequest) -> SyncResult<DocumentRecord> {
        (**self).save(id, request)
    }

    fn trash(&self, id: &DocumentId) -> SyncResult<()> {
        (**self).trash(id)
    }

    fn list(&self, query: &ListQuery) -> SyncResult<Vec<DocumentMeta>> {
        (**self).list(query)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

/// A failure [`MockTransport`] can be told to return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFailure {
    /// Connection dropped.
    Network,
    /// Server error with the given status.
    Server(u16),
    /// Document deleted.
    NotFound,
    /// Access revoked.
    Forbidden,
    /// Request rejected.
    Validation,
}

impl MockFailure {
    fn into_error(self) -> SyncError {
        match self {
            MockFailure::Network => SyncError::transport_retryable("connection reset"),
            MockFailure::Server(status) => SyncError::Server {
                status,
                message: "Internal server error".into(),
            },
            MockFailure::NotFound => SyncError::NotFound("Document not found".into()),
            MockFailure::Forbidden => SyncError::Forbidden("Access denied".into()),
            MockFailure::Validation => SyncError::Validation("Invalid input".into()),
        }
    }
}

/// In-memory remote store for tests.
///
/// Keeps documents in a map with compare-and-swap versioning and can be
/// scripted to fail upcoming calls or drop the connection.
pub struct MockTransport {
    owner: UserId,
    connected: AtomicBool,
    documents: Mutex<HashMap<DocumentId, DocumentRecord>>,
    save_failures: Mutex<VecDeque<MockFailure>>,
    fetch_failures: Mutex<VecDeque<MockFailure>>,
    saves: Mutex<Vec<(DocumentId, SaveRequest)>>,
}

impl MockTransport {
    /// Creates a connected transport with no documents.
    pub fn new() -> Self {
        Self {
            owner: UserId::new("mock-user"),
            connected: AtomicBool::new(true),
            documents: Mutex::new(HashMap::new()),
            save_failures: Mutex::new(VecDeque::new()),
            fetch_failures: Mutex::new(VecDeque::new()),
            saves: Mutex::new(Vec::new()),
        }
    }

    /// Stores a document at `version` with the given content.
    pub fn insert(&self, id: &DocumentId, version: u64, content: DocumentContent) -> DocumentRecord {
        let now = epoch_millis();
        let record = DocumentRecord {
            id: id.clone(),
            owner_user_id: self.owner.clone(),
            team_id: None,
            title: DEFAULT_TITLE.to_string(),
            version,
            content,
            created_at: now,
            updated_at: now,
            is_trashed: false,
            trashed_at: None,
            is_favorite: false,
        };
        self.documents.lock().insert(id.clone(), record.clone());
        record
    }

    /// Simulates a write from another session.
    pub fn bump(&self, id: &DocumentId, content: DocumentContent) -> Option<DocumentRecord> {
        let mut documents = self.documents.lock();
        let record = documents.get_mut(id)?;
        record.version += 1;
        record.content = content;
        record.updated_at = epoch_millis();
        Some(record.clone())
    }

    /// Removes a document, as if another session purged it.
    pub fn delete(&self, id: &DocumentId) {
        self.documents.lock().remove(id);
    }

    /// Returns the stored record for `id`.
    pub fn record(&self, id: &DocumentId) -> Option<DocumentRecord> {
        self.documents.lock().get(id).cloned()
    }

    /// Sets the connected state. While disconnected every call fails.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Makes the next save fail with `failure`.
    pub fn fail_next_save(&self, failure: MockFailure) {
        self.save_failures.lock().push_back(failure);
    }

    /// Makes the next fetch fail with `failure`.
    pub fn fail_next_fetch(&self, failure: MockFailure) {
        self.fetch_failures.lock().push_back(failure);
    }

    /// Returns every save request received, including failed ones.
    pub fn save_requests(&self) -> Vec<(DocumentId, SaveRequest)> {
        self.saves.lock().clone()
    }

    fn check_connected(&self) -> SyncResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::NotConnected)
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStore for MockTransport {
    fn create(&self, request: &CreateRequest) -> SyncResult<DocumentRecord> {
        self.check_connected()?;
        let id = DocumentId::generate();
        let mut record = self.insert(
            &id,
            1,
            request.content.clone().unwrap_or_else(DocumentContent::blank),
        );
        if let Some(title) = &request.title {
            record.title = title.clone();
        }
        record.team_id = request.team_id.clone();
        self.documents.lock().insert(id, record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &DocumentId) -> SyncResult<DocumentRecord> {
        self.check_connected()?;
        if let Some(failure) = self.fetch_failures.lock().pop_front() {
            return Err(failure.into_error());
        }
        self.documents
            .lock()
            .get(id)
            .filter(|record| !record.is_trashed)
            .cloned()
            .ok_or_else(|| SyncError::NotFound("Document not found".into()))
    }

    fn save(&self, id: &DocumentId, request: &SaveRequest) -> SyncResult<DocumentRecord> {
        self.check_connected()?;
        self.saves.lock().push((id.clone(), request.clone()));
        if let Some(failure) = self.save_failures.lock().pop_front() {
            return Err(failure.into_error());
        }

        let mut documents = self.documents.lock();
        let record = documents
            .get_mut(id)
            .filter(|record| !record.is_trashed)
            .ok_or_else(|| SyncError::NotFound("Document not found".into()))?;
        if record.version != request.version {
            return Err(SyncError::VersionConflict {
                current_version: record.version,
            });
        }
        record.version += 1;
        record.content = request.content.clone();
        if let Some(title) = &request.title {
            record.title = title.clone();
        }
        record.updated_at = epoch_millis();
        Ok(record.clone())
    }

    fn trash(&self, id: &DocumentId) -> SyncResult<()> {
        self.check_connected()?;
        let mut documents = self.documents.lock();
        let record = documents
            .get_mut(id)
            .ok_or_else(|| SyncError::NotFound("Document not found".into()))?;
        if !record.is_trashed {
            record.is_trashed = true;
            record.trashed_at = Some(epoch_millis());
        }
        Ok(())
    }

    fn list(&self, query: &ListQuery) -> SyncResult<Vec<DocumentMeta>> {
        self.check_connected()?;
        let mut rows: Vec<DocumentMeta> = self
            .documents
            .lock()
            .values()
            .filter(|record| query.include_trashed || !record.is_trashed)
            .filter(|record| !query.favorites_only || record.is_favorite)
            .filter(|record| record.team_id == query.team_id)
            .map(DocumentRecord::meta)
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(rows)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
