//! HTTP transport implementation.
//!
//! [`HttpTransport`] speaks the JSON document API over any [`HttpClient`].
//! The client only moves bytes; status codes and error bodies are mapped
//! to [`SyncError`] here.

use crate::error::{SyncError, SyncResult};
use crate::transport::RemoteStore;
use docsync_protocol::{
    document_path, ApiRequest, ApiResponse, CreateRequest, DocumentEnvelope, DocumentId,
    DocumentListEnvelope, DocumentMeta, DocumentRecord, ListQuery, Method, SaveRequest,
    DOCUMENTS_PATH,
};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// HTTP client abstraction.
///
/// Implementations send one request to `url` and return the raw response.
/// An `Err` means no response was received at all.
pub trait HttpClient: Send + Sync {
    /// Sends a request.
    fn send(&self, url: &str, request: &ApiRequest) -> Result<ApiResponse, String>;

    /// Returns false if the client knows the network is down.
    fn is_healthy(&self) -> bool;
}

/// Remote store backed by the JSON document API.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    client: C,
    credentials: Option<String>,
    connected: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport for the server at `base_url`.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            credentials: None,
            connected: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Sends `credentials` with every request.
    pub fn with_credentials(mut self, credentials: impl Into<String>) -> Self {
        self.credentials = Some(credentials.into());
        self
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the HTTP client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the last transport error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn exchange(&self, request: ApiRequest) -> SyncResult<ApiResponse> {
        if !self.client.is_healthy() {
            self.connected.store(false, Ordering::SeqCst);
            return Err(SyncError::NotConnected);
        }

        let request = match &self.credentials {
            Some(credentials) => request.with_credentials(credentials.clone()),
            None => request,
        };
        let url = format!("{}{}", self.base_url, request.path);
        debug!(method = request.method.as_str(), %url, "sending request");

        let response = self.client.send(&url, &request).map_err(|e| {
            *self.last_error.write() = Some(e.clone());
            self.connected.store(false, Ordering::SeqCst);
            SyncError::transport_retryable(e)
        })?;

        self.connected.store(true, Ordering::SeqCst);
        *self.last_error.write() = None;

        if response.is_success() {
            Ok(response)
        } else {
            Err(status_error(&response))
        }
    }

    fn exchange_json<T: DeserializeOwned>(&self, request: ApiRequest) -> SyncResult<T> {
        let response = self.exchange(request)?;
        response
            .decode()
            .map_err(|e| SyncError::Protocol(format!("failed to decode response: {e}")))
    }
}

fn encode_error(e: docsync_protocol::ProtocolError) -> SyncError {
    SyncError::Protocol(format!("failed to encode request: {e}"))
}

/// Maps a non-2xx response to an error.
fn status_error(response: &ApiResponse) -> SyncError {
    let body = response.error_body();
    let message = body
        .as_ref()
        .map(|b| b.error.message.clone())
        .unwrap_or_else(|| format!("HTTP {}", response.status));

    match response.status {
        409 => match body.and_then(|b| b.current_version) {
            Some(current_version) => SyncError::VersionConflict { current_version },
            None => SyncError::Protocol("conflict response without currentVersion".into()),
        },
        404 => SyncError::NotFound(message),
        403 => SyncError::Forbidden(message),
        401 => SyncError::Unauthorized(message),
        400 | 413 | 422 => SyncError::Validation(message),
        408 | 429 => SyncError::transport_retryable(message),
        status if status >= 500 => SyncError::Server { status, message },
        status => SyncError::Protocol(format!("unexpected status {status}: {message}")),
    }
}

impl<C: HttpClient> RemoteStore for HttpTransport<C> {
    fn create(&self, request: &CreateRequest) -> SyncResult<DocumentRecord> {
        let request = ApiRequest::new(Method::Post, DOCUMENTS_PATH)
            .with_json(request)
            .map_err(encode_error)?;
        let envelope: DocumentEnvelope = self.exchange_json(request)?;
        Ok(envelope.document)
    }

    fn fetch(&self, id: &DocumentId) -> SyncResult<DocumentRecord> {
        let envelope: DocumentEnvelope =
            self.exchange_json(ApiRequest::new(Method::Get, document_path(id)))?;
        Ok(envelope.document)
    }

    fn save(&self, id: &DocumentId, request: &SaveRequest) -> SyncResult<DocumentRecord> {
        let request = ApiRequest::new(Method::Put, document_path(id))
            .with_json(request)
            .map_err(encode_error)?;
        let envelope: DocumentEnvelope = self.exchange_json(request)?;
        Ok(envelope.document)
    }

    fn trash(&self, id: &DocumentId) -> SyncResult<()> {
        self.exchange(ApiRequest::new(Method::Delete, document_path(id)))?;
        Ok(())
    }

    fn list(&self, query: &ListQuery) -> SyncResult<Vec<DocumentMeta>> {
        let request = ApiRequest::new(Method::Get, DOCUMENTS_PATH).with_query(query.to_pairs());
        let envelope: DocumentListEnvelope = self.exchange_json(request)?;
        Ok(envelope.documents)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.client.is_healthy()
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer: Send + Sync {
    /// Handles one request.
    fn handle(&self, request: &ApiRequest) -> ApiResponse;
}

impl<S: LoopbackServer + ?Sized> LoopbackServer for Arc<S> {
    fn handle(&self, request: &ApiRequest) -> ApiResponse {
        (**self).handle(request)
    }
}

/// An HTTP client that hands requests straight to an in-process server.
///
/// Can be switched offline to simulate a dropped connection.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
    online: AtomicBool,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a client connected to `server`.
    pub fn new(server: S) -> Self {
        Self {
            server,
            online: AtomicBool::new(true),
        }
    }

    /// Switches the simulated network on or off.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Returns the server.
    pub fn server(&self) -> &S {
        &self.server
    }
}

impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    fn send(&self, _url: &str, request: &ApiRequest) -> Result<ApiResponse, String> {
        if !self.online.load(Ordering::SeqCst) {
            return Err("connection refused".into());
        }
        Ok(self.server.handle(request))
    }

    fn is_healthy(&self) -> bool {
        true
    }
}
