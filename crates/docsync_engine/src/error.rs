//! Error types for the sync engine.

use crate::cache::CacheError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The server holds a newer version than the one claimed.
    #[error("version conflict: server is at version {current_version}")]
    VersionConflict {
        /// Version currently stored on the server.
        current_version: u64,
    },

    /// The document no longer exists on the server.
    #[error("document not found: {0}")]
    NotFound(String),

    /// Access to the document was revoked.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The session is not authenticated.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The server rejected the request as malformed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server failed while handling the request.
    #[error("server error {status}: {message}")]
    Server {
        /// HTTP status.
        status: u16,
        /// Error message.
        message: String,
    },

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,

    /// A response could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The local cache failed.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// The operation does not apply to the current session state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The background driver has shut down.
    #[error("sync driver stopped")]
    DriverStopped,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::NotConnected | SyncError::Server { .. } => true,
            _ => false,
        }
    }

    /// Returns true if the error means the server could not be reached.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            SyncError::Transport { .. } | SyncError::NotConnected
        )
    }

    /// Returns true if the document is gone or out of reach for good.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, SyncError::NotFound(_) | SyncError::Forbidden(_))
    }

    /// Short code recorded on a pending operation after a failure.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::VersionConflict { .. } => "VERSION_CONFLICT",
            SyncError::NotFound(_) => "DOCUMENT_NOT_FOUND",
            SyncError::Forbidden(_) => "FORBIDDEN",
            SyncError::Unauthorized(_) => "UNAUTHORIZED",
            SyncError::Validation(_) => "INVALID_INPUT",
            SyncError::Transport { .. } => "NETWORK_ERROR",
            SyncError::Server { .. } => "SERVER_ERROR",
            SyncError::NotConnected => "NOT_CONNECTED",
            SyncError::Protocol(_) => "PROTOCOL_ERROR",
            SyncError::Cache(_) => "CACHE_ERROR",
            SyncError::InvalidState(_) => "INVALID_STATE",
            SyncError::DriverStopped => "DRIVER_STOPPED",
        }
    }
}
