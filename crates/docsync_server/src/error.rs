//! Error types for the document server.

use docsync_protocol::{DocumentId, ErrorBody, ErrorCode, ProtocolError};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while serving a request.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The claimed version does not match the stored one.
    #[error("version conflict: server is at version {current_version}")]
    VersionConflict {
        /// Version currently stored.
        current_version: u64,
    },

    /// The document does not exist or is in the trash.
    #[error("document not found: {0}")]
    NotFound(DocumentId),

    /// The caller may not access the document or scope.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Credentials were missing or invalid.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The request failed validation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No endpoint matches.
    #[error("no route for {method} {path}")]
    UnknownRoute {
        /// Request method.
        method: String,
        /// Request path.
        path: String,
    },

    /// A body could not be encoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns the wire error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ServerError::VersionConflict { .. } => ErrorCode::VersionConflict,
            ServerError::NotFound(_) => ErrorCode::DocumentNotFound,
            ServerError::Forbidden(_) => ErrorCode::Forbidden,
            ServerError::Unauthorized(_) => ErrorCode::Unauthorized,
            ServerError::InvalidRequest(_) => ErrorCode::InvalidInput,
            ServerError::UnknownRoute { .. } => ErrorCode::RouteNotFound,
            ServerError::Protocol(_) | ServerError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Returns the HTTP status code.
    pub fn status_code(&self) -> u16 {
        self.error_code().status()
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Builds the response body for this error.
    pub fn to_body(&self) -> ErrorBody {
        match self {
            ServerError::VersionConflict { current_version } => {
                ErrorBody::version_conflict(*current_version)
            }
            ServerError::Protocol(_) | ServerError::Internal(_) => {
                ErrorBody::new(ErrorCode::InternalError, "Internal server error")
            }
            other => ErrorBody::new(other.error_code(), other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::Internal("oops".into()).is_server_error());
        assert!(!ServerError::Forbidden("no".into()).is_server_error());
    }

    #[test]
    fn status_mapping() {
        let conflict = ServerError::VersionConflict { current_version: 4 };
        assert_eq!(conflict.status_code(), 409);
        assert_eq!(ServerError::NotFound(DocumentId::new("x")).status_code(), 404);
        assert_eq!(ServerError::Forbidden("team".into()).status_code(), 403);
        assert_eq!(ServerError::Unauthorized("token".into()).status_code(), 401);
        assert_eq!(ServerError::InvalidRequest("title".into()).status_code(), 400);
    }

    #[test]
    fn conflict_body_carries_current_version() {
        let body = ServerError::VersionConflict { current_version: 4 }.to_body();
        assert_eq!(body.error.code, ErrorCode::VersionConflict);
        assert_eq!(body.current_version, Some(4));
    }

    #[test]
    fn internal_details_are_not_leaked() {
        let body = ServerError::Internal("lock poisoned at 0xdead".into()).to_body();
        assert!(!body.error.message.contains("0xdead"));
    }
}
