//! Framework-agnostic request and response values.
//!
//! The server crate routes [`ApiRequest`]s without depending on any HTTP
//! framework; the client transport builds them and hands them to whatever
//! HTTP client is plugged in.

use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::DocumentId;
use crate::messages::ErrorBody;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Collection path of the document endpoints.
pub const DOCUMENTS_PATH: &str = "/documents";

/// Path of a single document.
pub fn document_path(id: &DocumentId) -> String {
    format!("{}/{}", DOCUMENTS_PATH, id)
}

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl Method {
    /// Returns the method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

/// An incoming (server) or outgoing (client) request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    /// Method.
    pub method: Method,
    /// Path without query string.
    pub path: String,
    /// Decoded query parameters.
    pub query: Vec<(String, String)>,
    /// Session credentials (bearer token or cookie value).
    pub credentials: Option<String>,
    /// JSON body.
    pub body: Option<Vec<u8>>,
}

impl ApiRequest {
    /// Creates a request without query, credentials, or body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            credentials: None,
            body: None,
        }
    }

    /// Sets the query parameters.
    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    /// Attaches session credentials.
    pub fn with_credentials(mut self, credentials: impl Into<String>) -> Self {
        self.credentials = Some(credentials.into());
        self
    }

    /// Serializes `body` as the JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if `body` cannot be serialized.
    pub fn with_json<T: Serialize>(mut self, body: &T) -> ProtocolResult<Self> {
        self.body = Some(serde_json::to_vec(body)?);
        Ok(self)
    }

    /// Parses the JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MissingBody`] when there is no body, or a
    /// JSON error when it does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> ProtocolResult<T> {
        let body = self.body.as_deref().ok_or(ProtocolError::MissingBody)?;
        Ok(serde_json::from_slice(body)?)
    }

    /// Returns the non-empty path segments.
    pub fn segments(&self) -> Vec<&str> {
        self.path.split('/').filter(|s| !s.is_empty()).collect()
    }
}

/// A response: status code plus JSON body (empty for 204).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status.
    pub status: u16,
    /// Body bytes.
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Creates a JSON response.
    ///
    /// # Errors
    ///
    /// Returns an error if `body` cannot be serialized.
    pub fn json<T: Serialize>(status: u16, body: &T) -> ProtocolResult<Self> {
        Ok(Self {
            status,
            body: serde_json::to_vec(body)?,
        })
    }

    /// Creates an empty 204 response.
    pub fn no_content() -> Self {
        Self {
            status: 204,
            body: Vec::new(),
        }
    }

    /// Creates an error response whose status follows the error code.
    pub fn error(body: &ErrorBody) -> Self {
        Self {
            status: body.error.code.status(),
            body: serde_json::to_vec(body).unwrap_or_default(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parses the body as `T`.
    ///
    /// # Errors
    ///
    /// Returns a JSON error when the body does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> ProtocolResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Parses the body as an [`ErrorBody`], if it is one.
    pub fn error_body(&self) -> Option<ErrorBody> {
        serde_json::from_slice(&self.body).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ErrorCode, FavoriteRequest};

    #[test]
    fn request_segments_and_body() {
        let request = ApiRequest::new(Method::Patch, "/documents/abc/favorite")
            .with_json(&FavoriteRequest { is_favorite: true })
            .unwrap();
        assert_eq!(request.segments(), vec!["documents", "abc", "favorite"]);

        let body: FavoriteRequest = request.json().unwrap();
        assert!(body.is_favorite);
    }

    #[test]
    fn missing_body_is_reported() {
        let request = ApiRequest::new(Method::Put, document_path(&DocumentId::new("x")));
        assert_eq!(request.path, "/documents/x");
        let result: ProtocolResult<FavoriteRequest> = request.json();
        assert!(matches!(result, Err(ProtocolError::MissingBody)));
    }

    #[test]
    fn error_response_status_follows_code() {
        let response = ApiResponse::error(&ErrorBody::version_conflict(7));
        assert_eq!(response.status, 409);
        assert!(!response.is_success());
        assert_eq!(response.error_body().unwrap().current_version, Some(7));
    }

    #[test]
    fn no_content_is_success() {
        let response = ApiResponse::no_content();
        assert!(response.is_success());
        assert!(response.body.is_empty());
        assert!(response.error_body().is_none());
        assert_eq!(Method::Delete.as_str(), "DELETE");
        assert_eq!(ErrorCode::Unauthorized.status(), 401);
    }
}
