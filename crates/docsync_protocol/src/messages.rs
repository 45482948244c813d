//! Request and response bodies for the document endpoints.

use crate::document::{DocumentContent, DocumentMeta, DocumentRecord};
use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::TeamId;
use serde::{Deserialize, Serialize};

/// Body of `PUT /documents/{id}`.
///
/// `version` is the claimed version: the version the writer believes is
/// current on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    /// Claimed version.
    pub version: u64,
    /// New title, if it changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Full replacement content.
    pub content: DocumentContent,
}

impl SaveRequest {
    /// Creates a save request claiming `version`.
    pub fn new(version: u64, content: DocumentContent) -> Self {
        Self {
            version,
            title: None,
            content,
        }
    }

    /// Sets the title carried with the save.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Body of `POST /documents`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    /// Initial title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Team to create the document in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<TeamId>,
    /// Initial content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<DocumentContent>,
}

/// Body of `PATCH /documents/{id}/favorite`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteRequest {
    /// New favorite flag.
    pub is_favorite: bool,
}

/// Which documents a listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Documents owned by the caller outside any team.
    #[default]
    Personal,
    /// Documents of one team.
    Team,
}

impl Scope {
    /// Returns the query-string spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Personal => "personal",
            Scope::Team => "team",
        }
    }
}

/// Query of `GET /documents`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListQuery {
    /// Listing scope.
    pub scope: Scope,
    /// Team, required when `scope` is [`Scope::Team`].
    pub team_id: Option<TeamId>,
    /// Include trashed documents.
    pub include_trashed: bool,
    /// Only favorites.
    pub favorites_only: bool,
}

impl ListQuery {
    /// Lists the caller's personal documents.
    pub fn personal() -> Self {
        Self::default()
    }

    /// Lists the documents of `team`.
    pub fn team(team: TeamId) -> Self {
        Self {
            scope: Scope::Team,
            team_id: Some(team),
            ..Self::default()
        }
    }

    /// Includes trashed documents.
    pub fn with_trashed(mut self) -> Self {
        self.include_trashed = true;
        self
    }

    /// Restricts the listing to favorites.
    pub fn favorites(mut self) -> Self {
        self.favorites_only = true;
        self
    }

    /// Renders the query as key/value pairs.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("scope".to_string(), self.scope.as_str().to_string())];
        if let Some(team) = &self.team_id {
            pairs.push(("teamId".into(), team.as_str().into()));
        }
        if self.include_trashed {
            pairs.push(("includeTrashed".into(), "true".into()));
        }
        if self.favorites_only {
            pairs.push(("favoritesOnly".into(), "true".into()));
        }
        pairs
    }

    /// Parses key/value pairs. Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidQuery`] for an unknown scope or a
    /// flag that is not `true`/`false`.
    pub fn from_pairs(pairs: &[(String, String)]) -> ProtocolResult<Self> {
        let mut query = Self::default();
        for (name, value) in pairs {
            match name.as_str() {
                "scope" => {
                    query.scope = match value.as_str() {
                        "personal" => Scope::Personal,
                        "team" => Scope::Team,
                        _ => return Err(invalid(name, value)),
                    }
                }
                "teamId" => query.team_id = Some(TeamId::new(value.clone())),
                "includeTrashed" => query.include_trashed = parse_flag(name, value)?,
                "favoritesOnly" => query.favorites_only = parse_flag(name, value)?,
                _ => {}
            }
        }
        Ok(query)
    }
}

fn parse_flag(name: &str, value: &str) -> ProtocolResult<bool> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(invalid(name, value)),
    }
}

fn invalid(name: &str, value: &str) -> ProtocolError {
    ProtocolError::InvalidQuery {
        name: name.to_string(),
        value: value.to_string(),
    }
}

/// `{ "document": ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentEnvelope {
    /// The document.
    pub document: DocumentRecord,
}

/// `{ "documents": [...] }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentListEnvelope {
    /// Listing rows.
    pub documents: Vec<DocumentMeta>,
}

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Missing or invalid credentials.
    Unauthorized,
    /// Request failed validation.
    InvalidInput,
    /// Caller may not touch the document.
    Forbidden,
    /// Document does not exist (or is trashed).
    DocumentNotFound,
    /// No endpoint matches the method and path.
    RouteNotFound,
    /// Claimed version did not match.
    VersionConflict,
    /// Anything else.
    InternalError,
}

impl ErrorCode {
    /// HTTP status carried with this code.
    pub fn status(&self) -> u16 {
        match self {
            ErrorCode::InvalidInput => 400,
            ErrorCode::Unauthorized => 401,
            ErrorCode::Forbidden => 403,
            ErrorCode::DocumentNotFound | ErrorCode::RouteNotFound => 404,
            ErrorCode::VersionConflict => 409,
            ErrorCode::InternalError => 500,
        }
    }
}

/// Inner object of an [`ErrorBody`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Body of every error response.
///
/// Version conflicts additionally carry `currentVersion`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Code and message.
    pub error: ErrorDetail,
    /// Server version at the time of a conflict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_version: Option<u64>,
}

impl ErrorBody {
    /// Creates an error body.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code,
                message: message.into(),
            },
            current_version: None,
        }
    }

    /// Creates the body of a 409 response.
    pub fn version_conflict(current_version: u64) -> Self {
        Self {
            current_version: Some(current_version),
            ..Self::new(ErrorCode::VersionConflict, "Version conflict")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn conflict_body_shape() {
        let body = serde_json::to_value(ErrorBody::version_conflict(4)).unwrap();
        assert_eq!(
            body,
            json!({
                "error": {"code": "VERSION_CONFLICT", "message": "Version conflict"},
                "currentVersion": 4
            })
        );
    }

    #[test]
    fn plain_error_omits_version() {
        let body = serde_json::to_value(ErrorBody::new(ErrorCode::DocumentNotFound, "gone")).unwrap();
        assert_eq!(body["error"]["code"], "DOCUMENT_NOT_FOUND");
        assert!(body.get("currentVersion").is_none());
    }

    #[test]
    fn error_code_status() {
        assert_eq!(ErrorCode::VersionConflict.status(), 409);
        assert_eq!(ErrorCode::Forbidden.status(), 403);
        assert_eq!(ErrorCode::InvalidInput.status(), 400);
    }

    #[test]
    fn save_request_title_is_optional() {
        let body: SaveRequest =
            serde_json::from_value(json!({"version": 3, "content": {"elements": []}})).unwrap();
        assert_eq!(body.version, 3);
        assert!(body.title.is_none());

        let encoded = serde_json::to_value(
            SaveRequest::new(3, DocumentContent::default()).with_title("Plan"),
        )
        .unwrap();
        assert_eq!(encoded["title"], "Plan");
    }

    #[test]
    fn list_query_pairs() {
        let query = ListQuery::team(TeamId::new("t1")).with_trashed();
        let pairs = query.to_pairs();
        assert!(pairs.contains(&("teamId".into(), "t1".into())));
        assert_eq!(ListQuery::from_pairs(&pairs).unwrap(), query);
    }

    #[test]
    fn list_query_rejects_bad_values() {
        let pairs = vec![("scope".to_string(), "everyone".to_string())];
        assert!(ListQuery::from_pairs(&pairs).is_err());

        let pairs = vec![("favoritesOnly".to_string(), "maybe".to_string())];
        assert!(ListQuery::from_pairs(&pairs).is_err());
    }
}
