//! Document records and content payloads.

use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::{DocumentId, TeamId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// Title given to documents created without one.
pub const DEFAULT_TITLE: &str = "Untitled";

/// Returns the current wall-clock time in milliseconds since the Unix epoch.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Opaque document payload.
///
/// The sync layer never looks inside the content; it only requires a JSON
/// object so the payload round-trips unchanged through both caches and the
/// server.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentContent(Map<String, Value>);

impl DocumentContent {
    /// Wraps a JSON object.
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Builds content from an arbitrary JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ContentNotObject`] unless `value` is an object.
    pub fn from_value(value: Value) -> ProtocolResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(ProtocolError::ContentNotObject),
        }
    }

    /// Content of a freshly created drawing.
    pub fn blank() -> Self {
        let mut map = Map::new();
        map.insert("elements".into(), Value::Array(Vec::new()));
        map.insert("appState".into(), Value::Object(Map::new()));
        map.insert("files".into(), Value::Object(Map::new()));
        Self(map)
    }

    /// Returns the underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consumes the content and returns it as a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Size of the content once serialized.
    pub fn encoded_len(&self) -> usize {
        serde_json::to_vec(&self.0).map(|v| v.len()).unwrap_or(0)
    }
}

/// The authoritative server copy of a document.
///
/// `version` starts at 1 and grows by exactly one per accepted content write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    /// Document identifier.
    pub id: DocumentId,
    /// Owning user.
    pub owner_user_id: UserId,
    /// Team scope, if the document is shared with a team.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<TeamId>,
    /// Display title.
    pub title: String,
    /// Monotonic version stamp.
    pub version: u64,
    /// Document payload.
    pub content: DocumentContent,
    /// Creation time, epoch millis.
    pub created_at: u64,
    /// Time of the last accepted change, epoch millis.
    pub updated_at: u64,
    /// Whether the document sits in the trash.
    #[serde(default)]
    pub is_trashed: bool,
    /// When the document was trashed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trashed_at: Option<u64>,
    /// Whether the owner marked it as a favorite.
    #[serde(default)]
    pub is_favorite: bool,
}

impl DocumentRecord {
    /// Returns the listing projection of this record.
    pub fn meta(&self) -> DocumentMeta {
        DocumentMeta {
            id: self.id.clone(),
            owner_user_id: self.owner_user_id.clone(),
            team_id: self.team_id.clone(),
            title: self.title.clone(),
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
            is_trashed: self.is_trashed,
            trashed_at: self.trashed_at,
            is_favorite: self.is_favorite,
        }
    }
}

/// A document without its content, as returned by listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMeta {
    /// Document identifier.
    pub id: DocumentId,
    /// Owning user.
    pub owner_user_id: UserId,
    /// Team scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<TeamId>,
    /// Display title.
    pub title: String,
    /// Version stamp.
    pub version: u64,
    /// Creation time, epoch millis.
    pub created_at: u64,
    /// Last change, epoch millis.
    pub updated_at: u64,
    /// Whether the document sits in the trash.
    #[serde(default)]
    pub is_trashed: bool,
    /// When the document was trashed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trashed_at: Option<u64>,
    /// Favorite flag.
    #[serde(default)]
    pub is_favorite: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> DocumentRecord {
        DocumentRecord {
            id: DocumentId::new("d1"),
            owner_user_id: UserId::new("u1"),
            team_id: None,
            title: "Plan".into(),
            version: 3,
            content: DocumentContent::blank(),
            created_at: 10,
            updated_at: 20,
            is_trashed: false,
            trashed_at: None,
            is_favorite: true,
        }
    }

    #[test]
    fn content_rejects_non_objects() {
        assert!(DocumentContent::from_value(json!({"elements": [1]})).is_ok());
        assert!(matches!(
            DocumentContent::from_value(json!([1, 2])),
            Err(ProtocolError::ContentNotObject)
        ));
    }

    #[test]
    fn blank_content_shape() {
        let value = DocumentContent::blank().into_value();
        assert_eq!(value, json!({"elements": [], "appState": {}, "files": {}}));
    }

    #[test]
    fn record_uses_camel_case() {
        let value = serde_json::to_value(record()).unwrap();
        assert_eq!(value["ownerUserId"], "u1");
        assert_eq!(value["updatedAt"], 20);
        assert_eq!(value["isFavorite"], true);
        assert!(value.get("teamId").is_none());
        assert!(value.get("trashedAt").is_none());
    }

    #[test]
    fn meta_drops_content() {
        let meta = record().meta();
        let value = serde_json::to_value(&meta).unwrap();
        assert!(value.get("content").is_none());
        assert_eq!(meta.version, 3);
    }
}
