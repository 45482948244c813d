//! Request routing and validation.

use crate::access::{AccessKind, AccessPolicy, IdentityResolver};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::store::RecordStore;
use docsync_protocol::{
    ApiRequest, ApiResponse, CreateRequest, DocumentEnvelope, DocumentId, DocumentListEnvelope,
    DocumentRecord, FavoriteRequest, ListQuery, Method, SaveRequest, Scope, UserId,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Routes document requests to a [`RecordStore`].
///
/// | method | path | success |
/// |---|---|---|
/// | GET | `/documents` | 200 |
/// | POST | `/documents` | 201 |
/// | GET | `/documents/{id}` | 200 |
/// | PUT | `/documents/{id}` | 200 |
/// | DELETE | `/documents/{id}` | 204 |
/// | POST | `/documents/{id}/restore` | 200 |
/// | DELETE | `/documents/{id}/permanent` | 204 |
/// | PATCH | `/documents/{id}/favorite` | 200 |
pub struct RequestHandler {
    config: ServerConfig,
    store: Arc<RecordStore>,
    identity: Arc<dyn IdentityResolver>,
    access: Arc<dyn AccessPolicy>,
}

impl RequestHandler {
    /// Creates a handler.
    pub fn new(
        config: ServerConfig,
        store: Arc<RecordStore>,
        identity: Arc<dyn IdentityResolver>,
        access: Arc<dyn AccessPolicy>,
    ) -> Self {
        Self {
            config,
            store,
            identity,
            access,
        }
    }

    /// Handles a request. Every failure becomes an error response.
    pub fn route(&self, request: &ApiRequest) -> ApiResponse {
        match self.dispatch(request) {
            Ok(response) => response,
            Err(err) => {
                if err.is_server_error() {
                    error!(method = request.method.as_str(), path = %request.path, error = %err, "request failed");
                } else {
                    debug!(method = request.method.as_str(), path = %request.path, error = %err, "request rejected");
                }
                ApiResponse::error(&err.to_body())
            }
        }
    }

    fn dispatch(&self, request: &ApiRequest) -> ServerResult<ApiResponse> {
        let user = self.identity.resolve(request.credentials.as_deref())?;
        let segments = request.segments();

        match (request.method, segments.as_slice()) {
            (Method::Get, ["documents"]) => self.list(&user, request),
            (Method::Post, ["documents"]) => self.create(&user, request),
            (Method::Get, ["documents", id]) => {
                let record = self.authorize(&user, id, AccessKind::Read)?;
                if record.is_trashed {
                    return Err(ServerError::NotFound(record.id));
                }
                envelope(200, record)
            }
            (Method::Put, ["documents", id]) => self.save(&user, id, request),
            (Method::Delete, ["documents", id]) => {
                let record = self.authorize(&user, id, AccessKind::Manage)?;
                self.store.trash(&record.id)?;
                Ok(ApiResponse::no_content())
            }
            (Method::Post, ["documents", id, "restore"]) => {
                let record = self.authorize(&user, id, AccessKind::Manage)?;
                envelope(200, self.store.restore(&record.id)?)
            }
            (Method::Delete, ["documents", id, "permanent"]) => {
                let record = self.authorize(&user, id, AccessKind::Manage)?;
                self.store.purge(&record.id)?;
                Ok(ApiResponse::no_content())
            }
            (Method::Patch, ["documents", id, "favorite"]) => {
                let record = self.authorize(&user, id, AccessKind::Manage)?;
                let body: FavoriteRequest = parse_body(request)?;
                envelope(200, self.store.set_favorite(&record.id, body.is_favorite)?)
            }
            _ => Err(ServerError::UnknownRoute {
                method: request.method.as_str().to_string(),
                path: request.path.clone(),
            }),
        }
    }

    /// Loads a document, trashed or not, and checks access.
    fn authorize(&self, user: &UserId, id: &str, kind: AccessKind) -> ServerResult<DocumentRecord> {
        let id = DocumentId::new(id);
        let record = self
            .store
            .get(&id)
            .ok_or_else(|| ServerError::NotFound(id.clone()))?;
        if !self.access.can_access(user, &record, kind) {
            return Err(ServerError::Forbidden(format!("no access to document {}", id)));
        }
        Ok(record)
    }

    fn list(&self, user: &UserId, request: &ApiRequest) -> ServerResult<ApiResponse> {
        let query = ListQuery::from_pairs(&request.query)
            .map_err(|e| ServerError::InvalidRequest(e.to_string()))?;
        if query.scope == Scope::Team {
            let team = query
                .team_id
                .as_ref()
                .ok_or_else(|| ServerError::InvalidRequest("teamId is required for team scope".into()))?;
            if !self.access.can_use_team(user, team) {
                return Err(ServerError::Forbidden(format!("not a member of team {}", team)));
            }
        }

        let documents = self.store.list(user, &query);
        Ok(ApiResponse::json(200, &DocumentListEnvelope { documents })?)
    }

    fn create(&self, user: &UserId, request: &ApiRequest) -> ServerResult<ApiResponse> {
        let mut body: CreateRequest = match request.body {
            Some(_) => parse_body(request)?,
            None => CreateRequest::default(),
        };
        body.title = body
            .title
            .as_deref()
            .map(|t| self.validate_title(t))
            .transpose()?;
        if let Some(content) = &body.content {
            self.validate_size(content.encoded_len())?;
        }
        if let Some(team) = &body.team_id {
            if !self.access.can_use_team(user, team) {
                return Err(ServerError::Forbidden(format!("not a member of team {}", team)));
            }
        }

        envelope(201, self.store.create(user, body))
    }

    fn save(&self, user: &UserId, id: &str, request: &ApiRequest) -> ServerResult<ApiResponse> {
        let body: SaveRequest = parse_body(request)?;
        if body.version < 1 {
            return Err(ServerError::InvalidRequest("version must be at least 1".into()));
        }
        let title = body
            .title
            .as_deref()
            .map(|t| self.validate_title(t))
            .transpose()?;
        self.validate_size(body.content.encoded_len())?;

        let record = self.authorize(user, id, AccessKind::Write)?;
        match self.store.write(&record.id, body.version, body.content, title) {
            Ok(record) => envelope(200, record),
            Err(err @ ServerError::VersionConflict { .. }) => {
                warn!(document = %record.id, claimed = body.version, error = %err, "write conflict");
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    fn validate_title(&self, title: &str) -> ServerResult<String> {
        let trimmed = title.trim();
        let chars = trimmed.chars().count();
        if chars == 0 || chars > self.config.max_title_chars {
            return Err(ServerError::InvalidRequest(format!(
                "title must be 1 to {} characters",
                self.config.max_title_chars
            )));
        }
        Ok(trimmed.to_string())
    }

    fn validate_size(&self, len: usize) -> ServerResult<()> {
        if len > self.config.max_content_bytes {
            return Err(ServerError::InvalidRequest(format!(
                "content is {} bytes, limit is {}",
                len, self.config.max_content_bytes
            )));
        }
        Ok(())
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(request: &ApiRequest) -> ServerResult<T> {
    request
        .json()
        .map_err(|e| ServerError::InvalidRequest(e.to_string()))
}

fn envelope(status: u16, document: DocumentRecord) -> ServerResult<ApiResponse> {
    Ok(ApiResponse::json(status, &DocumentEnvelope { document })?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{PlainUserResolver, ScopeAccessPolicy};
    use docsync_protocol::{document_path, ErrorBody, ErrorCode, TeamId, DOCUMENTS_PATH};
    use serde_json::json;

    struct Fixture {
        handler: RequestHandler,
        store: Arc<RecordStore>,
        access: Arc<ScopeAccessPolicy>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(RecordStore::new());
        let access = Arc::new(ScopeAccessPolicy::new());
        let handler = RequestHandler::new(
            ServerConfig::default().with_max_content_bytes(256),
            Arc::clone(&store),
            Arc::new(PlainUserResolver),
            access.clone(),
        );
        Fixture {
            handler,
            store,
            access,
        }
    }

    fn as_user(request: ApiRequest, user: &str) -> ApiRequest {
        request.with_credentials(user)
    }

    fn create(f: &Fixture, user: &str) -> DocumentRecord {
        let request = as_user(ApiRequest::new(Method::Post, DOCUMENTS_PATH), user);
        let response = f.handler.route(&request);
        assert_eq!(response.status, 201);
        response.decode::<DocumentEnvelope>().unwrap().document
    }

    fn put(f: &Fixture, user: &str, id: &DocumentId, body: serde_json::Value) -> ApiResponse {
        let request = ApiRequest::new(Method::Put, document_path(id))
            .with_json(&body)
            .unwrap();
        f.handler.route(&as_user(request, user))
    }

    fn code(response: &ApiResponse) -> ErrorCode {
        response.decode::<ErrorBody>().unwrap().error.code
    }

    #[test]
    fn missing_credentials_is_401() {
        let f = fixture();
        let response = f.handler.route(&ApiRequest::new(Method::Get, DOCUMENTS_PATH));
        assert_eq!(response.status, 401);
        assert_eq!(code(&response), ErrorCode::Unauthorized);
    }

    #[test]
    fn save_increments_version() {
        let f = fixture();
        let doc = create(&f, "alice");

        let response = put(&f, "alice", &doc.id, json!({"version": 1, "title": "  Plan  ", "content": {"elements": [1]}}));
        assert_eq!(response.status, 200);
        let saved = response.decode::<DocumentEnvelope>().unwrap().document;
        assert_eq!(saved.version, 2);
        assert_eq!(saved.title, "Plan");
    }

    #[test]
    fn stale_save_is_409_with_current_version() {
        let f = fixture();
        let doc = create(&f, "alice");
        put(&f, "alice", &doc.id, json!({"version": 1, "content": {}}));

        let response = put(&f, "alice", &doc.id, json!({"version": 1, "content": {}}));
        assert_eq!(response.status, 409);
        let body: ErrorBody = response.decode().unwrap();
        assert_eq!(body.error.code, ErrorCode::VersionConflict);
        assert_eq!(body.current_version, Some(2));
    }

    #[test]
    fn invalid_saves_are_400() {
        let f = fixture();
        let doc = create(&f, "alice");

        for body in [
            json!({"version": 0, "content": {}}),
            json!({"version": 1, "title": "   ", "content": {}}),
            json!({"version": 1, "title": "x".repeat(256), "content": {}}),
            json!({"version": 1, "content": [1, 2]}),
            json!({"version": 1, "content": {"blob": "y".repeat(300)}}),
            json!({"content": {}}),
        ] {
            let response = put(&f, "alice", &doc.id, body);
            assert_eq!(response.status, 400);
            assert_eq!(code(&response), ErrorCode::InvalidInput);
        }
        assert_eq!(f.store.read(&doc.id).unwrap().version, 1);
    }

    #[test]
    fn foreign_document_is_403_and_missing_is_404() {
        let f = fixture();
        let doc = create(&f, "alice");

        let response = put(&f, "mallory", &doc.id, json!({"version": 1, "content": {}}));
        assert_eq!(response.status, 403);

        let response = put(&f, "alice", &DocumentId::new("nope"), json!({"version": 1, "content": {}}));
        assert_eq!(response.status, 404);
        assert_eq!(code(&response), ErrorCode::DocumentNotFound);
    }

    #[test]
    fn trash_restore_and_purge() {
        let f = fixture();
        let doc = create(&f, "alice");
        let path = document_path(&doc.id);

        let response = f.handler.route(&as_user(ApiRequest::new(Method::Delete, path.clone()), "alice"));
        assert_eq!(response.status, 204);

        let response = f.handler.route(&as_user(ApiRequest::new(Method::Get, path.clone()), "alice"));
        assert_eq!(response.status, 404);

        let response = put(&f, "alice", &doc.id, json!({"version": 1, "content": {}}));
        assert_eq!(response.status, 404);

        let restore = ApiRequest::new(Method::Post, format!("{}/restore", path));
        let response = f.handler.route(&as_user(restore, "alice"));
        assert_eq!(response.status, 200);
        assert!(!response.decode::<DocumentEnvelope>().unwrap().document.is_trashed);

        let purge = ApiRequest::new(Method::Delete, format!("{}/permanent", path));
        assert_eq!(f.handler.route(&as_user(purge, "alice")).status, 204);
        assert!(f.store.is_empty());
    }

    #[test]
    fn favorite_toggle() {
        let f = fixture();
        let doc = create(&f, "alice");
        let request = ApiRequest::new(Method::Patch, format!("{}/favorite", document_path(&doc.id)))
            .with_json(&FavoriteRequest { is_favorite: true })
            .unwrap();

        let response = f.handler.route(&as_user(request, "alice"));
        assert_eq!(response.status, 200);
        let record = response.decode::<DocumentEnvelope>().unwrap().document;
        assert!(record.is_favorite);
        assert_eq!(record.version, 1);
    }

    #[test]
    fn listing_respects_team_membership() {
        let f = fixture();
        let team = TeamId::new("t1");
        let query = ListQuery::team(team.clone()).to_pairs();

        let request = as_user(ApiRequest::new(Method::Get, DOCUMENTS_PATH).with_query(query.clone()), "bob");
        assert_eq!(f.handler.route(&request).status, 403);

        f.access.grant(team.clone(), UserId::new("bob"));
        let create = as_user(ApiRequest::new(Method::Post, DOCUMENTS_PATH), "bob")
            .with_json(&CreateRequest {
                title: Some("Shared".into()),
                team_id: Some(team),
                content: None,
            })
            .unwrap();
        assert_eq!(f.handler.route(&create).status, 201);

        let response = f.handler.route(&request);
        assert_eq!(response.status, 200);
        let rows = response.decode::<DocumentListEnvelope>().unwrap().documents;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "Shared");

        let missing_team = vec![("scope".to_string(), "team".to_string())];
        let request = as_user(ApiRequest::new(Method::Get, DOCUMENTS_PATH).with_query(missing_team), "bob");
        assert_eq!(f.handler.route(&request).status, 400);
    }

    #[test]
    fn unknown_route_is_404() {
        let f = fixture();
        let request = as_user(ApiRequest::new(Method::Patch, DOCUMENTS_PATH), "alice");
        let response = f.handler.route(&request);
        assert_eq!(response.status, 404);
        assert_eq!(code(&response), ErrorCode::RouteNotFound);
    }
}
