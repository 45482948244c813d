//! Server facade.

use crate::access::{
    AccessPolicy, IdentityResolver, PlainUserResolver, ScopeAccessPolicy, SignedTokenResolver,
};
use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::handler::RequestHandler;
use crate::store::RecordStore;
use docsync_protocol::{ApiRequest, ApiResponse, TeamId, UserId};
use std::sync::Arc;

/// The document server.
///
/// Wires a [`RecordStore`], an identity resolver and an access policy into a
/// [`RequestHandler`]. An HTTP layer only has to translate its requests into
/// [`ApiRequest`]s and call [`DocumentServer::handle`].
///
/// # Example
///
/// ```
/// use docsync_server::{DocumentServer, ServerConfig};
///
/// let server = DocumentServer::new(ServerConfig::default().with_auth(b"secret".to_vec()));
/// let token = server.issue_token(&"alice".into()).unwrap();
/// assert!(token.is_some());
/// ```
pub struct DocumentServer {
    handler: RequestHandler,
    store: Arc<RecordStore>,
    teams: Arc<ScopeAccessPolicy>,
    tokens: Option<SignedTokenResolver>,
}

impl DocumentServer {
    /// Creates a server with an empty store.
    ///
    /// With `config.auth` set, credentials must be signed tokens; otherwise
    /// they are taken as user ids.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(RecordStore::new()))
    }

    /// Creates a server over an existing store.
    pub fn with_store(config: ServerConfig, store: Arc<RecordStore>) -> Self {
        let tokens = config.auth.clone().map(SignedTokenResolver::new);
        let identity: Arc<dyn IdentityResolver> = match &tokens {
            Some(resolver) => Arc::new(resolver.clone()),
            None => Arc::new(PlainUserResolver),
        };
        let teams = Arc::new(ScopeAccessPolicy::new());
        let access: Arc<dyn AccessPolicy> = teams.clone();
        let handler = RequestHandler::new(config, Arc::clone(&store), identity, access);

        Self {
            handler,
            store,
            teams,
            tokens,
        }
    }

    /// Handles a request.
    pub fn handle(&self, request: &ApiRequest) -> ApiResponse {
        self.handler.route(request)
    }

    /// Returns the record store.
    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    /// Adds `user` to `team`.
    pub fn grant_team(&self, team: TeamId, user: UserId) {
        self.teams.grant(team, user);
    }

    /// Removes `user` from `team`.
    pub fn revoke_team(&self, team: &TeamId, user: &UserId) {
        self.teams.revoke(team, user);
    }

    /// Issues a session token, or `None` when token auth is disabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the user id cannot be encoded in a token.
    pub fn issue_token(&self, user: &UserId) -> ServerResult<Option<String>> {
        self.tokens.as_ref().map(|t| t.issue(user)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_protocol::{document_path, DocumentEnvelope, Method, DOCUMENTS_PATH};

    #[test]
    fn token_auth_round_trip() {
        let server = DocumentServer::new(ServerConfig::default().with_auth(b"k".to_vec()));
        let token = server.issue_token(&UserId::new("alice")).unwrap().unwrap();

        let plain = ApiRequest::new(Method::Post, DOCUMENTS_PATH).with_credentials("alice");
        assert_eq!(server.handle(&plain).status, 401);

        let signed = ApiRequest::new(Method::Post, DOCUMENTS_PATH).with_credentials(token);
        let response = server.handle(&signed);
        assert_eq!(response.status, 201);
        let doc = response.decode::<DocumentEnvelope>().unwrap().document;
        assert_eq!(doc.owner_user_id.as_str(), "alice");
    }

    #[test]
    fn revoked_member_loses_access() {
        let server = DocumentServer::new(ServerConfig::default());
        let team = TeamId::new("t");
        let bob = UserId::new("bob");
        server.grant_team(team.clone(), bob.clone());

        let record = server.store().create(
            &UserId::new("alice"),
            docsync_protocol::CreateRequest {
                team_id: Some(team.clone()),
                ..Default::default()
            },
        );
        let get = ApiRequest::new(Method::Get, document_path(&record.id)).with_credentials("bob");
        assert_eq!(server.handle(&get).status, 200);

        server.revoke_team(&team, &bob);
        assert_eq!(server.handle(&get).status, 403);
    }

    #[test]
    fn no_tokens_without_auth() {
        let server = DocumentServer::new(ServerConfig::default());
        assert!(server.issue_token(&UserId::new("alice")).unwrap().is_none());
    }
}
