//! Identity resolution and access control.
//!
//! Both concerns are seams: the handler only asks "who is calling" and
//! "may they touch this". The implementations here cover signed session
//! tokens and owner/team scopes.
//!
//! ## Token Format
//!
//! `<user id>.<issued at, unix millis>.<hex HMAC-SHA256 of the first two parts>`

use crate::config::AuthConfig;
use crate::error::{ServerError, ServerResult};
use docsync_protocol::{epoch_millis, DocumentRecord, TeamId, UserId};
use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use sha2::Sha256;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

type HmacSha256 = Hmac<Sha256>;

/// Turns request credentials into a user id.
pub trait IdentityResolver: Send + Sync {
    /// Resolves the caller.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Unauthorized`] when credentials are missing or
    /// invalid.
    fn resolve(&self, credentials: Option<&str>) -> ServerResult<UserId>;
}

/// Kind of access requested on a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    /// Read content or metadata.
    Read,
    /// Write content.
    Write,
    /// Trash, restore, purge, favorite.
    Manage,
}

/// Authorization predicate.
pub trait AccessPolicy: Send + Sync {
    /// Returns true if `user` may perform `kind` on `document`.
    fn can_access(&self, user: &UserId, document: &DocumentRecord, kind: AccessKind) -> bool;

    /// Returns true if `user` may list or create documents in `team`.
    fn can_use_team(&self, user: &UserId, team: &TeamId) -> bool;
}

/// Resolver that trusts the credential string as the user id.
///
/// For deployments where an upstream proxy has already authenticated the
/// caller, and for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainUserResolver;

impl IdentityResolver for PlainUserResolver {
    fn resolve(&self, credentials: Option<&str>) -> ServerResult<UserId> {
        match credentials.map(str::trim) {
            Some(user) if !user.is_empty() => Ok(UserId::new(user)),
            _ => Err(ServerError::Unauthorized("missing credentials".into())),
        }
    }
}

/// Resolver for HMAC-SHA256 signed, expiring session tokens.
#[derive(Clone)]
pub struct SignedTokenResolver {
    config: AuthConfig,
}

impl SignedTokenResolver {
    /// Creates a resolver.
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Issues a token for `user`, stamped now.
    ///
    /// # Errors
    ///
    /// Returns an error if the user id contains a `.`.
    pub fn issue(&self, user: &UserId) -> ServerResult<String> {
        self.issue_at(user, epoch_millis())
    }

    /// Issues a token for `user` stamped at `issued_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the user id contains a `.`.
    pub fn issue_at(&self, user: &UserId, issued_at: u64) -> ServerResult<String> {
        if user.as_str().contains('.') {
            return Err(ServerError::InvalidRequest(
                "user id may not contain '.'".into(),
            ));
        }
        let payload = format!("{}.{}", user, issued_at);
        let signature = self.sign(payload.as_bytes())?;
        Ok(format!("{}.{}", payload, to_hex(&signature)))
    }

    /// Validates a token against the clock value `now`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Unauthorized`] for malformed, tampered, or
    /// expired tokens.
    pub fn validate_at(&self, token: &str, now: u64) -> ServerResult<UserId> {
        let mut parts = token.rsplitn(3, '.');
        let (signature, issued, user) = match (parts.next(), parts.next(), parts.next()) {
            (Some(s), Some(i), Some(u)) if !u.is_empty() => (s, i, u),
            _ => return Err(ServerError::Unauthorized("malformed token".into())),
        };

        let signature = from_hex(signature)
            .ok_or_else(|| ServerError::Unauthorized("malformed token".into()))?;
        let mut mac = self.mac()?;
        mac.update(format!("{}.{}", user, issued).as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| ServerError::Unauthorized("invalid signature".into()))?;

        let issued_at: u64 = issued
            .parse()
            .map_err(|_| ServerError::Unauthorized("malformed token".into()))?;
        let expiry = self.config.token_expiry.as_millis() as u64;
        if now > issued_at.saturating_add(expiry) {
            return Err(ServerError::Unauthorized("token expired".into()));
        }

        Ok(UserId::new(user))
    }

    fn mac(&self) -> ServerResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.config.secret)
            .map_err(|e| ServerError::Internal(format!("hmac key: {}", e)))
    }

    fn sign(&self, data: &[u8]) -> ServerResult<Vec<u8>> {
        let mut mac = self.mac()?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

impl IdentityResolver for SignedTokenResolver {
    fn resolve(&self, credentials: Option<&str>) -> ServerResult<UserId> {
        let token =
            credentials.ok_or_else(|| ServerError::Unauthorized("missing credentials".into()))?;
        self.validate_at(token, epoch_millis())
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{:02x}", b);
        out
    })
}

fn from_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(text.get(i..i + 2)?, 16).ok())
        .collect()
}

/// Owner-only personal documents plus explicit team memberships.
#[derive(Debug, Default)]
pub struct ScopeAccessPolicy {
    members: RwLock<HashMap<TeamId, HashSet<UserId>>>,
}

impl ScopeAccessPolicy {
    /// Creates a policy with no team memberships.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `user` to `team`.
    pub fn grant(&self, team: TeamId, user: UserId) {
        self.members.write().entry(team).or_default().insert(user);
    }

    /// Removes `user` from `team`.
    pub fn revoke(&self, team: &TeamId, user: &UserId) {
        if let Some(users) = self.members.write().get_mut(team) {
            users.remove(user);
        }
    }
}

impl AccessPolicy for ScopeAccessPolicy {
    fn can_access(&self, user: &UserId, document: &DocumentRecord, _kind: AccessKind) -> bool {
        match &document.team_id {
            None => &document.owner_user_id == user,
            Some(team) => self.can_use_team(user, team),
        }
    }

    fn can_use_team(&self, user: &UserId, team: &TeamId) -> bool {
        self.members
            .read()
            .get(team)
            .is_some_and(|users| users.contains(user))
    }
}
