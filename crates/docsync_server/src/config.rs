//! Server configuration.

use std::time::Duration;

/// Configuration for the document server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Largest accepted serialized content, in bytes.
    pub max_content_bytes: usize,
    /// Longest accepted title, in characters, after trimming.
    pub max_title_chars: usize,
    /// Session token settings. `None` trusts credentials as user ids.
    pub auth: Option<AuthConfig>,
}

impl ServerConfig {
    /// Creates a configuration with default limits and no token auth.
    pub fn new() -> Self {
        Self {
            max_content_bytes: 8 * 1024 * 1024,
            max_title_chars: 255,
            auth: None,
        }
    }

    /// Sets the content size limit.
    pub fn with_max_content_bytes(mut self, max: usize) -> Self {
        self.max_content_bytes = max;
        self
    }

    /// Sets the title length limit.
    pub fn with_max_title_chars(mut self, max: usize) -> Self {
        self.max_title_chars = max;
        self
    }

    /// Enables signed session tokens with the given secret.
    pub fn with_auth(mut self, secret: Vec<u8>) -> Self {
        self.auth = Some(AuthConfig::new(secret));
        self
    }

    /// Enables signed session tokens with a full auth configuration.
    pub fn with_auth_config(mut self, auth: AuthConfig) -> Self {
        self.auth = Some(auth);
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Session token configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret key for HMAC.
    pub secret: Vec<u8>,
    /// Token lifetime.
    pub token_expiry: Duration,
}

impl AuthConfig {
    /// Creates an auth configuration with a seven day token lifetime.
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret,
            token_expiry: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }

    /// Sets the token lifetime.
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.max_title_chars, 255);
        assert!(config.auth.is_none());
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new()
            .with_max_content_bytes(1024)
            .with_max_title_chars(40)
            .with_auth_config(AuthConfig::new(vec![1, 2, 3]).with_expiry(Duration::from_secs(60)));

        assert_eq!(config.max_content_bytes, 1024);
        assert_eq!(config.max_title_chars, 40);
        let auth = config.auth.unwrap();
        assert_eq!(auth.secret, vec![1, 2, 3]);
        assert_eq!(auth.token_expiry, Duration::from_secs(60));
    }
}
