//! # DocSync Server
//!
//! Authoritative document store for DocSync clients.
//!
//! This crate provides:
//! - [`RecordStore`], a versioned record store with atomic
//!   compare-and-increment writes
//! - Identity resolution (HMAC-SHA256 signed session tokens)
//! - An access policy seam for owner and team scopes
//! - [`RequestHandler`], which routes framework-agnostic requests to the
//!   store and maps failures onto status codes
//!
//! # Concurrency
//!
//! Every write holds the store's write lock for the whole
//! compare-and-increment, so two writers claiming the same version can never
//! both succeed: exactly one gets the next version, the other gets a
//! `409 VERSION_CONFLICT` carrying the version it lost to.
//!
//! # Example
//!
//! ```rust
//! use docsync_protocol::{ApiRequest, CreateRequest, Method, DOCUMENTS_PATH};
//! use docsync_server::{DocumentServer, ServerConfig};
//!
//! let server = DocumentServer::new(ServerConfig::default());
//! let request = ApiRequest::new(Method::Post, DOCUMENTS_PATH)
//!     .with_credentials("alice")
//!     .with_json(&CreateRequest::default())
//!     .unwrap();
//! assert_eq!(server.handle(&request).status, 201);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod access;
mod config;
mod error;
mod handler;
mod server;
mod store;

pub use access::{
    AccessKind, AccessPolicy, IdentityResolver, PlainUserResolver, ScopeAccessPolicy,
    SignedTokenResolver,
};
pub use config::{AuthConfig, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use handler::RequestHandler;
pub use server::DocumentServer;
pub use store::RecordStore;
