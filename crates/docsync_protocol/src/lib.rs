//! # DocSync Protocol
//!
//! Wire types shared by the DocSync server and client engine.
//!
//! This crate provides:
//! - Identifier newtypes ([`DocumentId`], [`UserId`], [`TeamId`])
//! - The versioned [`DocumentRecord`] and its listing projection
//! - Request and response bodies for the document endpoints
//! - The error body carried by every non-2xx response
//! - Framework-agnostic [`ApiRequest`] / [`ApiResponse`] values
//!
//! All bodies are JSON with camelCase field names. This is a pure protocol
//! crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod api;
mod document;
mod error;
mod ids;
mod messages;

pub use api::{document_path, ApiRequest, ApiResponse, Method, DOCUMENTS_PATH};
pub use document::{epoch_millis, DocumentContent, DocumentMeta, DocumentRecord, DEFAULT_TITLE};
pub use error::{ProtocolError, ProtocolResult};
pub use ids::{DocumentId, TeamId, UserId};
pub use messages::{
    CreateRequest, DocumentEnvelope, DocumentListEnvelope, ErrorBody, ErrorCode, ErrorDetail,
    FavoriteRequest, ListQuery, SaveRequest, Scope,
};
