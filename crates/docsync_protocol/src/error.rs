//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or decoding wire values.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A body could not be serialized or parsed as JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A request that needs a body arrived without one.
    #[error("missing request body")]
    MissingBody,

    /// Document content was not a JSON object.
    #[error("document content must be a JSON object")]
    ContentNotObject,

    /// A query parameter could not be interpreted.
    #[error("invalid query parameter {name}: {value}")]
    InvalidQuery {
        /// Parameter name.
        name: String,
        /// Offending value.
        value: String,
    },
}
