//! Error taxonomy for the `hydrowatch` library.
//!
//! Three families matter to callers:
//! - [`Error::Validation`]: malformed input, raised before any I/O.
//! - [`StoreError`]: failures from the document store, propagated as-is.
//! - [`TransportError`]: failures talking to the ML inference service. These
//!   are converted into fallback predictions inside the gateway and never
//!   surface through [`Error`].

use thiserror::Error;

/// Errors returned by the dashboard operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Required input missing or outside its valid range.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The document store rejected or failed an operation.
    #[error(transparent)]
    Store(StoreError),

    /// A stored document did not match the expected record shape.
    #[error("invalid {collection} document {id}: {reason}")]
    Decode {
        collection: String,
        id: String,
        reason: String,
    },

    /// The referenced record does not exist.
    #[error("{collection}/{id} not found")]
    NotFound { collection: String, id: String },

    /// An alert status change that the lifecycle does not allow.
    #[error("alert cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Unusable configuration (bad URL, invalid bounds).
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { collection, id } => Error::NotFound { collection, id },
            other => Error::Store(other),
        }
    }
}

/// Failures from a [`DocumentStore`](crate::store::DocumentStore) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("document {collection}/{id} does not exist")]
    NotFound { collection: String, id: String },
}

/// Failures from a single call to the ML inference service.
///
/// Kept public so logs and tests can name the cause, but the gateway only
/// ever reports it inside a fallback prediction.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Network(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("service responded with HTTP {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),

    /// The service answered 2xx but flagged the inference as failed.
    #[error("service reported status {0:?}")]
    Rejected(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
