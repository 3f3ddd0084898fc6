//! Error types for pubsync Core

use thiserror::Error;

/// Core error types
///
/// These are hard failures. Expected business outcomes (denials, exhausted
/// codes) are values and never travel through this type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid document ID: {0}")]
    InvalidDocumentId(String),

    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Malformed change: {0}")]
    MalformedChange(String),

    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    #[error("Unknown publication: {0}")]
    UnknownPublication(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("{kind} already registered: {name}")]
    DuplicateRegistration { kind: &'static str, name: String },

    #[error("Method {0} requires an authenticated caller")]
    NotAuthenticated(String),

    #[error("Missing {collection} record: {id}")]
    MissingRecord { collection: String, id: String },

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("Store error: {0}")]
    Store(String),
}

/// Result type alias for pubsync Core operations
pub type Result<T> = std::result::Result<T, Error>;
