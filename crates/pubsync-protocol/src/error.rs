//! Protocol error types

use thiserror::Error;

/// Protocol-specific errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Message too large: {size} > {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
}

impl ProtocolError {
    /// Wire code for this error
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::InvalidFrame(_) => "INVALID_FRAME",
            ProtocolError::MessageTooLarge { .. } => "TOO_LARGE",
            ProtocolError::InvalidJson(_) => "PARSE_ERROR",
        }
    }
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
