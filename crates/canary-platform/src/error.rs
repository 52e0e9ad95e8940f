//! Error types for control-plane calls.

use thiserror::Error;

use crate::plane::Operation;

/// Result type alias for control-plane operations.
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Errors returned by a control-plane backend.
#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    #[error("{resource} not found: {name}")]
    NotFound { resource: &'static str, name: String },

    #[error("{resource} already exists: {name}")]
    AlreadyExists { resource: &'static str, name: String },

    #[error("{operation} rejected: {message}")]
    Rejected { operation: Operation, message: String },

    #[error("{operation} failed: {message}")]
    Service { operation: Operation, message: String },

    #[error("malformed {operation} response: {detail}")]
    Malformed { operation: Operation, detail: String },
}

impl PlatformError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PlatformError::NotFound { .. })
    }
}
