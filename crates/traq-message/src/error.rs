//! Error types for message operations.

use thiserror::Error;
use traq_repository::RepositoryError;

/// Errors that can occur in message, stamp and clip operations.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The actor may not perform the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<RepositoryError> for MessageError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(what) => MessageError::NotFound(what),
            RepositoryError::AlreadyExists(what) => MessageError::AlreadyExists(what),
            RepositoryError::InvalidArgument(what) => MessageError::InvalidArgument(what),
            RepositoryError::DepthLimit => MessageError::InvalidArgument(e.to_string()),
        }
    }
}
