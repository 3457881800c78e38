//! Error types for webhook intake.

use thiserror::Error;
use traq_message::MessageError;
use traq_repository::RepositoryError;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// The signature header is missing or does not match the body.
    #[error("invalid signature: {0}")]
    InvalidSignature(&'static str),

    /// A template set could not be loaded.
    #[error("template error: {0}")]
    Template(String),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl From<RepositoryError> for WebhookError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(what) => WebhookError::NotFound(what),
            other => WebhookError::Message(other.into()),
        }
    }
}
