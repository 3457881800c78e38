//! Error types for the channel service.

use thiserror::Error;
use traq_repository::RepositoryError;

/// Errors that can occur in channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel does not exist or is not visible to the actor.
    #[error("not found: {0}")]
    NotFound(String),

    /// A sibling already uses the name.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The operation is not allowed on this channel.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The tree would exceed its maximum depth, or would contain a loop.
    #[error("channel depth limit exceeded")]
    DepthLimit,

    /// The name violates the channel naming rules.
    #[error("invalid channel name: {0}")]
    InvalidName(String),

    /// Bad input shape.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unexpected repository failure.
    #[error("repository error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for ChannelError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(what) => ChannelError::NotFound(what),
            RepositoryError::AlreadyExists(what) => ChannelError::AlreadyExists(what),
            RepositoryError::DepthLimit => ChannelError::DepthLimit,
            other => ChannelError::Repository(other),
        }
    }
}
