//! Error types for the bot engine.

use thiserror::Error;
use traq_oauth2::OAuth2Error;
use traq_repository::RepositoryError;

/// Errors returned by bot management and delivery.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The actor is neither the bot's creator nor an administrator.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Activation was refused because the bot did not answer the ping.
    #[error("ping failed: {0}")]
    PingFailed(String),

    /// A hub event lacked a field its topic always carries.
    #[error("{topic} event is missing field {field}")]
    MissingField {
        topic: &'static str,
        field: &'static str,
    },

    /// The worker pool has shut down.
    #[error("bot engine is closed")]
    Closed,

    #[error("http client error: {0}")]
    Client(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    OAuth2(#[from] OAuth2Error),

    #[error("hub error: {0}")]
    Hub(#[from] traq_hub::HubError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
