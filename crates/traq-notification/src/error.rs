//! Error types for notification routing.

use thiserror::Error;
use traq_hub::HubError;
use traq_repository::RepositoryError;

#[derive(Debug, Error)]
pub enum NotificationError {
    /// The event lacks a field its topic requires.
    #[error("event {topic} is missing field '{field}'")]
    MissingField { topic: &'static str, field: &'static str },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Hub(#[from] HubError),
}
