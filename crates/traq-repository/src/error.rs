//! Error types for the repository crate.

use thiserror::Error;

/// Errors returned by repository operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint would be violated.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The arguments violate a referential or domain constraint.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A channel write would exceed the maximum tree depth or form a loop.
    #[error("channel depth limit exceeded")]
    DepthLimit,
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;
