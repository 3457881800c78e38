//! Error types for the hub.

use thiserror::Error;

/// Errors that can occur in hub operations.
#[derive(Debug, Error)]
pub enum HubError {
    /// Subscriber buffers must hold at least one event.
    #[error("subscriber buffer size must be positive")]
    InvalidBuffer,
}
