//! Error types for the realtime module.

use thiserror::Error;

/// Errors that can occur in realtime operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Unknown heartbeat status.
    #[error("invalid heartbeat status: {0}")]
    InvalidStatus(String),

    /// Malformed WebRTC state.
    #[error("invalid webrtc state: {0}")]
    InvalidState(String),

    /// The streamer has shut down.
    #[error("streamer closed")]
    Closed,
}
