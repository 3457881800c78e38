//! # traQ Realtime
//!
//! Server-to-client delivery and ephemeral presence:
//!
//! - [`Streamer`]: per-user Server-Sent-Events connections with broadcast,
//!   user-multicast and channel-viewer-multicast dispatch. A client that
//!   cannot keep up is disconnected rather than slowing anyone else down.
//! - [`HeartbeatTracker`]: who is on which channel, and with what status.
//! - [`WebRtcManager`]: each user's advertised call state.

pub mod client;
pub mod error;
pub mod heartbeat;
pub mod streamer;
pub mod webrtc;

pub use client::{ConnectionId, SseClient, SseEvent, DEFAULT_CLIENT_BUFFER, KEEPALIVE_FRAME};
pub use error::RealtimeError;
pub use heartbeat::{HeartbeatTracker, DEFAULT_HEARTBEAT_TTL, STATUSES, STATUS_NONE};
pub use streamer::{SseConnection, Streamer};
pub use webrtc::{WebRtcManager, WebRtcUserState};

/// Result type for realtime operations.
pub type Result<T> = std::result::Result<T, RealtimeError>;
