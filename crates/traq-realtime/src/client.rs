//! SSE clients and frames.

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use traq_types::UserId;
use uuid::Uuid;

/// Comment frame sent periodically to keep idle connections open.
pub const KEEPALIVE_FRAME: &str = ":\n\n";

/// Default per-client buffer size.
pub const DEFAULT_CLIENT_BUFFER: usize = 100;

/// Unique identifier of one SSE connection.
pub type ConnectionId = Uuid;

/// An event as sent to SSE clients.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    /// Upper-snake-case event type, e.g. `MESSAGE_CREATED`.
    pub event_type: &'static str,
    pub payload: serde_json::Value,
}

impl SseEvent {
    pub fn new(event_type: &'static str, payload: impl Serialize) -> Self {
        Self {
            event_type,
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Wire framing: `event: TYPE\ndata: JSON\n\n`.
    pub fn frame(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event_type, self.payload)
    }
}

/// One connected SSE stream.
#[derive(Debug)]
pub struct SseClient {
    pub id: ConnectionId,
    pub user_id: UserId,
    tx: mpsc::Sender<SseEvent>,
    disconnected: RwLock<bool>,
    closed: CancellationToken,
}

/// Result of a non-blocking send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendOutcome {
    Sent,
    /// The client is gone or already being torn down.
    Skipped,
    /// The buffer is full; the client must be disconnected.
    Saturated,
}

impl SseClient {
    pub(crate) fn new(user_id: UserId, buffer: usize) -> (Self, mpsc::Receiver<SseEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let client = Self {
            id: Uuid::new_v4(),
            user_id,
            tx,
            disconnected: RwLock::new(false),
            closed: CancellationToken::new(),
        };
        (client, rx)
    }

    pub fn is_disconnected(&self) -> bool {
        *self.disconnected.read()
    }

    /// Non-blocking enqueue, performed while holding the read side of the
    /// `disconnected` latch so it never races with disposal.
    pub(crate) fn try_send(&self, event: &SseEvent) -> SendOutcome {
        let disconnected = self.disconnected.read();
        if *disconnected {
            return SendOutcome::Skipped;
        }
        match self.tx.try_send(event.clone()) {
            Ok(()) => SendOutcome::Sent,
            Err(mpsc::error::TrySendError::Full(_)) => SendOutcome::Saturated,
            Err(mpsc::error::TrySendError::Closed(_)) => SendOutcome::Skipped,
        }
    }

    /// Mark the client disconnected. Returns `false` if it already was.
    pub(crate) fn mark_disconnected(&self) -> bool {
        let mut disconnected = self.disconnected.write();
        let first = !*disconnected;
        *disconnected = true;
        first
    }

    /// Signal the HTTP stream to finish.
    pub(crate) fn close(&self) {
        self.closed.cancel();
    }

    pub(crate) fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }
}
