//! The SSE streamer.
//!
//! A coordinator task owns every registry mutation and receives work on
//! three inputs: `connect`, `disconnect` and shutdown. Dispatchers only take
//! a read lock long enough to snapshot the target clients, then enqueue
//! without blocking. A client whose buffer is full is marked disconnected
//! and handed to the coordinator instead of stalling the dispatcher.

use crate::client::{ConnectionId, SendOutcome, SseClient, SseEvent, KEEPALIVE_FRAME};
use crate::error::RealtimeError;
use crate::webrtc::WebRtcManager;
use crate::Result;
use bytes::Bytes;
use futures::Stream;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use traq_types::UserId;

type Registry = HashMap<UserId, HashMap<ConnectionId, Arc<SseClient>>>;

struct ConnectRequest {
    client: Arc<SseClient>,
    ack: oneshot::Sender<()>,
}

/// Per-user registry of SSE connections with three dispatch strategies.
pub struct Streamer {
    registry: Arc<RwLock<Registry>>,
    connect_tx: mpsc::UnboundedSender<ConnectRequest>,
    disconnect_tx: mpsc::UnboundedSender<Arc<SseClient>>,
    buffer: usize,
    shutdown: CancellationToken,
}

impl Streamer {
    /// Start a streamer whose coordinator stops when `shutdown` is cancelled.
    /// Must be called within a Tokio runtime.
    pub fn new(buffer: usize, webrtc: Arc<WebRtcManager>, shutdown: CancellationToken) -> Arc<Self> {
        let registry: Arc<RwLock<Registry>> = Arc::default();
        let (connect_tx, connect_rx) = mpsc::unbounded_channel();
        let (disconnect_tx, disconnect_rx) = mpsc::unbounded_channel();
        let shutdown = shutdown.child_token();

        tokio::spawn(coordinate(
            registry.clone(),
            connect_rx,
            disconnect_rx,
            shutdown.clone(),
            webrtc,
        ));

        Arc::new(Self {
            registry,
            connect_tx,
            disconnect_tx,
            buffer,
            shutdown,
        })
    }

    /// Register a new connection for `user_id`. The connection is visible to
    /// dispatchers once this returns.
    pub async fn connect(&self, user_id: UserId) -> Result<SseConnection> {
        let (client, rx) = SseClient::new(user_id, self.buffer);
        let client = Arc::new(client);
        let (ack, acked) = oneshot::channel();
        self.connect_tx
            .send(ConnectRequest {
                client: client.clone(),
                ack,
            })
            .map_err(|_| RealtimeError::Closed)?;
        acked.await.map_err(|_| RealtimeError::Closed)?;

        Ok(SseConnection {
            client,
            rx,
            disconnect_tx: self.disconnect_tx.clone(),
        })
    }

    /// Send to every connected client.
    pub fn broadcast(&self, event: &SseEvent) -> usize {
        let targets: Vec<Arc<SseClient>> = self
            .registry
            .read()
            .values()
            .flat_map(|conns| conns.values().cloned())
            .collect();
        self.send_all(&targets, event)
    }

    /// Send to every connection of the given users.
    pub fn multicast(&self, user_ids: &[UserId], event: &SseEvent) -> usize {
        let targets: Vec<Arc<SseClient>> = {
            let registry = self.registry.read();
            user_ids
                .iter()
                .filter_map(|u| registry.get(u))
                .flat_map(|conns| conns.values().cloned())
                .collect()
        };
        self.send_all(&targets, event)
    }

    pub fn is_user_connected(&self, user_id: UserId) -> bool {
        self.registry.read().contains_key(&user_id)
    }

    pub fn connected_users(&self) -> Vec<UserId> {
        self.registry.read().keys().copied().collect()
    }

    pub fn connection_count(&self) -> usize {
        self.registry.read().values().map(HashMap::len).sum()
    }

    /// Stop the coordinator and dispose every client.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    fn send_all(&self, targets: &[Arc<SseClient>], event: &SseEvent) -> usize {
        let mut sent = 0;
        for client in targets {
            match client.try_send(event) {
                SendOutcome::Sent => sent += 1,
                SendOutcome::Skipped => {}
                SendOutcome::Saturated => {
                    if client.mark_disconnected() {
                        warn!(
                            connection_id = %client.id,
                            user_id = %client.user_id,
                            "SSE client buffer full, disconnecting"
                        );
                        let _ = self.disconnect_tx.send(client.clone());
                    }
                }
            }
        }
        sent
    }
}

async fn coordinate(
    registry: Arc<RwLock<Registry>>,
    mut connect_rx: mpsc::UnboundedReceiver<ConnectRequest>,
    mut disconnect_rx: mpsc::UnboundedReceiver<Arc<SseClient>>,
    shutdown: CancellationToken,
    webrtc: Arc<WebRtcManager>,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            Some(ConnectRequest { client, ack }) = connect_rx.recv() => {
                if !client.is_disconnected() {
                    registry
                        .write()
                        .entry(client.user_id)
                        .or_default()
                        .insert(client.id, client.clone());
                    info!(connection_id = %client.id, user_id = %client.user_id, "SSE client connected");
                }
                let _ = ack.send(());
            }
            Some(client) = disconnect_rx.recv() => {
                client.close();
                let last = {
                    let mut registry = registry.write();
                    let removed = registry
                        .get_mut(&client.user_id)
                        .and_then(|conns| conns.remove(&client.id))
                        .is_some();
                    let empty = registry.get(&client.user_id).is_some_and(HashMap::is_empty);
                    if empty {
                        registry.remove(&client.user_id);
                    }
                    removed && empty
                };
                debug!(connection_id = %client.id, user_id = %client.user_id, "SSE client disconnected");
                if last {
                    webrtc.reset_user(client.user_id);
                }
            }
            else => break,
        }
    }

    let clients: Vec<Arc<SseClient>> = registry
        .write()
        .drain()
        .flat_map(|(_, conns)| conns.into_values())
        .collect();
    for client in &clients {
        client.mark_disconnected();
        client.close();
    }
    info!(disposed = clients.len(), "SSE streamer stopped");
}

/// The receiving side of one SSE connection. Dropping it disposes the
/// client: it is marked disconnected, its queue is closed and drained, and
/// the coordinator is told to forget it.
pub struct SseConnection {
    client: Arc<SseClient>,
    rx: mpsc::Receiver<SseEvent>,
    disconnect_tx: mpsc::UnboundedSender<Arc<SseClient>>,
}

impl SseConnection {
    pub fn id(&self) -> ConnectionId {
        self.client.id
    }

    pub fn user_id(&self) -> UserId {
        self.client.user_id
    }

    /// Next queued event, or `None` once the client has been closed.
    pub async fn recv(&mut self) -> Option<SseEvent> {
        let closed = self.client.closed_token();
        tokio::select! {
            event = self.rx.recv() => event,
            _ = closed.cancelled() => None,
        }
    }

    /// Render the connection as an SSE body: event frames interleaved with a
    /// keep-alive comment every `keepalive`.
    pub fn into_stream(self, keepalive: Duration) -> impl Stream<Item = std::result::Result<Bytes, Infallible>> + Send + 'static {
        let start = tokio::time::Instant::now() + keepalive;
        let ticker = tokio::time::interval_at(start, keepalive);
        futures::stream::unfold((self, ticker), |(mut conn, mut ticker)| async move {
            let closed = conn.client.closed_token();
            let frame = tokio::select! {
                event = conn.rx.recv() => event.map(|e| Bytes::from(e.frame())),
                _ = ticker.tick() => Some(Bytes::from_static(KEEPALIVE_FRAME.as_bytes())),
                _ = closed.cancelled() => None,
            };
            frame.map(|bytes| (Ok(bytes), (conn, ticker)))
        })
    }
}

impl Drop for SseConnection {
    fn drop(&mut self) {
        self.client.mark_disconnected();
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
        let _ = self.disconnect_tx.send(self.client.clone());
    }
}
