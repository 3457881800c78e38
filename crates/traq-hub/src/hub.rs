//! The event hub.
//!
//! Each subscriber owns two queues: an unbounded ingress that publishers
//! push into, and a bounded queue of the subscriber's chosen size that it
//! reads from. A forwarding task moves events between them, so a full
//! subscriber only stalls its own forwarder while publishers keep
//! enqueueing in constant time.
//!
//! The ingress has no cap: a subscriber that stops reading accumulates its
//! backlog in memory. The hub counts each subscriber's backlog and logs a
//! warning every [`BACKLOG_WARN_THRESHOLD`] pending events.

use crate::error::HubError;
use crate::event::Event;
use crate::topic::Topic;
use crate::Result;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Identifier of a hub subscription.
pub type SubscriberId = u64;

/// Backlog size at which, and at every multiple of which, a lagging
/// subscriber is reported.
pub const BACKLOG_WARN_THRESHOLD: usize = 10_000;

fn crosses_high_water(pending: usize) -> bool {
    pending > 0 && pending % BACKLOG_WARN_THRESHOLD == 0
}

#[derive(Debug)]
struct SubscriberEntry {
    /// `None` subscribes to every topic.
    topics: Option<HashSet<Topic>>,
    ingress: mpsc::UnboundedSender<Event>,
    /// Events accepted by `publish` but not yet handed to the subscriber's
    /// bounded queue.
    backlog: Arc<AtomicUsize>,
}

impl SubscriberEntry {
    fn wants(&self, topic: Topic) -> bool {
        self.topics.as_ref().map_or(true, |t| t.contains(&topic))
    }
}

/// Hub statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    pub total_published: u64,
    pub total_delivered: u64,
    pub current_subscribers: usize,
}

/// Typed in-process publish/subscribe.
#[derive(Debug, Default)]
pub struct Hub {
    subscribers: RwLock<HashMap<SubscriberId, SubscriberEntry>>,
    next_id: AtomicU64,
    published: AtomicU64,
    delivered: AtomicU64,
}

/// The receiving side of a subscription.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Event>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Receive the next event. Returns `None` once the subscription has been
    /// removed and every queued event has been drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

impl Hub {
    /// Create a new hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to `topics` (all topics when empty) with a buffer of
    /// `buffer` events. Must be called within a Tokio runtime.
    pub fn subscribe(&self, buffer: usize, topics: &[Topic]) -> Result<Subscription> {
        if buffer == 0 {
            return Err(HubError::InvalidBuffer);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (ingress, mut ingress_rx) = mpsc::unbounded_channel::<Event>();
        let (tx, rx) = mpsc::channel::<Event>(buffer);
        let backlog = Arc::new(AtomicUsize::new(0));
        let pending = backlog.clone();

        tokio::spawn(async move {
            while let Some(event) = ingress_rx.recv().await {
                if tx.send(event).await.is_err() {
                    break;
                }
                pending.fetch_sub(1, Ordering::Relaxed);
            }
            trace!(subscriber = id, "Hub forwarder finished");
        });

        let topics = if topics.is_empty() {
            None
        } else {
            Some(topics.iter().copied().collect())
        };
        self.subscribers
            .write()
            .insert(
                id,
                SubscriberEntry {
                    topics,
                    ingress,
                    backlog,
                },
            );

        debug!(subscriber = id, buffer, "Hub subscriber added");
        Ok(Subscription { id, rx })
    }

    /// Remove a subscription. Events already published to it are still
    /// delivered, after which its receiver yields `None`.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.write().remove(&id).is_some();
        if removed {
            debug!(subscriber = id, "Hub subscriber removed");
        }
        removed
    }

    /// Publish an event to every interested subscriber. Returns the number
    /// of subscribers it was enqueued for.
    pub fn publish(&self, event: Event) -> usize {
        let topic = event.topic;
        let mut delivered = 0;
        let mut dead = Vec::new();

        {
            let subscribers = self.subscribers.read();
            for (id, entry) in subscribers.iter() {
                if !entry.wants(topic) {
                    continue;
                }
                if entry.ingress.send(event.clone()).is_ok() {
                    delivered += 1;
                    let pending = entry.backlog.fetch_add(1, Ordering::Relaxed) + 1;
                    if crosses_high_water(pending) {
                        warn!(subscriber = id, pending, "Hub subscriber is falling behind");
                    }
                } else {
                    dead.push(*id);
                }
            }
        }

        if !dead.is_empty() {
            let mut subscribers = self.subscribers.write();
            for id in dead {
                subscribers.remove(&id);
            }
        }

        self.published.fetch_add(1, Ordering::Relaxed);
        self.delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        trace!(topic = %topic, recipients = delivered, "Event published");
        delivered
    }

    /// Events waiting in `id`'s ingress, or `None` for unknown subscribers.
    pub fn backlog(&self, id: SubscriberId) -> Option<usize> {
        self.subscribers
            .read()
            .get(&id)
            .map(|entry| entry.backlog.load(Ordering::Relaxed))
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            total_published: self.published.load(Ordering::Relaxed),
            total_delivered: self.delivered.load(Ordering::Relaxed),
            current_subscribers: self.subscriber_count(),
        }
    }
}
