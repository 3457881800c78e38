//! Ephemeral channel presence.
//!
//! Clients report `(channel, status)` every few seconds. Entries not
//! refreshed within the TTL are reaped by [`HeartbeatTracker::run`]. The
//! tracker also derives user online/offline transitions: a user is online
//! while at least one heartbeat entry exists for them.

use crate::error::RealtimeError;
use crate::Result;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use traq_hub::{fields, Event, Field, Hub, Topic, Viewer};
use traq_repository::{Repository, UserRepository};
use traq_types::{ChannelId, Timestamp, UserId};

/// Default time after which an unrefreshed entry is dropped.
pub const DEFAULT_HEARTBEAT_TTL: Duration = Duration::from_secs(5);

/// Present on the channel but not looking at it.
pub const STATUS_NONE: &str = "none";

/// Accepted heartbeat statuses.
pub const STATUSES: [&str; 4] = [STATUS_NONE, "monitoring", "viewing", "editing"];

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    user_id: UserId,
    status: String,
    last_time: Timestamp,
}

impl From<&Entry> for Viewer {
    fn from(e: &Entry) -> Self {
        Viewer {
            user_id: e.user_id,
            status: e.status.clone(),
            updated_at: e.last_time,
        }
    }
}

pub struct HeartbeatTracker {
    channels: RwLock<HashMap<ChannelId, Vec<Entry>>>,
    hub: Arc<Hub>,
    repo: Arc<dyn Repository>,
    ttl: Duration,
}

impl HeartbeatTracker {
    pub fn new(repo: Arc<dyn Repository>, hub: Arc<Hub>, ttl: Duration) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            hub,
            repo,
            ttl,
        }
    }

    /// Refresh a user's presence on a channel.
    pub fn update(&self, user_id: UserId, channel_id: ChannelId, status: &str) -> Result<()> {
        self.update_at(user_id, channel_id, status, Timestamp::now())
    }

    pub(crate) fn update_at(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
        status: &str,
        now: Timestamp,
    ) -> Result<()> {
        if !STATUSES.contains(&status) {
            return Err(RealtimeError::InvalidStatus(status.to_string()));
        }

        let (came_online, changed) = {
            let mut channels = self.channels.write();
            let came_online = !channels
                .values()
                .any(|entries| entries.iter().any(|e| e.user_id == user_id));
            let entries = channels.entry(channel_id).or_default();
            let changed = match entries.iter_mut().find(|e| e.user_id == user_id) {
                Some(entry) => {
                    entry.last_time = now;
                    if entry.status != status {
                        entry.status = status.to_string();
                        Some(entries.iter().map(Viewer::from).collect::<Vec<_>>())
                    } else {
                        None
                    }
                }
                None => {
                    entries.push(Entry {
                        user_id,
                        status: status.to_string(),
                        last_time: now,
                    });
                    Some(entries.iter().map(Viewer::from).collect())
                }
            };
            (came_online, changed)
        };

        if came_online {
            self.hub
                .publish(Event::new(Topic::UserOnline).with_id(fields::USER_ID, user_id));
        }
        if let Some(viewers) = changed {
            self.publish_viewers(channel_id, viewers);
        }
        Ok(())
    }

    /// Reap stale entries as of `now`.
    pub fn sweep(&self, now: Timestamp) {
        let ttl_secs = self.ttl.as_secs() as i64;
        let mut changed: Vec<(ChannelId, Vec<Viewer>)> = Vec::new();
        let mut offline: Vec<UserId> = Vec::new();
        {
            let mut channels = self.channels.write();
            let mut reaped: HashSet<UserId> = HashSet::new();
            for (channel_id, entries) in channels.iter_mut() {
                let before = entries.len();
                entries.retain(|e| {
                    let stale = e.last_time.older_than(ttl_secs, now);
                    if stale {
                        reaped.insert(e.user_id);
                    }
                    !stale
                });
                if entries.len() != before {
                    changed.push((*channel_id, entries.iter().map(Viewer::from).collect()));
                }
            }
            channels.retain(|_, entries| !entries.is_empty());

            for user_id in reaped {
                let still_present = channels
                    .values()
                    .any(|entries| entries.iter().any(|e| e.user_id == user_id));
                if !still_present {
                    offline.push(user_id);
                }
            }
        }

        for (channel_id, viewers) in changed {
            self.publish_viewers(channel_id, viewers);
        }
        for user_id in offline {
            debug!(user_id = %user_id, "User went offline");
            if let Err(e) = self.repo.update_user_last_online(user_id, now) {
                warn!(user_id = %user_id, error = %e, "Failed to record last online time");
            }
            self.hub.publish(
                Event::new(Topic::UserOffline)
                    .with_id(fields::USER_ID, user_id)
                    .with(fields::TIME, Field::Time(now)),
            );
        }
    }

    /// Sweep once a second until cancelled.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.sweep(Timestamp::now()),
            }
        }
        debug!("Heartbeat sweeper stopped");
    }

    /// Users whose status on the channel is anything but `none`.
    pub fn viewing_users(&self, channel_id: ChannelId) -> Vec<UserId> {
        self.channels
            .read()
            .get(&channel_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.status != STATUS_NONE)
                    .map(|e| e.user_id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every user with a heartbeat entry on the channel.
    pub fn present_users(&self, channel_id: ChannelId) -> Vec<UserId> {
        self.channels
            .read()
            .get(&channel_id)
            .map(|entries| entries.iter().map(|e| e.user_id).collect())
            .unwrap_or_default()
    }

    pub fn entries(&self, channel_id: ChannelId) -> Vec<Viewer> {
        self.channels
            .read()
            .get(&channel_id)
            .map(|entries| entries.iter().map(Viewer::from).collect())
            .unwrap_or_default()
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.channels
            .read()
            .values()
            .any(|entries| entries.iter().any(|e| e.user_id == user_id))
    }

    fn publish_viewers(&self, channel_id: ChannelId, viewers: Vec<Viewer>) {
        self.hub.publish(
            Event::new(Topic::ChannelViewersChanged)
                .with_id(fields::CHANNEL_ID, channel_id)
                .with(fields::VIEWERS, Field::Viewers(viewers)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use traq_repository::MemoryRepository;
    use traq_types::User;
    use uuid::Uuid;

    fn setup() -> (HeartbeatTracker, Arc<dyn Repository>, traq_hub::Subscription) {
        let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
        let hub = Arc::new(Hub::new());
        let sub = hub.subscribe(64, &[]).unwrap();
        (HeartbeatTracker::new(repo.clone(), hub, DEFAULT_HEARTBEAT_TTL), repo, sub)
    }

    fn topics(sub: &mut traq_hub::Subscription) -> Vec<Topic> {
        std::iter::from_fn(|| sub.try_recv()).map(|e| e.topic).collect()
    }

    #[tokio::test]
    async fn test_update_tracks_viewers_and_presence() {
        let (tracker, _, mut sub) = setup();
        let channel = Uuid::new_v4();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let t0 = Timestamp::from_millis(1_000_000);

        tracker.update_at(alice, channel, "viewing", t0).unwrap();
        tracker.update_at(bob, channel, "none", t0).unwrap();
        assert!(tracker.update_at(bob, channel, "sleeping", t0).is_err());

        assert_eq!(tracker.viewing_users(channel), vec![alice]);
        assert_eq!(tracker.present_users(channel).len(), 2);

        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            topics(&mut sub),
            vec![
                Topic::UserOnline,
                Topic::ChannelViewersChanged,
                Topic::UserOnline,
                Topic::ChannelViewersChanged,
            ]
        );

        // Refreshing with the same status changes nothing observable.
        tracker.update_at(alice, channel, "viewing", t0.add_secs(1)).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(topics(&mut sub).is_empty());
    }

    #[tokio::test]
    async fn test_sweep_expires_entries_and_reports_offline() {
        let (tracker, repo, mut sub) = setup();
        let user = repo.create_user(User::new("alice", "alice", String::new())).unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let t0 = Timestamp::from_millis(1_000_000);

        tracker.update_at(user.id, a, "viewing", t0).unwrap();
        tracker.update_at(user.id, b, "editing", t0.add_secs(4)).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        topics(&mut sub);

        // Only the first entry is past the TTL.
        tracker.sweep(t0.add_secs(6));
        assert!(tracker.present_users(a).is_empty());
        assert!(tracker.is_online(user.id));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(topics(&mut sub), vec![Topic::ChannelViewersChanged]);

        tracker.sweep(t0.add_secs(10));
        assert!(!tracker.is_online(user.id));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            topics(&mut sub),
            vec![Topic::ChannelViewersChanged, Topic::UserOffline]
        );
        assert_eq!(
            repo.get_user(user.id).unwrap().last_online,
            Some(t0.add_secs(10))
        );
    }
}
