//! Hub consumer that writes unread rows and feeds the SSE streamer.

use crate::dispatch::{self, Strategy};
use crate::error::NotificationError;
use crate::recipients::{self, Presence};
use crate::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use traq_hub::{fields, Event, Hub};
use traq_realtime::{HeartbeatTracker, SseEvent, Streamer};
use traq_repository::{ChannelRepository, MessageRepository, Repository, UserRepository};

/// Hub buffer of the notification subscriber.
pub const NOTIFICATION_BUFFER: usize = 1024;

pub struct NotificationService {
    repo: Arc<dyn Repository>,
    streamer: Arc<Streamer>,
    heartbeat: Arc<HeartbeatTracker>,
}

impl NotificationService {
    pub fn new(
        repo: Arc<dyn Repository>,
        streamer: Arc<Streamer>,
        heartbeat: Arc<HeartbeatTracker>,
    ) -> Self {
        Self {
            repo,
            streamer,
            heartbeat,
        }
    }

    /// Subscribe to every hub topic and process events until cancelled.
    pub fn spawn(self: Arc<Self>, hub: &Hub, shutdown: CancellationToken) -> Result<JoinHandle<()>> {
        let mut sub = hub.subscribe(NOTIFICATION_BUFFER, &[])?;
        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = sub.recv() => match event {
                        Some(event) => {
                            if let Err(e) = self.handle(&event) {
                                warn!(topic = %event.topic, error = %e, "Failed to route event");
                            }
                        }
                        None => break,
                    },
                }
            }
            info!("Notification service stopped");
        }))
    }

    /// Route one hub event. Returns the number of SSE frames enqueued.
    pub fn handle(&self, event: &Event) -> Result<usize> {
        let Some(route) = dispatch::route_for(event.topic) else {
            return Ok(0);
        };
        let sse = SseEvent::new(route.event_type, dispatch::payload(event)?);

        let sent = match route.strategy {
            Strategy::Broadcast => self.streamer.broadcast(&sse),
            Strategy::UserMulticast => {
                let user_id = event.id(fields::USER_ID).ok_or(NotificationError::MissingField {
                    topic: event.topic.as_str(),
                    field: fields::USER_ID,
                })?;
                self.streamer.multicast(&[user_id], &sse)
            }
            Strategy::ChannelViewerMulticast => {
                let channel_id = event.channel_id().ok_or(NotificationError::MissingField {
                    topic: event.topic.as_str(),
                    field: fields::CHANNEL_ID,
                })?;
                let viewers = self.heartbeat.present_users(channel_id);
                self.streamer.multicast(&viewers, &sse)
            }
            Strategy::ChannelScoped => {
                if event.bool(fields::IS_PUBLIC).unwrap_or(true) {
                    self.streamer.broadcast(&sse)
                } else {
                    let members = event.ids(fields::MEMBERS).unwrap_or_default();
                    self.streamer.multicast(members, &sse)
                }
            }
            Strategy::MessageRecipients => self.on_message_created(event, &sse)?,
        };
        Ok(sent)
    }

    fn on_message_created(&self, event: &Event, sse: &SseEvent) -> Result<usize> {
        let message = event.message().ok_or(NotificationError::MissingField {
            topic: event.topic.as_str(),
            field: fields::MESSAGE,
        })?;
        let channel = match event.channel() {
            Some(channel) => channel.clone(),
            None => self.repo.get_channel(message.channel_id)?,
        };
        let parsed = event.parse_result().cloned().unwrap_or_default();

        let present = self.heartbeat.present_users(channel.id);
        let viewing = self.heartbeat.viewing_users(channel.id);
        let recipients = recipients::compute(
            self.repo.as_ref(),
            &channel,
            message,
            &parsed,
            Presence {
                present: &present,
                viewing: &viewing,
            },
        )?;

        for &user_id in &recipients.unread {
            let noticeable = recipients.noticeable.contains(&user_id);
            if let Err(e) = self
                .repo
                .set_unread(user_id, channel.id, message.id, noticeable)
            {
                warn!(user_id = %user_id, message_id = %message.id, error = %e, "Failed to set unread");
            }
        }

        if !recipients.push.is_empty() {
            let targets: Vec<_> = recipients.push.iter().copied().collect();
            let devices = self.repo.get_device_tokens(&targets);
            debug!(
                message_id = %message.id,
                users = targets.len(),
                devices = devices.len(),
                "Push targets resolved"
            );
        }

        let sent = self.streamer.multicast(&recipients.stream_targets(), sse);
        debug!(
            message_id = %message.id,
            channel_id = %channel.id,
            unread = recipients.unread.len(),
            streamed = sent,
            "Message routed"
        );
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use traq_message::{MessageService, StampService};
    use traq_realtime::{WebRtcManager, DEFAULT_HEARTBEAT_TTL};
    use traq_repository::MemoryRepository;
    use traq_types::{Channel, User};

    struct Harness {
        repo: Arc<dyn Repository>,
        hub: Arc<Hub>,
        streamer: Arc<Streamer>,
        heartbeat: Arc<HeartbeatTracker>,
        service: NotificationService,
    }

    fn harness() -> Harness {
        let repo: Arc<dyn Repository> = Arc::new(MemoryRepository::new());
        let hub = Arc::new(Hub::new());
        let webrtc = Arc::new(WebRtcManager::new(hub.clone()));
        let streamer = Streamer::new(16, webrtc, CancellationToken::new());
        let heartbeat = Arc::new(HeartbeatTracker::new(repo.clone(), hub.clone(), DEFAULT_HEARTBEAT_TTL));
        let service = NotificationService::new(repo.clone(), streamer.clone(), heartbeat.clone());
        Harness {
            repo,
            hub,
            streamer,
            heartbeat,
            service,
        }
    }

    #[tokio::test]
    async fn test_forced_channel_message_creates_unreads() {
        let h = harness();
        let mut sub = h.hub.subscribe(16, &[traq_hub::Topic::MessageCreated]).unwrap();
        let users: Vec<User> = (0..5)
            .map(|i| {
                let name = format!("u{}", i);
                h.repo.create_user(User::new(&name, &name, String::new())).unwrap()
            })
            .collect();
        let bot = h.repo.create_user(User::new_bot("BOT_b", "b")).unwrap();
        let mut forced = Channel::new("general", None, true, users[0].id);
        forced.is_forced = true;
        let forced = h.repo.create_channel(forced, &[]).unwrap();

        let messages = MessageService::new(h.repo.clone(), h.hub.clone());
        let m = messages.create(users[0].id, forced.id, "hi").unwrap();
        let event = sub.recv().await.unwrap();
        h.service.handle(&event).unwrap();

        assert!(h.repo.get_unreads(users[0].id).is_empty());
        assert!(h.repo.get_unreads(bot.id).is_empty());
        for user in &users[1..] {
            let unreads = h.repo.get_unreads(user.id);
            assert_eq!(unreads.len(), 1);
            assert_eq!(unreads[0].message_id, m.id);
        }
    }

    #[tokio::test]
    async fn test_viewers_skip_unread_but_receive_stream() {
        let h = harness();
        let mut sub = h.hub.subscribe(16, &[traq_hub::Topic::MessageCreated]).unwrap();
        let alice = h.repo.create_user(User::new("alice", "alice", String::new())).unwrap();
        let bob = h.repo.create_user(User::new("bob", "bob", String::new())).unwrap();
        let carol = h.repo.create_user(User::new("carol", "carol", String::new())).unwrap();
        let channel = h
            .repo
            .create_channel(Channel::new("team", None, false, alice.id), &[alice.id, bob.id, carol.id])
            .unwrap();

        h.heartbeat.update(bob.id, channel.id, "viewing").unwrap();
        h.heartbeat.update(carol.id, channel.id, "none").unwrap();
        let mut bob_conn = h.streamer.connect(bob.id).await.unwrap();

        let messages = MessageService::new(h.repo.clone(), h.hub.clone());
        let m = messages.create(alice.id, channel.id, "hello").unwrap();
        let event = sub.recv().await.unwrap();
        assert_eq!(h.service.handle(&event).unwrap(), 1);

        assert!(h.repo.get_unreads(bob.id).is_empty());
        assert_eq!(h.repo.get_unreads(carol.id).len(), 1);
        let frame = bob_conn.recv().await.unwrap();
        assert_eq!(frame.event_type, "MESSAGE_CREATED");
        assert_eq!(frame.payload["id"], m.id.to_string());
    }

    #[tokio::test]
    async fn test_spawned_service_streams_stamp_broadcast() {
        let h = harness();
        let service = Arc::new(h.service);
        let token = CancellationToken::new();
        let handle = service.spawn(&h.hub, token.clone()).unwrap();

        let user = h.repo.create_user(User::new("alice", "alice", String::new())).unwrap();
        let mut a = h.streamer.connect(user.id).await.unwrap();
        let mut b = h.streamer.connect(user.id).await.unwrap();

        let stamps = StampService::new(h.repo.clone(), h.hub.clone());
        let stamp = stamps.create("wave", user.id, None).unwrap();

        for conn in [&mut a, &mut b] {
            let frame = tokio::time::timeout(Duration::from_secs(1), conn.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(
                frame.frame(),
                format!("event: STAMP_CREATED\ndata: {{\"id\":\"{}\"}}\n\n", stamp.id)
            );
        }

        token.cancel();
        handle.await.unwrap();
    }
}
