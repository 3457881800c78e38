//! Hub consumer that turns domain events into bot deliveries.

use crate::dispatcher::{BotConfig, Dispatcher};
use crate::error::BotError;
use crate::metrics::BotMetrics;
use crate::payload;
use crate::pool::{Job, WorkerPool};
use crate::sender::EventSender;
use crate::Result;
use bytes::Bytes;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use traq_hub::{fields, Event, Hub, Topic};
use traq_repository::{
    BotRepository, ChannelRepository, MessageRepository, Repository, StampRepository,
    TagRepository, UserRepository,
};
use traq_types::{
    embed, Bot, BotDeliveryResult, BotEventType, BotMode, BotState, Channel, Timestamp,
};
use uuid::Uuid;

/// Hub buffer of the bot subscriber.
pub const BOT_HUB_BUFFER: usize = 1024;

/// Hub topics that can produce a bot event.
pub const BOT_TOPICS: &[Topic] = &[
    Topic::MessageCreated,
    Topic::MessageUpdated,
    Topic::MessageDeleted,
    Topic::MessageStamped,
    Topic::MessageUnstamped,
    Topic::ChannelCreated,
    Topic::ChannelTopicUpdated,
    Topic::UserJoined,
    Topic::StampCreated,
    Topic::UserTagAdded,
    Topic::UserTagRemoved,
    Topic::UserGroupCreated,
    Topic::UserGroupUpdated,
    Topic::UserGroupDeleted,
    Topic::BotJoined,
    Topic::BotLeft,
];

/// One bot event ready to be queued.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub bot_id: Uuid,
    pub event: BotEventType,
    pub body: Bytes,
}

pub struct BotEngine {
    repo: Arc<dyn Repository>,
    dispatcher: Arc<Dispatcher>,
    pool: WorkerPool,
}

impl BotEngine {
    /// Create the engine and start its delivery workers. Must be called
    /// inside a Tokio runtime.
    pub fn start(
        repo: Arc<dyn Repository>,
        sender: Arc<dyn EventSender>,
        config: BotConfig,
        metrics: BotMetrics,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        let dispatcher = Arc::new(Dispatcher::new(
            repo.clone(),
            sender,
            metrics,
            config.pause_threshold,
        ));
        let pool = WorkerPool::spawn(config.workers, dispatcher.clone(), shutdown);
        info!(workers = pool.workers(), "Bot engine started");
        Arc::new(Self {
            repo,
            dispatcher,
            pool,
        })
    }

    /// Subscribe to the hub and queue deliveries until cancelled.
    pub fn spawn(self: Arc<Self>, hub: &Hub, shutdown: CancellationToken) -> Result<JoinHandle<()>> {
        let mut sub = hub.subscribe(BOT_HUB_BUFFER, BOT_TOPICS)?;
        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = sub.recv() => match event {
                        Some(event) => {
                            if let Err(e) = self.handle(&event).await {
                                warn!(topic = %event.topic, error = %e, "Failed to process bot event");
                            }
                        }
                        None => break,
                    },
                }
            }
            self.pool.join().await;
            info!("Bot engine stopped");
        }))
    }

    /// Queue every delivery produced by `event`. Returns how many were queued.
    pub async fn handle(&self, event: &Event) -> Result<usize> {
        let deliveries = self.plan(event)?;
        let count = deliveries.len();
        for delivery in deliveries {
            self.pool
                .submit(Job {
                    bot_id: delivery.bot_id,
                    event: delivery.event,
                    body: delivery.body,
                })
                .await?;
        }
        if count > 0 {
            debug!(topic = %event.topic, count, "Queued bot deliveries");
        }
        Ok(count)
    }

    /// Send `PING` right away. A 204 echoing the verification token activates
    /// the bot, anything else pauses it. Disabled bots keep their state.
    pub async fn ping(&self, bot_id: Uuid) -> Result<BotDeliveryResult> {
        let bot = self.repo.get_bot(bot_id)?;
        let now = Timestamp::now();
        let result = self
            .dispatcher
            .send(&bot, BotEventType::Ping, encode(now, json!({}))?)
            .await;

        let ok = result == BotDeliveryResult::Ok;
        self.repo.modify_bot(bot_id, &mut |bot: &mut Bot| {
            if bot.state == BotState::Disabled {
                return;
            }
            bot.state = if ok { BotState::Active } else { BotState::Paused };
            if ok {
                bot.consecutive_failures = 0;
            }
            bot.updated_at = now;
        })?;
        info!(bot_id = %bot_id, result = %result, "Bot pinged");
        Ok(result)
    }

    /// Work out which bots receive `event` and with which body.
    pub fn plan(&self, event: &Event) -> Result<Vec<Delivery>> {
        let now = Timestamp::now();
        let repo = self.repo.as_ref();

        match event.topic {
            Topic::MessageCreated => self.plan_message_created(event, now),
            Topic::MessageUpdated => self.plan_message_updated(event, now),
            Topic::MessageDeleted => self.plan_message_deleted(event, now),
            Topic::MessageStamped | Topic::MessageUnstamped => {
                let message_id = require(event, event.id(fields::MESSAGE_ID), fields::MESSAGE_ID)?;
                let Ok(message) = repo.get_message(message_id) else {
                    return Ok(Vec::new());
                };
                let targets: Vec<Bot> = self
                    .subscribed(BotEventType::BotMessageStampsUpdated)
                    .into_iter()
                    .filter(|b| b.bot_user_id == message.user_id)
                    .collect();
                if targets.is_empty() {
                    return Ok(Vec::new());
                }
                let stamps = payload::stamps(repo, &repo.get_message_stamps(message_id));
                let body = encode(now, json!({ "messageId": message_id, "stamps": stamps }))?;
                Ok(to_all(&targets, BotEventType::BotMessageStampsUpdated, body))
            }
            Topic::ChannelCreated => {
                let channel = require(event, event.channel(), fields::CHANNEL)?;
                if !channel.is_public || channel.is_dm() {
                    return Ok(Vec::new());
                }
                let body = encode(now, json!({ "channel": payload::channel(repo, channel) }))?;
                Ok(to_all(
                    &self.subscribed(BotEventType::ChannelCreated),
                    BotEventType::ChannelCreated,
                    body,
                ))
            }
            Topic::ChannelTopicUpdated => {
                let channel = require(event, event.channel(), fields::CHANNEL)?;
                let topic = event.text(fields::TOPIC).unwrap_or(&channel.topic);
                let updater = event
                    .id(fields::USER_ID)
                    .and_then(|id| repo.get_user(id).ok())
                    .as_ref()
                    .map(payload::UserPayload::from);
                let body = encode(
                    now,
                    json!({
                        "channel": payload::channel(repo, channel),
                        "topic": topic,
                        "updater": updater,
                    }),
                )?;
                Ok(to_all(
                    &self.channel_targets(channel.id, BotEventType::ChannelTopicChanged),
                    BotEventType::ChannelTopicChanged,
                    body,
                ))
            }
            Topic::UserJoined => {
                let user = match event.user() {
                    Some(user) => user.clone(),
                    None => repo.get_user(require(event, event.id(fields::USER_ID), fields::USER_ID)?)?,
                };
                let body = encode(now, json!({ "user": payload::UserPayload::from(&user) }))?;
                Ok(to_all(
                    &self.subscribed(BotEventType::UserCreated),
                    BotEventType::UserCreated,
                    body,
                ))
            }
            Topic::StampCreated => {
                let stamp = match event.stamp() {
                    Some(stamp) => stamp.clone(),
                    None => repo.get_stamp(require(event, event.id(fields::STAMP_ID), fields::STAMP_ID)?)?,
                };
                let body = encode(now, payload::stamp_created(repo, &stamp))?;
                Ok(to_all(
                    &self.subscribed(BotEventType::StampCreated),
                    BotEventType::StampCreated,
                    body,
                ))
            }
            Topic::UserTagAdded | Topic::UserTagRemoved => {
                let kind = if event.topic == Topic::UserTagAdded {
                    BotEventType::TagAdded
                } else {
                    BotEventType::TagRemoved
                };
                let user_id = require(event, event.id(fields::USER_ID), fields::USER_ID)?;
                let tag_id = require(event, event.id(fields::TAG_ID), fields::TAG_ID)?;
                let targets: Vec<Bot> = self
                    .subscribed(kind)
                    .into_iter()
                    .filter(|b| b.bot_user_id == user_id)
                    .collect();
                if targets.is_empty() {
                    return Ok(Vec::new());
                }
                let tag = repo.get_tag(tag_id)?;
                Ok(to_all(&targets, kind, encode(now, payload::tag(&tag))?))
            }
            Topic::UserGroupCreated => {
                let group_id = require(event, event.id(fields::GROUP_ID), fields::GROUP_ID)?;
                let group = repo.get_user_group(group_id)?;
                let body = encode(now, json!({ "group": payload::group(&group) }))?;
                Ok(to_all(
                    &self.subscribed(BotEventType::UserGroupCreated),
                    BotEventType::UserGroupCreated,
                    body,
                ))
            }
            Topic::UserGroupUpdated | Topic::UserGroupDeleted => {
                let kind = if event.topic == Topic::UserGroupUpdated {
                    BotEventType::UserGroupUpdated
                } else {
                    BotEventType::UserGroupDeleted
                };
                let group_id = require(event, event.id(fields::GROUP_ID), fields::GROUP_ID)?;
                let body = encode(now, json!({ "groupId": group_id }))?;
                Ok(to_all(&self.subscribed(kind), kind, body))
            }
            Topic::BotJoined | Topic::BotLeft => {
                let kind = if event.topic == Topic::BotJoined {
                    BotEventType::Joined
                } else {
                    BotEventType::Left
                };
                let bot_id = require(event, event.id(fields::BOT_ID), fields::BOT_ID)?;
                let channel_id = require(event, event.id(fields::CHANNEL_ID), fields::CHANNEL_ID)?;
                let bot = repo.get_bot(bot_id)?;
                if bot.state != BotState::Active || bot.mode != BotMode::Http {
                    return Ok(Vec::new());
                }
                let channel = repo
                    .get_channel(channel_id)
                    .ok()
                    .map(|c| payload::channel(repo, &c));
                let body = encode(now, json!({ "channelId": channel_id, "channel": channel }))?;
                Ok(to_all(&[bot], kind, body))
            }
            _ => Ok(Vec::new()),
        }
    }

    fn plan_message_created(&self, event: &Event, now: Timestamp) -> Result<Vec<Delivery>> {
        let repo = self.repo.as_ref();
        let message = require(event, event.message(), fields::MESSAGE)?;
        let channel = self.event_channel(event, message.channel_id)?;
        let parsed = event
            .parse_result()
            .cloned()
            .unwrap_or_else(|| embed::parse(&message.text));
        let body = encode(now, json!({ "message": payload::message(repo, message, &parsed) }))?;

        if channel.is_dm() {
            let members = repo.get_private_channel_members(channel.id);
            let targets: Vec<Bot> = self
                .subscribed(BotEventType::DirectMessageCreated)
                .into_iter()
                .filter(|b| b.bot_user_id != message.user_id && members.contains(&b.bot_user_id))
                .collect();
            return Ok(to_all(&targets, BotEventType::DirectMessageCreated, body));
        }

        let mut deliveries = Vec::new();
        let mut reached = HashSet::new();
        for bot in self.channel_targets(channel.id, BotEventType::MessageCreated) {
            if bot.bot_user_id == message.user_id {
                continue;
            }
            reached.insert(bot.id);
            deliveries.push(Delivery {
                bot_id: bot.id,
                event: BotEventType::MessageCreated,
                body: body.clone(),
            });
        }
        for bot in self.subscribed(BotEventType::MentionMessageCreated) {
            if bot.bot_user_id == message.user_id
                || reached.contains(&bot.id)
                || !parsed.mentions.contains(&bot.bot_user_id)
            {
                continue;
            }
            deliveries.push(Delivery {
                bot_id: bot.id,
                event: BotEventType::MentionMessageCreated,
                body: body.clone(),
            });
        }
        Ok(deliveries)
    }

    fn plan_message_updated(&self, event: &Event, now: Timestamp) -> Result<Vec<Delivery>> {
        let repo = self.repo.as_ref();
        let message = require(event, event.message(), fields::MESSAGE)?;
        let channel = self.event_channel(event, message.channel_id)?;
        let parsed = event
            .parse_result()
            .cloned()
            .unwrap_or_else(|| embed::parse(&message.text));
        let body = encode(now, json!({ "message": payload::message(repo, message, &parsed) }))?;

        let (kind, targets) = self.message_targets(&channel, message.user_id, true);
        Ok(to_all(&targets, kind, body))
    }

    fn plan_message_deleted(&self, event: &Event, now: Timestamp) -> Result<Vec<Delivery>> {
        let message = require(event, event.message(), fields::MESSAGE)?;
        let channel = self.event_channel(event, message.channel_id)?;
        let body = if channel.is_dm() {
            json!({ "message": { "id": message.id, "userId": message.user_id, "channelId": channel.id } })
        } else {
            json!({ "message": { "id": message.id, "channelId": channel.id } })
        };
        let (kind, targets) = self.message_targets(&channel, message.user_id, false);
        Ok(to_all(&targets, kind, encode(now, body)?))
    }

    /// Recipients of an update or delete in `channel`, excluding the author.
    fn message_targets(
        &self,
        channel: &Channel,
        author_id: Uuid,
        updated: bool,
    ) -> (BotEventType, Vec<Bot>) {
        let (kind, bots) = if channel.is_dm() {
            let kind = if updated {
                BotEventType::DirectMessageUpdated
            } else {
                BotEventType::DirectMessageDeleted
            };
            let members = self.repo.get_private_channel_members(channel.id);
            let bots = self
                .subscribed(kind)
                .into_iter()
                .filter(|b| members.contains(&b.bot_user_id))
                .collect();
            (kind, bots)
        } else {
            let kind = if updated {
                BotEventType::MessageUpdated
            } else {
                BotEventType::MessageDeleted
            };
            (kind, self.channel_targets(channel.id, kind))
        };
        let bots = bots
            .into_iter()
            .filter(|b: &Bot| b.bot_user_id != author_id)
            .collect();
        (kind, bots)
    }

    fn event_channel(&self, event: &Event, channel_id: Uuid) -> Result<Channel> {
        match event.channel() {
            Some(channel) => Ok(channel.clone()),
            None => Ok(self.repo.get_channel(channel_id)?),
        }
    }

    /// Active HTTP bots subscribed to `kind`.
    fn subscribed(&self, kind: BotEventType) -> Vec<Bot> {
        self.repo
            .list_bots()
            .into_iter()
            .filter(|b| b.should_receive(kind))
            .collect()
    }

    /// Subscribed bots that joined `channel_id`, plus privileged bots.
    fn channel_targets(&self, channel_id: Uuid, kind: BotEventType) -> Vec<Bot> {
        let joined: HashSet<Uuid> = self.repo.get_channel_bot_ids(channel_id).into_iter().collect();
        self.subscribed(kind)
            .into_iter()
            .filter(|b| b.privileged || joined.contains(&b.id))
            .collect()
    }
}

fn require<T>(event: &Event, value: Option<T>, field: &'static str) -> Result<T> {
    value.ok_or(BotError::MissingField {
        topic: event.topic.as_str(),
        field,
    })
}

fn encode(now: Timestamp, body: Value) -> Result<Bytes> {
    let mut bytes = serde_json::to_vec(&payload::envelope(now, body))?;
    bytes.push(b'\n');
    Ok(Bytes::from(bytes))
}

fn to_all(bots: &[Bot], event: BotEventType, body: Bytes) -> Vec<Delivery> {
    bots.iter()
        .map(|bot| Delivery {
            bot_id: bot.id,
            event,
            body: body.clone(),
        })
        .collect()
}
