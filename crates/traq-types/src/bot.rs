//! Bots, bot event types and delivery logs.

use crate::{Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Events a bot can subscribe to. Wire names are upper snake case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BotEventType {
    Ping,
    Joined,
    Left,
    MessageCreated,
    MessageUpdated,
    MessageDeleted,
    BotMessageStampsUpdated,
    MentionMessageCreated,
    DirectMessageCreated,
    DirectMessageUpdated,
    DirectMessageDeleted,
    ChannelCreated,
    ChannelTopicChanged,
    UserCreated,
    StampCreated,
    TagAdded,
    TagRemoved,
    UserGroupCreated,
    UserGroupUpdated,
    UserGroupDeleted,
}

impl BotEventType {
    /// Parse from the wire name.
    pub fn from_str(s: &str) -> Option<Self> {
        Self::all().into_iter().find(|e| e.as_str() == s)
    }

    /// Get all event types.
    pub fn all() -> Vec<BotEventType> {
        vec![
            BotEventType::Ping,
            BotEventType::Joined,
            BotEventType::Left,
            BotEventType::MessageCreated,
            BotEventType::MessageUpdated,
            BotEventType::MessageDeleted,
            BotEventType::BotMessageStampsUpdated,
            BotEventType::MentionMessageCreated,
            BotEventType::DirectMessageCreated,
            BotEventType::DirectMessageUpdated,
            BotEventType::DirectMessageDeleted,
            BotEventType::ChannelCreated,
            BotEventType::ChannelTopicChanged,
            BotEventType::UserCreated,
            BotEventType::StampCreated,
            BotEventType::TagAdded,
            BotEventType::TagRemoved,
            BotEventType::UserGroupCreated,
            BotEventType::UserGroupUpdated,
            BotEventType::UserGroupDeleted,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BotEventType::Ping => "PING",
            BotEventType::Joined => "JOINED",
            BotEventType::Left => "LEFT",
            BotEventType::MessageCreated => "MESSAGE_CREATED",
            BotEventType::MessageUpdated => "MESSAGE_UPDATED",
            BotEventType::MessageDeleted => "MESSAGE_DELETED",
            BotEventType::BotMessageStampsUpdated => "BOT_MESSAGE_STAMPS_UPDATED",
            BotEventType::MentionMessageCreated => "MENTION_MESSAGE_CREATED",
            BotEventType::DirectMessageCreated => "DIRECT_MESSAGE_CREATED",
            BotEventType::DirectMessageUpdated => "DIRECT_MESSAGE_UPDATED",
            BotEventType::DirectMessageDeleted => "DIRECT_MESSAGE_DELETED",
            BotEventType::ChannelCreated => "CHANNEL_CREATED",
            BotEventType::ChannelTopicChanged => "CHANNEL_TOPIC_CHANGED",
            BotEventType::UserCreated => "USER_CREATED",
            BotEventType::StampCreated => "STAMP_CREATED",
            BotEventType::TagAdded => "TAG_ADDED",
            BotEventType::TagRemoved => "TAG_REMOVED",
            BotEventType::UserGroupCreated => "USER_GROUP_CREATED",
            BotEventType::UserGroupUpdated => "USER_GROUP_UPDATED",
            BotEventType::UserGroupDeleted => "USER_GROUP_DELETED",
        }
    }
}

impl fmt::Display for BotEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How events reach a bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BotMode {
    Http,
    WebSocket,
}

/// Delivery state of a bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotState {
    Active,
    Paused,
    Disabled,
}

impl BotState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotState::Active => "active",
            BotState::Paused => "paused",
            BotState::Disabled => "disabled",
        }
    }
}

impl fmt::Display for BotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bot registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bot {
    pub id: Uuid,
    pub bot_user_id: UserId,
    pub creator_id: UserId,
    pub description: String,
    #[serde(skip_serializing)]
    pub verification_token: String,
    pub access_token_id: Uuid,
    pub post_url: String,
    pub subscribe_events: BTreeSet<BotEventType>,
    pub mode: BotMode,
    pub state: BotState,
    pub privileged: bool,
    #[serde(skip_serializing)]
    pub bot_code: String,
    /// Consecutive non-`ok` deliveries since the last success.
    pub consecutive_failures: u32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Bot {
    /// Check if this bot should receive an event of the given type.
    pub fn should_receive(&self, event: BotEventType) -> bool {
        self.state == BotState::Active
            && self.mode == BotMode::Http
            && self.subscribe_events.contains(&event)
    }
}

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotDeliveryResult {
    /// HTTP 204.
    Ok,
    /// Any other HTTP status.
    Ng,
    /// Network error or timeout.
    Ne,
}

impl BotDeliveryResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotDeliveryResult::Ok => "ok",
            BotDeliveryResult::Ng => "ng",
            BotDeliveryResult::Ne => "ne",
        }
    }
}

impl fmt::Display for BotDeliveryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotEventLog {
    pub request_id: Uuid,
    pub bot_id: Uuid,
    pub event: BotEventType,
    pub body: String,
    pub error: String,
    /// HTTP status, or -1 when no response was received.
    pub code: i32,
    pub latency_ms: u64,
    pub result: BotDeliveryResult,
    pub date_time: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_wire_names() {
        for event in BotEventType::all() {
            assert_eq!(BotEventType::from_str(event.as_str()), Some(event));
            let json = serde_json::to_string(&event).unwrap();
            assert_eq!(json, format!("\"{}\"", event.as_str()));
        }
        assert_eq!(BotEventType::from_str("message_created"), None);
    }

    #[test]
    fn test_should_receive_requires_active_http() {
        let mut bot = Bot {
            id: Uuid::new_v4(),
            bot_user_id: Uuid::new_v4(),
            creator_id: Uuid::new_v4(),
            description: String::new(),
            verification_token: "v".into(),
            access_token_id: Uuid::new_v4(),
            post_url: "http://localhost/bot".into(),
            subscribe_events: [BotEventType::MessageCreated].into_iter().collect(),
            mode: BotMode::Http,
            state: BotState::Active,
            privileged: false,
            bot_code: "code".into(),
            consecutive_failures: 0,
            created_at: Timestamp::now(),
            updated_at: Timestamp::now(),
        };
        assert!(bot.should_receive(BotEventType::MessageCreated));
        assert!(!bot.should_receive(BotEventType::Ping));

        bot.state = BotState::Paused;
        assert!(!bot.should_receive(BotEventType::MessageCreated));

        bot.state = BotState::Active;
        bot.mode = BotMode::WebSocket;
        assert!(!bot.should_receive(BotEventType::MessageCreated));
    }
}
