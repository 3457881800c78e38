//! Messages, pins, unreads, stamps and clips.

use crate::{ChannelId, MessageId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message posted to a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub user_id: UserId,
    pub channel_id: ChannelId,
    pub text: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Message {
    pub fn new(user_id: UserId, channel_id: ChannelId, text: impl Into<String>) -> Self {
        let now = Timestamp::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            channel_id,
            text: text.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A pinned message. At most one pin exists per message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pin {
    pub id: Uuid,
    pub message_id: MessageId,
    pub user_id: UserId,
    pub created_at: Timestamp,
}

/// An unread marker for a (user, channel, message) triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unread {
    pub user_id: UserId,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    /// Set when the user was mentioned directly or through a group/tag.
    pub noticeable: bool,
    pub created_at: Timestamp,
}

/// Per-channel unread summary for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadChannel {
    pub channel_id: ChannelId,
    pub count: usize,
    pub noticeable: bool,
    pub since: Timestamp,
    pub updated_at: Timestamp,
}

/// A stamp (reaction image).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
    pub id: Uuid,
    pub name: String,
    pub creator_id: UserId,
    pub file_id: Option<Uuid>,
    pub is_unicode: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Stamp {
    pub fn new(name: impl Into<String>, creator_id: UserId, file_id: Option<Uuid>) -> Self {
        let now = Timestamp::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            creator_id,
            file_id,
            is_unicode: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A user's stamp on a message. Repeated stamping increments `count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageStamp {
    pub message_id: MessageId,
    pub stamp_id: Uuid,
    pub user_id: UserId,
    pub count: u32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A user-owned folder of clipped messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipFolder {
    pub id: Uuid,
    pub owner_id: UserId,
    pub name: String,
    pub description: String,
    pub created_at: Timestamp,
}

/// A message clipped into a folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipFolderMessage {
    pub folder_id: Uuid,
    pub message_id: MessageId,
    pub clipped_at: Timestamp,
}
