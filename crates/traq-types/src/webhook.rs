//! Incoming webhooks.

use crate::{ChannelId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An incoming webhook. Posts are authored by its dedicated bot user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    pub id: Uuid,
    pub bot_user_id: UserId,
    pub name: String,
    pub description: String,
    /// Default destination channel.
    pub channel_id: ChannelId,
    /// HMAC secret; empty when signatures are not required.
    #[serde(skip_serializing)]
    pub secret: String,
    pub creator_id: UserId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Webhook {
    pub fn requires_signature(&self) -> bool {
        !self.secret.is_empty()
    }
}
