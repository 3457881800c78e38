//! Automated message producers.

use crate::error::MessageError;
use crate::service::MessageService;
use crate::Result;
use traq_types::{Bot, ChannelId, Message, UserId, Webhook};
use uuid::Uuid;

/// Something that posts messages on behalf of a bot user.
#[derive(Debug, Clone)]
pub enum Producer {
    Bot(Bot),
    Webhook(Webhook),
}

impl Producer {
    /// Id of the bot or webhook.
    pub fn id(&self) -> Uuid {
        match self {
            Producer::Bot(bot) => bot.id,
            Producer::Webhook(webhook) => webhook.id,
        }
    }

    pub fn creator_id(&self) -> UserId {
        match self {
            Producer::Bot(bot) => bot.creator_id,
            Producer::Webhook(webhook) => webhook.creator_id,
        }
    }

    /// The user that authors produced messages.
    pub fn author_id(&self) -> UserId {
        match self {
            Producer::Bot(bot) => bot.bot_user_id,
            Producer::Webhook(webhook) => webhook.bot_user_id,
        }
    }

    /// Default destination channel, if the producer is bound to one.
    pub fn channel_binding(&self) -> Option<ChannelId> {
        match self {
            Producer::Bot(_) => None,
            Producer::Webhook(webhook) => Some(webhook.channel_id),
        }
    }

    /// Post `text` to `channel_id`, or to the bound channel when `None`.
    pub fn deliver_message(
        &self,
        messages: &MessageService,
        channel_id: Option<ChannelId>,
        text: &str,
    ) -> Result<Message> {
        let channel_id = channel_id
            .or_else(|| self.channel_binding())
            .ok_or_else(|| MessageError::InvalidArgument("no destination channel".into()))?;
        messages.create(self.author_id(), channel_id, text)
    }
}
