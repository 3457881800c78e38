//! Posting, editing, deleting and pinning messages.

use crate::error::MessageError;
use crate::Result;
use std::sync::Arc;
use tracing::{debug, info};
use traq_hub::{fields, Event, Field, Hub, Topic};
use traq_repository::{ChannelRepository, MessageRepository, Repository, UserRepository};
use traq_types::{embed, ChannelId, Message, MessageId, Pin, UserId};
use uuid::Uuid;

/// Maximum message length in characters.
pub const MAX_MESSAGE_LENGTH: usize = 10_000;

/// Message commands. Every mutation publishes the matching `message.*`
/// event.
#[derive(Clone)]
pub struct MessageService {
    repo: Arc<dyn Repository>,
    hub: Arc<Hub>,
}

impl MessageService {
    pub fn new(repo: Arc<dyn Repository>, hub: Arc<Hub>) -> Self {
        Self { repo, hub }
    }

    /// Post a message as `author_id`.
    pub fn create(&self, author_id: UserId, channel_id: ChannelId, text: &str) -> Result<Message> {
        validate_text(text)?;
        let author = self.repo.get_user(author_id)?;
        if !author.is_active() {
            return Err(MessageError::Forbidden("inactive users cannot post".into()));
        }
        let channel = self.require_accessible(author_id, channel_id)?;

        let message = self.repo.create_message(author_id, channel.id, text)?;
        let parsed = embed::parse(text);
        info!(
            message_id = %message.id,
            channel_id = %channel.id,
            author_id = %author_id,
            "Message created"
        );
        self.hub.publish(
            Event::new(Topic::MessageCreated)
                .with(fields::MESSAGE, Field::Message(Box::new(message.clone())))
                .with(fields::PARSE_RESULT, Field::ParseResult(Box::new(parsed)))
                .with(fields::CHANNEL, Field::Channel(Box::new(channel))),
        );
        Ok(message)
    }

    /// Fetch a message the user may see.
    pub fn get(&self, user_id: UserId, id: MessageId) -> Result<Message> {
        let message = self.repo.get_message(id)?;
        if !self.repo.is_channel_accessible(user_id, message.channel_id) {
            return Err(MessageError::NotFound(format!("message {}", id)));
        }
        Ok(message)
    }

    /// Messages of a channel, newest first.
    pub fn list(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Message>> {
        self.require_accessible(user_id, channel_id)?;
        Ok(self.repo.list_messages(channel_id, limit, offset))
    }

    /// The newest message of every channel the user can read.
    pub fn latest(&self, user_id: UserId, limit: usize) -> Vec<Message> {
        self.repo
            .latest_messages(usize::MAX)
            .into_iter()
            .filter(|m| self.repo.is_channel_accessible(user_id, m.channel_id))
            .take(limit)
            .collect()
    }

    /// Replace the text of a message. Only the author may edit.
    pub fn edit(&self, actor_id: UserId, id: MessageId, text: &str) -> Result<Message> {
        validate_text(text)?;
        let message = self.get(actor_id, id)?;
        if message.user_id != actor_id {
            return Err(MessageError::Forbidden("only the author can edit a message".into()));
        }

        let message = self.repo.update_message(id, text)?;
        debug!(message_id = %id, "Message updated");
        self.hub.publish(
            Event::new(Topic::MessageUpdated)
                .with(fields::MESSAGE, Field::Message(Box::new(message.clone())))
                .with(
                    fields::PARSE_RESULT,
                    Field::ParseResult(Box::new(embed::parse(text))),
                ),
        );
        Ok(message)
    }

    /// Delete a message. Only the author may delete.
    pub fn delete(&self, actor_id: UserId, id: MessageId) -> Result<()> {
        let message = self.get(actor_id, id)?;
        if message.user_id != actor_id {
            return Err(MessageError::Forbidden("only the author can delete a message".into()));
        }

        let message = self.repo.delete_message(id)?;
        info!(message_id = %id, "Message deleted");
        self.hub.publish(
            Event::new(Topic::MessageDeleted)
                .with(fields::MESSAGE, Field::Message(Box::new(message))),
        );
        Ok(())
    }

    /// Pin a message. Pinning twice returns the existing pin.
    pub fn pin(&self, actor_id: UserId, message_id: MessageId) -> Result<Pin> {
        let message = self.get(actor_id, message_id)?;
        let (pin, created) = self.repo.pin_message(message_id, actor_id)?;
        if created {
            self.hub.publish(
                Event::new(Topic::MessagePinned)
                    .with_id(fields::PIN_ID, pin.id)
                    .with_id(fields::MESSAGE_ID, message_id)
                    .with_id(fields::CHANNEL_ID, message.channel_id)
                    .with_id(fields::USER_ID, actor_id),
            );
        }
        Ok(pin)
    }

    pub fn get_pin(&self, user_id: UserId, pin_id: Uuid) -> Result<Pin> {
        let pin = self.repo.get_pin(pin_id)?;
        self.get(user_id, pin.message_id)?;
        Ok(pin)
    }

    pub fn unpin(&self, actor_id: UserId, pin_id: Uuid) -> Result<()> {
        let pin = self.get_pin(actor_id, pin_id)?;
        let message = self.repo.get_message(pin.message_id)?;
        self.repo.delete_pin(pin_id)?;
        self.hub.publish(
            Event::new(Topic::MessageUnpinned)
                .with_id(fields::PIN_ID, pin.id)
                .with_id(fields::MESSAGE_ID, pin.message_id)
                .with_id(fields::CHANNEL_ID, message.channel_id)
                .with_id(fields::USER_ID, actor_id),
        );
        Ok(())
    }

    pub fn channel_pins(&self, user_id: UserId, channel_id: ChannelId) -> Result<Vec<Pin>> {
        self.require_accessible(user_id, channel_id)?;
        Ok(self.repo.get_channel_pins(channel_id))
    }

    fn require_accessible(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
    ) -> Result<traq_types::Channel> {
        if !self.repo.is_channel_accessible(user_id, channel_id) {
            return Err(MessageError::NotFound(format!("channel {}", channel_id)));
        }
        Ok(self.repo.get_channel(channel_id)?)
    }
}

fn validate_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(MessageError::InvalidArgument("message text is empty".into()));
    }
    if text.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(MessageError::InvalidArgument(format!(
            "message text exceeds {} characters",
            MAX_MESSAGE_LENGTH
        )));
    }
    Ok(())
}
