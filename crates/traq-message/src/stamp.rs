//! Stamps and message stamping.

use crate::error::MessageError;
use crate::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::info;
use traq_hub::{fields, Event, Field, Hub, Topic};
use traq_repository::{ChannelRepository, MessageRepository, Repository, StampRepository};
use traq_types::{MessageId, MessageStamp, Stamp, Timestamp, UserId};
use uuid::Uuid;

/// Stamp names: 1-32 ASCII letters, digits, underscores or hyphens.
pub static STAMP_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_-]{1,32}$").expect("Invalid regex"));

/// Upper bound on a single stamping request.
pub const MAX_STAMP_COUNT: u32 = 100;

#[derive(Clone)]
pub struct StampService {
    repo: Arc<dyn Repository>,
    hub: Arc<Hub>,
}

impl StampService {
    pub fn new(repo: Arc<dyn Repository>, hub: Arc<Hub>) -> Self {
        Self { repo, hub }
    }

    pub fn create(&self, name: &str, creator_id: UserId, file_id: Option<Uuid>) -> Result<Stamp> {
        if !STAMP_NAME_REGEX.is_match(name) {
            return Err(MessageError::InvalidArgument(format!("invalid stamp name '{}'", name)));
        }
        let stamp = self.repo.create_stamp(Stamp::new(name, creator_id, file_id))?;
        info!(stamp_id = %stamp.id, name = %stamp.name, "Stamp created");
        self.hub.publish(
            Event::new(Topic::StampCreated)
                .with(fields::STAMP, Field::Stamp(Box::new(stamp.clone())))
                .with_id(fields::STAMP_ID, stamp.id),
        );
        Ok(stamp)
    }

    pub fn get(&self, id: Uuid) -> Result<Stamp> {
        Ok(self.repo.get_stamp(id)?)
    }

    pub fn list(&self) -> Vec<Stamp> {
        self.repo.list_stamps()
    }

    /// Rename a stamp. Only its creator may rename it.
    pub fn rename(&self, actor_id: UserId, id: Uuid, name: &str) -> Result<Stamp> {
        if !STAMP_NAME_REGEX.is_match(name) {
            return Err(MessageError::InvalidArgument(format!("invalid stamp name '{}'", name)));
        }
        if self.repo.get_stamp(id)?.creator_id != actor_id {
            return Err(MessageError::Forbidden("only the creator can rename a stamp".into()));
        }
        let stamp = self.repo.rename_stamp(id, name)?;
        self.hub.publish(
            Event::new(Topic::StampUpdated)
                .with(fields::STAMP, Field::Stamp(Box::new(stamp.clone())))
                .with_id(fields::STAMP_ID, stamp.id),
        );
        Ok(stamp)
    }

    /// Delete a stamp. Only its creator may delete it.
    pub fn delete(&self, actor_id: UserId, id: Uuid) -> Result<()> {
        if self.repo.get_stamp(id)?.creator_id != actor_id {
            return Err(MessageError::Forbidden("only the creator can delete a stamp".into()));
        }
        self.repo.delete_stamp(id)?;
        info!(stamp_id = %id, "Stamp deleted");
        self.hub
            .publish(Event::new(Topic::StampDeleted).with_id(fields::STAMP_ID, id));
        Ok(())
    }

    /// Add `count` uses of a stamp to a message the user can see.
    pub fn stamp_message(
        &self,
        user_id: UserId,
        message_id: MessageId,
        stamp_id: Uuid,
        count: u32,
    ) -> Result<MessageStamp> {
        if count == 0 || count > MAX_STAMP_COUNT {
            return Err(MessageError::InvalidArgument(format!(
                "stamp count must be between 1 and {}",
                MAX_STAMP_COUNT
            )));
        }
        let message = self.repo.get_message(message_id)?;
        if !self.repo.is_channel_accessible(user_id, message.channel_id) {
            return Err(MessageError::NotFound(format!("message {}", message_id)));
        }

        let stamped = self
            .repo
            .add_message_stamp(message_id, stamp_id, user_id, count)?;
        self.hub.publish(
            Event::new(Topic::MessageStamped)
                .with_id(fields::MESSAGE_ID, message_id)
                .with_id(fields::CHANNEL_ID, message.channel_id)
                .with_id(fields::USER_ID, user_id)
                .with_id(fields::STAMP_ID, stamp_id)
                .with(fields::COUNT, Field::Int(i64::from(stamped.count)))
                .with(fields::TIME, Field::Time(stamped.created_at)),
        );
        Ok(stamped)
    }

    pub fn unstamp_message(&self, user_id: UserId, message_id: MessageId, stamp_id: Uuid) -> Result<()> {
        let message = self.repo.get_message(message_id)?;
        if !self.repo.is_channel_accessible(user_id, message.channel_id) {
            return Err(MessageError::NotFound(format!("message {}", message_id)));
        }
        self.repo.remove_message_stamp(message_id, stamp_id, user_id)?;
        self.hub.publish(
            Event::new(Topic::MessageUnstamped)
                .with_id(fields::MESSAGE_ID, message_id)
                .with_id(fields::CHANNEL_ID, message.channel_id)
                .with_id(fields::USER_ID, user_id)
                .with_id(fields::STAMP_ID, stamp_id),
        );
        Ok(())
    }

    pub fn message_stamps(&self, user_id: UserId, message_id: MessageId) -> Result<Vec<MessageStamp>> {
        let message = self.repo.get_message(message_id)?;
        if !self.repo.is_channel_accessible(user_id, message.channel_id) {
            return Err(MessageError::NotFound(format!("message {}", message_id)));
        }
        Ok(self.repo.get_message_stamps(message_id))
    }

    /// Stamps recently used by a user, most recent first.
    pub fn history(&self, user_id: UserId, limit: usize) -> Vec<(Uuid, Timestamp)> {
        self.repo.get_stamp_history(user_id, limit)
    }
}
