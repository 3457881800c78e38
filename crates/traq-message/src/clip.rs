//! Clip folders.

use crate::error::MessageError;
use crate::Result;
use std::sync::Arc;
use traq_hub::{fields, Event, Hub, Topic};
use traq_repository::{ChannelRepository, ClipRepository, MessageRepository, Repository};
use traq_types::{ClipFolder, ClipFolderMessage, MessageId, Timestamp, UserId};
use uuid::Uuid;

/// Maximum clip folder name length in characters.
pub const MAX_CLIP_FOLDER_NAME: usize = 30;

/// Per-user clip folders. Events are addressed to the folder owner only.
#[derive(Clone)]
pub struct ClipService {
    repo: Arc<dyn Repository>,
    hub: Arc<Hub>,
}

impl ClipService {
    pub fn new(repo: Arc<dyn Repository>, hub: Arc<Hub>) -> Self {
        Self { repo, hub }
    }

    pub fn create_folder(&self, owner_id: UserId, name: &str, description: &str) -> Result<ClipFolder> {
        let len = name.chars().count();
        if len == 0 || len > MAX_CLIP_FOLDER_NAME {
            return Err(MessageError::InvalidArgument(format!(
                "clip folder name must be 1-{} characters",
                MAX_CLIP_FOLDER_NAME
            )));
        }
        let folder = self.repo.create_clip_folder(ClipFolder {
            id: Uuid::new_v4(),
            owner_id,
            name: name.to_string(),
            description: description.to_string(),
            created_at: Timestamp::now(),
        })?;
        self.publish(Topic::ClipFolderCreated, owner_id, folder.id, None);
        Ok(folder)
    }

    pub fn folders(&self, owner_id: UserId) -> Vec<ClipFolder> {
        self.repo.list_clip_folders(owner_id)
    }

    /// Fetch a folder owned by `owner_id`. Other users' folders are reported
    /// as missing.
    pub fn folder(&self, owner_id: UserId, id: Uuid) -> Result<ClipFolder> {
        let folder = self.repo.get_clip_folder(id)?;
        if folder.owner_id != owner_id {
            return Err(MessageError::NotFound(format!("clip folder {}", id)));
        }
        Ok(folder)
    }

    pub fn delete_folder(&self, owner_id: UserId, id: Uuid) -> Result<()> {
        self.folder(owner_id, id)?;
        self.repo.delete_clip_folder(id)?;
        self.publish(Topic::ClipFolderDeleted, owner_id, id, None);
        Ok(())
    }

    pub fn add_message(&self, owner_id: UserId, folder_id: Uuid, message_id: MessageId) -> Result<ClipFolderMessage> {
        self.folder(owner_id, folder_id)?;
        let message = self.repo.get_message(message_id)?;
        if !self.repo.is_channel_accessible(owner_id, message.channel_id) {
            return Err(MessageError::NotFound(format!("message {}", message_id)));
        }
        let clip = self.repo.add_clip_message(folder_id, message_id)?;
        self.publish(Topic::ClipFolderMessageAdded, owner_id, folder_id, Some(message_id));
        Ok(clip)
    }

    pub fn remove_message(&self, owner_id: UserId, folder_id: Uuid, message_id: MessageId) -> Result<()> {
        self.folder(owner_id, folder_id)?;
        self.repo.remove_clip_message(folder_id, message_id)?;
        self.publish(Topic::ClipFolderMessageRemoved, owner_id, folder_id, Some(message_id));
        Ok(())
    }

    pub fn messages(&self, owner_id: UserId, folder_id: Uuid) -> Result<Vec<ClipFolderMessage>> {
        self.folder(owner_id, folder_id)?;
        Ok(self.repo.get_clip_messages(folder_id))
    }

    fn publish(&self, topic: Topic, owner_id: UserId, folder_id: Uuid, message_id: Option<MessageId>) {
        let mut event = Event::new(topic)
            .with_id(fields::USER_ID, owner_id)
            .with_id(fields::FOLDER_ID, folder_id);
        if let Some(message_id) = message_id {
            event = event.with_id(fields::MESSAGE_ID, message_id);
        }
        self.hub.publish(event);
    }
}
