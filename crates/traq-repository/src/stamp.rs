//! Stamps, message stamps and clip folders.

use crate::error::{RepositoryError, Result};
use crate::memory::MemoryRepository;
use std::collections::HashMap;
use traq_types::{ClipFolder, ClipFolderMessage, MessageId, MessageStamp, Stamp, Timestamp, UserId};
use uuid::Uuid;

/// Stamp persistence.
pub trait StampRepository: Send + Sync {
    /// Insert a stamp. Names are unique.
    fn create_stamp(&self, stamp: Stamp) -> Result<Stamp>;
    fn get_stamp(&self, id: Uuid) -> Result<Stamp>;
    fn list_stamps(&self) -> Vec<Stamp>;
    fn rename_stamp(&self, id: Uuid, name: &str) -> Result<Stamp>;
    /// Delete a stamp and every use of it on messages.
    fn delete_stamp(&self, id: Uuid) -> Result<Stamp>;

    /// Add `count` uses of a stamp by a user on a message.
    fn add_message_stamp(
        &self,
        message_id: MessageId,
        stamp_id: Uuid,
        user_id: UserId,
        count: u32,
    ) -> Result<MessageStamp>;
    fn remove_message_stamp(&self, message_id: MessageId, stamp_id: Uuid, user_id: UserId) -> Result<()>;
    fn get_message_stamps(&self, message_id: MessageId) -> Vec<MessageStamp>;
    /// Stamps a user has used, most recently used first.
    fn get_stamp_history(&self, user_id: UserId, limit: usize) -> Vec<(Uuid, Timestamp)>;
}

/// Clip folder persistence.
pub trait ClipRepository: Send + Sync {
    fn create_clip_folder(&self, folder: ClipFolder) -> Result<ClipFolder>;
    fn get_clip_folder(&self, id: Uuid) -> Result<ClipFolder>;
    fn list_clip_folders(&self, owner_id: UserId) -> Vec<ClipFolder>;
    fn delete_clip_folder(&self, id: Uuid) -> Result<ClipFolder>;
    fn add_clip_message(&self, folder_id: Uuid, message_id: MessageId) -> Result<ClipFolderMessage>;
    fn remove_clip_message(&self, folder_id: Uuid, message_id: MessageId) -> Result<()>;
    fn get_clip_messages(&self, folder_id: Uuid) -> Vec<ClipFolderMessage>;
}

fn stamp_not_found(id: Uuid) -> RepositoryError {
    RepositoryError::NotFound(format!("stamp {}", id))
}

impl StampRepository for MemoryRepository {
    fn create_stamp(&self, stamp: Stamp) -> Result<Stamp> {
        let mut t = self.tables.write();
        if t.stamp_names.contains_key(&stamp.name) {
            return Err(RepositoryError::AlreadyExists(format!("stamp '{}'", stamp.name)));
        }
        t.stamp_names.insert(stamp.name.clone(), stamp.id);
        t.stamps.insert(stamp.id, stamp.clone());
        Ok(stamp)
    }

    fn get_stamp(&self, id: Uuid) -> Result<Stamp> {
        self.tables
            .read()
            .stamps
            .get(&id)
            .cloned()
            .ok_or_else(|| stamp_not_found(id))
    }

    fn list_stamps(&self) -> Vec<Stamp> {
        let mut stamps: Vec<Stamp> = self.tables.read().stamps.values().cloned().collect();
        stamps.sort_by(|a, b| a.name.cmp(&b.name));
        stamps
    }

    fn rename_stamp(&self, id: Uuid, name: &str) -> Result<Stamp> {
        let mut t = self.tables.write();
        if t.stamp_names.get(name).is_some_and(|other| *other != id) {
            return Err(RepositoryError::AlreadyExists(format!("stamp '{}'", name)));
        }
        let stamp = t.stamps.get_mut(&id).ok_or_else(|| stamp_not_found(id))?;
        let old = std::mem::replace(&mut stamp.name, name.to_string());
        stamp.updated_at = Timestamp::now();
        let stamp = stamp.clone();
        t.stamp_names.remove(&old);
        t.stamp_names.insert(name.to_string(), id);
        Ok(stamp)
    }

    fn delete_stamp(&self, id: Uuid) -> Result<Stamp> {
        let mut t = self.tables.write();
        let stamp = t.stamps.remove(&id).ok_or_else(|| stamp_not_found(id))?;
        t.stamp_names.remove(&stamp.name);
        t.message_stamps.retain(|(_, s, _), _| *s != id);
        Ok(stamp)
    }

    fn add_message_stamp(
        &self,
        message_id: MessageId,
        stamp_id: Uuid,
        user_id: UserId,
        count: u32,
    ) -> Result<MessageStamp> {
        let mut t = self.tables.write();
        if !t.messages.contains_key(&message_id) {
            return Err(RepositoryError::NotFound(format!("message {}", message_id)));
        }
        if !t.stamps.contains_key(&stamp_id) {
            return Err(stamp_not_found(stamp_id));
        }
        let now = Timestamp::now();
        let entry = t
            .message_stamps
            .entry((message_id, stamp_id, user_id))
            .or_insert(MessageStamp {
                message_id,
                stamp_id,
                user_id,
                count: 0,
                created_at: now,
                updated_at: now,
            });
        entry.count = entry.count.saturating_add(count.max(1));
        entry.updated_at = now;
        Ok(entry.clone())
    }

    fn remove_message_stamp(&self, message_id: MessageId, stamp_id: Uuid, user_id: UserId) -> Result<()> {
        self.tables
            .write()
            .message_stamps
            .remove(&(message_id, stamp_id, user_id))
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(format!("stamp {} on message {}", stamp_id, message_id)))
    }

    fn get_message_stamps(&self, message_id: MessageId) -> Vec<MessageStamp> {
        let mut stamps: Vec<MessageStamp> = self
            .tables
            .read()
            .message_stamps
            .values()
            .filter(|s| s.message_id == message_id)
            .cloned()
            .collect();
        stamps.sort_by_key(|s| s.created_at);
        stamps
    }

    fn get_stamp_history(&self, user_id: UserId, limit: usize) -> Vec<(Uuid, Timestamp)> {
        let t = self.tables.read();
        let mut last_used: HashMap<Uuid, Timestamp> = HashMap::new();
        for ms in t.message_stamps.values().filter(|s| s.user_id == user_id) {
            let slot = last_used.entry(ms.stamp_id).or_insert(ms.updated_at);
            *slot = (*slot).max(ms.updated_at);
        }
        let mut history: Vec<(Uuid, Timestamp)> = last_used.into_iter().collect();
        history.sort_by(|a, b| b.1.cmp(&a.1));
        history.truncate(limit);
        history
    }
}

impl ClipRepository for MemoryRepository {
    fn create_clip_folder(&self, folder: ClipFolder) -> Result<ClipFolder> {
        let mut t = self.tables.write();
        if t
            .clip_folders
            .values()
            .any(|f| f.owner_id == folder.owner_id && f.name == folder.name)
        {
            return Err(RepositoryError::AlreadyExists(format!("clip folder '{}'", folder.name)));
        }
        t.clip_folders.insert(folder.id, folder.clone());
        Ok(folder)
    }

    fn get_clip_folder(&self, id: Uuid) -> Result<ClipFolder> {
        self.tables
            .read()
            .clip_folders
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("clip folder {}", id)))
    }

    fn list_clip_folders(&self, owner_id: UserId) -> Vec<ClipFolder> {
        let mut folders: Vec<ClipFolder> = self
            .tables
            .read()
            .clip_folders
            .values()
            .filter(|f| f.owner_id == owner_id)
            .cloned()
            .collect();
        folders.sort_by_key(|f| f.created_at);
        folders
    }

    fn delete_clip_folder(&self, id: Uuid) -> Result<ClipFolder> {
        let mut t = self.tables.write();
        let folder = t
            .clip_folders
            .remove(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("clip folder {}", id)))?;
        t.clip_messages.retain(|(f, _), _| *f != id);
        Ok(folder)
    }

    fn add_clip_message(&self, folder_id: Uuid, message_id: MessageId) -> Result<ClipFolderMessage> {
        let mut t = self.tables.write();
        if !t.clip_folders.contains_key(&folder_id) {
            return Err(RepositoryError::NotFound(format!("clip folder {}", folder_id)));
        }
        if !t.messages.contains_key(&message_id) {
            return Err(RepositoryError::NotFound(format!("message {}", message_id)));
        }
        if t.clip_messages.contains_key(&(folder_id, message_id)) {
            return Err(RepositoryError::AlreadyExists(format!("message {} in folder", message_id)));
        }
        let clip = ClipFolderMessage {
            folder_id,
            message_id,
            clipped_at: Timestamp::now(),
        };
        t.clip_messages.insert((folder_id, message_id), clip.clone());
        Ok(clip)
    }

    fn remove_clip_message(&self, folder_id: Uuid, message_id: MessageId) -> Result<()> {
        self.tables
            .write()
            .clip_messages
            .remove(&(folder_id, message_id))
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(format!("message {} in folder", message_id)))
    }

    fn get_clip_messages(&self, folder_id: Uuid) -> Vec<ClipFolderMessage> {
        let mut clips: Vec<ClipFolderMessage> = self
            .tables
            .read()
            .clip_messages
            .values()
            .filter(|c| c.folder_id == folder_id)
            .cloned()
            .collect();
        clips.sort_by(|a, b| b.clipped_at.cmp(&a.clipped_at));
        clips
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChannelRepository, MessageRepository, UserRepository};
    use traq_types::{Channel, User};

    #[test]
    fn test_message_stamp_counts_and_history() {
        let repo = MemoryRepository::new();
        let user = repo.create_user(User::new("alice", "alice", String::new())).unwrap();
        let ch = repo.create_channel(Channel::new("a", None, true, user.id), &[]).unwrap();
        let m = repo.create_message(user.id, ch.id, "x").unwrap();
        let stamp = repo.create_stamp(Stamp::new("good", user.id, None)).unwrap();
        assert!(repo.create_stamp(Stamp::new("good", user.id, None)).is_err());

        repo.add_message_stamp(m.id, stamp.id, user.id, 1).unwrap();
        let ms = repo.add_message_stamp(m.id, stamp.id, user.id, 2).unwrap();
        assert_eq!(ms.count, 3);
        assert_eq!(repo.get_stamp_history(user.id, 10)[0].0, stamp.id);

        repo.delete_stamp(stamp.id).unwrap();
        assert!(repo.get_message_stamps(m.id).is_empty());
    }

    #[test]
    fn test_clip_folder_lifecycle() {
        let repo = MemoryRepository::new();
        let user = repo.create_user(User::new("alice", "alice", String::new())).unwrap();
        let ch = repo.create_channel(Channel::new("a", None, true, user.id), &[]).unwrap();
        let m = repo.create_message(user.id, ch.id, "x").unwrap();
        let folder = repo
            .create_clip_folder(ClipFolder {
                id: Uuid::new_v4(),
                owner_id: user.id,
                name: "later".into(),
                description: String::new(),
                created_at: Timestamp::now(),
            })
            .unwrap();

        repo.add_clip_message(folder.id, m.id).unwrap();
        assert!(repo.add_clip_message(folder.id, m.id).is_err());
        assert_eq!(repo.get_clip_messages(folder.id).len(), 1);

        repo.delete_message(m.id).unwrap();
        assert!(repo.get_clip_messages(folder.id).is_empty());
    }
}
