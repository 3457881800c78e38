//! Messages, pins and unreads.

use crate::error::{RepositoryError, Result};
use crate::memory::MemoryRepository;
use std::collections::HashMap;
use traq_types::{
    ChannelId, Message, MessageId, Pin, Timestamp, Unread, UnreadChannel, UserId,
};
use uuid::Uuid;

/// Message persistence.
pub trait MessageRepository: Send + Sync {
    fn create_message(&self, user_id: UserId, channel_id: ChannelId, text: &str) -> Result<Message>;
    fn get_message(&self, id: MessageId) -> Result<Message>;
    fn update_message(&self, id: MessageId, text: &str) -> Result<Message>;
    /// Delete a message, cascading to its unreads, pin, stamps and clips.
    fn delete_message(&self, id: MessageId) -> Result<Message>;
    /// Messages of a channel, newest first.
    fn list_messages(&self, channel_id: ChannelId, limit: usize, offset: usize) -> Vec<Message>;
    /// The newest message of each channel, newest first.
    fn latest_messages(&self, limit: usize) -> Vec<Message>;

    /// Pin a message. Pinning an already-pinned message returns the
    /// existing pin and `false`.
    fn pin_message(&self, message_id: MessageId, user_id: UserId) -> Result<(Pin, bool)>;
    fn get_pin(&self, id: Uuid) -> Result<Pin>;
    fn delete_pin(&self, id: Uuid) -> Result<Pin>;
    fn get_channel_pins(&self, channel_id: ChannelId) -> Vec<Pin>;

    /// Record an unread row. The user must be an active non-bot user and the
    /// message must belong to the channel.
    fn set_unread(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
        message_id: MessageId,
        noticeable: bool,
    ) -> Result<()>;
    fn get_unread_channels(&self, user_id: UserId) -> Vec<UnreadChannel>;
    fn get_unreads(&self, user_id: UserId) -> Vec<Unread>;
    /// Drop every unread of a user in a channel. Returns the number removed.
    fn delete_unreads(&self, user_id: UserId, channel_id: ChannelId) -> usize;
}

fn message_not_found(id: MessageId) -> RepositoryError {
    RepositoryError::NotFound(format!("message {}", id))
}

impl MessageRepository for MemoryRepository {
    fn create_message(&self, user_id: UserId, channel_id: ChannelId, text: &str) -> Result<Message> {
        let mut t = self.tables.write();
        if !t.users.contains_key(&user_id) {
            return Err(RepositoryError::NotFound(format!("user {}", user_id)));
        }
        if !t.channels.contains_key(&channel_id) {
            return Err(RepositoryError::NotFound(format!("channel {}", channel_id)));
        }
        let message = Message::new(user_id, channel_id, text);
        t.channel_messages
            .entry(channel_id)
            .or_default()
            .push(message.id);
        t.messages.insert(message.id, message.clone());
        Ok(message)
    }

    fn get_message(&self, id: MessageId) -> Result<Message> {
        self.tables
            .read()
            .messages
            .get(&id)
            .cloned()
            .ok_or_else(|| message_not_found(id))
    }

    fn update_message(&self, id: MessageId, text: &str) -> Result<Message> {
        let mut t = self.tables.write();
        let message = t.messages.get_mut(&id).ok_or_else(|| message_not_found(id))?;
        message.text = text.to_string();
        message.updated_at = Timestamp::now();
        Ok(message.clone())
    }

    fn delete_message(&self, id: MessageId) -> Result<Message> {
        self.tables
            .write()
            .purge_message(id)
            .ok_or_else(|| message_not_found(id))
    }

    fn list_messages(&self, channel_id: ChannelId, limit: usize, offset: usize) -> Vec<Message> {
        let t = self.tables.read();
        t.channel_messages
            .get(&channel_id)
            .map(|ids| {
                ids.iter()
                    .rev()
                    .skip(offset)
                    .take(limit)
                    .filter_map(|id| t.messages.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn latest_messages(&self, limit: usize) -> Vec<Message> {
        let t = self.tables.read();
        let mut latest: Vec<Message> = t
            .channel_messages
            .values()
            .filter_map(|ids| ids.last())
            .filter_map(|id| t.messages.get(id).cloned())
            .collect();
        latest.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        latest.truncate(limit);
        latest
    }

    fn pin_message(&self, message_id: MessageId, user_id: UserId) -> Result<(Pin, bool)> {
        let mut t = self.tables.write();
        if !t.messages.contains_key(&message_id) {
            return Err(message_not_found(message_id));
        }
        if let Some(pin) = t.message_pins.get(&message_id).and_then(|id| t.pins.get(id)) {
            return Ok((pin.clone(), false));
        }
        let pin = Pin {
            id: Uuid::new_v4(),
            message_id,
            user_id,
            created_at: Timestamp::now(),
        };
        t.message_pins.insert(message_id, pin.id);
        t.pins.insert(pin.id, pin.clone());
        Ok((pin, true))
    }

    fn get_pin(&self, id: Uuid) -> Result<Pin> {
        self.tables
            .read()
            .pins
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("pin {}", id)))
    }

    fn delete_pin(&self, id: Uuid) -> Result<Pin> {
        let mut t = self.tables.write();
        let pin = t
            .pins
            .remove(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("pin {}", id)))?;
        t.message_pins.remove(&pin.message_id);
        Ok(pin)
    }

    fn get_channel_pins(&self, channel_id: ChannelId) -> Vec<Pin> {
        let t = self.tables.read();
        let mut pins: Vec<Pin> = t
            .pins
            .values()
            .filter(|p| {
                t.messages
                    .get(&p.message_id)
                    .is_some_and(|m| m.channel_id == channel_id)
            })
            .cloned()
            .collect();
        pins.sort_by_key(|p| p.created_at);
        pins
    }

    fn set_unread(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
        message_id: MessageId,
        noticeable: bool,
    ) -> Result<()> {
        let mut t = self.tables.write();
        let user = t
            .users
            .get(&user_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("user {}", user_id)))?;
        if user.bot || !user.is_active() {
            return Err(RepositoryError::InvalidArgument(format!(
                "user {} cannot hold unreads",
                user_id
            )));
        }
        match t.messages.get(&message_id) {
            Some(m) if m.channel_id == channel_id => {}
            Some(_) => {
                return Err(RepositoryError::InvalidArgument(format!(
                    "message {} is not in channel {}",
                    message_id, channel_id
                )))
            }
            None => return Err(message_not_found(message_id)),
        }

        let unread = t.unreads.entry((user_id, message_id)).or_insert(Unread {
            user_id,
            channel_id,
            message_id,
            noticeable,
            created_at: Timestamp::now(),
        });
        unread.noticeable |= noticeable;
        Ok(())
    }

    fn get_unread_channels(&self, user_id: UserId) -> Vec<UnreadChannel> {
        let t = self.tables.read();
        let mut by_channel: HashMap<ChannelId, UnreadChannel> = HashMap::new();
        for unread in t.unreads.values().filter(|u| u.user_id == user_id) {
            let entry = by_channel
                .entry(unread.channel_id)
                .or_insert_with(|| UnreadChannel {
                    channel_id: unread.channel_id,
                    count: 0,
                    noticeable: false,
                    since: unread.created_at,
                    updated_at: unread.created_at,
                });
            entry.count += 1;
            entry.noticeable |= unread.noticeable;
            entry.since = entry.since.min(unread.created_at);
            entry.updated_at = entry.updated_at.max(unread.created_at);
        }
        let mut channels: Vec<UnreadChannel> = by_channel.into_values().collect();
        channels.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        channels
    }

    fn get_unreads(&self, user_id: UserId) -> Vec<Unread> {
        let mut unreads: Vec<Unread> = self
            .tables
            .read()
            .unreads
            .values()
            .filter(|u| u.user_id == user_id)
            .cloned()
            .collect();
        unreads.sort_by_key(|u| u.created_at);
        unreads
    }

    fn delete_unreads(&self, user_id: UserId, channel_id: ChannelId) -> usize {
        let mut t = self.tables.write();
        let before = t.unreads.len();
        t.unreads
            .retain(|(u, _), unread| !(*u == user_id && unread.channel_id == channel_id));
        before - t.unreads.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChannelRepository, UserRepository};
    use traq_types::{Channel, User, UserStatus};

    fn setup() -> (MemoryRepository, User, User, Channel) {
        let repo = MemoryRepository::new();
        let alice = repo.create_user(User::new("alice", "alice", String::new())).unwrap();
        let bob = repo.create_user(User::new("bob", "bob", String::new())).unwrap();
        let ch = repo
            .create_channel(Channel::new("general", None, true, alice.id), &[])
            .unwrap();
        (repo, alice, bob, ch)
    }

    #[test]
    fn test_list_messages_newest_first() {
        let (repo, alice, _, ch) = setup();
        let first = repo.create_message(alice.id, ch.id, "one").unwrap();
        let second = repo.create_message(alice.id, ch.id, "two").unwrap();

        let listed = repo.list_messages(ch.id, 10, 0);
        assert_eq!(listed.iter().map(|m| m.id).collect::<Vec<_>>(), vec![second.id, first.id]);
        assert_eq!(repo.list_messages(ch.id, 1, 1)[0].id, first.id);
    }

    #[test]
    fn test_pin_idempotent_and_repin() {
        let (repo, alice, _, ch) = setup();
        let m = repo.create_message(alice.id, ch.id, "pin me").unwrap();

        let (pin, created) = repo.pin_message(m.id, alice.id).unwrap();
        assert!(created);
        let (again, created) = repo.pin_message(m.id, alice.id).unwrap();
        assert!(!created);
        assert_eq!(pin.id, again.id);

        repo.delete_pin(pin.id).unwrap();
        let (repinned, created) = repo.pin_message(m.id, alice.id).unwrap();
        assert!(created);
        assert_ne!(repinned.id, pin.id);
    }

    #[test]
    fn test_unread_rules() {
        let (repo, alice, bob, ch) = setup();
        let m = repo.create_message(alice.id, ch.id, "hi").unwrap();

        repo.set_unread(bob.id, ch.id, m.id, false).unwrap();
        repo.set_unread(bob.id, ch.id, m.id, true).unwrap();
        let channels = repo.get_unread_channels(bob.id);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].count, 1);
        assert!(channels[0].noticeable);

        let bot = repo.create_user(User::new_bot("BOT_x", "x")).unwrap();
        assert!(repo.set_unread(bot.id, ch.id, m.id, false).is_err());

        assert_eq!(repo.delete_unreads(bob.id, ch.id), 1);
        assert!(repo.get_unreads(bob.id).is_empty());
    }

    #[test]
    fn test_unread_cascade_on_delete_and_deactivate() {
        let (repo, alice, bob, ch) = setup();
        let m1 = repo.create_message(alice.id, ch.id, "a").unwrap();
        let m2 = repo.create_message(alice.id, ch.id, "b").unwrap();
        repo.set_unread(bob.id, ch.id, m1.id, false).unwrap();
        repo.set_unread(bob.id, ch.id, m2.id, false).unwrap();

        repo.delete_message(m1.id).unwrap();
        assert_eq!(repo.get_unreads(bob.id).len(), 1);

        repo.update_user_status(bob.id, UserStatus::Deactivated).unwrap();
        assert!(repo.get_unreads(bob.id).is_empty());
        assert!(repo.set_unread(bob.id, ch.id, m2.id, false).is_err());
    }

    #[test]
    fn test_latest_messages() {
        let (repo, alice, _, ch) = setup();
        let other = repo
            .create_channel(Channel::new("random", None, true, alice.id), &[])
            .unwrap();
        repo.create_message(alice.id, ch.id, "old").unwrap();
        let newest_general = repo.create_message(alice.id, ch.id, "new").unwrap();
        repo.create_message(alice.id, other.id, "x").unwrap();

        let latest = repo.latest_messages(10);
        assert_eq!(latest.len(), 2);
        assert!(latest.iter().any(|m| m.id == newest_general.id));
    }
}
