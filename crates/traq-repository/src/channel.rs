//! Channels, private memberships, subscriptions, stars and mutes.

use crate::error::{RepositoryError, Result};
use crate::memory::{MemoryRepository, Tables};
use std::collections::HashSet;
use traq_types::{
    Channel, ChannelId, ChannelSubscription, SubscriptionFlags, Timestamp, UserId,
    DM_CHANNEL_ROOT_ID, MAX_CHANNEL_DEPTH,
};

/// Partial update of a channel. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateChannelArgs {
    pub updater_id: UserId,
    pub name: Option<String>,
    /// `Some(None)` moves the channel to the top level.
    pub parent_id: Option<Option<ChannelId>>,
    pub topic: Option<String>,
    pub visibility: Option<bool>,
    pub forced: Option<bool>,
}

/// Channel persistence.
pub trait ChannelRepository: Send + Sync {
    /// Insert a channel. Private channels get `members` as their member set.
    ///
    /// Fails with `AlreadyExists` when a sibling already has the same name,
    /// and with `DepthLimit` when the parent is already at the maximum depth.
    fn create_channel(&self, channel: Channel, members: &[UserId]) -> Result<Channel>;
    fn get_channel(&self, id: ChannelId) -> Result<Channel>;
    /// Every channel, including private and direct-message channels.
    fn list_channels(&self) -> Vec<Channel>;
    /// Apply `args`. A parent change fails with `DepthLimit` when the new
    /// parent lies inside the moved subtree or the subtree would end up
    /// deeper than [`MAX_CHANNEL_DEPTH`].
    fn update_channel(&self, id: ChannelId, args: UpdateChannelArgs) -> Result<Channel>;
    /// Delete a channel and all of its descendants, cascading to messages,
    /// unreads, pins, subscriptions, stars, mutes and bot joins.
    fn delete_channel(&self, id: ChannelId) -> Result<Vec<ChannelId>>;

    fn get_private_channel_members(&self, id: ChannelId) -> Vec<UserId>;
    /// Public channels are accessible to everyone; private ones to members.
    fn is_channel_accessible(&self, user_id: UserId, channel_id: ChannelId) -> bool;
    /// Return the direct-message channel between two users, creating it if needed.
    fn get_or_create_dm_channel(&self, user1: UserId, user2: UserId) -> Result<Channel>;

    fn get_channel_subscriptions(&self, channel_id: ChannelId) -> Vec<ChannelSubscription>;
    fn get_user_subscriptions(&self, user_id: UserId) -> Vec<ChannelSubscription>;
    fn set_subscription(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
        flags: SubscriptionFlags,
    ) -> Result<()>;

    /// Returns true if the star was newly added.
    fn add_star(&self, user_id: UserId, channel_id: ChannelId) -> Result<bool>;
    /// Returns true if a star was removed.
    fn remove_star(&self, user_id: UserId, channel_id: ChannelId) -> Result<bool>;
    fn get_stars(&self, user_id: UserId) -> Vec<ChannelId>;

    /// Returns true if the mute was newly added.
    fn mute_channel(&self, user_id: UserId, channel_id: ChannelId) -> Result<bool>;
    /// Returns true if a mute was removed.
    fn unmute_channel(&self, user_id: UserId, channel_id: ChannelId) -> Result<bool>;
    fn get_muted_channels(&self, user_id: UserId) -> Vec<ChannelId>;
    fn get_muted_users(&self, channel_id: ChannelId) -> Vec<UserId>;
}

fn not_found(id: ChannelId) -> RepositoryError {
    RepositoryError::NotFound(format!("channel {}", id))
}

fn require_channel(t: &Tables, id: ChannelId) -> Result<&Channel> {
    t.channels.get(&id).ok_or_else(|| not_found(id))
}

fn require_user(t: &Tables, id: UserId) -> Result<()> {
    if t.users.contains_key(&id) {
        Ok(())
    } else {
        Err(RepositoryError::NotFound(format!("user {}", id)))
    }
}

fn collect_subtree(t: &Tables, root: ChannelId) -> Vec<ChannelId> {
    let mut result = vec![root];
    let mut seen: HashSet<ChannelId> = HashSet::from([root]);
    let mut i = 0;
    while i < result.len() {
        let current = result[i];
        for child in t.channels.values().filter(|c| c.parent_id == Some(current)) {
            if seen.insert(child.id) {
                result.push(child.id);
            }
        }
        i += 1;
    }
    result
}

/// Depth of `id` counting itself, or `None` if the parent chain loops.
fn depth_of(t: &Tables, id: ChannelId) -> Option<usize> {
    let mut seen: HashSet<ChannelId> = HashSet::from([id]);
    let mut depth = 1;
    let mut current = t.channels.get(&id).and_then(|c| c.parent_id);
    while let Some(parent) = current {
        if !seen.insert(parent) {
            return None;
        }
        depth += 1;
        current = t.channels.get(&parent).and_then(|c| c.parent_id);
    }
    Some(depth)
}

/// Height of the subtree rooted at `root`. A leaf has height 1.
fn subtree_height(t: &Tables, root: ChannelId) -> usize {
    let mut height = 1;
    let mut level = vec![root];
    let mut seen: HashSet<ChannelId> = HashSet::from([root]);
    loop {
        let next: Vec<ChannelId> = t
            .channels
            .values()
            .filter(|c| c.parent_id.is_some_and(|p| level.contains(&p)))
            .filter(|c| seen.insert(c.id))
            .map(|c| c.id)
            .collect();
        if next.is_empty() {
            return height;
        }
        height += 1;
        level = next;
    }
}

/// Reject moving `id` under `parent` when that closes a loop or overflows
/// the depth limit.
fn check_move(t: &Tables, id: ChannelId, parent: ChannelId) -> Result<()> {
    let mut current = Some(parent);
    let mut seen: HashSet<ChannelId> = HashSet::new();
    while let Some(c) = current {
        if c == id || !seen.insert(c) {
            return Err(RepositoryError::DepthLimit);
        }
        current = t.channels.get(&c).and_then(|ch| ch.parent_id);
    }
    let parent_depth = depth_of(t, parent).ok_or(RepositoryError::DepthLimit)?;
    if parent_depth + subtree_height(t, id) > MAX_CHANNEL_DEPTH {
        return Err(RepositoryError::DepthLimit);
    }
    Ok(())
}

impl ChannelRepository for MemoryRepository {
    fn create_channel(&self, channel: Channel, members: &[UserId]) -> Result<Channel> {
        let mut t = self.tables.write();
        if let Some(parent) = channel.parent_id {
            if parent != DM_CHANNEL_ROOT_ID {
                require_channel(&t, parent)?;
                let depth = depth_of(&t, parent).ok_or(RepositoryError::DepthLimit)?;
                if depth + 1 > MAX_CHANNEL_DEPTH {
                    return Err(RepositoryError::DepthLimit);
                }
            }
        }
        if t.sibling_name_taken(channel.parent_id, &channel.name, None) {
            return Err(RepositoryError::AlreadyExists(format!(
                "channel '{}' under the same parent",
                channel.name
            )));
        }
        for member in members {
            require_user(&t, *member)?;
        }

        if !channel.is_public {
            t.private_members
                .insert(channel.id, members.iter().copied().collect());
        }
        t.channels.insert(channel.id, channel.clone());
        Ok(channel)
    }

    fn get_channel(&self, id: ChannelId) -> Result<Channel> {
        let t = self.tables.read();
        require_channel(&t, id).cloned()
    }

    fn list_channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self.tables.read().channels.values().cloned().collect();
        channels.sort_by_key(|c| c.created_at);
        channels
    }

    fn update_channel(&self, id: ChannelId, args: UpdateChannelArgs) -> Result<Channel> {
        let mut t = self.tables.write();
        let current = require_channel(&t, id)?.clone();

        let name = args.name.clone().unwrap_or_else(|| current.name.clone());
        let parent = args.parent_id.unwrap_or(current.parent_id);
        if (args.name.is_some() || args.parent_id.is_some())
            && t.sibling_name_taken(parent, &name, Some(id))
        {
            return Err(RepositoryError::AlreadyExists(format!(
                "channel '{}' under the same parent",
                name
            )));
        }
        if let Some(Some(p)) = args.parent_id {
            require_channel(&t, p)?;
            check_move(&t, id, p)?;
        }

        let channel = t.channels.get_mut(&id).ok_or_else(|| not_found(id))?;
        channel.name = name;
        channel.parent_id = parent;
        if let Some(topic) = args.topic {
            channel.topic = topic;
        }
        if let Some(visible) = args.visibility {
            channel.is_visible = visible;
        }
        if let Some(forced) = args.forced {
            channel.is_forced = forced;
        }
        channel.updater_id = args.updater_id;
        channel.updated_at = Timestamp::now();
        Ok(channel.clone())
    }

    fn delete_channel(&self, id: ChannelId) -> Result<Vec<ChannelId>> {
        let mut t = self.tables.write();
        require_channel(&t, id)?;
        let ids = collect_subtree(&t, id);
        let doomed: HashSet<ChannelId> = ids.iter().copied().collect();

        for cid in &ids {
            let messages = t.channel_messages.remove(cid).unwrap_or_default();
            for mid in messages {
                t.purge_message(mid);
            }
            t.channels.remove(cid);
            t.private_members.remove(cid);
        }
        t.subscriptions.retain(|(_, c), _| !doomed.contains(c));
        t.stars.retain(|(_, c)| !doomed.contains(c));
        t.mutes.retain(|(_, c)| !doomed.contains(c));
        t.bot_channels.retain(|(_, c)| !doomed.contains(c));
        t.dm_pairs.retain(|_, c| !doomed.contains(c));
        t.unreads.retain(|_, u| !doomed.contains(&u.channel_id));
        tracing::debug!(channel_id = %id, removed = ids.len(), "deleted channel subtree");
        Ok(ids)
    }

    fn get_private_channel_members(&self, id: ChannelId) -> Vec<UserId> {
        self.tables
            .read()
            .private_members
            .get(&id)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }

    fn is_channel_accessible(&self, user_id: UserId, channel_id: ChannelId) -> bool {
        let t = self.tables.read();
        match t.channels.get(&channel_id) {
            Some(c) if c.is_public => true,
            Some(_) => t
                .private_members
                .get(&channel_id)
                .is_some_and(|m| m.contains(&user_id)),
            None => false,
        }
    }

    fn get_or_create_dm_channel(&self, user1: UserId, user2: UserId) -> Result<Channel> {
        let key = if user1 <= user2 { (user1, user2) } else { (user2, user1) };
        let mut t = self.tables.write();
        if let Some(id) = t.dm_pairs.get(&key) {
            if let Some(channel) = t.channels.get(id) {
                return Ok(channel.clone());
            }
        }
        require_user(&t, user1)?;
        require_user(&t, user2)?;

        let mut channel = Channel::new(String::new(), Some(DM_CHANNEL_ROOT_ID), false, user1);
        channel.name = format!("dm_{}", &channel.id.simple().to_string()[..17]);
        channel.is_visible = true;

        t.private_members
            .insert(channel.id, HashSet::from([user1, user2]));
        t.dm_pairs.insert(key, channel.id);
        t.channels.insert(channel.id, channel.clone());
        Ok(channel)
    }

    fn get_channel_subscriptions(&self, channel_id: ChannelId) -> Vec<ChannelSubscription> {
        self.tables
            .read()
            .subscriptions
            .iter()
            .filter(|((_, c), _)| *c == channel_id)
            .map(|((u, c), flags)| ChannelSubscription {
                user_id: *u,
                channel_id: *c,
                flags: *flags,
            })
            .collect()
    }

    fn get_user_subscriptions(&self, user_id: UserId) -> Vec<ChannelSubscription> {
        self.tables
            .read()
            .subscriptions
            .iter()
            .filter(|((u, _), _)| *u == user_id)
            .map(|((u, c), flags)| ChannelSubscription {
                user_id: *u,
                channel_id: *c,
                flags: *flags,
            })
            .collect()
    }

    fn set_subscription(
        &self,
        user_id: UserId,
        channel_id: ChannelId,
        flags: SubscriptionFlags,
    ) -> Result<()> {
        let mut t = self.tables.write();
        require_user(&t, user_id)?;
        require_channel(&t, channel_id)?;
        if flags.is_none() {
            t.subscriptions.remove(&(user_id, channel_id));
        } else {
            t.subscriptions.insert((user_id, channel_id), flags);
        }
        Ok(())
    }

    fn add_star(&self, user_id: UserId, channel_id: ChannelId) -> Result<bool> {
        let mut t = self.tables.write();
        require_channel(&t, channel_id)?;
        Ok(t.stars.insert((user_id, channel_id)))
    }

    fn remove_star(&self, user_id: UserId, channel_id: ChannelId) -> Result<bool> {
        Ok(self.tables.write().stars.remove(&(user_id, channel_id)))
    }

    fn get_stars(&self, user_id: UserId) -> Vec<ChannelId> {
        self.tables
            .read()
            .stars
            .iter()
            .filter(|(u, _)| *u == user_id)
            .map(|(_, c)| *c)
            .collect()
    }

    fn mute_channel(&self, user_id: UserId, channel_id: ChannelId) -> Result<bool> {
        let mut t = self.tables.write();
        require_channel(&t, channel_id)?;
        Ok(t.mutes.insert((user_id, channel_id)))
    }

    fn unmute_channel(&self, user_id: UserId, channel_id: ChannelId) -> Result<bool> {
        Ok(self.tables.write().mutes.remove(&(user_id, channel_id)))
    }

    fn get_muted_channels(&self, user_id: UserId) -> Vec<ChannelId> {
        self.tables
            .read()
            .mutes
            .iter()
            .filter(|(u, _)| *u == user_id)
            .map(|(_, c)| *c)
            .collect()
    }

    fn get_muted_users(&self, channel_id: ChannelId) -> Vec<UserId> {
        self.tables
            .read()
            .mutes
            .iter()
            .filter(|(_, c)| *c == channel_id)
            .map(|(u, _)| *u)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MessageRepository, UserRepository};
    use traq_types::User;
    use uuid::Uuid;

    fn setup() -> (MemoryRepository, User) {
        let repo = MemoryRepository::new();
        let user = repo.create_user(User::new("alice", "alice", String::new())).unwrap();
        (repo, user)
    }

    #[test]
    fn test_sibling_uniqueness() {
        let (repo, user) = setup();
        let parent = repo
            .create_channel(Channel::new("general", None, true, user.id), &[])
            .unwrap();
        repo.create_channel(Channel::new("a", Some(parent.id), true, user.id), &[])
            .unwrap();
        let err = repo
            .create_channel(Channel::new("a", Some(parent.id), true, user.id), &[])
            .unwrap_err();
        assert!(matches!(err, RepositoryError::AlreadyExists(_)));
        // same name under a different parent is fine
        repo.create_channel(Channel::new("a", None, true, user.id), &[])
            .unwrap();
    }

    #[test]
    fn test_rename_conflict() {
        let (repo, user) = setup();
        let a = repo.create_channel(Channel::new("a", None, true, user.id), &[]).unwrap();
        repo.create_channel(Channel::new("b", None, true, user.id), &[]).unwrap();
        let args = UpdateChannelArgs {
            updater_id: user.id,
            name: Some("b".into()),
            ..Default::default()
        };
        assert!(repo.update_channel(a.id, args).is_err());
    }

    fn move_to(
        repo: &MemoryRepository,
        user: &User,
        id: ChannelId,
        parent: ChannelId,
    ) -> Result<Channel> {
        repo.update_channel(
            id,
            UpdateChannelArgs {
                updater_id: user.id,
                parent_id: Some(Some(parent)),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_move_rejects_loop_and_overflow() {
        let (repo, user) = setup();
        let x = repo.create_channel(Channel::new("x", None, true, user.id), &[]).unwrap();
        let y = repo.create_channel(Channel::new("y", None, true, user.id), &[]).unwrap();

        move_to(&repo, &user, x.id, y.id).unwrap();
        assert_eq!(move_to(&repo, &user, y.id, x.id).unwrap_err(), RepositoryError::DepthLimit);
        assert_eq!(move_to(&repo, &user, y.id, y.id).unwrap_err(), RepositoryError::DepthLimit);
        assert_eq!(repo.get_channel(y.id).unwrap().parent_id, None);

        let mut parent = y.id;
        for name in ["a", "b", "c", "d"] {
            parent = repo
                .create_channel(Channel::new(name, Some(parent), true, user.id), &[])
                .unwrap()
                .id;
        }
        assert_eq!(
            repo.create_channel(Channel::new("e", Some(parent), true, user.id), &[])
                .unwrap_err(),
            RepositoryError::DepthLimit
        );

        // z has a child, so it cannot go below depth 4.
        let z = repo.create_channel(Channel::new("z", None, true, user.id), &[]).unwrap();
        repo.create_channel(Channel::new("leaf", Some(z.id), true, user.id), &[])
            .unwrap();
        let depth4 = repo.list_channels().into_iter().find(|c| c.name == "c").unwrap();
        assert_eq!(
            move_to(&repo, &user, z.id, depth4.id).unwrap_err(),
            RepositoryError::DepthLimit
        );
        let depth3 = repo.list_channels().into_iter().find(|c| c.name == "b").unwrap();
        move_to(&repo, &user, z.id, depth3.id).unwrap();
    }

    #[test]
    fn test_private_access() {
        let (repo, user) = setup();
        let other = repo.create_user(User::new("bob", "bob", String::new())).unwrap();
        let private = repo
            .create_channel(Channel::new("secret", None, false, user.id), &[user.id])
            .unwrap();
        assert!(repo.is_channel_accessible(user.id, private.id));
        assert!(!repo.is_channel_accessible(other.id, private.id));
        assert_eq!(repo.get_private_channel_members(private.id), vec![user.id]);
    }

    #[test]
    fn test_delete_cascades() {
        let (repo, user) = setup();
        let root = repo.create_channel(Channel::new("root", None, true, user.id), &[]).unwrap();
        let child = repo
            .create_channel(Channel::new("child", Some(root.id), true, user.id), &[])
            .unwrap();
        let other = repo.create_user(User::new("bob", "bob", String::new())).unwrap();
        let message = repo.create_message(user.id, child.id, "hi").unwrap();
        repo.set_unread(other.id, child.id, message.id, false).unwrap();
        repo.add_star(other.id, child.id).unwrap();

        let deleted = repo.delete_channel(root.id).unwrap();
        assert_eq!(deleted.len(), 2);
        assert!(repo.get_message(message.id).is_err());
        assert!(repo.get_unread_channels(other.id).is_empty());
        assert!(repo.get_stars(other.id).is_empty());
    }

    #[test]
    fn test_dm_channel_reuse() {
        let (repo, user) = setup();
        let other = repo.create_user(User::new("bob", "bob", String::new())).unwrap();
        let dm = repo.get_or_create_dm_channel(user.id, other.id).unwrap();
        assert!(dm.is_dm());
        assert!(!dm.is_public);
        assert_eq!(repo.get_or_create_dm_channel(other.id, user.id).unwrap().id, dm.id);
        assert!(repo.get_or_create_dm_channel(user.id, Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_subscription_roundtrip() {
        let (repo, user) = setup();
        let ch = repo.create_channel(Channel::new("a", None, true, user.id), &[]).unwrap();
        assert!(repo.get_channel_subscriptions(ch.id).is_empty());

        repo.set_subscription(user.id, ch.id, SubscriptionFlags::NOTIFY).unwrap();
        assert_eq!(repo.get_channel_subscriptions(ch.id).len(), 1);

        repo.set_subscription(user.id, ch.id, SubscriptionFlags::NONE).unwrap();
        assert!(repo.get_channel_subscriptions(ch.id).is_empty());
    }

    #[test]
    fn test_stars_and_mutes() {
        let (repo, user) = setup();
        let ch = repo.create_channel(Channel::new("a", None, true, user.id), &[]).unwrap();
        assert!(repo.add_star(user.id, ch.id).unwrap());
        assert!(!repo.add_star(user.id, ch.id).unwrap());
        assert!(repo.remove_star(user.id, ch.id).unwrap());

        assert!(repo.mute_channel(user.id, ch.id).unwrap());
        assert_eq!(repo.get_muted_users(ch.id), vec![user.id]);
        assert!(repo.unmute_channel(user.id, ch.id).unwrap());
        assert!(repo.get_muted_channels(user.id).is_empty());
    }
}
