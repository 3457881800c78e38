//! Channel tree service.

use crate::error::ChannelError;
use crate::tree::ChannelTree;
use crate::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;
use traq_hub::{fields, Event, Field, Hub, Topic};
use traq_repository::{
    ChannelRepository, MessageRepository, Repository, UpdateChannelArgs, UserRepository,
};
use traq_types::{
    Channel, ChannelId, ChannelSubscription, SubscriptionFlags, UserId, DM_CHANNEL_ROOT_ID,
    MAX_CHANNEL_DEPTH,
};

/// Flag changes accepted by [`ChannelService::update_flags`].
#[derive(Debug, Clone, Default)]
pub struct ChannelFlags {
    pub visibility: Option<bool>,
    pub forced: Option<bool>,
}

/// Creates, moves and edits channels, and manages per-user channel state
/// (subscriptions, stars, mutes, read markers).
#[derive(Clone)]
pub struct ChannelService {
    repo: Arc<dyn Repository>,
    hub: Arc<Hub>,
}

impl ChannelService {
    pub fn new(repo: Arc<dyn Repository>, hub: Arc<Hub>) -> Self {
        Self { repo, hub }
    }

    /// Snapshot of the whole tree.
    pub fn tree(&self) -> ChannelTree {
        ChannelTree::new(self.repo.list_channels())
    }

    /// Fetch a channel the user may see. Inaccessible channels are reported
    /// as missing.
    pub fn get_channel(&self, user_id: UserId, id: ChannelId) -> Result<Channel> {
        if !self.repo.is_channel_accessible(user_id, id) {
            return Err(ChannelError::NotFound(format!("channel {}", id)));
        }
        Ok(self.repo.get_channel(id)?)
    }

    /// Public channels plus the private and direct-message channels the user
    /// belongs to.
    pub fn list_channels(&self, user_id: UserId) -> Vec<Channel> {
        self.repo
            .list_channels()
            .into_iter()
            .filter(|c| c.is_public || self.repo.is_channel_accessible(user_id, c.id))
            .collect()
    }

    /// Create a public channel at the top level or under a public parent.
    pub fn create_public(
        &self,
        name: &str,
        parent_id: Option<ChannelId>,
        creator_id: UserId,
    ) -> Result<Channel> {
        validate_name(name)?;
        if let Some(parent) = parent_id {
            let tree = self.tree();
            let parent = self.require_parent(&tree, parent)?;
            if !parent.is_public {
                return Err(ChannelError::Forbidden(
                    "public channels cannot be created under a private channel".into(),
                ));
            }
            check_child_depth(&tree, parent.id)?;
        }

        let channel = self
            .repo
            .create_channel(Channel::new(name, parent_id, true, creator_id), &[])?;
        info!(channel_id = %channel.id, name = %channel.name, "Channel created");
        self.publish_channel(Topic::ChannelCreated, &channel, Vec::new(), creator_id);
        Ok(channel)
    }

    /// Create a top-level private channel. The creator is always a member.
    pub fn create_private(
        &self,
        name: &str,
        creator_id: UserId,
        members: &[UserId],
    ) -> Result<Channel> {
        validate_name(name)?;
        if members.is_empty() {
            return Err(ChannelError::InvalidArgument(
                "private channels need at least one member".into(),
            ));
        }
        let mut member_set: Vec<UserId> = Vec::with_capacity(members.len() + 1);
        for id in members.iter().chain(std::iter::once(&creator_id)) {
            if !member_set.contains(id) {
                self.repo.get_user(*id)?;
                member_set.push(*id);
            }
        }

        let channel = self
            .repo
            .create_channel(Channel::new(name, None, false, creator_id), &member_set)?;
        info!(channel_id = %channel.id, members = member_set.len(), "Private channel created");
        self.publish_channel(Topic::ChannelCreated, &channel, member_set, creator_id);
        Ok(channel)
    }

    /// Create a child channel. Children of private channels are private and
    /// copy the parent's membership.
    pub fn create_child(
        &self,
        name: &str,
        parent_id: ChannelId,
        creator_id: UserId,
    ) -> Result<Channel> {
        let parent = self.get_channel(creator_id, parent_id)?;
        if parent.is_public {
            return self.create_public(name, Some(parent_id), creator_id);
        }

        validate_name(name)?;
        let tree = self.tree();
        self.require_parent(&tree, parent_id)?;
        check_child_depth(&tree, parent_id)?;

        let members = self.repo.get_private_channel_members(parent_id);
        let channel = self
            .repo
            .create_channel(Channel::new(name, Some(parent_id), false, creator_id), &members)?;
        info!(channel_id = %channel.id, parent_id = %parent_id, "Private child channel created");
        self.publish_channel(Topic::ChannelCreated, &channel, members, creator_id);
        Ok(channel)
    }

    pub fn change_name(&self, id: ChannelId, name: &str, updater_id: UserId) -> Result<Channel> {
        validate_name(name)?;
        let current = self.repo.get_channel(id)?;
        if current.is_dm() {
            return Err(ChannelError::Forbidden("direct message channels cannot be renamed".into()));
        }

        let channel = self.repo.update_channel(
            id,
            UpdateChannelArgs {
                updater_id,
                name: Some(name.to_string()),
                ..Default::default()
            },
        )?;
        self.publish_updated(&channel, updater_id);
        Ok(channel)
    }

    /// Move a channel under `new_parent` (`None` for the top level).
    pub fn change_parent(
        &self,
        id: ChannelId,
        new_parent: Option<ChannelId>,
        updater_id: UserId,
    ) -> Result<Channel> {
        let tree = self.tree();
        let channel = tree
            .get(id)
            .cloned()
            .ok_or_else(|| ChannelError::NotFound(format!("channel {}", id)))?;
        if channel.is_dm() {
            return Err(ChannelError::Forbidden("direct message channels cannot be moved".into()));
        }

        let mut new_depth = tree.subtree_depth(id);
        if let Some(parent_id) = new_parent {
            let parent = self.require_parent(&tree, parent_id)?;
            if parent.is_public != channel.is_public {
                return Err(ChannelError::Forbidden(
                    "public and private channels cannot be mixed".into(),
                ));
            }
            if tree.is_in_subtree(id, parent_id) {
                return Err(ChannelError::DepthLimit);
            }
            new_depth += tree.depth(parent_id);
        }
        if new_depth > MAX_CHANNEL_DEPTH {
            return Err(ChannelError::DepthLimit);
        }

        let channel = self.repo.update_channel(
            id,
            UpdateChannelArgs {
                updater_id,
                parent_id: Some(new_parent),
                ..Default::default()
            },
        )?;
        info!(channel_id = %id, parent_id = ?new_parent, "Channel moved");
        self.publish_updated(&channel, updater_id);
        Ok(channel)
    }

    /// Change visibility and the forced flag. Only public channels can be
    /// forced.
    pub fn update_flags(
        &self,
        id: ChannelId,
        flags: ChannelFlags,
        updater_id: UserId,
    ) -> Result<Channel> {
        let current = self.repo.get_channel(id)?;
        if current.is_dm() {
            return Err(ChannelError::Forbidden("direct message channels cannot be edited".into()));
        }
        if flags.forced == Some(true) && !current.is_public {
            return Err(ChannelError::Forbidden("private channels cannot be forced".into()));
        }

        let channel = self.repo.update_channel(
            id,
            UpdateChannelArgs {
                updater_id,
                visibility: flags.visibility,
                forced: flags.forced,
                ..Default::default()
            },
        )?;
        self.publish_updated(&channel, updater_id);
        Ok(channel)
    }

    pub fn set_topic(&self, id: ChannelId, topic: &str, updater_id: UserId) -> Result<Channel> {
        let channel = self.repo.update_channel(
            id,
            UpdateChannelArgs {
                updater_id,
                topic: Some(topic.to_string()),
                ..Default::default()
            },
        )?;
        let members = self.members_of(&channel);
        self.hub.publish(
            channel_event(Topic::ChannelTopicUpdated, &channel, members, updater_id)
                .with(fields::TOPIC, Field::Text(topic.to_string())),
        );
        self.publish_updated(&channel, updater_id);
        Ok(channel)
    }

    /// Delete a channel and its whole subtree.
    pub fn delete(&self, id: ChannelId, actor_id: UserId) -> Result<Vec<ChannelId>> {
        let channel = self.repo.get_channel(id)?;
        if channel.is_dm() {
            return Err(ChannelError::Forbidden("direct message channels cannot be deleted".into()));
        }
        let members = self.members_of(&channel);

        let deleted = self.repo.delete_channel(id)?;
        info!(channel_id = %id, removed = deleted.len(), "Channel deleted");
        self.hub.publish(
            channel_event(Topic::ChannelDeleted, &channel, members, actor_id)
                .with(fields::DELETED_IDS, Field::Ids(deleted.clone())),
        );
        Ok(deleted)
    }

    /// Return the direct-message channel between two users.
    pub fn dm_channel(&self, user_id: UserId, other_id: UserId) -> Result<Channel> {
        self.repo.get_user(other_id)?;
        Ok(self.repo.get_or_create_dm_channel(user_id, other_id)?)
    }

    /// Users subscribed with `notify` to a public, non-forced channel.
    pub fn notify_subscribers(&self, id: ChannelId) -> Result<Vec<UserId>> {
        let channel = self.repo.get_channel(id)?;
        require_subscribable(&channel)?;
        Ok(self
            .repo
            .get_channel_subscriptions(id)
            .into_iter()
            .filter(|s| s.flags.notify)
            .map(|s| s.user_id)
            .collect())
    }

    /// Turn notifications on for `on` and off for `off`.
    pub fn change_notify_subscribers(
        &self,
        id: ChannelId,
        on: &[UserId],
        off: &[UserId],
    ) -> Result<()> {
        let channel = self.repo.get_channel(id)?;
        require_subscribable(&channel)?;
        let on_set: HashSet<&UserId> = on.iter().collect();
        if off.iter().any(|u| on_set.contains(u)) {
            return Err(ChannelError::InvalidArgument(
                "a user cannot be both subscribed and unsubscribed".into(),
            ));
        }
        for user in on {
            self.repo.set_subscription(*user, id, SubscriptionFlags::NOTIFY)?;
        }
        for user in off {
            self.repo.set_subscription(*user, id, SubscriptionFlags::NONE)?;
        }
        Ok(())
    }

    pub fn user_subscriptions(&self, user_id: UserId) -> Vec<ChannelSubscription> {
        self.repo.get_user_subscriptions(user_id)
    }

    pub fn set_user_subscription(
        &self,
        user_id: UserId,
        id: ChannelId,
        flags: SubscriptionFlags,
    ) -> Result<()> {
        let channel = self.get_channel(user_id, id)?;
        if channel.is_forced {
            return Err(ChannelError::InvalidArgument(
                "forced channels cannot change subscription".into(),
            ));
        }
        Ok(self.repo.set_subscription(user_id, id, flags)?)
    }

    pub fn star(&self, user_id: UserId, id: ChannelId) -> Result<()> {
        self.get_channel(user_id, id)?;
        if self.repo.add_star(user_id, id)? {
            self.publish_personal(Topic::ChannelStared, user_id, id);
        }
        Ok(())
    }

    pub fn unstar(&self, user_id: UserId, id: ChannelId) -> Result<()> {
        if self.repo.remove_star(user_id, id)? {
            self.publish_personal(Topic::ChannelUnstared, user_id, id);
        }
        Ok(())
    }

    pub fn mute(&self, user_id: UserId, id: ChannelId) -> Result<()> {
        let channel = self.get_channel(user_id, id)?;
        if channel.is_forced {
            return Err(ChannelError::InvalidArgument("forced channels cannot be muted".into()));
        }
        if self.repo.mute_channel(user_id, id)? {
            self.publish_personal(Topic::ChannelMuted, user_id, id);
        }
        Ok(())
    }

    pub fn unmute(&self, user_id: UserId, id: ChannelId) -> Result<()> {
        if self.repo.unmute_channel(user_id, id)? {
            self.publish_personal(Topic::ChannelUnmuted, user_id, id);
        }
        Ok(())
    }

    /// Mark every message of a channel as read.
    pub fn read(&self, user_id: UserId, id: ChannelId) -> Result<()> {
        self.repo.delete_unreads(user_id, id);
        self.publish_personal(Topic::ChannelRead, user_id, id);
        Ok(())
    }

    fn require_parent<'a>(&self, tree: &'a ChannelTree, parent_id: ChannelId) -> Result<&'a Channel> {
        if parent_id == DM_CHANNEL_ROOT_ID {
            return Err(ChannelError::Forbidden(
                "channels cannot be placed under the direct message root".into(),
            ));
        }
        let parent = tree
            .get(parent_id)
            .ok_or_else(|| ChannelError::NotFound(format!("channel {}", parent_id)))?;
        if parent.is_dm() {
            return Err(ChannelError::Forbidden(
                "direct message channels cannot have children".into(),
            ));
        }
        Ok(parent)
    }

    fn members_of(&self, channel: &Channel) -> Vec<UserId> {
        if channel.is_public {
            Vec::new()
        } else {
            self.repo.get_private_channel_members(channel.id)
        }
    }

    fn publish_updated(&self, channel: &Channel, updater_id: UserId) {
        let members = self.members_of(channel);
        self.publish_channel(Topic::ChannelUpdated, channel, members, updater_id);
    }

    fn publish_channel(&self, topic: Topic, channel: &Channel, members: Vec<UserId>, actor: UserId) {
        self.hub.publish(channel_event(topic, channel, members, actor));
    }

    fn publish_personal(&self, topic: Topic, user_id: UserId, channel_id: ChannelId) {
        self.hub.publish(
            Event::new(topic)
                .with_id(fields::USER_ID, user_id)
                .with_id(fields::CHANNEL_ID, channel_id),
        );
    }
}

fn channel_event(topic: Topic, channel: &Channel, members: Vec<UserId>, actor: UserId) -> Event {
    Event::new(topic)
        .with(fields::CHANNEL, Field::Channel(Box::new(channel.clone())))
        .with_id(fields::CHANNEL_ID, channel.id)
        .with_id(fields::USER_ID, actor)
        .with(fields::IS_PUBLIC, Field::Bool(channel.is_public))
        .with(fields::MEMBERS, Field::Ids(members))
}

fn validate_name(name: &str) -> Result<()> {
    if Channel::is_valid_name(name) {
        Ok(())
    } else {
        Err(ChannelError::InvalidName(name.to_string()))
    }
}

/// Creating a child under `parent_id` must keep the child within the depth
/// limit.
fn check_child_depth(tree: &ChannelTree, parent_id: ChannelId) -> Result<()> {
    if tree.depth(parent_id) + 1 > MAX_CHANNEL_DEPTH {
        Err(ChannelError::DepthLimit)
    } else {
        Ok(())
    }
}

fn require_subscribable(channel: &Channel) -> Result<()> {
    if channel.is_forced || !channel.is_public {
        return Err(ChannelError::InvalidArgument(
            "forced and private channels have fixed subscribers".into(),
        ));
    }
    Ok(())
}
