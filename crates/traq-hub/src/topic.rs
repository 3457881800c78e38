//! The closed set of hub topics.

use std::fmt;

/// A hub topic. Wire names are dotted lower-case strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    // Message events
    MessageCreated,
    MessageUpdated,
    MessageDeleted,
    MessagePinned,
    MessageUnpinned,
    MessageStamped,
    MessageUnstamped,

    // Channel events
    ChannelCreated,
    ChannelUpdated,
    ChannelTopicUpdated,
    ChannelDeleted,
    ChannelStared,
    ChannelUnstared,
    ChannelMuted,
    ChannelUnmuted,
    ChannelRead,
    ChannelViewersChanged,

    // User events
    UserJoined,
    UserUpdated,
    UserIconUpdated,
    UserOnline,
    UserOffline,
    UserTagAdded,
    UserTagRemoved,
    UserGroupCreated,
    UserGroupUpdated,
    UserGroupDeleted,
    UserWebRtcStateChanged,

    // Stamp events
    StampCreated,
    StampUpdated,
    StampDeleted,

    // Clip events
    ClipFolderCreated,
    ClipFolderDeleted,
    ClipFolderMessageAdded,
    ClipFolderMessageRemoved,

    // Bot membership events
    BotJoined,
    BotLeft,
}

impl Topic {
    /// Parse a topic from its wire name.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        Self::all().into_iter().find(|t| t.as_str() == s)
    }

    /// Every topic.
    pub fn all() -> Vec<Topic> {
        vec![
            Topic::MessageCreated,
            Topic::MessageUpdated,
            Topic::MessageDeleted,
            Topic::MessagePinned,
            Topic::MessageUnpinned,
            Topic::MessageStamped,
            Topic::MessageUnstamped,
            Topic::ChannelCreated,
            Topic::ChannelUpdated,
            Topic::ChannelTopicUpdated,
            Topic::ChannelDeleted,
            Topic::ChannelStared,
            Topic::ChannelUnstared,
            Topic::ChannelMuted,
            Topic::ChannelUnmuted,
            Topic::ChannelRead,
            Topic::ChannelViewersChanged,
            Topic::UserJoined,
            Topic::UserUpdated,
            Topic::UserIconUpdated,
            Topic::UserOnline,
            Topic::UserOffline,
            Topic::UserTagAdded,
            Topic::UserTagRemoved,
            Topic::UserGroupCreated,
            Topic::UserGroupUpdated,
            Topic::UserGroupDeleted,
            Topic::UserWebRtcStateChanged,
            Topic::StampCreated,
            Topic::StampUpdated,
            Topic::StampDeleted,
            Topic::ClipFolderCreated,
            Topic::ClipFolderDeleted,
            Topic::ClipFolderMessageAdded,
            Topic::ClipFolderMessageRemoved,
            Topic::BotJoined,
            Topic::BotLeft,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::MessageCreated => "message.created",
            Topic::MessageUpdated => "message.updated",
            Topic::MessageDeleted => "message.deleted",
            Topic::MessagePinned => "message.pinned",
            Topic::MessageUnpinned => "message.unpinned",
            Topic::MessageStamped => "message.stamped",
            Topic::MessageUnstamped => "message.unstamped",
            Topic::ChannelCreated => "channel.created",
            Topic::ChannelUpdated => "channel.updated",
            Topic::ChannelTopicUpdated => "channel.topic.updated",
            Topic::ChannelDeleted => "channel.deleted",
            Topic::ChannelStared => "channel.stared",
            Topic::ChannelUnstared => "channel.unstared",
            Topic::ChannelMuted => "channel.muted",
            Topic::ChannelUnmuted => "channel.unmuted",
            Topic::ChannelRead => "channel.read",
            Topic::ChannelViewersChanged => "channel.viewers.changed",
            Topic::UserJoined => "user.joined",
            Topic::UserUpdated => "user.updated",
            Topic::UserIconUpdated => "user.iconUpdated",
            Topic::UserOnline => "user.online",
            Topic::UserOffline => "user.offline",
            Topic::UserTagAdded => "user.tag.added",
            Topic::UserTagRemoved => "user.tag.removed",
            Topic::UserGroupCreated => "user.group.created",
            Topic::UserGroupUpdated => "user.group.updated",
            Topic::UserGroupDeleted => "user.group.deleted",
            Topic::UserWebRtcStateChanged => "user.webrtc.state_changed",
            Topic::StampCreated => "stamp.created",
            Topic::StampUpdated => "stamp.updated",
            Topic::StampDeleted => "stamp.deleted",
            Topic::ClipFolderCreated => "clip.folder.created",
            Topic::ClipFolderDeleted => "clip.folder.deleted",
            Topic::ClipFolderMessageAdded => "clip.folder.message.added",
            Topic::ClipFolderMessageRemoved => "clip.folder.message.removed",
            Topic::BotJoined => "bot.joined",
            Topic::BotLeft => "bot.left",
        }
    }

    /// Check if this is a message event.
    pub fn is_message_event(&self) -> bool {
        self.as_str().starts_with("message.")
    }

    /// Check if this is a user event (tags and groups included).
    pub fn is_user_event(&self) -> bool {
        self.as_str().starts_with("user.")
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
