//! Channels and per-user channel subscriptions.

use crate::{ChannelId, Timestamp, UserId};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum depth of the channel tree, counting the top-level channel as 1.
pub const MAX_CHANNEL_DEPTH: usize = 5;

/// Reserved virtual parent of every direct-message channel.
pub const DM_CHANNEL_ROOT_ID: Uuid = Uuid::from_u128(0xaaaaaaaa_aaaa_4aaa_aaaa_aaaaaaaaaaaa);

/// Channel names: 1 to 20 characters, no mention/hash/colon marks (ASCII or
/// full-width) and no whitespace.
pub static CHANNEL_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@＠#＃:：\s]{1,20}$").expect("Invalid regex"));

/// A channel in the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    /// `None` for top-level channels.
    pub parent_id: Option<ChannelId>,
    pub topic: String,
    pub is_public: bool,
    pub is_forced: bool,
    pub is_visible: bool,
    pub is_thread: bool,
    pub creator_id: UserId,
    pub updater_id: UserId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Channel {
    /// Creates a visible, non-forced channel.
    pub fn new(
        name: impl Into<String>,
        parent_id: Option<ChannelId>,
        is_public: bool,
        creator_id: UserId,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            parent_id,
            topic: String::new(),
            is_public,
            is_forced: false,
            is_visible: true,
            is_thread: false,
            creator_id,
            updater_id: creator_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Direct-message channels live under the reserved DM root.
    pub fn is_dm(&self) -> bool {
        self.parent_id == Some(DM_CHANNEL_ROOT_ID)
    }

    pub fn is_valid_name(name: &str) -> bool {
        CHANNEL_NAME_REGEX.is_match(name)
    }
}

/// Per-user subscription flags for a channel.
///
/// `mark` keeps unread tracking visible without push notifications;
/// `notify` additionally makes the user a notification subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubscriptionFlags {
    pub mark: bool,
    pub notify: bool,
}

impl SubscriptionFlags {
    pub const NONE: Self = Self { mark: false, notify: false };
    pub const MARK: Self = Self { mark: true, notify: false };
    pub const NOTIFY: Self = Self { mark: true, notify: true };

    pub fn is_none(&self) -> bool {
        !self.mark && !self.notify
    }
}

/// A user's subscription to a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSubscription {
    pub user_id: UserId,
    pub channel_id: ChannelId,
    #[serde(flatten)]
    pub flags: SubscriptionFlags,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_name_rules() {
        assert!(Channel::is_valid_name("general"));
        assert!(Channel::is_valid_name("日本語チャンネル"));
        assert!(!Channel::is_valid_name(""));
        assert!(!Channel::is_valid_name("a b"));
        assert!(!Channel::is_valid_name("a\tb"));
        for bad in ["@x", "＠x", "#x", "＃x", "x:y", "x：y"] {
            assert!(!Channel::is_valid_name(bad), "{bad} should be rejected");
        }
        assert!(!Channel::is_valid_name(&"a".repeat(21)));
        assert!(Channel::is_valid_name(&"あ".repeat(20)));
    }

    #[test]
    fn test_dm_detection() {
        let user = Uuid::new_v4();
        let dm = Channel::new("dm", Some(DM_CHANNEL_ROOT_ID), false, user);
        assert!(dm.is_dm());
        let public = Channel::new("general", None, true, user);
        assert!(!public.is_dm());
    }

    #[test]
    fn test_subscription_flags() {
        assert!(SubscriptionFlags::NONE.is_none());
        assert!(!SubscriptionFlags::MARK.is_none());
        assert!(SubscriptionFlags::NOTIFY.notify);
    }
}
