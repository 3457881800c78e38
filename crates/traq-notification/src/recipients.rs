//! Who a new message concerns.

use crate::Result;
use std::collections::BTreeSet;
use tracing::warn;
use traq_repository::{
    ChannelRepository, Repository, TagRepository, UserRepository, UsersQuery,
};
use traq_types::{Channel, Message, ParseResult, UserId};

/// Recipients of a newly posted message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipients {
    /// Users the channel's policy says should hear about the message.
    pub subscribers: BTreeSet<UserId>,
    /// Users present on the channel who are not subscribers.
    pub connected: BTreeSet<UserId>,
    /// Users who get an unread row.
    pub unread: BTreeSet<UserId>,
    /// Subset of `unread` whose row is noticeable.
    pub noticeable: BTreeSet<UserId>,
    /// Users who should get a push notification.
    pub push: BTreeSet<UserId>,
}

impl Recipients {
    /// Everyone who should receive the `MESSAGE_CREATED` stream event.
    pub fn stream_targets(&self) -> Vec<UserId> {
        self.subscribers.union(&self.connected).copied().collect()
    }
}

/// Channel presence as seen by the heartbeat tracker.
#[derive(Debug, Clone, Copy, Default)]
pub struct Presence<'a> {
    /// Everyone with a heartbeat entry on the channel.
    pub present: &'a [UserId],
    /// Those whose status is not `none`.
    pub viewing: &'a [UserId],
}

/// Apply the channel's delivery policy to a new message.
///
/// 1. forced channel: every active non-bot user;
/// 2. private channel: its members;
/// 3. otherwise: notify subscribers plus everyone mentioned directly, by
///    tag or by group.
///
/// Unread rows go to subscribers other than the author who are not
/// currently viewing. Mutes only suppress push.
pub fn compute(
    repo: &dyn Repository,
    channel: &Channel,
    message: &Message,
    parsed: &ParseResult,
    presence: Presence<'_>,
) -> Result<Recipients> {
    let mut mentioned: BTreeSet<UserId> = BTreeSet::new();
    let subscribers: BTreeSet<UserId> = if channel.is_forced {
        repo.list_users(UsersQuery::notifiable())
            .into_iter()
            .map(|u| u.id)
            .collect()
    } else if !channel.is_public {
        repo.get_private_channel_members(channel.id)
            .into_iter()
            .collect()
    } else {
        let mut set: BTreeSet<UserId> = repo
            .get_channel_subscriptions(channel.id)
            .into_iter()
            .filter(|s| s.flags.notify)
            .map(|s| s.user_id)
            .collect();

        for &user_id in &parsed.mentions {
            match repo.get_user(user_id) {
                Ok(user) if user.is_active() && !user.bot => {
                    mentioned.insert(user_id);
                }
                Ok(_) => {}
                Err(e) => warn!(user_id = %user_id, error = %e, "Mentioned user not found"),
            }
        }
        for &tag_id in &parsed.tag_mentions {
            mentioned.extend(repo.get_users_with_tag(tag_id));
        }
        for &group_id in &parsed.group_mentions {
            match repo.get_user_group(group_id) {
                Ok(group) => mentioned.extend(group.members),
                Err(e) => warn!(group_id = %group_id, error = %e, "Mentioned group not found"),
            }
        }
        mentioned.retain(|id| is_notifiable(repo, *id));
        set.extend(mentioned.iter().copied());
        set
    };

    let connected: BTreeSet<UserId> = presence
        .present
        .iter()
        .filter(|id| !subscribers.contains(id))
        .copied()
        .collect();

    let unread: BTreeSet<UserId> = subscribers
        .iter()
        .filter(|id| **id != message.user_id && !presence.viewing.contains(id))
        .filter(|id| is_notifiable(repo, **id))
        .copied()
        .collect();

    let noticeable: BTreeSet<UserId> = unread.intersection(&mentioned).copied().collect();

    let muted: BTreeSet<UserId> = if channel.is_forced {
        BTreeSet::new()
    } else {
        repo.get_muted_users(channel.id).into_iter().collect()
    };
    let push: BTreeSet<UserId> = subscribers
        .iter()
        .filter(|id| **id != message.user_id && !muted.contains(id))
        .copied()
        .collect();

    Ok(Recipients {
        subscribers,
        connected,
        unread,
        noticeable,
        push,
    })
}

fn is_notifiable(repo: &dyn Repository, user_id: UserId) -> bool {
    repo.get_user(user_id)
        .map(|u| u.is_active() && !u.bot)
        .unwrap_or(false)
}
