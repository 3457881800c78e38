//! In-memory repository.
//!
//! All tables live behind a single lock so that every trait method executes
//! as one transaction: multi-table invariants (membership inheritance, unread
//! cascades, token rotation) are never observable half-applied.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use traq_types::{
    Bot, BotEventLog, Channel, ChannelId, ClipFolder, ClipFolderMessage, Message, MessageId,
    MessageStamp, OAuth2Authorize, OAuth2Client, OAuth2Token, Pin, Stamp, SubscriptionFlags, Tag,
    Unread, User, UserGroup, UserId, UserTag, Webhook,
};
use uuid::Uuid;

#[derive(Debug, Default)]
pub(crate) struct Tables {
    // users
    pub users: HashMap<UserId, User>,
    pub user_names: HashMap<String, UserId>,
    pub devices: HashMap<String, UserId>,
    pub tags: HashMap<Uuid, Tag>,
    pub tag_names: HashMap<String, Uuid>,
    pub user_tags: HashMap<(UserId, Uuid), UserTag>,
    pub groups: HashMap<Uuid, UserGroup>,

    // channels
    pub channels: HashMap<ChannelId, Channel>,
    pub private_members: HashMap<ChannelId, HashSet<UserId>>,
    pub dm_pairs: HashMap<(UserId, UserId), ChannelId>,
    pub subscriptions: HashMap<(UserId, ChannelId), SubscriptionFlags>,
    pub stars: HashSet<(UserId, ChannelId)>,
    pub mutes: HashSet<(UserId, ChannelId)>,

    // messages
    pub messages: HashMap<MessageId, Message>,
    pub channel_messages: HashMap<ChannelId, Vec<MessageId>>,
    pub pins: HashMap<Uuid, Pin>,
    pub message_pins: HashMap<MessageId, Uuid>,
    pub unreads: HashMap<(UserId, MessageId), Unread>,
    pub stamps: HashMap<Uuid, Stamp>,
    pub stamp_names: HashMap<String, Uuid>,
    pub message_stamps: HashMap<(MessageId, Uuid, UserId), MessageStamp>,
    pub clip_folders: HashMap<Uuid, ClipFolder>,
    pub clip_messages: HashMap<(Uuid, MessageId), ClipFolderMessage>,

    // oauth2
    pub clients: HashMap<String, OAuth2Client>,
    pub authorizes: HashMap<String, OAuth2Authorize>,
    pub tokens: HashMap<Uuid, OAuth2Token>,
    pub access_index: HashMap<String, Uuid>,
    pub refresh_index: HashMap<String, Uuid>,

    // bots and webhooks
    pub bots: HashMap<Uuid, Bot>,
    pub bot_channels: HashSet<(Uuid, ChannelId)>,
    pub bot_logs: HashMap<Uuid, Vec<BotEventLog>>,
    pub webhooks: HashMap<Uuid, Webhook>,
}

impl Tables {
    /// Removes a message and everything that references it.
    pub(crate) fn purge_message(&mut self, id: MessageId) -> Option<Message> {
        let message = self.messages.remove(&id)?;
        if let Some(ids) = self.channel_messages.get_mut(&message.channel_id) {
            ids.retain(|m| *m != id);
        }
        if let Some(pin_id) = self.message_pins.remove(&id) {
            self.pins.remove(&pin_id);
        }
        self.unreads.retain(|(_, m), _| *m != id);
        self.message_stamps.retain(|(m, _, _), _| *m != id);
        self.clip_messages.retain(|(_, m), _| *m != id);
        Some(message)
    }

    /// Removes a token and its lookup indexes.
    pub(crate) fn purge_token(&mut self, id: Uuid) -> Option<OAuth2Token> {
        let token = self.tokens.remove(&id)?;
        self.access_index.remove(&token.access_token);
        if let Some(refresh) = &token.refresh_token {
            self.refresh_index.remove(refresh);
        }
        Some(token)
    }

    pub(crate) fn insert_token(&mut self, token: OAuth2Token) {
        self.access_index.insert(token.access_token.clone(), token.id);
        if let Some(refresh) = &token.refresh_token {
            self.refresh_index.insert(refresh.clone(), token.id);
        }
        self.tokens.insert(token.id, token);
    }

    pub(crate) fn sibling_name_taken(
        &self,
        parent_id: Option<ChannelId>,
        name: &str,
        except: Option<ChannelId>,
    ) -> bool {
        self.channels.values().any(|c| {
            c.parent_id == parent_id && c.name == name && Some(c.id) != except
        })
    }
}

/// Thread-safe in-memory implementation of [`crate::Repository`].
#[derive(Debug, Default)]
pub struct MemoryRepository {
    pub(crate) tables: RwLock<Tables>,
}

impl MemoryRepository {
    /// Create a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}
