//! # traQ Types
//!
//! Domain types shared by every traQ crate.
//!
//! ## Entities
//!
//! - [`User`], [`Tag`], [`UserGroup`]: accounts and the groupings used for mentions
//! - [`Channel`], [`SubscriptionFlags`]: the channel tree and per-user subscriptions
//! - [`Message`], [`Pin`], [`Unread`], [`Stamp`], [`MessageStamp`], [`ClipFolder`]
//! - [`OAuth2Client`], [`OAuth2Authorize`], [`OAuth2Token`]: the OAuth2 server state
//! - [`Bot`], [`BotEventLog`]: bot registrations and their delivery history
//! - [`Webhook`]: incoming webhooks
//!
//! All identifiers are 128-bit UUIDs except OAuth2 client ids, which are
//! opaque strings.
//!
//! ## Embeds
//!
//! [`embed::parse`] extracts mentions, group/tag mentions, channel links,
//! attachments and citations from message text.

pub mod bot;
pub mod channel;
pub mod embed;
pub mod message;
pub mod oauth2;
pub mod scope;
pub mod timestamp;
pub mod user;
pub mod webhook;

use uuid::Uuid;

pub type UserId = Uuid;
pub type ChannelId = Uuid;
pub type MessageId = Uuid;

pub use bot::{Bot, BotDeliveryResult, BotEventLog, BotEventType, BotMode, BotState};
pub use channel::{
    Channel, ChannelSubscription, SubscriptionFlags, CHANNEL_NAME_REGEX, DM_CHANNEL_ROOT_ID,
    MAX_CHANNEL_DEPTH,
};
pub use embed::ParseResult;
pub use message::{
    ClipFolder, ClipFolderMessage, Message, MessageStamp, Pin, Stamp, Unread, UnreadChannel,
};
pub use oauth2::{
    CodeChallengeMethod, OAuth2Authorize, OAuth2Client, OAuth2Token, AUTHORIZATION_CODE_EXPIRES_IN,
};
pub use scope::{is_oauth2_scope, AccessScope, AccessScopes, REGISTERED_SCOPES};
pub use timestamp::Timestamp;
pub use user::{role, Tag, User, UserGroup, UserStatus, UserTag, USER_NAME_REGEX};
pub use webhook::Webhook;
