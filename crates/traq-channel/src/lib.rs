//! # traQ Channel
//!
//! The channel tree service: creation, renaming, re-parenting and deletion
//! of channels, plus per-user channel state (subscriptions, stars, mutes and
//! read markers).
//!
//! ## Tree rules
//!
//! - Depth, counting the channel itself, never exceeds
//!   [`traq_types::MAX_CHANNEL_DEPTH`]. Top-level channels have depth 1.
//! - Sibling names are unique.
//! - A channel never moves between the public and private halves of the tree.
//! - Children of private channels copy their parent's membership.
//! - Direct-message channels live under a reserved root and are immutable.
//!
//! Every mutation publishes the matching `channel.*` event on the hub.

pub mod error;
pub mod service;
pub mod tree;

pub use error::ChannelError;
pub use service::{ChannelFlags, ChannelService};
pub use tree::ChannelTree;

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;
