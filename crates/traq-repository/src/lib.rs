//! # traQ Repository
//!
//! The persistence contract consumed by every traQ service, and an
//! in-memory implementation of it.
//!
//! The contract is split by concern ([`UserRepository`], [`ChannelRepository`],
//! [`MessageRepository`], ...) and recombined as [`Repository`], which services
//! hold as `Arc<dyn Repository>`. Each method is one transaction: multi-step
//! effects such as subtree deletion or refresh-token rotation are applied
//! atomically.

mod bot;
mod channel;
mod error;
mod memory;
mod message;
mod oauth2;
mod stamp;
mod user;

pub use bot::{BotRepository, WebhookRepository};
pub use channel::{ChannelRepository, UpdateChannelArgs};
pub use error::{RepositoryError, Result};
pub use memory::MemoryRepository;
pub use message::MessageRepository;
pub use oauth2::OAuth2Repository;
pub use stamp::{ClipRepository, StampRepository};
pub use user::{TagRepository, UserRepository, UsersQuery};

/// The full persistence contract.
pub trait Repository:
    UserRepository
    + TagRepository
    + ChannelRepository
    + MessageRepository
    + StampRepository
    + ClipRepository
    + OAuth2Repository
    + BotRepository
    + WebhookRepository
{
}

impl<T> Repository for T where
    T: UserRepository
        + TagRepository
        + ChannelRepository
        + MessageRepository
        + StampRepository
        + ClipRepository
        + OAuth2Repository
        + BotRepository
        + WebhookRepository
{
}
