//! # traQ Message
//!
//! Commands over messages and the things attached to them: pins, stamps and
//! clip folders. Each command checks channel access, writes through the
//! repository and publishes the matching hub event.
//!
//! [`Producer`] covers the automated authors, bots and webhooks, that post
//! as their dedicated bot user.

pub mod clip;
pub mod error;
pub mod producer;
pub mod service;
pub mod stamp;

pub use clip::ClipService;
pub use error::MessageError;
pub use producer::Producer;
pub use service::{MessageService, MAX_MESSAGE_LENGTH};
pub use stamp::{StampService, STAMP_NAME_REGEX};

/// Result type for message operations.
pub type Result<T> = std::result::Result<T, MessageError>;
