//! # traQ Webhook
//!
//! Incoming webhooks post messages into a channel as their own bot user.
//! Plain, JSON and form bodies are accepted; webhooks with a secret require
//! an HMAC-SHA1 signature of the body. GitHub deliveries are rendered through
//! a YAML template set.

pub mod error;
pub mod github;
pub mod service;
pub mod signature;

pub use error::WebhookError;
pub use github::{TemplateSet, GITHUB_EVENT_HEADER};
pub use service::{
    CreateWebhook, Incoming, WebhookService, CHANNEL_ID_HEADER, GITHUB_SIGNATURE_HEADER,
    SIGNATURE_HEADER,
};

/// Result type for webhook operations.
pub type Result<T> = std::result::Result<T, WebhookError>;
