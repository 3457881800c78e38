//! # traQ Hub
//!
//! A typed in-process publish/subscribe bus carrying domain events between
//! traQ services.
//!
//! Publishers call [`Hub::publish`] with an [`Event`]: a [`Topic`] drawn from a
//! closed set plus a map of typed [`Field`]s. Subscribers choose their topics
//! and buffer size; each one receives events in publish order.
//!
//! ## Example
//!
//! ```rust
//! use traq_hub::{fields, Event, Hub, Topic};
//! use uuid::Uuid;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let hub = Hub::new();
//! let mut sub = hub.subscribe(16, &[Topic::ChannelStared]).unwrap();
//!
//! hub.publish(Event::new(Topic::ChannelStared).with_id(fields::CHANNEL_ID, Uuid::nil()));
//!
//! let event = sub.recv().await.unwrap();
//! assert_eq!(event.id(fields::CHANNEL_ID), Some(Uuid::nil()));
//! # }
//! ```

pub mod error;
pub mod event;
pub mod hub;
pub mod topic;

pub use error::HubError;
pub use event::{fields, Event, Field, Viewer};
pub use hub::{Hub, HubStats, SubscriberId, Subscription, BACKLOG_WARN_THRESHOLD};
pub use topic::Topic;

/// Result type for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;
