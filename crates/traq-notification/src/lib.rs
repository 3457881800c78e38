//! # traQ Notification
//!
//! Consumes hub events and turns them into user-visible effects:
//!
//! - for `message.created`, [`recipients::compute`] decides who gets an
//!   unread row, who is notified and who merely sees the stream event;
//! - every other streamed topic is mapped by [`dispatch::route_for`] onto an
//!   upper-snake-case SSE event type and one of the delivery strategies.

pub mod dispatch;
pub mod error;
pub mod recipients;
pub mod service;

pub use dispatch::{payload, route_for, Route, Strategy};
pub use error::NotificationError;
pub use recipients::{Presence, Recipients};
pub use service::{NotificationService, NOTIFICATION_BUFFER};

/// Result type for notification routing.
pub type Result<T> = std::result::Result<T, NotificationError>;
