//! Bot event delivery for traQ.
//!
//! The [`BotEngine`] subscribes to the hub, works out which bots should see
//! each event and queues HTTP deliveries on a worker pool. Each bot is bound
//! to one worker so its events arrive in publish order. Every attempt is
//! logged; three consecutive failures pause the bot until it answers a ping.
//!
//! [`BotService`] covers registration and management of bots.

pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod payload;
pub mod pool;
pub mod sender;
pub mod service;

pub use dispatcher::{BotConfig, Dispatcher, MAX_LOG_BODY, MAX_LOG_ERROR};
pub use engine::{BotEngine, Delivery, BOT_HUB_BUFFER, BOT_TOPICS};
pub use error::BotError;
pub use metrics::BotMetrics;
pub use pool::{Job, WorkerPool};
pub use sender::{DeliveryRequest, EventSender, HttpSender, SendOutcome};
pub use service::{BotService, BotTokens, CreateBot, UpdateBot, BOT_USER_PREFIX, MAX_LOG_LIMIT};

/// Result type for bot operations.
pub type Result<T> = std::result::Result<T, BotError>;
