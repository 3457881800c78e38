//! # traQ Node
//!
//! The HTTP server of a traQ chat node. It wires the domain crates together
//! and exposes them as a JSON API under `/api/v3`.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         traQ Node                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  HTTP API (axum)                                            │
//! │   • users, groups, tags, sessions                           │
//! │   • channels, subscriptions, stars, mutes, unreads          │
//! │   • messages, pins, stamps, clips                           │
//! │   • SSE notifications, heartbeats, WebRTC state             │
//! │   • OAuth2 server, bots, incoming webhooks                  │
//! │                          │                                  │
//! │                   Hub (event bus)                           │
//! │          ┌───────────────┴───────────────┐                  │
//! │  Notification router               Bot engine               │
//! │  (unreads, SSE fan-out)      (HTTP deliveries, logs)        │
//! │                          │                                  │
//! │                 Repository (in memory)                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`node`] - Service assembly, background tasks and shutdown
//! - [`api`] - Shared state, error mapping and the router
//! - [`session`] - Login sessions and request authentication
//! - [`user_api`], [`channel_api`], [`message_api`], [`realtime_api`],
//!   [`bot_api`], [`oauth2_api`], [`webhook_api`] - Route groups
//! - [`config`] - Node configuration
//! - [`observability`] - Structured logging, metrics and request tracing
//! - [`validation`] - Request body validation
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use traq_node::config::Config;
//! use traq_node::node::Node;
//! use traq_repository::MemoryRepository;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let node = Node::start(
//!     &Config::default(),
//!     Arc::new(MemoryRepository::new()),
//!     CancellationToken::new(),
//! )?;
//! let app = node.router();
//! # let _ = app;
//! node.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod bot_api;
pub mod channel_api;
pub mod config;
pub mod message_api;
pub mod node;
pub mod oauth2_api;
pub mod observability;
pub mod realtime_api;
pub mod session;
pub mod user_api;
pub mod validation;
pub mod webhook_api;
