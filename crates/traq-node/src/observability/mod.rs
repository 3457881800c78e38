//! # Observability
//!
//! - **Structured logging**: JSON or pretty output with request ids
//! - **Prometheus metrics**: HTTP traffic, SSE connections, hub publications
//!   and bot deliveries
//! - **Request tracing**: an `x-request-id` span around every request
//!
//! ```rust,ignore
//! use traq_node::observability::{init_logging, request_id_layer, LogFormat};
//!
//! init_logging("info", LogFormat::Json);
//! let app: axum::Router<()> = axum::Router::new().layer(request_id_layer());
//! ```

mod logging;
mod metrics;
pub mod middleware;

pub use logging::{filter_directives, init_logging, LogFormat};
pub use metrics::{MetricsState, SseConnectionGuard, METRICS};
pub use middleware::{metrics_handler, metrics_layer, request_id_layer, MiddlewareLayer, REQUEST_ID_HEADER};
