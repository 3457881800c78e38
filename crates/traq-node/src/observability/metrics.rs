//! Prometheus metrics.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use traq_bot::BotMetrics;
use traq_hub::HubStats;
use uuid::Uuid;

/// HTTP request labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpLabels {
    pub method: String,
    /// Path with ids replaced by `:id`.
    pub path: String,
    pub status: u16,
}

/// Global metrics state.
pub static METRICS: Lazy<MetricsState> = Lazy::new(MetricsState::new);

/// Metrics state container. Clones share the same series.
#[derive(Clone)]
pub struct MetricsState {
    pub registry: Arc<RwLock<Registry>>,
    pub http_requests_total: Family<HttpLabels, Counter>,
    /// Request duration in seconds.
    pub http_request_duration_seconds: Family<HttpLabels, Histogram>,
    pub http_active_connections: Gauge,
    /// Open SSE streams.
    pub sse_connections: Gauge,
    /// Events published on the hub since start.
    pub hub_events_published: Counter,
    /// Bot deliveries by result.
    pub bot: BotMetrics,
}

impl Default for MetricsState {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsState {
    /// Create a metrics state with every metric registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let http_requests_total = Family::<HttpLabels, Counter>::default();
        registry.register(
            "traq_http_requests",
            "Total HTTP requests",
            http_requests_total.clone(),
        );

        let http_request_duration_seconds =
            Family::<HttpLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 16))
            });
        registry.register(
            "traq_http_request_duration_seconds",
            "HTTP request duration in seconds",
            http_request_duration_seconds.clone(),
        );

        let http_active_connections = Gauge::default();
        registry.register(
            "traq_http_active_connections",
            "Number of in-flight HTTP requests",
            http_active_connections.clone(),
        );

        let sse_connections = Gauge::default();
        registry.register(
            "traq_sse_connections",
            "Open SSE notification streams",
            sse_connections.clone(),
        );

        let hub_events_published = Counter::default();
        registry.register(
            "traq_hub_events_published",
            "Events published on the event hub",
            hub_events_published.clone(),
        );

        let bot = BotMetrics::new();
        bot.register(&mut registry);

        Self {
            registry: Arc::new(RwLock::new(registry)),
            http_requests_total,
            http_request_duration_seconds,
            http_active_connections,
            sse_connections,
            hub_events_published,
            bot,
        }
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let labels = HttpLabels {
            method: method.to_string(),
            path: normalize_path(path),
            status,
        };

        self.http_requests_total.get_or_create(&labels).inc();
        self.http_request_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Bring the publication counter up to the hub's running total.
    pub fn observe_hub(&self, stats: &HubStats) {
        let seen = self.hub_events_published.get();
        if stats.total_published > seen {
            self.hub_events_published.inc_by(stats.total_published - seen);
        }
    }

    /// Encode metrics in the Prometheus text format.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        let registry = self.registry.read();
        if let Err(e) = prometheus_client::encoding::text::encode(&mut buffer, &registry) {
            tracing::warn!(error = %e, "Failed to encode metrics");
        }
        buffer
    }
}

/// Counts one open SSE stream for as long as it lives.
pub struct SseConnectionGuard(());

impl SseConnectionGuard {
    pub fn new() -> Self {
        METRICS.sse_connections.inc();
        Self(())
    }
}

impl Default for SseConnectionGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SseConnectionGuard {
    fn drop(&mut self) {
        METRICS.sse_connections.dec();
    }
}

/// Replace id segments so that label cardinality stays bounded.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|part| {
            if is_dynamic_segment(part) {
                ":id"
            } else {
                part
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_dynamic_segment(segment: &str) -> bool {
    if segment.is_empty() {
        return false;
    }
    Uuid::parse_str(segment).is_ok() || segment.chars().all(|c| c.is_ascii_digit())
}
