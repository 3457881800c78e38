//! Delivery counters.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;
use traq_types::BotDeliveryResult;

/// Bot delivery labels.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DeliveryLabels {
    /// `ok`, `ng` or `ne`.
    pub result: String,
}

/// Counters updated by the dispatcher. Clones share the same series.
#[derive(Clone, Default)]
pub struct BotMetrics {
    pub deliveries_total: Family<DeliveryLabels, Counter>,
}

impl BotMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the counters with a registry.
    pub fn register(&self, registry: &mut Registry) {
        registry.register(
            "traq_bot_event_deliveries",
            "Bot event deliveries by result",
            self.deliveries_total.clone(),
        );
    }

    pub fn record(&self, result: BotDeliveryResult) {
        self.deliveries_total
            .get_or_create(&DeliveryLabels {
                result: result.as_str().to_string(),
            })
            .inc();
    }

    /// Current count for one result.
    pub fn count(&self, result: BotDeliveryResult) -> u64 {
        self.deliveries_total
            .get_or_create(&DeliveryLabels {
                result: result.as_str().to_string(),
            })
            .get()
    }
}
