//! Prometheus counters for the webhook gateway.

use hook_relay_core::{MetricEvent, ProviderKind};
use prometheus::IntCounterVec;
use std::sync::Arc;

/// Label for a request whose provider could not be determined.
pub const UNKNOWN_PROVIDER_LABEL: &str = "unknown";

/// Outcome label values for `webhook_trigger_outcomes_total`.
pub mod outcome {
    pub const SUCCESS: &str = "success";
    pub const FAILED: &str = "failed";
    pub const ERROR: &str = "error";
    pub const SKIPPED: &str = "skipped";
}

/// Service metrics for observability
///
/// Registered once against the default Prometheus registry; registering a
/// second instance in the same process fails with a duplicate-metric error.
#[derive(Debug)]
pub struct ServiceMetrics {
    pub webhook_requests_total: IntCounterVec,
    pub webhook_trigger_outcomes_total: IntCounterVec,
    pub webhook_observed_events_total: IntCounterVec,
}

impl ServiceMetrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        use prometheus::register_int_counter_vec;

        Ok(Arc::new(Self {
            webhook_requests_total: register_int_counter_vec!(
                "webhook_requests_total",
                "Webhook requests received, by provider",
                &["provider"]
            )?,
            webhook_trigger_outcomes_total: register_int_counter_vec!(
                "webhook_trigger_outcomes_total",
                "Trigger entries by outcome",
                &["outcome"]
            )?,
            webhook_observed_events_total: register_int_counter_vec!(
                "webhook_observed_events_total",
                "Repository activity observed in webhooks",
                &["provider", "kind"]
            )?,
        }))
    }

    pub fn record_request(&self, provider: Option<ProviderKind>) {
        let label = provider.map_or(UNKNOWN_PROVIDER_LABEL, |p| p.id());
        self.webhook_requests_total.with_label_values(&[label]).inc();
    }

    pub fn record_trigger_outcome(&self, outcome: &str) {
        self.webhook_trigger_outcomes_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn record_observed_event(&self, event: &MetricEvent) {
        self.webhook_observed_events_total
            .with_label_values(&[event.provider.id(), event.kind.as_str()])
            .inc();
    }
}
