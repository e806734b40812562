use prometheus::{IntCounter, IntGauge, Opts};
use tracing::warn;

/// Prometheus view of the relay.
///
/// Registered against the default registry with a `service` const label so
/// several services sharing one process (tests, mostly) do not collide.
#[derive(Clone)]
pub struct OutboxMetrics {
    pub pending: IntGauge,
    pub oldest_pending_age_seconds: IntGauge,
    pub polled: IntCounter,
    pub published: IntCounter,
    pub retried: IntCounter,
    pub failed: IntCounter,
}

impl OutboxMetrics {
    pub fn new(service: &str) -> Self {
        let registry = prometheus::default_registry();

        let pending = IntGauge::with_opts(
            Opts::new(
                "outbox_pending_count",
                "Number of PENDING outbox rows awaiting relay",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for outbox_pending_count");

        let oldest_pending_age_seconds = IntGauge::with_opts(
            Opts::new(
                "outbox_oldest_pending_age_seconds",
                "Age in seconds of the oldest PENDING outbox row",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for outbox_oldest_pending_age_seconds");

        let polled = IntCounter::with_opts(
            Opts::new(
                "outbox_polled_total",
                "Total rows claimed by the relay for delivery",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for outbox_polled_total");

        let published = IntCounter::with_opts(
            Opts::new(
                "outbox_published_total",
                "Total outbox rows delivered and marked PUBLISHED",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for outbox_published_total");

        let retried = IntCounter::with_opts(
            Opts::new(
                "outbox_retried_total",
                "Total delivery failures rescheduled with backoff",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for outbox_retried_total");

        let failed = IntCounter::with_opts(
            Opts::new(
                "outbox_failed_total",
                "Total rows marked FAILED after exhausting retries",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for outbox_failed_total");

        for metric in [
            Box::new(pending.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(oldest_pending_age_seconds.clone()),
            Box::new(polled.clone()),
            Box::new(published.clone()),
            Box::new(retried.clone()),
            Box::new(failed.clone()),
        ] {
            if let Err(e) = registry.register(metric) {
                warn!("Failed to register outbox metric: {}", e);
            }
        }

        Self {
            pending,
            oldest_pending_age_seconds,
            polled,
            published,
            retried,
            failed,
        }
    }
}
