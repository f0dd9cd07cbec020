//! Metric names and recording helpers.
//!
//! Recorded through the `metrics` facade; the binary installs the Prometheus
//! recorder and serves it on `/metrics`.

use std::sync::atomic::{AtomicU64, Ordering};

use metrics::describe_counter;

pub const CRITICAL_FAILURES_TOTAL: &str = "notification_dispatch_critical_failures_total";
pub const DELIVERED_TOTAL: &str = "notification_dispatch_delivered_total";
pub const FALLBACK_PERSISTED_TOTAL: &str = "notification_dispatch_fallback_persisted_total";

/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        CRITICAL_FAILURES_TOTAL,
        "Commands that failed dispatch and could not be saved for redelivery"
    );
    describe_counter!(DELIVERED_TOTAL, "Commands confirmed by the broker");
    describe_counter!(
        FALLBACK_PERSISTED_TOTAL,
        "Commands saved to the fallback store after a failed dispatch"
    );
}

pub fn record_delivered(channel: &str) {
    metrics::counter!(DELIVERED_TOTAL, "channel" => channel.to_string()).increment(1);
}

pub fn record_fallback_persisted(channel: &str) {
    metrics::counter!(FALLBACK_PERSISTED_TOTAL, "channel" => channel.to_string()).increment(1);
}

/// Monotonic count of dispatch-plus-fallback double failures.
///
/// Mirrors every increment into [`CRITICAL_FAILURES_TOTAL`] so alerting can
/// key off the exported counter.
#[derive(Debug, Default)]
pub struct CriticalFailureSignal {
    count: AtomicU64,
}

impl CriticalFailureSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self, channel: &str) {
        self.count.fetch_add(1, Ordering::SeqCst);
        metrics::counter!(CRITICAL_FAILURES_TOTAL, "channel" => channel.to_string()).increment(1);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }
}
