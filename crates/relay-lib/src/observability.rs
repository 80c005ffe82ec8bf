//! Observability infrastructure for the stats relay
//!
//! Provides:
//! - Prometheus metrics (tick latency, containers observed, event delivery counters)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter,
    IntGauge,
};
use crate::classify::Status;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for tick latency (in seconds)
const TICK_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<RelayMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct RelayMetricsInner {
    tick_latency_seconds: Histogram,
    containers_observed: IntGauge,
    events_forwarded: IntCounter,
    events_dropped: IntCounter,
    forward_retries: IntCounter,
    tick_failures: IntCounter,
}

impl RelayMetricsInner {
    fn new() -> Self {
        Self {
            tick_latency_seconds: register_histogram!(
                "stats_relay_tick_latency_seconds",
                "Time spent fetching, deriving and forwarding one tick",
                TICK_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register tick_latency_seconds"),

            containers_observed: register_int_gauge!(
                "stats_relay_containers_observed",
                "Number of containers reported by the metrics source in the last tick"
            )
            .expect("Failed to register containers_observed"),

            events_forwarded: register_int_counter!(
                "stats_relay_events_forwarded_total",
                "Total number of events accepted by the event sink"
            )
            .expect("Failed to register events_forwarded"),

            events_dropped: register_int_counter!(
                "stats_relay_events_dropped_total",
                "Total number of events dropped after exhausting retries"
            )
            .expect("Failed to register events_dropped"),

            forward_retries: register_int_counter!(
                "stats_relay_forward_retries_total",
                "Total number of event delivery retries"
            )
            .expect("Failed to register forward_retries"),

            tick_failures: register_int_counter!(
                "stats_relay_tick_failures_total",
                "Total number of ticks aborted by a metrics source error"
            )
            .expect("Failed to register tick_failures"),
        }
    }
}

/// Relay metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct RelayMetrics {
    _private: (),
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(RelayMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &RelayMetricsInner {
        GLOBAL_METRICS.get_or_init(RelayMetricsInner::new)
    }

    pub fn observe_tick_latency(&self, duration_secs: f64) {
        self.inner().tick_latency_seconds.observe(duration_secs);
    }

    pub fn set_containers_observed(&self, count: i64) {
        self.inner().containers_observed.set(count);
    }

    pub fn inc_events_forwarded(&self) {
        self.inner().events_forwarded.inc();
    }

    pub fn inc_events_dropped(&self) {
        self.inner().events_dropped.inc();
    }

    pub fn inc_forward_retries(&self) {
        self.inner().forward_retries.inc();
    }

    pub fn inc_tick_failures(&self) {
        self.inner().tick_failures.inc();
    }

    pub fn events_forwarded(&self) -> u64 {
        self.inner().events_forwarded.get()
    }

    pub fn events_dropped(&self) -> u64 {
        self.inner().events_dropped.get()
    }
}

/// Structured logger for relay events
///
/// Provides consistent JSON-formatted logging for lifecycle events,
/// tick summaries and threshold breaches.
#[derive(Clone)]
pub struct StructuredLogger {
    host: String,
}

impl StructuredLogger {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    /// Log relay startup
    pub fn log_startup(&self, version: &str, cadvisor_address: &str, riemann_address: &str) {
        info!(
            event = "relay_started",
            host = %self.host,
            relay_version = %version,
            cadvisor_address = %cadvisor_address,
            riemann_address = %riemann_address,
            "Stats relay started"
        );
    }

    /// Log relay shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "relay_shutdown",
            host = %self.host,
            reason = %reason,
            "Stats relay shutting down"
        );
    }

    /// Log the outcome of one tick
    pub fn log_tick(&self, containers: usize, forwarded: usize, dropped: usize, elapsed_ms: u128) {
        info!(
            event = "tick_completed",
            host = %self.host,
            containers = containers,
            forwarded = forwarded,
            dropped = dropped,
            elapsed_ms = elapsed_ms as u64,
            "Tick complete"
        );
    }

    /// Log a metric classified above the warning cutoff
    pub fn log_threshold_breach(&self, service: &str, value: f64, status: Status) {
        match status {
            Status::Critical => {
                warn!(
                    event = "threshold_breached",
                    host = %self.host,
                    service = %service,
                    value = value,
                    status = %status,
                    "Critical threshold exceeded"
                );
            }
            Status::Warning | Status::Ok => {
                info!(
                    event = "threshold_breached",
                    host = %self.host,
                    service = %service,
                    value = value,
                    status = %status,
                    "Warning threshold exceeded"
                );
            }
        }
    }

    /// Log an event dropped after exhausting retries
    pub fn log_event_dropped(&self, service: &str, error: &str) {
        warn!(
            event = "event_dropped",
            host = %self.host,
            service = %service,
            error = %error,
            "Dropped event after exhausting retries"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_metrics_counters() {
        let metrics = RelayMetrics::new();

        let forwarded = metrics.events_forwarded();
        metrics.inc_events_forwarded();
        assert!(metrics.events_forwarded() > forwarded);

        let dropped = metrics.events_dropped();
        metrics.inc_events_dropped();
        assert!(metrics.events_dropped() > dropped);

        metrics.observe_tick_latency(0.01);
        metrics.set_containers_observed(3);
        metrics.inc_forward_retries();
        metrics.inc_tick_failures();
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("node-a");
        assert_eq!(logger.host, "node-a");
    }

    #[test]
    fn test_threshold_breach_accepts_each_status() {
        let logger = StructuredLogger::new("node-a");
        for status in [Status::Ok, Status::Warning, Status::Critical] {
            logger.log_threshold_breach("Memory.UsagePercent web-1", 97.0, status);
        }
    }
}
