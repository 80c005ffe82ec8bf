//! Event forwarding with bounded retry
//!
//! Turns a [`DerivedMetric`] into a [`SinkEvent`] and delivers it. Failed
//! deliveries are retried with exponential backoff; once the retry budget is
//! spent the last error is returned and the caller decides whether that is
//! fatal.

use crate::models::DerivedMetric;
use crate::observability::RelayMetrics;
use crate::sink::{EventSink, SinkError, SinkEvent};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Retry settings for a single event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `0` disables retrying
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Backoff before retry number `retry` (1-based), doubling up to the cap
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Forwarder settings shared by every event
#[derive(Debug, Clone, Default)]
pub struct ForwarderConfig {
    /// Host label attached to every event
    pub host: Option<String>,
    pub retry: RetryPolicy,
}

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("giving up on {service} after {attempts} attempt(s): {source}")]
    Exhausted {
        service: String,
        attempts: u32,
        #[source]
        source: SinkError,
    },
}

/// Delivers derived metrics to an event sink
pub struct EventForwarder {
    sink: Arc<dyn EventSink>,
    config: ForwarderConfig,
    metrics: RelayMetrics,
}

impl EventForwarder {
    pub fn new(sink: Arc<dyn EventSink>, config: ForwarderConfig) -> Self {
        Self {
            sink,
            config,
            metrics: RelayMetrics::new(),
        }
    }

    /// Build the sink event for a metric
    pub fn to_event(&self, metric: &DerivedMetric) -> SinkEvent {
        SinkEvent {
            host: self.config.host.clone(),
            service: metric.name.clone(),
            metric: metric.value,
            ttl: metric.ttl_seconds,
            tags: metric.tags.clone(),
            state: metric.status.to_string(),
        }
    }

    /// Deliver one metric, retrying per the configured policy
    pub async fn forward(&self, metric: &DerivedMetric) -> Result<(), ForwardError> {
        let event = self.to_event(metric);
        let retry = self.config.retry;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.sink.send_event(&event).await {
                Ok(()) => {
                    self.metrics.inc_events_forwarded();
                    return Ok(());
                }
                Err(e) if attempt > retry.max_retries => {
                    return Err(ForwardError::Exhausted {
                        service: event.service,
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    let backoff = retry.backoff(attempt);
                    warn!(
                        service = %event.service,
                        attempt = attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Failed to forward event, retrying"
                    );
                    self.metrics.inc_forward_retries();
                    tokio::time::sleep(backoff).await;
                    debug!(service = %event.service, "Retrying event");
                }
            }
        }
    }
}
