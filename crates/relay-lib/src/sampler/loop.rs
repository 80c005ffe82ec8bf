//! Sampling loop
//!
//! Fetches a snapshot on a fixed cadence, derives metrics and forwards them.
//! A tick that overruns the interval delays the next one instead of
//! overlapping or skipping it.

use super::FailurePolicy;
use crate::classify::Status;
use crate::derivation::{derive_container_metrics, derive_filesystem_metrics, DerivationContext};
use crate::forwarder::EventForwarder;
use crate::health::{components, HealthRegistry};
use crate::models::{ContainerInfo, DerivedMetric, FilesystemInfo, MachineDescriptor};
use crate::observability::{RelayMetrics, StructuredLogger};
use crate::source::MetricsSource;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Configuration for the sampling loop
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Time between tick starts (default: 1 second)
    pub interval: Duration,
    /// Samples requested per container; CPU rates need two
    pub history_depth: usize,
    pub derivation: DerivationContext,
    pub failure_policy: FailurePolicy,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            history_depth: 2,
            derivation: DerivationContext::default(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// Everything fetched from the metrics source in one tick
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub containers: Vec<ContainerInfo>,
    pub machine: MachineDescriptor,
    pub filesystems: FilesystemInfo,
}

/// Outcome of a single tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub containers: usize,
    pub filesystems: usize,
    pub forwarded: usize,
    pub dropped: usize,
}

/// Derive every metric for a snapshot: per-container sets, then filesystems
pub fn derive_snapshot(snapshot: &Snapshot, ctx: &DerivationContext) -> Vec<DerivedMetric> {
    let mut metrics: Vec<DerivedMetric> = snapshot
        .containers
        .iter()
        .flat_map(|container| derive_container_metrics(container, &snapshot.machine, ctx))
        .collect();
    metrics.extend(derive_filesystem_metrics(&snapshot.filesystems, ctx));
    metrics
}

/// Periodic fetch/derive/forward loop
pub struct SamplingLoop {
    source: Arc<dyn MetricsSource>,
    forwarder: EventForwarder,
    config: SamplerConfig,
    health: HealthRegistry,
    metrics: RelayMetrics,
    logger: StructuredLogger,
}

impl SamplingLoop {
    pub fn new(
        source: Arc<dyn MetricsSource>,
        forwarder: EventForwarder,
        config: SamplerConfig,
        health: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            source,
            forwarder,
            config,
            health,
            metrics: RelayMetrics::new(),
            logger,
        }
    }

    /// Run ticks until `shutdown` fires.
    ///
    /// Returns an error only under [`FailurePolicy::Strict`], when a tick fails.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            failure_policy = %self.config.failure_policy,
            "Starting sampling loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let start = Instant::now();
                    let result = self.tick().await;
                    let elapsed = start.elapsed();
                    self.metrics.observe_tick_latency(elapsed.as_secs_f64());

                    match result {
                        Ok(report) => {
                            self.logger.log_tick(
                                report.containers,
                                report.forwarded,
                                report.dropped,
                                elapsed.as_millis(),
                            );
                        }
                        Err(e) if self.config.failure_policy == FailurePolicy::Strict => {
                            error!(error = %format!("{:#}", e), "Tick failed, stopping sampling loop");
                            self.health
                                .set_unhealthy(components::SAMPLER, e.to_string())
                                .await;
                            return Err(e);
                        }
                        Err(e) => {
                            warn!(error = %format!("{:#}", e), "Tick failed, skipping");
                            self.health
                                .set_degraded(components::SAMPLER, e.to_string())
                                .await;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down sampling loop");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Run one fetch/derive/forward cycle
    pub async fn tick(&self) -> Result<TickReport> {
        let snapshot = match self.fetch_snapshot().await {
            Ok(snapshot) => {
                self.health.set_healthy(components::METRICS_SOURCE).await;
                snapshot
            }
            Err(e) => {
                self.metrics.inc_tick_failures();
                self.health
                    .set_degraded(components::METRICS_SOURCE, e.to_string())
                    .await;
                return Err(e);
            }
        };

        self.metrics
            .set_containers_observed(snapshot.containers.len() as i64);

        let derived = derive_snapshot(&snapshot, &self.config.derivation);
        debug!(
            containers = snapshot.containers.len(),
            metrics = derived.len(),
            "Derived metrics"
        );

        let mut report = TickReport {
            containers: snapshot.containers.len(),
            filesystems: snapshot.filesystems.filesystems.len(),
            ..Default::default()
        };

        // After one event exhausts its retries the rest of the tick is
        // dropped without touching the sink
        let mut sink_down = false;

        for metric in &derived {
            if metric.status != Status::Ok {
                self.logger
                    .log_threshold_breach(&metric.name, metric.value, metric.status);
            }

            if sink_down {
                report.dropped += 1;
                self.metrics.inc_events_dropped();
                continue;
            }

            match self.forwarder.forward(metric).await {
                Ok(()) => report.forwarded += 1,
                Err(e) if self.config.failure_policy == FailurePolicy::Strict => {
                    self.health
                        .set_unhealthy(components::EVENT_SINK, e.to_string())
                        .await;
                    return Err(anyhow::Error::new(e).context("unable to forward event"));
                }
                Err(e) => {
                    report.dropped += 1;
                    self.metrics.inc_events_dropped();
                    self.logger.log_event_dropped(&metric.name, &e.to_string());
                    sink_down = true;
                }
            }
        }

        if sink_down {
            warn!(
                dropped = report.dropped,
                "Event sink unavailable, dropped remaining events for this tick"
            );
        }

        if report.dropped > 0 {
            self.health
                .set_degraded(
                    components::EVENT_SINK,
                    format!("dropped {} event(s) in last tick", report.dropped),
                )
                .await;
        } else {
            self.health.set_healthy(components::EVENT_SINK).await;
        }
        self.health.set_healthy(components::SAMPLER).await;

        Ok(report)
    }

    async fn fetch_snapshot(&self) -> Result<Snapshot> {
        let containers = self
            .source
            .list_containers(self.config.history_depth)
            .await
            .context("unable to retrieve container list")?;
        let machine = self
            .source
            .machine_info()
            .await
            .context("unable to retrieve machine info")?;
        let filesystems = self
            .source
            .root_filesystem_info()
            .await
            .context("unable to retrieve root filesystem info")?;

        Ok(Snapshot {
            containers,
            machine,
            filesystems,
        })
    }
}

/// Builder for creating the sampling loop
pub struct SamplingLoopBuilder {
    source: Option<Arc<dyn MetricsSource>>,
    forwarder: Option<EventForwarder>,
    config: SamplerConfig,
    health: HealthRegistry,
    logger: StructuredLogger,
}

impl SamplingLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            source: None,
            forwarder: None,
            config: SamplerConfig::default(),
            health: HealthRegistry::new(),
            logger: StructuredLogger::new("unknown"),
        }
    }

    pub fn source(mut self, source: Arc<dyn MetricsSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn forwarder(mut self, forwarder: EventForwarder) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn history_depth(mut self, depth: usize) -> Self {
        self.config.history_depth = depth;
        self
    }

    pub fn derivation(mut self, ctx: DerivationContext) -> Self {
        self.config.derivation = ctx;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn health_registry(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Build the sampling loop
    pub fn build(self) -> Result<SamplingLoop> {
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("Metrics source is required"))?;
        let forwarder = self
            .forwarder
            .ok_or_else(|| anyhow::anyhow!("Event forwarder is required"))?;

        anyhow::ensure!(
            !self.config.interval.is_zero(),
            "Sampling interval must be greater than zero"
        );
        anyhow::ensure!(
            self.config.history_depth >= 2,
            "History depth must be at least 2 to compute CPU rates"
        );

        Ok(SamplingLoop::new(
            source,
            forwarder,
            self.config,
            self.health,
            self.logger,
        ))
    }
}

impl Default for SamplingLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
