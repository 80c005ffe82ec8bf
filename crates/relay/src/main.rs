//! Stats relay - container telemetry forwarder
//!
//! Periodically samples container statistics from cAdvisor, derives
//! utilization metrics, classifies them against thresholds and forwards
//! them as events to Riemann.

use anyhow::{Context, Result};
use clap::Parser;
use relay_lib::{
    api::{self, AppState},
    forwarder::{EventForwarder, ForwarderConfig},
    health::{components, HealthRegistry},
    observability::{RelayMetrics, StructuredLogger},
    sampler::SamplingLoopBuilder,
    sink::{RiemannClient, RiemannConfig},
    source::{CadvisorClient, MetricsSource},
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const RELAY_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let cli = config::Cli::parse();
    let config = config::RelayConfig::load(&cli)?;
    info!(
        cadvisor_address = %config.cadvisor_address,
        riemann_address = %config.riemann_address,
        interval_secs = config.interval_secs,
        failure_policy = %config.failure_policy,
        "Relay configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::METRICS_SOURCE).await;
    health_registry.register(components::EVENT_SINK).await;
    health_registry.register(components::SAMPLER).await;

    let metrics = RelayMetrics::new();
    let logger = StructuredLogger::new(config.host.clone().unwrap_or_else(|| "-".to_string()));
    logger.log_startup(
        RELAY_VERSION,
        &config.cadvisor_address,
        &config.riemann_address,
    );

    let app_state = Arc::new(AppState::new(health_registry.clone(), metrics));
    let api_port = config.api_port;
    let api_handle = tokio::spawn(async move {
        // Relaying continues without the probe endpoints
        if let Err(e) = api::serve(api_port, app_state).await {
            error!(error = %format!("{:#}", e), "API server stopped");
        }
    });

    // Both collaborators must be reachable before sampling starts
    let source = CadvisorClient::new(&config.cadvisor_address, config.request_timeout())
        .context("unable to setup cadvisor client")?;
    let machine = source
        .machine_info()
        .await
        .context("unable to retrieve machine data from cadvisor")?;
    info!(
        cores = machine.core_count,
        memory_capacity_bytes = machine.memory_capacity_bytes,
        "Connected to cAdvisor"
    );

    let sink = RiemannClient::new(RiemannConfig {
        address: config.riemann_address.clone(),
        timeout: config.request_timeout(),
    });
    sink.connect()
        .await
        .context("unable to connect to riemann")?;

    let forwarder = EventForwarder::new(
        Arc::new(sink),
        ForwarderConfig {
            host: config.host.clone(),
            retry: config.retry_policy(),
        },
    );

    let sampler = SamplingLoopBuilder::new()
        .source(Arc::new(source))
        .forwarder(forwarder)
        .interval(config.interval())
        .derivation(config.derivation())
        .failure_policy(config.failure_policy)
        .health_registry(health_registry.clone())
        .logger(logger.clone())
        .build()?;

    health_registry.set_ready(true).await;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let mut sampler_handle = tokio::spawn(async move { sampler.run(shutdown_rx).await });

    let finished = tokio::select! {
        result = &mut sampler_handle => Some(result),
        signal = tokio::signal::ctrl_c() => {
            signal?;
            None
        }
    };

    let result = match finished {
        Some(result) => {
            let result = result.context("sampling loop panicked")?;
            if let Err(e) = &result {
                error!(error = %format!("{:#}", e), "Sampling loop stopped");
                logger.log_shutdown("fatal sampling error");
            }
            result
        }
        None => {
            logger.log_shutdown("SIGINT received");
            let _ = shutdown_tx.send(());
            sampler_handle.await.context("sampling loop panicked")?
        }
    };

    api_handle.abort();
    info!("Shutting down");

    result
}
