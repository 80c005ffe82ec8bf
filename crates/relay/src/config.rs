//! Relay configuration
//!
//! Sources are layered, later ones winning: built-in defaults, an optional
//! config file, `RELAY_*` environment variables, then command-line flags.

use anyhow::{Context, Result};
use clap::Parser;
use relay_lib::derivation::DerivationContext;
use relay_lib::forwarder::RetryPolicy;
use relay_lib::sampler::FailurePolicy;
use relay_lib::Thresholds;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Samples cAdvisor container statistics and forwards them to Riemann
#[derive(Debug, Default, Parser)]
#[command(name = "stats-relay")]
#[command(author, version, about = "Forward cAdvisor container statistics to Riemann", long_about = None)]
pub struct Cli {
    /// Path to a config file (toml, yaml or json)
    #[arg(long, env = "RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Riemann server location (host:port)
    #[arg(long)]
    pub riemann_address: Option<String>,

    /// cAdvisor API server location
    #[arg(long)]
    pub cadvisor_address: Option<String>,

    /// Seconds between samples
    #[arg(long)]
    pub interval_secs: Option<u64>,

    /// Host label attached to every event
    #[arg(long)]
    pub host: Option<String>,

    /// Event time-to-live in seconds
    #[arg(long)]
    pub ttl_secs: Option<f32>,

    /// Percentages above this are reported as warning
    #[arg(long)]
    pub warning_cutoff: Option<f64>,

    /// Percentages above this are reported as critical
    #[arg(long)]
    pub critical_cutoff: Option<f64>,

    /// What a failed fetch or forward does: stop the relay or skip and continue
    #[arg(long, value_parser = ["strict", "tolerant"])]
    pub failure_policy: Option<String>,

    /// Shorthand for `--failure-policy strict`
    #[arg(long, conflicts_with = "failure_policy")]
    pub strict: bool,

    /// Delivery retries per event before it is dropped
    #[arg(long)]
    pub forward_retries: Option<u32>,

    /// Timeout for each request to cAdvisor or Riemann, in seconds
    #[arg(long)]
    pub request_timeout_secs: Option<u64>,

    /// Port for the health and metrics endpoints
    #[arg(long)]
    pub api_port: Option<u16>,
}

/// Relay configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    pub riemann_address: String,
    pub cadvisor_address: String,
    pub interval_secs: u64,
    #[serde(default)]
    pub host: Option<String>,
    pub ttl_secs: f32,
    pub warning_cutoff: f64,
    pub critical_cutoff: f64,
    pub failure_policy: FailurePolicy,
    pub forward_retries: u32,
    pub request_timeout_secs: u64,
    pub api_port: u16,
}

impl Cli {
    fn failure_policy_override(&self) -> Option<String> {
        self.failure_policy
            .clone()
            .or_else(|| self.strict.then(|| "strict".to_string()))
    }
}

impl RelayConfig {
    /// Load configuration from defaults, file, environment and flags
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("riemann_address", "localhost:5555")?
            .set_default("cadvisor_address", "http://localhost:8080")?
            .set_default("interval_secs", 1i64)?
            .set_default("ttl_secs", 10.0)?
            .set_default("warning_cutoff", 80.0)?
            .set_default("critical_cutoff", 95.0)?
            .set_default("failure_policy", "tolerant")?
            .set_default("forward_retries", 3i64)?
            .set_default("request_timeout_secs", 5i64)?
            .set_default("api_port", 9102i64)?;

        if let Some(path) = &cli.config {
            builder = builder.add_source(config::File::from(path.as_path()));
        }

        let config = builder
            .add_source(config::Environment::with_prefix("RELAY"))
            .set_override_option("riemann_address", cli.riemann_address.clone())?
            .set_override_option("cadvisor_address", cli.cadvisor_address.clone())?
            .set_override_option("interval_secs", cli.interval_secs.map(|v| v as i64))?
            .set_override_option("host", cli.host.clone())?
            .set_override_option("ttl_secs", cli.ttl_secs.map(f64::from))?
            .set_override_option("warning_cutoff", cli.warning_cutoff)?
            .set_override_option("critical_cutoff", cli.critical_cutoff)?
            .set_override_option("failure_policy", cli.failure_policy_override())?
            .set_override_option("forward_retries", cli.forward_retries.map(i64::from))?
            .set_override_option(
                "request_timeout_secs",
                cli.request_timeout_secs.map(|v| v as i64),
            )?
            .set_override_option("api_port", cli.api_port.map(i64::from))?
            .build()
            .context("Failed to load configuration")?;

        let relay_config: RelayConfig = config
            .try_deserialize()
            .context("Invalid configuration")?;
        relay_config.validate()?;

        Ok(relay_config)
    }

    /// Reject values the sampling loop cannot run with
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.interval_secs > 0, "interval_secs must be greater than zero");
        anyhow::ensure!(
            self.ttl_secs.is_finite() && self.ttl_secs > 0.0,
            "ttl_secs must be a positive number"
        );
        anyhow::ensure!(
            self.request_timeout_secs > 0,
            "request_timeout_secs must be greater than zero"
        );
        anyhow::ensure!(
            self.warning_cutoff < self.critical_cutoff,
            "warning_cutoff ({}) must be below critical_cutoff ({})",
            self.warning_cutoff,
            self.critical_cutoff
        );
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn derivation(&self) -> DerivationContext {
        DerivationContext {
            thresholds: Thresholds::new(self.warning_cutoff, self.critical_cutoff),
            ttl_seconds: self.ttl_secs,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.forward_retries,
            ..RetryPolicy::default()
        }
    }
}
