//! Periodic sampling of the metrics source
//!
//! Each tick fetches a snapshot from the [`MetricsSource`](crate::source::MetricsSource),
//! derives and classifies metrics, and hands them to the
//! [`EventForwarder`](crate::forwarder::EventForwarder). Ticks run strictly
//! one after another.

mod r#loop;


pub use r#loop::{
    derive_snapshot, SamplerConfig, SamplingLoop, SamplingLoopBuilder, Snapshot, TickReport,
};

use serde::{Deserialize, Serialize};

/// What a failed fetch or forward does to the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Any fetch error, or any event that cannot be delivered, stops the loop
    Strict,
    /// Skip the failed tick or drop the failed event and keep going
    #[default]
    Tolerant,
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::Strict => write!(f, "strict"),
            FailurePolicy::Tolerant => write!(f, "tolerant"),
        }
    }
}
