//! Library for the container stats relay
//!
//! This crate provides the core functionality for:
//! - Fetching container statistics from cAdvisor
//! - Deriving utilization metrics and classifying them against thresholds
//! - Forwarding events to Riemann
//! - Health checks and observability

pub mod api;
pub mod classify;
pub mod derivation;
pub mod forwarder;
pub mod health;
pub mod models;
pub mod observability;
pub mod sampler;
pub mod sink;
pub mod source;
pub mod units;

pub use classify::{classify, Status, Thresholds};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{RelayMetrics, StructuredLogger};
