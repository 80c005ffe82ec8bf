//! Event sinks
//!
//! The forwarder only talks to the [`EventSink`] trait. The bundled
//! implementation speaks the Riemann TCP protocol.

pub mod proto;
mod riemann;

pub use riemann::{RiemannClient, RiemannConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// One event as accepted by the sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkEvent {
    pub host: Option<String>,
    pub service: String,
    pub metric: f64,
    pub ttl: f32,
    pub tags: Vec<String>,
    pub state: String,
}

/// Errors returned while delivering events
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error talking to {address}: {source}")]
    Io {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation} to {address} timed out after {timeout:?}")]
    Timeout {
        address: String,
        operation: &'static str,
        timeout: Duration,
    },

    #[error("failed to decode sink response: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("sink rejected event: {0}")]
    Rejected(String),
}

/// Write access to a remote event store
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send_event(&self, event: &SinkEvent) -> Result<(), SinkError>;
}
