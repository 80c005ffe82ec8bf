//! Container metrics sources
//!
//! The sampling loop only talks to the [`MetricsSource`] trait. The bundled
//! implementation reads the cAdvisor v1.3 REST API.

mod cadvisor;

pub use cadvisor::CadvisorClient;

use crate::models::{ContainerInfo, FilesystemInfo, MachineDescriptor};
use async_trait::async_trait;
use thiserror::Error;

/// Errors returned while fetching from a metrics source
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("invalid metrics source address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("metrics source returned HTTP {status} for {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("failed to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// Read access to per-container statistics and machine facts
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// List containers, each with at most `history_depth` samples, oldest first
    async fn list_containers(&self, history_depth: usize) -> Result<Vec<ContainerInfo>, SourceError>;

    /// Machine core count and memory capacity
    async fn machine_info(&self) -> Result<MachineDescriptor, SourceError>;

    /// Filesystems mounted on the host
    async fn root_filesystem_info(&self) -> Result<FilesystemInfo, SourceError>;
}
