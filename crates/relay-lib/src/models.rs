//! Core data models for the stats relay

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::Status;

/// Host facts reported by the metrics source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineDescriptor {
    pub core_count: u32,
    pub memory_capacity_bytes: u64,
}

/// Static per-container configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub has_cpu_accounting: bool,
    /// May exceed machine capacity; saturate before use
    pub memory_limit_bytes: u64,
}

/// Cumulative CPU time counters, in nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CpuUsage {
    pub total: u64,
    pub user: u64,
    pub system: u64,
    pub load_average: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub usage_bytes: u64,
    pub working_set_bytes: u64,
}

/// Cumulative network interface counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkCounters {
    pub rx_bytes: u64,
    pub rx_packets: u64,
    pub rx_errors: u64,
    pub rx_dropped: u64,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errors: u64,
    pub tx_dropped: u64,
}

/// Usage of a single mounted filesystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemUsage {
    pub device: String,
    pub usage_bytes: u64,
    pub limit_bytes: u64,
}

/// One point-in-time measurement for a container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub timestamp: DateTime<Utc>,
    pub cpu: CpuUsage,
    pub memory: MemoryUsage,
    pub network: NetworkCounters,
    pub filesystems: Vec<FilesystemUsage>,
}

/// A container as reported by the metrics source, samples ordered oldest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub name: String,
    pub aliases: Vec<String>,
    pub spec: ContainerSpec,
    pub stats: Vec<RawSample>,
}

impl ContainerInfo {
    /// First alias, or the container name when it has none
    pub fn primary_alias(&self) -> &str {
        self.aliases
            .first()
            .map(String::as_str)
            .unwrap_or(&self.name)
    }

    /// Most recent sample, if any
    pub fn latest(&self) -> Option<&RawSample> {
        self.stats.last()
    }
}

/// Filesystems of the root container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilesystemInfo {
    pub filesystems: Vec<FilesystemUsage>,
}

/// A metric ready to be forwarded, created fresh each tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetric {
    pub name: String,
    pub value: f64,
    pub status: Status,
    pub tags: Vec<String>,
    pub ttl_seconds: f32,
}
