//! cAdvisor REST client
//!
//! Talks to the v1.3 API:
//! - GET  /api/v1.3/machine for core count and memory capacity
//! - POST /api/v1.3/docker/ for every Docker container with its recent stats
//! - POST /api/v1.3/containers/ for the root container (filesystem usage)

use super::{MetricsSource, SourceError};
use crate::models::{
    ContainerInfo, ContainerSpec, CpuUsage, FilesystemInfo, FilesystemUsage, MachineDescriptor,
    MemoryUsage, NetworkCounters, RawSample,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

const MACHINE_PATH: &str = "api/v1.3/machine";
const DOCKER_PATH: &str = "api/v1.3/docker/";
const ROOT_CONTAINER_PATH: &str = "api/v1.3/containers/";

/// HTTP client for a cAdvisor instance
pub struct CadvisorClient {
    client: Client,
    base_url: Url,
}

impl CadvisorClient {
    /// Create a client for `address`, e.g. `http://localhost:8080`
    pub fn new(address: &str, timeout: Duration) -> Result<Self, SourceError> {
        let invalid = |reason: String| SourceError::InvalidAddress {
            address: address.to_string(),
            reason,
        };

        let mut base_url = Url::parse(address).map_err(|e| invalid(e.to_string()))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> Result<Url, SourceError> {
        self.base_url
            .join(path)
            .map_err(|e| SourceError::InvalidAddress {
                address: self.base_url.to_string(),
                reason: e.to_string(),
            })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, SourceError> {
        let url = self.url(path)?;
        let request = self.client.get(url.clone());
        Self::execute(url, request).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, SourceError> {
        let url = self.url(path)?;
        let request = self.client.post(url.clone()).json(body);
        Self::execute(url, request).await
    }

    async fn execute<T: DeserializeOwned>(
        url: Url,
        request: reqwest::RequestBuilder,
    ) -> Result<T, SourceError> {
        let transport = |source| SourceError::Transport {
            url: url.to_string(),
            source,
        };

        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let body = response.text().await.map_err(transport)?;

        if !status.is_success() {
            return Err(SourceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| SourceError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl MetricsSource for CadvisorClient {
    async fn list_containers(&self, history_depth: usize) -> Result<Vec<ContainerInfo>, SourceError> {
        let request = StatsRequest {
            num_stats: history_depth,
        };
        let containers: BTreeMap<String, WireContainerInfo> =
            self.post(DOCKER_PATH, &request).await?;

        debug!(count = containers.len(), "Fetched container list");

        Ok(containers
            .into_iter()
            .map(|(key, info)| info.into_container(key, history_depth))
            .collect())
    }

    async fn machine_info(&self) -> Result<MachineDescriptor, SourceError> {
        let machine: WireMachineInfo = self.get(MACHINE_PATH).await?;
        Ok(MachineDescriptor {
            core_count: machine.num_cores,
            memory_capacity_bytes: machine.memory_capacity,
        })
    }

    async fn root_filesystem_info(&self) -> Result<FilesystemInfo, SourceError> {
        let root: WireContainerInfo = self
            .post(ROOT_CONTAINER_PATH, &StatsRequest { num_stats: 1 })
            .await?;

        let filesystems = root
            .stats
            .into_iter()
            .last()
            .map(|stats| stats.filesystem.into_iter().map(Into::into).collect())
            .unwrap_or_default();

        Ok(FilesystemInfo { filesystems })
    }
}

// cAdvisor wire types

#[derive(Debug, Serialize)]
struct StatsRequest {
    num_stats: usize,
}

#[derive(Debug, Deserialize)]
struct WireMachineInfo {
    #[serde(default)]
    num_cores: u32,
    #[serde(default)]
    memory_capacity: u64,
}

#[derive(Debug, Deserialize)]
struct WireContainerInfo {
    #[serde(default)]
    name: String,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    spec: WireContainerSpec,
    #[serde(default)]
    stats: Vec<WireStats>,
}

impl WireContainerInfo {
    fn into_container(self, key: String, history_depth: usize) -> ContainerInfo {
        let name = if self.name.is_empty() { key } else { self.name };
        let skip = self.stats.len().saturating_sub(history_depth);

        ContainerInfo {
            name,
            aliases: self.aliases,
            spec: ContainerSpec {
                has_cpu_accounting: self.spec.has_cpu,
                memory_limit_bytes: self.spec.memory.limit,
            },
            stats: self.stats.into_iter().skip(skip).map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct WireContainerSpec {
    #[serde(default)]
    has_cpu: bool,
    #[serde(default)]
    memory: WireMemorySpec,
}

#[derive(Debug, Default, Deserialize)]
struct WireMemorySpec {
    #[serde(default)]
    limit: u64,
}

#[derive(Debug, Deserialize)]
struct WireStats {
    timestamp: DateTime<Utc>,
    #[serde(default)]
    cpu: WireCpuStats,
    #[serde(default)]
    memory: WireMemoryStats,
    #[serde(default)]
    network: WireNetworkStats,
    #[serde(default)]
    filesystem: Vec<WireFsStats>,
}

impl From<WireStats> for RawSample {
    fn from(stats: WireStats) -> Self {
        let net = stats.network;
        RawSample {
            timestamp: stats.timestamp,
            cpu: CpuUsage {
                total: stats.cpu.usage.total,
                user: stats.cpu.usage.user,
                system: stats.cpu.usage.system,
                load_average: stats.cpu.load_average,
            },
            memory: MemoryUsage {
                usage_bytes: stats.memory.usage,
                working_set_bytes: stats.memory.working_set,
            },
            network: NetworkCounters {
                rx_bytes: net.rx_bytes,
                rx_packets: net.rx_packets,
                rx_errors: net.rx_errors,
                rx_dropped: net.rx_dropped,
                tx_bytes: net.tx_bytes,
                tx_packets: net.tx_packets,
                tx_errors: net.tx_errors,
                tx_dropped: net.tx_dropped,
            },
            filesystems: stats.filesystem.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct WireCpuStats {
    #[serde(default)]
    usage: WireCpuUsage,
    #[serde(default)]
    load_average: i32,
}

#[derive(Debug, Default, Deserialize)]
struct WireCpuUsage {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    user: u64,
    #[serde(default)]
    system: u64,
}

#[derive(Debug, Default, Deserialize)]
struct WireMemoryStats {
    #[serde(default)]
    usage: u64,
    #[serde(default)]
    working_set: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireNetworkStats {
    rx_bytes: u64,
    rx_packets: u64,
    rx_errors: u64,
    rx_dropped: u64,
    tx_bytes: u64,
    tx_packets: u64,
    tx_errors: u64,
    tx_dropped: u64,
}

#[derive(Debug, Deserialize)]
struct WireFsStats {
    #[serde(default)]
    device: String,
    /// cAdvisor reports the filesystem limit as `capacity`
    #[serde(default)]
    capacity: u64,
    #[serde(default)]
    usage: u64,
}

impl From<WireFsStats> for FilesystemUsage {
    fn from(fs: WireFsStats) -> Self {
        FilesystemUsage {
            device: fs.device,
            usage_bytes: fs.usage,
            limit_bytes: fs.capacity,
        }
    }
}
