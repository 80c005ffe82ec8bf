//! Metric derivation from raw container samples
//!
//! Everything in this module is pure: the same snapshot always yields the
//! same metrics. Preconditions that cannot be met (short history, zero
//! interval, zero limit, counter reset) fall back to `0` instead of failing.

use crate::classify::{Status, Thresholds};
use crate::models::{
    ContainerInfo, ContainerSpec, DerivedMetric, FilesystemInfo, MachineDescriptor, RawSample,
};
use crate::units::{bytes_to_megabytes, nanos_to_seconds, round_to};
use tracing::debug;

/// Metric field names, joined with the primary alias to form the service name
pub mod names {
    pub const CPU_TOTAL_PERCENT: &str = "Cpu.Usage.TotalPercent";
    pub const CPU_TOTAL: &str = "Cpu.Usage.Total";
    pub const CPU_USER: &str = "Cpu.Usage.User";
    pub const CPU_SYSTEM: &str = "Cpu.Usage.System";
    pub const CPU_LOAD_AVERAGE: &str = "Cpu.LoadAverage";

    pub const MEMORY_USAGE: &str = "Memory.Usage";
    pub const MEMORY_USAGE_PERCENT: &str = "Memory.UsagePercent";
    pub const MEMORY_HOT_PERCENT: &str = "Memory.UsageHotPercent";
    pub const MEMORY_COLD_PERCENT: &str = "Memory.UsageColdPercent";
    pub const MEMORY_WORKING_SET: &str = "Memory.WorkingSet";

    pub const NETWORK_RX_BYTES: &str = "Network.RxBytes";
    pub const NETWORK_RX_PACKETS: &str = "Network.RxPackets";
    pub const NETWORK_RX_ERRORS: &str = "Network.RxErrors";
    pub const NETWORK_RX_DROPPED: &str = "Network.RxDropped";
    pub const NETWORK_TX_BYTES: &str = "Network.TxBytes";
    pub const NETWORK_TX_PACKETS: &str = "Network.TxPackets";
    pub const NETWORK_TX_ERRORS: &str = "Network.TxErrors";
    pub const NETWORK_TX_DROPPED: &str = "Network.TxDropped";

    pub const FILESYSTEM_USAGE_PERCENT: &str = "Filesystem.UsagePercent";
}

/// Number of metrics derived for every container
pub const METRICS_PER_CONTAINER: usize = 18;

/// Parameters threaded into derivation instead of read from global state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivationContext {
    pub thresholds: Thresholds,
    pub ttl_seconds: f32,
}

impl Default for DerivationContext {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            ttl_seconds: 10.0,
        }
    }
}

/// CPU utilization across all cores between the last two samples
pub fn cpu_utilization_percent(
    spec: &ContainerSpec,
    history: &[RawSample],
    machine: &MachineDescriptor,
) -> f64 {
    if !spec.has_cpu_accounting || history.len() < 2 || machine.core_count == 0 {
        return 0.0;
    }

    let current = &history[history.len() - 1];
    let previous = &history[history.len() - 2];

    // A decreasing counter means the container restarted
    let Some(delta_ns) = current.cpu.total.checked_sub(previous.cpu.total) else {
        return 0.0;
    };

    let interval_ns = match (current.timestamp - previous.timestamp).num_nanoseconds() {
        Some(ns) if ns > 0 => ns as u64,
        _ => return 0.0,
    };

    let cpu_seconds = nanos_to_seconds(delta_ns);
    let wall_seconds = nanos_to_seconds(interval_ns);
    let percent = cpu_seconds / wall_seconds / machine.core_count as f64 * 100.0;
    round_to(percent, 2).clamp(0.0, 100.0)
}

/// Whole-percent memory utilization against the saturated container limit
pub fn memory_utilization_percent(
    usage_bytes: u64,
    spec: &ContainerSpec,
    machine: &MachineDescriptor,
) -> u64 {
    let limit = spec.memory_limit_bytes.min(machine.memory_capacity_bytes);
    if limit == 0 {
        return 0;
    }

    let percent = u128::from(usage_bytes) * 100 / u128::from(limit);
    percent.min(100) as u64
}

/// Latest memory usage in megabytes, `0` for an empty history
pub fn memory_usage_megabytes(history: &[RawSample]) -> f64 {
    history
        .last()
        .map(|sample| bytes_to_megabytes(sample.memory.usage_bytes))
        .unwrap_or(0.0)
}

/// Filesystem utilization rounded to two decimals, `0` when the limit is zero
pub fn filesystem_utilization_percent(usage_bytes: u64, limit_bytes: u64) -> f64 {
    if limit_bytes == 0 {
        debug!(usage_bytes, "Filesystem reports zero capacity, using 0%");
        return 0.0;
    }

    let percent = usage_bytes as f64 * 100.0 / limit_bytes as f64;
    round_to(percent, 2).clamp(0.0, 100.0)
}

/// Build the per-container metric set: 5 CPU, 5 memory and 8 network metrics
pub fn derive_container_metrics(
    container: &ContainerInfo,
    machine: &MachineDescriptor,
    ctx: &DerivationContext,
) -> Vec<DerivedMetric> {
    let alias = container.primary_alias();
    let latest = container.latest();
    let cpu = latest.map(|s| s.cpu).unwrap_or_default();
    let memory = latest.map(|s| s.memory).unwrap_or_default();
    let network = latest.map(|s| s.network).unwrap_or_default();

    let metric = |field: &str, value: f64, status: Status| DerivedMetric {
        name: format!("{} {}", field, alias),
        value,
        status,
        tags: container.aliases.clone(),
        ttl_seconds: ctx.ttl_seconds,
    };
    let classified = |field: &str, value: f64| metric(field, value, ctx.thresholds.classify(value));
    let raw = |field: &str, value: f64| metric(field, value, Status::Ok);

    let cpu_percent = cpu_utilization_percent(&container.spec, &container.stats, machine);
    let usage_percent = memory_utilization_percent(memory.usage_bytes, &container.spec, machine);
    let hot_percent =
        memory_utilization_percent(memory.working_set_bytes, &container.spec, machine);
    let cold_percent = memory_utilization_percent(
        memory.usage_bytes.saturating_sub(memory.working_set_bytes),
        &container.spec,
        machine,
    );

    let mut metrics = Vec::with_capacity(METRICS_PER_CONTAINER);

    metrics.push(classified(names::CPU_TOTAL_PERCENT, cpu_percent));
    metrics.push(raw(names::CPU_TOTAL, cpu.total as f64));
    metrics.push(raw(names::CPU_USER, cpu.user as f64));
    metrics.push(raw(names::CPU_SYSTEM, cpu.system as f64));
    metrics.push(raw(names::CPU_LOAD_AVERAGE, f64::from(cpu.load_average)));

    metrics.push(raw(
        names::MEMORY_USAGE,
        memory_usage_megabytes(&container.stats),
    ));
    metrics.push(classified(names::MEMORY_USAGE_PERCENT, usage_percent as f64));
    metrics.push(classified(names::MEMORY_HOT_PERCENT, hot_percent as f64));
    metrics.push(classified(names::MEMORY_COLD_PERCENT, cold_percent as f64));
    metrics.push(raw(
        names::MEMORY_WORKING_SET,
        bytes_to_megabytes(memory.working_set_bytes),
    ));

    // Network counters are forwarded as cumulative values, not rates
    metrics.push(raw(names::NETWORK_RX_BYTES, network.rx_bytes as f64));
    metrics.push(raw(names::NETWORK_RX_PACKETS, network.rx_packets as f64));
    metrics.push(raw(names::NETWORK_RX_ERRORS, network.rx_errors as f64));
    metrics.push(raw(names::NETWORK_RX_DROPPED, network.rx_dropped as f64));
    metrics.push(raw(names::NETWORK_TX_BYTES, network.tx_bytes as f64));
    metrics.push(raw(names::NETWORK_TX_PACKETS, network.tx_packets as f64));
    metrics.push(raw(names::NETWORK_TX_ERRORS, network.tx_errors as f64));
    metrics.push(raw(names::NETWORK_TX_DROPPED, network.tx_dropped as f64));

    metrics
}

/// One classified utilization metric per mounted filesystem
pub fn derive_filesystem_metrics(
    info: &FilesystemInfo,
    ctx: &DerivationContext,
) -> Vec<DerivedMetric> {
    info.filesystems
        .iter()
        .map(|fs| {
            let percent = filesystem_utilization_percent(fs.usage_bytes, fs.limit_bytes);
            DerivedMetric {
                name: format!("{} {}", names::FILESYSTEM_USAGE_PERCENT, fs.device),
                value: percent,
                status: ctx.thresholds.classify(percent),
                tags: vec![fs.device.clone()],
                ttl_seconds: ctx.ttl_seconds,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CpuUsage, FilesystemUsage, MemoryUsage, NetworkCounters};
    use chrono::{Duration, TimeZone, Utc};

    const GB16: u64 = 16_000_000_000;

    fn machine(cores: u32, capacity: u64) -> MachineDescriptor {
        MachineDescriptor {
            core_count: cores,
            memory_capacity_bytes: capacity,
        }
    }

    fn spec(limit: u64) -> ContainerSpec {
        ContainerSpec {
            has_cpu_accounting: true,
            memory_limit_bytes: limit,
        }
    }

    fn sample(offset_ms: i64, cpu_total: u64, usage: u64, working_set: u64) -> RawSample {
        RawSample {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                + Duration::milliseconds(offset_ms),
            cpu: CpuUsage {
                total: cpu_total,
                user: cpu_total / 2,
                system: cpu_total / 4,
                load_average: 3,
            },
            memory: MemoryUsage {
                usage_bytes: usage,
                working_set_bytes: working_set,
            },
            network: NetworkCounters {
                rx_bytes: 1000,
                rx_packets: 10,
                rx_errors: 1,
                rx_dropped: 2,
                tx_bytes: 500,
                tx_packets: 5,
                tx_errors: 0,
                tx_dropped: 3,
            },
            filesystems: vec![],
        }
    }

    #[test]
    fn test_cpu_percent_scenario() {
        let history = vec![
            sample(0, 1_000_000_000, 0, 0),
            sample(1000, 1_400_000_000, 0, 0),
        ];

        let percent = cpu_utilization_percent(&spec(GB16), &history, &machine(4, GB16));
        assert_eq!(percent, 10.0);
    }

    #[test]
    fn test_cpu_percent_uses_last_two_samples() {
        let history = vec![
            sample(0, 0, 0, 0),
            sample(1000, 1_000_000_000, 0, 0),
            sample(2000, 1_500_000_000, 0, 0),
        ];

        let percent = cpu_utilization_percent(&spec(GB16), &history, &machine(1, GB16));
        assert_eq!(percent, 50.0);
    }

    #[test]
    fn test_cpu_percent_requires_two_samples() {
        let m = machine(4, GB16);
        assert_eq!(cpu_utilization_percent(&spec(GB16), &[], &m), 0.0);
        assert_eq!(
            cpu_utilization_percent(&spec(GB16), &[sample(0, 5_000_000_000, 0, 0)], &m),
            0.0
        );
    }

    #[test]
    fn test_cpu_percent_requires_cpu_accounting() {
        let history = vec![sample(0, 0, 0, 0), sample(1000, 500_000_000, 0, 0)];
        let no_cpu = ContainerSpec {
            has_cpu_accounting: false,
            memory_limit_bytes: GB16,
        };

        assert_eq!(cpu_utilization_percent(&no_cpu, &history, &machine(1, GB16)), 0.0);
    }

    #[test]
    fn test_cpu_percent_clamped_to_100() {
        let history = vec![sample(0, 0, 0, 0), sample(1, u64::MAX / 2, 0, 0)];

        let percent = cpu_utilization_percent(&spec(GB16), &history, &machine(1, GB16));
        assert_eq!(percent, 100.0);
    }

    #[test]
    fn test_cpu_percent_counter_reset_is_zero() {
        let history = vec![
            sample(0, 9_000_000_000, 0, 0),
            sample(1000, 1_000_000, 0, 0),
        ];

        assert_eq!(
            cpu_utilization_percent(&spec(GB16), &history, &machine(2, GB16)),
            0.0
        );
    }

    #[test]
    fn test_cpu_percent_non_positive_interval_is_zero() {
        let same_time = vec![sample(1000, 0, 0, 0), sample(1000, 500_000_000, 0, 0)];
        let backwards = vec![sample(2000, 0, 0, 0), sample(1000, 500_000_000, 0, 0)];
        let m = machine(1, GB16);

        assert_eq!(cpu_utilization_percent(&spec(GB16), &same_time, &m), 0.0);
        assert_eq!(cpu_utilization_percent(&spec(GB16), &backwards, &m), 0.0);
    }

    #[test]
    fn test_memory_percent_scenario() {
        let percent = memory_utilization_percent(8_000_000_000, &spec(GB16), &machine(4, GB16));
        assert_eq!(percent, 50);
    }

    #[test]
    fn test_memory_percent_saturates_limit_at_capacity() {
        let m = machine(4, GB16);
        let at_capacity = memory_utilization_percent(4_000_000_000, &spec(GB16), &m);

        for limit in [GB16 + 1, GB16 * 2, u64::MAX] {
            assert_eq!(
                memory_utilization_percent(4_000_000_000, &spec(limit), &m),
                at_capacity
            );
        }
        assert_eq!(at_capacity, 25);
    }

    #[test]
    fn test_memory_percent_is_monotonic_and_floored() {
        let m = machine(1, 1000);
        let s = spec(1000);
        let mut last = 0;

        for usage in (0..=1000).step_by(7) {
            let percent = memory_utilization_percent(usage, &s, &m);
            assert!(percent >= last);
            last = percent;
        }
        assert_eq!(memory_utilization_percent(19, &s, &m), 1);
        assert_eq!(memory_utilization_percent(2000, &s, &m), 100);
    }

    #[test]
    fn test_memory_percent_zero_limit_is_zero() {
        assert_eq!(memory_utilization_percent(100, &spec(0), &machine(1, GB16)), 0);
        assert_eq!(memory_utilization_percent(100, &spec(GB16), &machine(1, 0)), 0);
    }

    #[test]
    fn test_memory_usage_megabytes() {
        assert_eq!(memory_usage_megabytes(&[]), 0.0);
        assert_eq!(
            memory_usage_megabytes(&[sample(0, 0, 1, 0), sample(1000, 0, 2_097_152, 0)]),
            2.0
        );
    }

    #[test]
    fn test_filesystem_percent() {
        assert_eq!(filesystem_utilization_percent(50, 200), 25.0);
        assert_eq!(filesystem_utilization_percent(1, 3), 33.33);
        assert_eq!(filesystem_utilization_percent(50, 0), 0.0);
        assert_eq!(filesystem_utilization_percent(300, 200), 100.0);
    }

    #[test]
    fn test_container_metrics_with_empty_history() {
        let container = ContainerInfo {
            name: "/docker/abc".to_string(),
            aliases: vec![],
            spec: spec(GB16),
            stats: vec![],
        };

        let metrics = derive_container_metrics(&container, &machine(4, GB16), &Default::default());

        assert_eq!(metrics.len(), METRICS_PER_CONTAINER);
        assert!(metrics.iter().all(|m| m.value == 0.0));
        assert!(metrics.iter().all(|m| m.status == Status::Ok));
        assert_eq!(metrics[0].name, "Cpu.Usage.TotalPercent /docker/abc");
    }

    #[test]
    fn test_container_metrics_names_tags_and_status() {
        let container = ContainerInfo {
            name: "/docker/abc".to_string(),
            aliases: vec!["web-1".to_string(), "abc".to_string()],
            spec: spec(1000),
            stats: vec![sample(0, 0, 0, 0), sample(1000, 900_000_000, 990, 850)],
        };
        let ctx = DerivationContext {
            thresholds: Thresholds::new(80.0, 95.0),
            ttl_seconds: 30.0,
        };

        let metrics = derive_container_metrics(&container, &machine(1, GB16), &ctx);
        let find = |name: &str| {
            metrics
                .iter()
                .find(|m| m.name == format!("{} web-1", name))
                .unwrap_or_else(|| panic!("missing {}", name))
        };

        assert_eq!(metrics.len(), METRICS_PER_CONTAINER);
        assert!(metrics.iter().all(|m| m.tags == container.aliases));
        assert!(metrics.iter().all(|m| m.ttl_seconds == 30.0));

        let cpu = find(names::CPU_TOTAL_PERCENT);
        assert_eq!(cpu.value, 90.0);
        assert_eq!(cpu.status, Status::Warning);

        let usage = find(names::MEMORY_USAGE_PERCENT);
        assert_eq!(usage.value, 99.0);
        assert_eq!(usage.status, Status::Critical);

        let hot = find(names::MEMORY_HOT_PERCENT);
        assert_eq!(hot.value, 85.0);
        assert_eq!(hot.status, Status::Warning);

        let cold = find(names::MEMORY_COLD_PERCENT);
        assert_eq!(cold.value, 14.0);
        assert_eq!(cold.status, Status::Ok);

        assert_eq!(find(names::CPU_TOTAL).value, 900_000_000.0);
        assert_eq!(find(names::CPU_LOAD_AVERAGE).value, 3.0);
        assert_eq!(find(names::NETWORK_RX_BYTES).value, 1000.0);
        assert_eq!(find(names::NETWORK_TX_DROPPED).value, 3.0);
    }

    #[test]
    fn test_cold_memory_never_negative() {
        let container = ContainerInfo {
            name: "c".to_string(),
            aliases: vec!["c".to_string()],
            spec: spec(1000),
            stats: vec![sample(0, 0, 100, 400)],
        };

        let metrics = derive_container_metrics(&container, &machine(1, GB16), &Default::default());
        let cold = metrics
            .iter()
            .find(|m| m.name.starts_with(names::MEMORY_COLD_PERCENT))
            .unwrap();

        assert_eq!(cold.value, 0.0);
    }

    #[test]
    fn test_filesystem_metrics() {
        let info = FilesystemInfo {
            filesystems: vec![
                FilesystemUsage {
                    device: "/dev/sda1".to_string(),
                    usage_bytes: 50,
                    limit_bytes: 200,
                },
                FilesystemUsage {
                    device: "/dev/sdb1".to_string(),
                    usage_bytes: 97,
                    limit_bytes: 100,
                },
            ],
        };

        let metrics = derive_filesystem_metrics(&info, &Default::default());

        assert_eq!(metrics.len(), 2);
        assert_eq!(metrics[0].name, "Filesystem.UsagePercent /dev/sda1");
        assert_eq!(metrics[0].value, 25.0);
        assert_eq!(metrics[0].status, Status::Ok);
        assert_eq!(metrics[0].tags, vec!["/dev/sda1".to_string()]);
        assert_eq!(metrics[1].status, Status::Critical);
    }
}
