//! Unit conversions for raw counters

const BYTES_PER_MEGABYTE: f64 = (1u64 << 20) as f64;

/// Convert bytes to mebibytes
pub fn bytes_to_megabytes(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MEGABYTE
}

/// Round to `precision` decimal places, half away from zero
pub fn round_to(value: f64, precision: i32) -> f64 {
    let factor = 10f64.powi(precision);
    (value * factor).round() / factor
}

pub fn nanos_to_seconds(nanos: u64) -> f64 {
    nanos as f64 / 1_000_000_000.0
}
