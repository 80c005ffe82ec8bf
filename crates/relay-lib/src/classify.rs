//! Threshold classification of derived metrics

use serde::{Deserialize, Serialize};

/// Status label attached to every forwarded event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Warning,
    Critical,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::Warning => "warning",
            Status::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Warning and critical cut-points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub warning: f64,
    pub critical: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warning: 80.0,
            critical: 95.0,
        }
    }
}

impl Thresholds {
    pub fn new(warning: f64, critical: f64) -> Self {
        Self { warning, critical }
    }

    pub fn classify(&self, value: f64) -> Status {
        classify(value, self.warning, self.critical)
    }
}

/// Classify `value` with strict greater-than at both cutoffs.
///
/// A value equal to the critical cutoff is `Warning`, and a value equal to
/// the warning cutoff is `Ok`. NaN compares false everywhere and is `Ok`.
pub fn classify(value: f64, warning_cutoff: f64, critical_cutoff: f64) -> Status {
    if value > critical_cutoff {
        Status::Critical
    } else if value > warning_cutoff {
        Status::Warning
    } else {
        Status::Ok
    }
}
