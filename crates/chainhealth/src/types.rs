//! Probe outcomes, chain health states and monitor configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Well-known liveness oracle. Answers `204 No Content` when reachable.
pub const DEFAULT_PROBE_URL: &str = "http://cp.cloudflare.com/generate_204";

/// Period between health check cycles.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Hard deadline for a single probe, dial through response.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on probes running at the same time within one cycle.
pub const DEFAULT_MAX_CONCURRENT_PROBES: usize = 16;

/// Why a probe failed.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The connection through the chain could not be established
    #[error("dial through chain failed: {0}")]
    Dial(#[source] std::io::Error),

    /// No complete response within the probe budget
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    /// The oracle answered with something other than 204
    #[error("unexpected status code: {0}")]
    UnexpectedStatus(u16),

    /// The HTTP exchange broke after the connection was up
    #[error("http exchange failed: {0}")]
    Http(#[from] hyper::Error),
}

impl ProbeError {
    /// Short, stable label for this failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::Dial(_) => "dial",
            ProbeError::Timeout(_) => "timeout",
            ProbeError::UnexpectedStatus(_) => "unexpected_status",
            ProbeError::Http(_) => "http",
        }
    }
}

/// Result of one probe.
pub type ProbeOutcome = Result<(), ProbeError>;

/// Health of a chain as seen through its failure marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    /// No unresolved failures
    Healthy,
    /// At least one failure since the last reset
    Unhealthy,
}

impl HealthState {
    /// Derive the state from a failure count.
    pub fn from_failures(count: u64) -> Self {
        if count == 0 {
            HealthState::Healthy
        } else {
            HealthState::Unhealthy
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthState::Healthy => write!(f, "HEALTHY"),
            HealthState::Unhealthy => write!(f, "UNHEALTHY"),
        }
    }
}

/// Health monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Interval between cycles
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Budget for each probe
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Liveness oracle URL
    pub probe_url: String,

    /// Maximum probes in flight per cycle
    pub max_concurrent_probes: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            probe_url: DEFAULT_PROBE_URL.to_string(),
            max_concurrent_probes: DEFAULT_MAX_CONCURRENT_PROBES,
        }
    }
}

/// Totals for one completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Sequence number, starting at 1
    pub cycle: u64,
    /// Chains whose probe ran to an outcome
    pub checked: usize,
    /// Chains that passed
    pub healthy: usize,
    /// Chains that failed
    pub unhealthy: usize,
    /// Probe tasks that panicked
    pub panicked: usize,
}
