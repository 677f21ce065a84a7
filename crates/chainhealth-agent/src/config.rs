//! Configuration loading and validation for the chain health agent

use chainhealth::{HttpProber, MonitorConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] ValidationErrors),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub health: HealthSettings,

    #[serde(default)]
    pub chains: Vec<ChainSettings>,

    #[serde(default)]
    pub metrics: MetricsSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), ValidationErrors> {
        self.health.validate()?;
        self.metrics.validate()?;

        let mut seen = HashSet::new();
        for chain in &self.chains {
            chain.validate()?;
            if !seen.insert(chain.name.as_str()) {
                let mut errors = ValidationErrors::new();
                errors.add("chains", ValidationError::new("duplicate_chain_name"));
                return Err(errors);
            }
        }
        Ok(())
    }
}

/// Probe scheduling settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HealthSettings {
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_interval")]
    pub interval: Duration,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_timeout")]
    pub timeout: Duration,

    #[validate(custom = "validate_probe_url")]
    pub probe_url: String,

    #[validate(range(min = 1, max = 1024))]
    pub max_concurrent_probes: usize,
}

/// One monitored chain
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ChainSettings {
    #[validate(length(min = 1))]
    pub name: String,

    /// HTTP CONNECT proxies, in dial order. Empty means a direct route.
    #[serde(default)]
    #[validate(custom = "validate_hops")]
    pub hops: Vec<String>,

    /// Attach a failure marker; off for observability-only chains
    #[serde(default = "default_mark_failures")]
    pub mark_failures: bool,
}

/// Metrics endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MetricsSettings {
    pub enabled: bool,

    #[validate(custom = "validate_listen_addr")]
    pub listen_addr: String,
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub format: Option<String>,
}

impl LoggingSettings {
    /// Whether JSON output was requested
    pub fn json(&self) -> bool {
        self.format
            .as_deref()
            .is_some_and(|f| f.eq_ignore_ascii_case("json"))
    }
}

// Default implementations

impl Default for HealthSettings {
    fn default() -> Self {
        let monitor = MonitorConfig::default();
        Self {
            interval: monitor.interval,
            timeout: monitor.timeout,
            probe_url: monitor.probe_url,
            max_concurrent_probes: monitor.max_concurrent_probes,
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "127.0.0.1:9464".to_string(),
        }
    }
}

fn default_mark_failures() -> bool {
    true
}

// Custom validators

fn validate_interval(interval: &Duration) -> Result<(), ValidationError> {
    if *interval < Duration::from_secs(1) || *interval > Duration::from_secs(3600) {
        return Err(ValidationError::new("interval_out_of_range"));
    }
    Ok(())
}

fn validate_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    if *timeout < Duration::from_millis(100) || *timeout > Duration::from_secs(300) {
        return Err(ValidationError::new("timeout_out_of_range"));
    }
    Ok(())
}

fn validate_probe_url(url: &str) -> Result<(), ValidationError> {
    HttpProber::new(url)
        .map(|_| ())
        .map_err(|_| ValidationError::new("probe_url_invalid"))
}

fn validate_hops(hops: &[String]) -> Result<(), ValidationError> {
    for hop in hops {
        let Some((host, port)) = hop.rsplit_once(':') else {
            return Err(ValidationError::new("hop_missing_port"));
        };
        if host.trim().is_empty() {
            return Err(ValidationError::new("hop_missing_host"));
        }
        if port.parse::<u16>().map_or(true, |p| p == 0) {
            return Err(ValidationError::new("hop_invalid_port"));
        }
    }
    Ok(())
}

fn validate_listen_addr(addr: &str) -> Result<(), ValidationError> {
    addr.parse::<SocketAddr>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("listen_addr_invalid"))
}

// Configuration loading implementation

impl Config {
    /// Load configuration from default search paths
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_file() {
            Some(path) => {
                tracing::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(&path)
            }
            None => {
                tracing::info!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/chainhealth/agent.yaml")];

        if let Some(home_path) = Self::home_config_path() {
            paths.push(home_path);
        }

        paths.push(PathBuf::from("./chainhealth-agent.yaml"));

        paths.into_iter().find(|p| p.is_file())
    }

    /// Get home directory config path
    fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/chainhealth/agent.yaml"))
    }

    /// Settings for the health monitor
    pub fn to_monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            interval: self.health.interval,
            timeout: self.health.timeout,
            probe_url: self.health.probe_url.clone(),
            max_concurrent_probes: self.health.max_concurrent_probes,
        }
    }
}
