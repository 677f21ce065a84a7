//! Chain health agent
//!
//! Long-running service that watches a fixed set of forwarding chains built
//! from HTTP CONNECT proxies and exposes their health as Prometheus metrics.
//!
//! # Components
//!
//! - **Config**: YAML configuration with validation
//! - **ConnectChain**: multi-hop CONNECT tunnels implementing [`chainhealth::Chain`]
//! - **MetricsRegistry**: probe outcomes, marker counts and recoveries
//! - **Agent**: runs the health monitor and the `/metrics` endpoint until Ctrl-C

pub mod agent;
pub mod config;
pub mod connect;
pub mod http_server;
pub mod metrics;

pub use agent::Agent;
pub use config::{Config, ConfigError};
pub use connect::ConnectChain;
pub use http_server::MetricsServer;
pub use metrics::MetricsRegistry;
