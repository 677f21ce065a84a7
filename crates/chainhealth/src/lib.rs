//! Liveness monitoring for forwarding chains.
//!
//! Every cycle the [`HealthMonitor`] probes each chain of a [`ChainSet`] by
//! sending a `GET` to a 204 oracle *through* the chain, then folds the
//! outcome into the chain's [`FailureMarker`]. Route selectors read the
//! marker count concurrently to steer traffic away from failing chains.
//!
//! # Features
//!
//! - Probes never use a direct network path, all bytes go through [`Chain::dial`]
//! - Hard per-probe deadline, enforced by the prober and again by the monitor
//! - Bounded fan-out per cycle, so slow chains do not serialize a cycle
//! - Immediate first cycle, then a fixed period; overdue ticks are skipped
//! - Pluggable [`Ticker`] and [`Prober`] for tests and embedders
//!
//! # Example
//!
//! ```no_run
//! use chainhealth::{
//!     AtomicMarker, BoxConnection, Chain, ChainSet, FailureMarker, HealthMonitor, HttpProber,
//!     MonitorConfig, Network,
//! };
//! use std::sync::Arc;
//!
//! struct Direct {
//!     marker: Arc<AtomicMarker>,
//! }
//!
//! #[async_trait::async_trait]
//! impl Chain for Direct {
//!     async fn dial(&self, _network: Network, address: &str) -> std::io::Result<BoxConnection> {
//!         Ok(Box::new(tokio::net::TcpStream::connect(address).await?))
//!     }
//!
//!     fn name(&self) -> Option<&str> {
//!         Some("direct")
//!     }
//!
//!     fn marker(&self) -> Option<Arc<dyn FailureMarker>> {
//!         Some(self.marker.clone())
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MonitorConfig::default();
//! let prober = Arc::new(HttpProber::new(&config.probe_url)?);
//! let chains = ChainSet::new();
//! chains.add(Arc::new(Direct { marker: Arc::new(AtomicMarker::new()) })).await;
//!
//! let monitor = HealthMonitor::new(chains, prober, config);
//! monitor.start();
//! // ...
//! monitor.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod chain;
pub mod marker;
pub mod monitor;
pub mod prober;
pub mod ticker;
pub mod types;

pub use chain::{ANONYMOUS_CHAIN, BoxConnection, Chain, ChainSet, Connection, Network, display_name};
pub use marker::{AtomicMarker, FailureMarker};
pub use monitor::{HealthMonitor, ProbeObserver, ProbeReport};
pub use prober::{HttpProber, Prober};
pub use ticker::{ChannelTicker, IntervalTicker, Ticker};
pub use types::{
    CycleSummary, DEFAULT_INTERVAL, DEFAULT_MAX_CONCURRENT_PROBES, DEFAULT_PROBE_URL,
    DEFAULT_TIMEOUT, HealthState, MonitorConfig, ProbeError, ProbeOutcome,
};
