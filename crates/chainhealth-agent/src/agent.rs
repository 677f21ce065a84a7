//! Agent runner: wires configured chains, the monitor and the metrics endpoint.

use crate::config::Config;
use crate::connect::ConnectChain;
use crate::http_server::MetricsServer;
use crate::metrics::MetricsRegistry;
use chainhealth::{Chain, ChainSet, HealthMonitor, HttpProber};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use validator::Validate;

/// Chain health agent
pub struct Agent {
    config: Config,
    chains: ChainSet,
    prober: Arc<HttpProber>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl Agent {
    /// Build the agent from a configuration.
    ///
    /// Fails if the configuration does not validate.
    pub fn new(config: Config) -> common::Result<Self> {
        config
            .validate()
            .map_err(|e| common::Error::config(e.to_string()))?;

        let prober = Arc::new(HttpProber::new(&config.health.probe_url)?);
        let chains = ChainSet::from_chains(
            config
                .chains
                .iter()
                .map(|settings| Arc::new(ConnectChain::from_settings(settings)) as Arc<dyn Chain>),
        );
        let metrics = config
            .metrics
            .enabled
            .then(|| Arc::new(MetricsRegistry::new()));

        Ok(Self {
            config,
            chains,
            prober,
            metrics,
        })
    }

    /// Shared handle to the monitored chains
    pub fn chains(&self) -> &ChainSet {
        &self.chains
    }

    pub fn metrics(&self) -> Option<&Arc<MetricsRegistry>> {
        self.metrics.as_ref()
    }

    /// Run until Ctrl-C
    pub async fn run(self) -> common::Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C, running until killed");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until `shutdown` resolves or the metrics server exits
    pub async fn run_until<F>(self, shutdown: F) -> common::Result<()>
    where
        F: Future<Output = ()>,
    {
        let chain_count = self.config.chains.len();
        let mut monitor = HealthMonitor::new(
            self.chains.clone(),
            self.prober.clone(),
            self.config.to_monitor_config(),
        );

        let mut metrics_handle: Option<JoinHandle<common::Result<()>>> = None;
        if let Some(registry) = &self.metrics {
            registry.set_chain_count(chain_count);
            monitor = monitor.with_observer(registry.clone());

            let server =
                MetricsServer::new(registry.clone(), self.config.metrics.listen_addr.clone());
            info!("Metrics enabled on {}", server.listen_addr());
            metrics_handle = Some(tokio::spawn(server.run()));
        } else {
            info!("Metrics disabled");
        }

        monitor.start();
        info!(
            chains = chain_count,
            interval = ?self.config.health.interval,
            timeout = ?self.config.health.timeout,
            probe_url = %self.config.health.probe_url,
            "Chain health agent running"
        );

        let result = tokio::select! {
            _ = shutdown => {
                info!("Shutdown requested");
                Ok(())
            }
            exit = async {
                match metrics_handle.as_mut() {
                    Some(handle) => handle.await,
                    None => std::future::pending().await,
                }
            } => {
                warn!("Metrics server exited");
                match exit {
                    Ok(result) => result,
                    Err(e) => Err(common::Error::Io(std::io::Error::other(e))),
                }
            }
        };

        monitor.stop().await;
        if let Some(handle) = metrics_handle {
            handle.abort();
        }

        info!("Chain health agent stopped");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_builds_configured_chains() {
        let config = Config::from_yaml(
            r#"
chains:
  - name: a
    hops: ["127.0.0.1:3128"]
  - name: b
metrics:
  enabled: false
"#,
        )
        .unwrap();

        let agent = Agent::new(config).unwrap();
        assert!(agent.metrics().is_none());
        assert_eq!(agent.prober.address(), "cp.cloudflare.com:80");
    }

    #[test]
    fn test_agent_rejects_invalid_config() {
        let mut config = Config::default();
        config.health.probe_url = "ftp://example.com/".to_string();

        assert!(matches!(Agent::new(config), Err(common::Error::Config(_))));
    }

    #[tokio::test]
    async fn test_run_until_stops_on_shutdown() {
        let mut config = Config::default();
        config.metrics.enabled = false;

        let agent = Agent::new(config).unwrap();
        let result = agent.run_until(async {}).await;
        assert!(result.is_ok());
    }
}
