//! Periodic chain health checking and failure marking.

use crate::chain::{Chain, ChainSet, display_name};
use crate::marker::FailureMarker;
use crate::prober::Prober;
use crate::ticker::{IntervalTicker, Ticker};
use crate::types::{CycleSummary, HealthState, MonitorConfig, ProbeError, ProbeOutcome};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, Notify, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{Instant, timeout};
use tracing::{Instrument, debug, error, info, info_span, warn};

/// What a single probe produced, as reported to a [`ProbeObserver`].
#[derive(Debug)]
pub struct ProbeReport<'a> {
    /// Chain display name
    pub chain: &'a str,
    /// Probe result
    pub outcome: &'a ProbeOutcome,
    /// Wall-clock cost of the probe
    pub elapsed: Duration,
    /// Marker count after the update, `None` for chains without a marker
    pub failures: Option<u64>,
}

/// Hook for metrics and other side channels. All methods default to no-ops.
pub trait ProbeObserver: Send + Sync {
    /// Called after every probe, once the marker has been updated.
    fn on_probe(&self, _report: &ProbeReport<'_>) {}

    /// Called when a marked chain passes again.
    fn on_recovery(&self, _chain: &str) {}

    /// Called when every probe of a cycle has finished.
    fn on_cycle_complete(&self, _summary: &CycleSummary) {}
}

/// Periodically probes every chain in a [`ChainSet`] and keeps each chain's
/// failure marker in step with the outcome.
pub struct HealthMonitor {
    inner: Arc<MonitorInner>,
    task: Mutex<Option<RunningTask>>,
}

/// Background loop and the signal that ends it. A fresh signal per start
/// keeps a stale stop from reaching the next run.
struct RunningTask {
    handle: JoinHandle<()>,
    stop_signal: Arc<Notify>,
}

struct MonitorInner {
    chains: ChainSet,
    prober: Arc<dyn Prober>,
    config: MonitorConfig,
    observer: Option<Arc<dyn ProbeObserver>>,
    cycles: AtomicU64,
    /// Held for the whole of a cycle, ticker-driven or `check_once`
    cycle_lock: AsyncMutex<()>,
}

impl HealthMonitor {
    /// Create a new health monitor
    pub fn new(chains: ChainSet, prober: Arc<dyn Prober>, config: MonitorConfig) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                chains,
                prober,
                config,
                observer: None,
                cycles: AtomicU64::new(0),
                cycle_lock: AsyncMutex::new(()),
            }),
            task: Mutex::new(None),
        }
    }

    /// Attach an observer. Must be called before the monitor is shared.
    pub fn with_observer(mut self, observer: Arc<dyn ProbeObserver>) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.observer = Some(observer),
            None => warn!("Health monitor already shared, observer ignored"),
        }
        self
    }

    /// Monitor configuration
    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    /// Start checking on the configured interval, beginning immediately.
    ///
    /// Returns `false` if the monitor is already running.
    pub fn start(&self) -> bool {
        self.start_with_ticker(IntervalTicker::new(self.inner.config.interval))
    }

    /// Start checking whenever `ticker` fires.
    ///
    /// Returns `false` if the monitor is already running.
    pub fn start_with_ticker<T>(&self, ticker: T) -> bool
    where
        T: Ticker + 'static,
    {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|running| !running.handle.is_finished()) {
            warn!("Health monitor already running");
            return false;
        }

        info!(
            interval = ?self.inner.config.interval,
            timeout = ?self.inner.config.timeout,
            max_concurrent_probes = self.inner.config.max_concurrent_probes,
            "Starting chain health monitor"
        );

        let stop_signal = Arc::new(Notify::new());
        let span = info_span!("health_check", kind = "health-check");
        let handle = tokio::spawn(
            Self::run(self.inner.clone(), ticker, stop_signal.clone()).instrument(span),
        );
        *task = Some(RunningTask {
            handle,
            stop_signal,
        });
        true
    }

    /// Stop ticking and abandon any cycle still in flight.
    pub async fn stop(&self) {
        let running = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(RunningTask {
            handle,
            stop_signal,
        }) = running
        {
            stop_signal.notify_one();
            if let Err(e) = handle.await {
                error!(error = %e, "Health monitor task ended abnormally");
            }
        }
    }

    /// Whether the background task is alive
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Run one cycle now, on the calling task.
    ///
    /// If a ticker-driven cycle is in flight, waits for it to finish first.
    pub async fn check_once(&self) -> CycleSummary {
        self.inner.clone().run_cycle().await
    }

    async fn run<T: Ticker>(inner: Arc<MonitorInner>, mut ticker: T, stop_signal: Arc<Notify>) {
        // At most one cycle; dropping the set aborts it, so cancelling this
        // task also cancels the cycle
        let mut in_flight: JoinSet<CycleSummary> = JoinSet::new();

        loop {
            tokio::select! {
                _ = stop_signal.notified() => {
                    in_flight.abort_all();
                    info!("Chain health monitor stopping");
                    break;
                }
                alive = ticker.tick() => {
                    if !alive {
                        // Let the last cycle land before going away
                        while let Some(joined) = in_flight.join_next().await {
                            log_cycle_exit(joined);
                        }
                        info!("Ticker closed, chain health monitor exiting");
                        break;
                    }

                    while let Some(joined) = in_flight.try_join_next() {
                        log_cycle_exit(joined);
                    }
                    if !in_flight.is_empty() {
                        warn!("Previous health check cycle still running, skipping tick");
                        continue;
                    }

                    in_flight.spawn(inner.clone().run_cycle().in_current_span());
                }
            }
        }
    }
}

fn log_cycle_exit(joined: Result<CycleSummary, JoinError>) {
    match joined {
        Ok(_) => {}
        Err(e) if e.is_cancelled() => debug!("Health check cycle cancelled"),
        Err(e) => error!(error = %e, "Health check cycle ended abnormally"),
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        if let Some(running) = self
            .task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            running.handle.abort();
        }
    }
}

impl MonitorInner {
    async fn run_cycle(self: Arc<Self>) -> CycleSummary {
        let _cycle_guard = self.cycle_lock.lock().await;
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let chains = self.chains.snapshot().await;
        debug!(cycle, chains = chains.len(), "Starting health check cycle");

        let limiter = Arc::new(Semaphore::new(self.config.max_concurrent_probes.max(1)));
        let mut probes = JoinSet::new();

        for chain in chains {
            let inner = self.clone();
            let limiter = limiter.clone();
            probes.spawn(
                async move {
                    let Ok(_permit) = limiter.acquire_owned().await else {
                        return None;
                    };
                    Some(inner.check_chain(chain.as_ref()).await)
                }
                .in_current_span(),
            );
        }

        let mut summary = CycleSummary {
            cycle,
            ..CycleSummary::default()
        };

        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(Some(healthy)) => {
                    summary.checked += 1;
                    if healthy {
                        summary.healthy += 1;
                    } else {
                        summary.unhealthy += 1;
                    }
                }
                Ok(None) => {}
                Err(e) if e.is_panic() => {
                    summary.panicked += 1;
                    error!(cycle, error = %e, "Chain health probe panicked");
                }
                Err(e) => {
                    debug!(cycle, error = %e, "Chain health probe cancelled");
                }
            }
        }

        debug!(
            cycle,
            checked = summary.checked,
            healthy = summary.healthy,
            unhealthy = summary.unhealthy,
            "Health check cycle complete"
        );

        if let Some(observer) = &self.observer {
            observer.on_cycle_complete(&summary);
        }

        summary
    }

    /// Probe one chain and fold the outcome into its marker.
    async fn check_chain(&self, chain: &dyn Chain) -> bool {
        let name = display_name(chain);
        let budget = self.config.timeout;
        let started = Instant::now();

        // Bounded here as well, whatever the prober does with its budget
        let outcome = match timeout(budget, self.prober.probe(chain, budget)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProbeError::Timeout(budget)),
        };
        let elapsed = started.elapsed();

        let failures = chain
            .marker()
            .map(|marker| self.record(name, &outcome, marker.as_ref()));

        match (&outcome, failures) {
            (Err(e), Some(failures)) => {
                warn!(chain = name, error = %e, failures, "Chain health check failed");
            }
            (Err(e), None) => {
                warn!(chain = name, error = %e, "Chain health check failed");
            }
            (Ok(()), _) => {
                debug!(chain = name, elapsed_ms = elapsed.as_millis() as u64, "Chain health check passed");
            }
        }

        if let Some(observer) = &self.observer {
            observer.on_probe(&ProbeReport {
                chain: name,
                outcome: &outcome,
                elapsed,
                failures,
            });
        }

        outcome.is_ok()
    }

    /// Apply the transition for one outcome and return the resulting count.
    fn record(&self, name: &str, outcome: &ProbeOutcome, marker: &dyn FailureMarker) -> u64 {
        let before = HealthState::from_failures(marker.count());
        match outcome {
            Err(_) => {
                marker.mark();
                let failures = marker.count();
                if before == HealthState::Healthy {
                    debug!(
                        chain = name,
                        from = %before,
                        to = %HealthState::Unhealthy,
                        "Chain health state changed"
                    );
                }
                failures
            }
            Ok(()) => {
                if before == HealthState::Unhealthy {
                    info!(chain = name, "Chain back to normal");
                    if let Some(observer) = &self.observer {
                        observer.on_recovery(name);
                    }
                }
                marker.reset();
                0
            }
        }
    }
}
