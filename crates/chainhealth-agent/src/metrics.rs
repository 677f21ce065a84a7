//! Prometheus metrics for the chain health agent.

use chainhealth::{CycleSummary, ProbeObserver, ProbeReport};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;

/// Labels for per-chain metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ChainLabels {
    /// Chain name, `-` for anonymous chains
    pub chain: String,
}

/// Labels for probe result metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ProbeLabels {
    /// Chain name
    pub chain: String,
    /// `success`, or the failure kind (dial, timeout, unexpected_status, http)
    pub result: String,
}

/// Probe durations from 5ms to ~20s
fn probe_duration_histogram() -> Histogram {
    Histogram::new(exponential_buckets(0.005, 2.0, 12))
}

/// Metrics registry with all agent metrics
pub struct MetricsRegistry {
    /// Prometheus registry
    pub registry: Registry,

    probes_total: Family<ProbeLabels, Counter>,
    probe_duration_seconds: Family<ChainLabels, Histogram>,
    chain_failures: Family<ChainLabels, Gauge>,
    recoveries_total: Family<ChainLabels, Counter>,
    chains: Gauge,
    cycles_total: Counter,
    probe_panics_total: Counter,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        // Counters get their `_total` suffix from the encoder
        let probes_total = Family::<ProbeLabels, Counter>::default();
        registry.register(
            "chainhealth_probes",
            "Chain health probes by result",
            probes_total.clone(),
        );

        let probe_duration_seconds =
            Family::<ChainLabels, Histogram>::new_with_constructor(probe_duration_histogram);
        registry.register(
            "chainhealth_probe_duration_seconds",
            "Time spent probing a chain, in seconds",
            probe_duration_seconds.clone(),
        );

        let chain_failures = Family::<ChainLabels, Gauge>::default();
        registry.register(
            "chainhealth_chain_failures",
            "Current failure marker count per chain",
            chain_failures.clone(),
        );

        let recoveries_total = Family::<ChainLabels, Counter>::default();
        registry.register(
            "chainhealth_recoveries",
            "Times a failing chain passed again",
            recoveries_total.clone(),
        );

        let chains = Gauge::default();
        registry.register(
            "chainhealth_chains",
            "Chains checked in the last cycle",
            chains.clone(),
        );

        let cycles_total = Counter::default();
        registry.register(
            "chainhealth_cycles",
            "Completed health check cycles",
            cycles_total.clone(),
        );

        let probe_panics_total = Counter::default();
        registry.register(
            "chainhealth_probe_panics",
            "Probes that panicked instead of returning an outcome",
            probe_panics_total.clone(),
        );

        Self {
            registry,
            probes_total,
            probe_duration_seconds,
            chain_failures,
            recoveries_total,
            chains,
            cycles_total,
            probe_panics_total,
        }
    }

    /// Seed the chain gauge before the first cycle completes
    pub fn set_chain_count(&self, count: usize) {
        self.chains.set(count as i64);
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeObserver for MetricsRegistry {
    fn on_probe(&self, report: &ProbeReport<'_>) {
        let result = match report.outcome {
            Ok(()) => "success",
            Err(e) => e.kind(),
        };

        self.probes_total
            .get_or_create(&ProbeLabels {
                chain: report.chain.to_string(),
                result: result.to_string(),
            })
            .inc();

        let labels = ChainLabels {
            chain: report.chain.to_string(),
        };

        self.probe_duration_seconds
            .get_or_create(&labels)
            .observe(report.elapsed.as_secs_f64());

        if let Some(failures) = report.failures {
            self.chain_failures
                .get_or_create(&labels)
                .set(failures as i64);
        }
    }

    fn on_recovery(&self, chain: &str) {
        self.recoveries_total
            .get_or_create(&ChainLabels {
                chain: chain.to_string(),
            })
            .inc();
    }

    fn on_cycle_complete(&self, summary: &CycleSummary) {
        self.cycles_total.inc();
        self.chains.set((summary.checked + summary.panicked) as i64);
        self.probe_panics_total.inc_by(summary.panicked as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainhealth::ProbeError;
    use prometheus_client::encoding::text::encode;
    use std::time::Duration;

    fn render(metrics: &MetricsRegistry) -> String {
        let mut buffer = String::new();
        encode(&mut buffer, &metrics.registry).unwrap();
        buffer
    }

    #[test]
    fn test_probe_results_are_labelled() {
        let metrics = MetricsRegistry::new();
        let failed = Err(ProbeError::Timeout(Duration::from_secs(10)));
        let passed = Ok(());

        metrics.on_probe(&ProbeReport {
            chain: "alpha",
            outcome: &failed,
            elapsed: Duration::from_secs(10),
            failures: Some(2),
        });
        metrics.on_probe(&ProbeReport {
            chain: "beta",
            outcome: &passed,
            elapsed: Duration::from_millis(40),
            failures: None,
        });

        let text = render(&metrics);
        assert!(
            text.contains(r#"chainhealth_probes_total{chain="alpha",result="timeout"} 1"#),
            "{text}"
        );
        assert!(
            text.contains(r#"chainhealth_probes_total{chain="beta",result="success"} 1"#),
            "{text}"
        );
        assert!(
            text.contains(r#"chainhealth_chain_failures{chain="alpha"} 2"#),
            "{text}"
        );
        // Unmarked chains have no failure gauge
        assert!(!text.contains(r#"chainhealth_chain_failures{chain="beta"}"#), "{text}");
        assert!(text.contains("chainhealth_probe_duration_seconds_count"), "{text}");
    }

    #[test]
    fn test_recoveries_and_cycles() {
        let metrics = MetricsRegistry::new();
        metrics.set_chain_count(3);
        assert!(render(&metrics).contains("chainhealth_chains 3"));

        metrics.on_recovery("alpha");
        metrics.on_recovery("alpha");
        metrics.on_cycle_complete(&CycleSummary {
            cycle: 1,
            checked: 4,
            healthy: 3,
            unhealthy: 1,
            panicked: 1,
        });

        let text = render(&metrics);
        assert!(text.contains(r#"chainhealth_recoveries_total{chain="alpha"} 2"#), "{text}");
        assert!(text.contains("chainhealth_cycles_total 1"), "{text}");
        assert!(text.contains("chainhealth_probe_panics_total 1"), "{text}");
        assert!(text.contains("chainhealth_chains 5"), "{text}");
    }
}
