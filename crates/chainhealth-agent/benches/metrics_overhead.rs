// Cost of the metrics observer on the probe path

use chainhealth::{CycleSummary, ProbeError, ProbeObserver, ProbeOutcome, ProbeReport};
use chainhealth_agent::MetricsRegistry;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::Duration;

fn bench_on_probe(c: &mut Criterion) {
    let mut group = c.benchmark_group("on_probe");
    let registry = MetricsRegistry::new();
    let passed: ProbeOutcome = Ok(());
    let failed: ProbeOutcome = Err(ProbeError::Timeout(Duration::from_secs(10)));

    group.bench_function("success", |b| {
        b.iter(|| {
            registry.on_probe(black_box(&ProbeReport {
                chain: "edge",
                outcome: &passed,
                elapsed: Duration::from_millis(40),
                failures: Some(0),
            }));
        });
    });

    group.bench_function("failure", |b| {
        b.iter(|| {
            registry.on_probe(black_box(&ProbeReport {
                chain: "edge",
                outcome: &failed,
                elapsed: Duration::from_secs(10),
                failures: Some(3),
            }));
        });
    });

    group.bench_function("recovery", |b| {
        b.iter(|| registry.on_recovery(black_box("edge")));
    });

    group.bench_function("cycle_complete", |b| {
        let summary = CycleSummary {
            cycle: 1,
            checked: 16,
            healthy: 15,
            unhealthy: 1,
            panicked: 0,
        };
        b.iter(|| registry.on_cycle_complete(black_box(&summary)));
    });

    group.finish();
}

fn bench_many_chains(c: &mut Criterion) {
    let mut group = c.benchmark_group("many_chains");
    let registry = MetricsRegistry::new();
    let passed: ProbeOutcome = Ok(());

    for chains in [1usize, 10, 100] {
        let names: Vec<String> = (0..chains).map(|i| format!("chain-{i}")).collect();
        group.bench_with_input(BenchmarkId::from_parameter(chains), &names, |b, names| {
            b.iter(|| {
                for name in names {
                    registry.on_probe(&ProbeReport {
                        chain: black_box(name),
                        outcome: &passed,
                        elapsed: Duration::from_millis(10),
                        failures: Some(0),
                    });
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_on_probe, bench_many_chains);
criterion_main!(benches);
