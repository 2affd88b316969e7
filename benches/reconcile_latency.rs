//! # Reconciliation Hot-Path Benchmarks
//!
//! Benchmarks the per-container cost of the kernels that run on every
//! reconciliation cycle: percentile/confidence scoring (C2), leak
//! regression (C4), full recommendation assembly (C8), and one
//! apply-through-the-reconciler round trip (C10) against a no-op
//! orchestrator client.

use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use resource_optimizer::cost::Price;
use resource_optimizer::leak::{self, MemorySample};
use resource_optimizer::orchestrator::NullOrchestratorClient;
use resource_optimizer::reconciler::{Reconciler, ReconcilerSettings};
use resource_optimizer::recommender::{ClampSettings, Recommender, RecommenderSettings};
use resource_optimizer::rollback::RollbackStore;
use resource_optimizer::safety::CircuitBreaker;
use resource_optimizer::stats::{confidence, percentile, ConfidenceInputs};
use resource_optimizer::store::SampleStore;
use resource_optimizer::types::{ContainerRecommendation, ContainerSample, WorkloadId, WorkloadKind};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn cpu_series(n: usize) -> Vec<f64> {
    (0..n).map(|i| 200.0 + (i % 50) as f64).collect()
}

/// Benchmark nearest-rank percentile over growing sample windows.
fn bench_percentile(c: &mut Criterion) {
    let mut group = c.benchmark_group("percentile");
    for size in [100, 1_000, 10_000].iter() {
        let values = cpu_series(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(percentile(&values, 95.0)));
        });
    }
    group.finish();
}

/// Benchmark confidence scoring, a fixed-cost closed-form computation.
fn bench_confidence(c: &mut Criterion) {
    c.bench_function("confidence_score", |b| {
        let inputs = ConfidenceInputs {
            span_hours: 24.0,
            sample_count: 720,
            coefficient_of_variation: 0.2,
            newest_age_hours: 0.1,
            gap_fraction: 0.02,
        };
        b.iter(|| black_box(confidence(inputs)));
    });
}

/// Benchmark the leak detector's OLS regression over growing windows.
fn bench_leak_analyze(c: &mut Criterion) {
    let mut group = c.benchmark_group("leak_analyze");
    for size in [60, 180, 720].iter() {
        let now = Utc::now();
        let samples: Vec<MemorySample> = (0..*size)
            .map(|i| MemorySample {
                timestamp: now - Duration::minutes((*size - i) as i64),
                bytes: 256.0 * 1024.0 * 1024.0 + (i as f64) * 1024.0 * 1024.0,
            })
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(leak::analyze(&samples, None)));
        });
    }
    group.finish();
}

/// Benchmark one full recommendation assembly (read -> group -> compute ->
/// clamp -> score) against an in-memory store.
fn bench_recommend(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = SampleStore::new();
    let workload = WorkloadId::new("default", WorkloadKind::Deployment, "api");

    rt.block_on(async {
        let now = Utc::now();
        for i in 0..500 {
            store
                .add(ContainerSample {
                    workload: workload.clone(),
                    container: "app".into(),
                    timestamp: now - Duration::minutes(i),
                    usage_cpu_millicores: 200.0 + (i % 50) as f64,
                    usage_memory_bytes: 128.0 * 1024.0 * 1024.0,
                    request_cpu_millicores: 1000.0,
                    request_memory_bytes: 512.0 * 1024.0 * 1024.0,
                    limit_cpu_millicores: 0.0,
                    limit_memory_bytes: 0.0,
                })
                .await;
        }
    });

    let recommender = Recommender::new(store, Price::default());
    let settings = RecommenderSettings::default();
    let clamps = ClampSettings::default();
    let oom_counts: HashMap<String, u32> = HashMap::new();
    let predicted_peaks: HashMap<String, (f64, f64)> = HashMap::new();

    c.bench_function("recommend_one_workload", |b| {
        b.to_async(&rt).iter(|| async {
            let result = recommender
                .recommend(&workload, &settings, &clamps, &oom_counts, &predicted_peaks)
                .await;
            black_box(result)
        });
    });
}

/// Benchmark one apply round trip through the reconciler against a no-op
/// orchestrator client (no network, isolates the reconciler's own
/// bookkeeping cost: locking, rollback snapshot, retry/poll loop).
fn bench_apply_container(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let client = Arc::new(NullOrchestratorClient);
    let rollback = RollbackStore::new();
    let breaker = Arc::new(CircuitBreaker::new(5, 3, Duration::minutes(5)));
    let reconciler = Reconciler::new(client, rollback, breaker, 4);
    let settings = ReconcilerSettings::default();
    let workload = WorkloadId::new("default", WorkloadKind::Deployment, "api");

    let recommendation = ContainerRecommendation {
        container_name: "app".into(),
        current_cpu: 0.0,
        current_memory: 0.0,
        recommended_cpu: 250.0,
        recommended_memory: 256.0 * 1024.0 * 1024.0,
        sample_count: 100,
        cpu_percentile: 95.0,
        memory_percentile: 95.0,
        confidence: 80.0,
        confidence_breakdown: resource_optimizer::types::ConfidenceBreakdown {
            duration: 80.0,
            samples: 80.0,
            consistency: 80.0,
            recency: 80.0,
            coverage: 80.0,
        },
        estimated_savings: 10.0,
        oom_flag: false,
        oom_count: 0,
        oom_boost_factor: 1.0,
        oom_priority: resource_optimizer::types::OomPriority::None,
    };

    c.bench_function("apply_container_noop_client", |b| {
        b.to_async(&rt).iter(|| async {
            let outcome = reconciler
                .apply_container(&workload, "app", &recommendation, &settings)
                .await;
            black_box(outcome)
        });
    });
}

criterion_group!(
    benches,
    bench_percentile,
    bench_confidence,
    bench_leak_analyze,
    bench_recommend,
    bench_apply_container,
);
criterion_main!(benches);
