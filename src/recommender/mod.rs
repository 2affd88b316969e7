//! # Recommender (C8)
//!
//! Produces a sizing recommendation in distinct phases, each its own
//! private method: read → group → compute → adjust → clamp → score →
//! assemble, with `#[instrument(skip(self))]` on the public entry point.

use crate::cost::{hourly_cost, CostProjection, Price, Savings};
use crate::stats::{coefficient_of_variation, confidence, mean, percentile, ConfidenceInputs};
use crate::store::SampleStore;
use crate::types::{
    ContainerRecommendation, ContainerSample, OomPriority, WorkloadId, WorkloadRecommendation,
};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::instrument;

/// Sizing aggressiveness, applied as a modifier to percentiles and margin
/// before computing a recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Smaller footprint, faster to converge.
    Aggressive,
    /// Unmodified defaults.
    Balanced,
    /// Larger headroom, slower to converge.
    Conservative,
}

/// Parameters controlling one recommendation cycle.
#[derive(Debug, Clone, Copy)]
pub struct RecommenderSettings {
    /// Percentile used for CPU sizing, before strategy adjustment.
    pub cpu_percentile: f64,
    /// Percentile used for memory sizing, before strategy adjustment.
    pub memory_percentile: f64,
    /// Multiplicative safety margin, before strategy adjustment.
    pub safety_margin: f64,
    /// Minimum sample count required to produce a recommendation.
    pub min_samples: usize,
    /// History window to read samples over.
    pub history_window: Duration,
    /// Recommendation validity window.
    pub ttl: Duration,
    /// Sizing aggressiveness.
    pub strategy: Strategy,
}

impl Default for RecommenderSettings {
    fn default() -> Self {
        Self {
            cpu_percentile: 95.0,
            memory_percentile: 95.0,
            safety_margin: 1.2,
            min_samples: 10,
            history_window: Duration::hours(24),
            ttl: Duration::hours(24),
            strategy: Strategy::Balanced,
        }
    }
}

impl RecommenderSettings {
    /// Apply the strategy modifier to `(cpu_percentile, memory_percentile,
    /// safety_margin)`.
    fn adjusted(&self) -> (f64, f64, f64) {
        match self.strategy {
            Strategy::Aggressive => (
                (self.cpu_percentile - 10.0).max(50.0),
                (self.memory_percentile - 5.0).max(50.0),
                (self.safety_margin - 0.1).max(1.0),
            ),
            Strategy::Conservative => (
                (self.cpu_percentile + 4.0).min(99.0),
                (self.memory_percentile + 4.0).min(99.0),
                (self.safety_margin + 0.2).min(2.0),
            ),
            Strategy::Balanced => (self.cpu_percentile, self.memory_percentile, self.safety_margin),
        }
    }
}

/// `(oom_count >= threshold, boost, priority)` rows, checked
/// highest-threshold-first.
const OOM_BOOST_TABLE: &[(u32, f64, OomPriority)] = &[
    (10, 2.00, OomPriority::Critical),
    (5, 1.75, OomPriority::High),
    (3, 1.50, OomPriority::Medium),
    (1, 1.30, OomPriority::Low),
];

fn oom_boost(oom_count: u32) -> (f64, OomPriority) {
    for (threshold, boost, priority) in OOM_BOOST_TABLE {
        if oom_count >= *threshold {
            return (*boost, *priority);
        }
    }
    (1.0, OomPriority::None)
}

/// Clamp bounds for one resource dimension, `None` meaning unbounded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Clamp {
    /// Lower bound.
    pub min: Option<f64>,
    /// Upper bound.
    pub max: Option<f64>,
}

impl Clamp {
    fn apply(&self, value: f64) -> f64 {
        let mut v = value;
        if let Some(min) = self.min {
            v = v.max(min);
        }
        if let Some(max) = self.max {
            v = v.min(max);
        }
        v
    }
}

/// Resource clamp thresholds for CPU and memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClampSettings {
    /// CPU clamp, in millicores.
    pub cpu: Clamp,
    /// Memory clamp, in bytes.
    pub memory: Clamp,
}

/// Produces [`WorkloadRecommendation`]s from stored samples.
pub struct Recommender {
    store: SampleStore,
    pricing: Price,
}

impl Recommender {
    /// Construct a recommender reading from `store`, pricing savings with
    /// `pricing`.
    pub fn new(store: SampleStore, pricing: Price) -> Self {
        Self { store, pricing }
    }

    /// Compute a recommendation for one workload.
    ///
    /// Containers with fewer than `settings.min_samples` samples are
    /// skipped. Returns `None` if no container qualifies.
    #[instrument(skip(self, settings, clamps, oom_counts, predicted_peaks))]
    pub async fn recommend(
        &self,
        workload: &WorkloadId,
        settings: &RecommenderSettings,
        clamps: &ClampSettings,
        oom_counts: &HashMap<String, u32>,
        predicted_peaks: &HashMap<String, (f64, f64)>,
    ) -> Option<WorkloadRecommendation> {
        let samples = self.store.by_workload(workload, settings.history_window).await;
        let grouped = self.group_by_container(samples);

        let mut containers = Vec::new();
        for (container_name, container_samples) in grouped {
            if container_samples.len() < settings.min_samples {
                continue;
            }
            let oom_count = oom_counts.get(&container_name).copied().unwrap_or(0);
            let predicted_peak = predicted_peaks.get(&container_name).copied();
            if let Some(rec) = self.compute_container(
                &container_name,
                &container_samples,
                settings,
                clamps,
                oom_count,
                predicted_peak,
            ) {
                containers.push(rec);
            }
        }

        if containers.is_empty() {
            return None;
        }

        Some(self.assemble(workload.clone(), containers, settings, Utc::now()))
    }

    fn group_by_container(&self, samples: Vec<ContainerSample>) -> HashMap<String, Vec<ContainerSample>> {
        let mut grouped: HashMap<String, Vec<ContainerSample>> = HashMap::new();
        for sample in samples {
            grouped.entry(sample.container.clone()).or_default().push(sample);
        }
        grouped
    }

    fn compute_container(
        &self,
        container_name: &str,
        samples: &[ContainerSample],
        settings: &RecommenderSettings,
        clamps: &ClampSettings,
        oom_count: u32,
        predicted_peak: Option<(f64, f64)>,
    ) -> Option<ContainerRecommendation> {
        let (cpu_percentile, memory_percentile, safety_margin) = settings.adjusted();

        let cpu_values: Vec<f64> = samples.iter().map(|s| s.usage_cpu_millicores).collect();
        let memory_values: Vec<f64> = samples.iter().map(|s| s.usage_memory_bytes).collect();

        let mut recommended_cpu = percentile(&cpu_values, cpu_percentile) * safety_margin;
        let mut recommended_memory = percentile(&memory_values, memory_percentile) * safety_margin;

        if settings.strategy == Strategy::Conservative {
            if let Some((cpu_peak, memory_peak)) = predicted_peak {
                recommended_cpu = recommended_cpu.max(cpu_peak * safety_margin);
                recommended_memory = recommended_memory.max(memory_peak * safety_margin);
            }
        }

        let current_cpu = samples.last().map(|s| s.request_cpu_millicores).unwrap_or(0.0);
        let current_memory = samples.last().map(|s| s.request_memory_bytes).unwrap_or(0.0);

        let (oom_boost_factor, oom_priority) = oom_boost(oom_count);
        if oom_count > 0 {
            recommended_memory = (recommended_memory * oom_boost_factor).max(current_memory);
        }

        recommended_cpu = clamps.cpu.apply(recommended_cpu);
        recommended_memory = clamps.memory.apply(recommended_memory);

        let span_hours = span_hours(samples);
        let gap_fraction = gap_fraction(samples);
        let newest_age_hours = samples
            .iter()
            .map(|s| s.timestamp)
            .max()
            .map(|newest| (Utc::now() - newest).num_seconds() as f64 / 3600.0)
            .unwrap_or(f64::MAX);

        let (breakdown, confidence_score) = confidence(ConfidenceInputs {
            span_hours,
            sample_count: samples.len(),
            coefficient_of_variation: coefficient_of_variation(&cpu_values)
                .max(coefficient_of_variation(&memory_values)),
            newest_age_hours,
            gap_fraction,
        });

        let current_monthly = CostProjection::from_hourly(hourly_cost(current_cpu, current_memory, self.pricing)).monthly;
        let recommended_monthly =
            CostProjection::from_hourly(hourly_cost(recommended_cpu, recommended_memory, self.pricing)).monthly;
        let savings = Savings::compute(current_monthly, recommended_monthly);

        Some(ContainerRecommendation {
            container_name: container_name.to_string(),
            current_cpu,
            current_memory,
            recommended_cpu,
            recommended_memory,
            sample_count: samples.len(),
            cpu_percentile,
            memory_percentile,
            confidence: confidence_score,
            confidence_breakdown: breakdown,
            estimated_savings: savings.amount,
            oom_flag: oom_count > 0,
            oom_count,
            oom_boost_factor,
            oom_priority,
        })
    }

    fn assemble(
        &self,
        workload: WorkloadId,
        containers: Vec<ContainerRecommendation>,
        settings: &RecommenderSettings,
        now: DateTime<Utc>,
    ) -> WorkloadRecommendation {
        let aggregate_savings = containers.iter().map(|c| c.estimated_savings).sum();
        let aggregate_oom_priority = containers
            .iter()
            .map(|c| c.oom_priority)
            .max_by_key(oom_priority_rank)
            .unwrap_or(OomPriority::None);

        WorkloadRecommendation {
            workload,
            containers,
            generated_at: now,
            expires_at: now + settings.ttl,
            aggregate_savings,
            aggregate_oom_priority,
        }
    }
}

fn oom_priority_rank(priority: &OomPriority) -> u8 {
    match priority {
        OomPriority::None => 0,
        OomPriority::Low => 1,
        OomPriority::Medium => 2,
        OomPriority::High => 3,
        OomPriority::Critical => 4,
    }
}

fn span_hours(samples: &[ContainerSample]) -> f64 {
    let min = samples.iter().map(|s| s.timestamp).min();
    let max = samples.iter().map(|s| s.timestamp).max();
    match (min, max) {
        (Some(a), Some(b)) => (b - a).num_seconds() as f64 / 3600.0,
        _ => 0.0,
    }
}

/// Fraction of total span consumed by gaps larger than 2x the expected
/// sampling interval (median inter-sample interval).
fn gap_fraction(samples: &[ContainerSample]) -> f64 {
    if samples.len() < 3 {
        return 0.0;
    }
    let mut timestamps: Vec<DateTime<Utc>> = samples.iter().map(|s| s.timestamp).collect();
    timestamps.sort();

    let intervals: Vec<f64> = timestamps
        .windows(2)
        .map(|w| (w[1] - w[0]).num_seconds() as f64)
        .collect();

    let expected = mean(&intervals);
    if expected <= 0.0 {
        return 0.0;
    }

    let total_span = (*timestamps.last().unwrap() - *timestamps.first().unwrap()).num_seconds() as f64;
    if total_span <= 0.0 {
        return 0.0;
    }

    let gap_time: f64 = intervals.iter().filter(|&&i| i > 2.0 * expected).sum();
    (gap_time / total_span).clamp(0.0, 1.0)
}

/// Sort workloads with OOM history first, then by total OOM count
/// descending.
pub fn order_by_priority(mut recommendations: Vec<WorkloadRecommendation>) -> Vec<WorkloadRecommendation> {
    recommendations.sort_by(|a, b| {
        b.has_oom_history()
            .cmp(&a.has_oom_history())
            .then(b.total_oom_count().cmp(&a.total_oom_count()))
    });
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConfidenceBreakdown, WorkloadKind};

    fn sample(workload: &WorkloadId, cpu: f64, memory: f64, ts: DateTime<Utc>) -> ContainerSample {
        ContainerSample {
            workload: workload.clone(),
            container: "app".into(),
            timestamp: ts,
            usage_cpu_millicores: cpu,
            usage_memory_bytes: memory,
            request_cpu_millicores: 1000.0,
            request_memory_bytes: 512.0 * 1024.0 * 1024.0,
            limit_cpu_millicores: 0.0,
            limit_memory_bytes: 0.0,
        }
    }

    fn pricing() -> Price {
        Price {
            cpu_per_core_hour: 0.04,
            memory_per_gb_hour: 0.01,
        }
    }

    #[tokio::test]
    async fn s2_stable_low_usage_scales_down() {
        let store = SampleStore::new();
        let workload = WorkloadId::new("default", WorkloadKind::Deployment, "api");
        let base = Utc::now() - Duration::hours(3);

        for i in 0..360 {
            let ts = base + Duration::seconds(i * 30);
            let cpu = 200.0 + (i % 50) as f64;
            let memory = (120.0 + (i % 20) as f64) * 1024.0 * 1024.0;
            store.add(sample(&workload, cpu, memory, ts)).await;
        }

        let recommender = Recommender::new(store, pricing());
        let settings = RecommenderSettings::default();
        let clamps = ClampSettings::default();

        let recommendation = recommender
            .recommend(&workload, &settings, &clamps, &HashMap::new(), &HashMap::new())
            .await
            .unwrap();

        let container = &recommendation.containers[0];
        assert!(container.recommended_cpu < container.current_cpu);
        assert!(container.recommended_memory < container.current_memory);
    }

    #[tokio::test]
    async fn below_min_samples_is_skipped() {
        let store = SampleStore::new();
        let workload = WorkloadId::new("default", WorkloadKind::Deployment, "api");
        store.add(sample(&workload, 100.0, 100.0, Utc::now())).await;

        let recommender = Recommender::new(store, pricing());
        let settings = RecommenderSettings::default();
        let clamps = ClampSettings::default();

        let recommendation = recommender
            .recommend(&workload, &settings, &clamps, &HashMap::new(), &HashMap::new())
            .await;
        assert!(recommendation.is_none());
    }

    #[tokio::test]
    async fn oom_history_boosts_memory_and_floors_at_current() {
        let store = SampleStore::new();
        let workload = WorkloadId::new("default", WorkloadKind::Deployment, "api");
        let base = Utc::now() - Duration::hours(2);
        for i in 0..20 {
            store
                .add(sample(&workload, 500.0, 400.0 * 1024.0 * 1024.0, base + Duration::minutes(i)))
                .await;
        }

        let mut oom_counts = HashMap::new();
        oom_counts.insert("app".to_string(), 6);

        let recommender = Recommender::new(store, pricing());
        let settings = RecommenderSettings::default();
        let clamps = ClampSettings::default();

        let recommendation = recommender
            .recommend(&workload, &settings, &clamps, &oom_counts, &HashMap::new())
            .await
            .unwrap();

        let container = &recommendation.containers[0];
        assert!(container.upholds_oom_floor());
        assert_eq!(container.oom_priority, OomPriority::High);
    }

    #[tokio::test]
    async fn clamps_are_respected() {
        let store = SampleStore::new();
        let workload = WorkloadId::new("default", WorkloadKind::Deployment, "api");
        let base = Utc::now() - Duration::hours(2);
        for i in 0..20 {
            store
                .add(sample(&workload, 5000.0, 2000.0 * 1024.0 * 1024.0, base + Duration::minutes(i)))
                .await;
        }

        let recommender = Recommender::new(store, pricing());
        let settings = RecommenderSettings::default();
        let clamps = ClampSettings {
            cpu: Clamp { min: None, max: Some(2000.0) },
            memory: Clamp::default(),
        };

        let recommendation = recommender
            .recommend(&workload, &settings, &clamps, &HashMap::new(), &HashMap::new())
            .await
            .unwrap();

        assert!(recommendation.containers[0].recommended_cpu <= 2000.0);
    }

    fn container_with_oom(count: u32) -> ContainerRecommendation {
        ContainerRecommendation {
            container_name: "app".into(),
            current_cpu: 500.0,
            current_memory: 256.0 * 1024.0 * 1024.0,
            recommended_cpu: 500.0,
            recommended_memory: 256.0 * 1024.0 * 1024.0,
            sample_count: 100,
            cpu_percentile: 95.0,
            memory_percentile: 95.0,
            confidence: 80.0,
            confidence_breakdown: ConfidenceBreakdown {
                duration: 80.0,
                samples: 80.0,
                consistency: 80.0,
                recency: 80.0,
                coverage: 80.0,
            },
            estimated_savings: 0.0,
            oom_flag: count > 0,
            oom_count: count,
            oom_boost_factor: 1.0,
            oom_priority: if count > 0 { OomPriority::Critical } else { OomPriority::None },
        }
    }

    #[test]
    fn ordering_prefers_oom_history_then_count() {
        let w1 = WorkloadRecommendation {
            workload: WorkloadId::new("default", WorkloadKind::Deployment, "no-oom"),
            containers: vec![container_with_oom(0)],
            generated_at: Utc::now(),
            expires_at: Utc::now(),
            aggregate_savings: 0.0,
            aggregate_oom_priority: OomPriority::None,
        };
        let w2 = WorkloadRecommendation {
            workload: WorkloadId::new("default", WorkloadKind::Deployment, "with-oom"),
            containers: vec![container_with_oom(3)],
            generated_at: Utc::now(),
            expires_at: Utc::now(),
            aggregate_savings: 0.0,
            aggregate_oom_priority: OomPriority::Critical,
        };

        let ordered = order_by_priority(vec![w1, w2]);
        assert_eq!(ordered[0].workload.name, "with-oom");
    }

    #[test]
    fn ordering_breaks_ties_by_oom_count() {
        let fewer = WorkloadRecommendation {
            workload: WorkloadId::new("default", WorkloadKind::Deployment, "fewer-ooms"),
            containers: vec![container_with_oom(1)],
            generated_at: Utc::now(),
            expires_at: Utc::now(),
            aggregate_savings: 0.0,
            aggregate_oom_priority: OomPriority::Low,
        };
        let more = WorkloadRecommendation {
            workload: WorkloadId::new("default", WorkloadKind::Deployment, "more-ooms"),
            containers: vec![container_with_oom(5)],
            generated_at: Utc::now(),
            expires_at: Utc::now(),
            aggregate_savings: 0.0,
            aggregate_oom_priority: OomPriority::Critical,
        };

        let ordered = order_by_priority(vec![fewer, more]);
        assert_eq!(ordered[0].workload.name, "more-ooms");
    }

    #[test]
    fn strategy_aggressive_lowers_percentile_and_margin() {
        let settings = RecommenderSettings {
            strategy: Strategy::Aggressive,
            ..RecommenderSettings::default()
        };
        let (cpu, memory, margin) = settings.adjusted();
        assert_eq!(cpu, 85.0);
        assert_eq!(memory, 90.0);
        assert!((margin - 1.1).abs() < 1e-9);
    }
}
