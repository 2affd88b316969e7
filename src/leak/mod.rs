//! # Leak Detector — Memory Growth Classification
//!
//! The leak detector examines a window of memory samples and decides
//! whether usage is growing the way a leak grows: a sustained, well-fit
//! linear trend that survives more than a couple of resets. One fixed
//! algorithm, not a pluggable rule set: regression slope, fit quality,
//! and reset count each contribute to a single severity verdict.

use crate::stats::linear_regression;
use crate::types::TrendDirection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

const MIN_SAMPLES: usize = 20;
const MIN_DURATION_HOURS: f64 = 1.0;
const RESET_THRESHOLD: f64 = 0.15;
const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

const LEAK_SLOPE_FLOOR_BYTES_PER_HOUR: f64 = BYTES_PER_MIB;
const LEAK_R2_FLOOR: f64 = 0.7;
const LEAK_MAX_RESETS: u32 = 2;
const LEAK_GROWTH_FLOOR_PCT: f64 = 10.0;

/// Severity of a detected leak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeakSeverity {
    /// No leak, or below the "low" threshold.
    Low,
    /// Moderate growth rate.
    Medium,
    /// High growth rate.
    High,
    /// Severe growth rate; workload may OOM soon.
    Critical,
}

impl LeakSeverity {
    /// `Critical|High|Medium` must block scaling; `Low` is a warning only.
    pub fn should_block_scaling(self) -> bool {
        !matches!(self, LeakSeverity::Low)
    }
}

/// One memory usage sample for leak analysis.
#[derive(Debug, Clone, Copy)]
pub struct MemorySample {
    /// When the sample was taken.
    pub timestamp: DateTime<Utc>,
    /// Memory usage, in bytes.
    pub bytes: f64,
}

/// Result of analyzing a window of memory samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeakReport {
    /// Whether the window is classified as a leak.
    pub is_leak: bool,
    /// Severity classification.
    pub severity: LeakSeverity,
    /// Regression slope, in bytes/hour.
    pub slope_bytes_per_hour: f64,
    /// Regression R², clamped to `[0,1]`.
    pub r_squared: f64,
    /// `(end - start) / start * 100`.
    pub growth_percent: f64,
    /// Number of resets observed (peak drops of >= 15%).
    pub reset_count: u32,
    /// Confidence in the classification, `[0,100]`.
    pub confidence: f64,
    /// Projected memory at +24h, if the slope were to continue.
    pub projection_24h: Option<f64>,
    /// Projected memory at +7d, if the slope were to continue.
    pub projection_7d: Option<f64>,
    /// Hours until a known memory limit would be reached, if any.
    pub time_to_limit_hours: Option<f64>,
    /// Human-readable summary.
    pub description: String,
    /// Trend direction (for narrative/telemetry use).
    pub trend: TrendDirection,
}

impl LeakReport {
    fn insufficient(description: impl Into<String>) -> Self {
        Self {
            is_leak: false,
            severity: LeakSeverity::Low,
            slope_bytes_per_hour: 0.0,
            r_squared: 0.0,
            growth_percent: 0.0,
            reset_count: 0,
            confidence: 0.0,
            projection_24h: None,
            projection_7d: None,
            time_to_limit_hours: None,
            description: description.into(),
            trend: TrendDirection::Stable,
        }
    }
}

/// Analyze a window of memory samples for leak behavior.
///
/// `samples` need not be sorted; this function sorts a local copy.
/// `memory_limit_bytes` is `Some` when the container has a known limit,
/// used to compute `time_to_limit_hours`.
#[instrument(skip(samples))]
pub fn analyze(samples: &[MemorySample], memory_limit_bytes: Option<f64>) -> LeakReport {
    if samples.len() < MIN_SAMPLES {
        return LeakReport::insufficient(format!(
            "insufficient samples: {} < {}",
            samples.len(),
            MIN_SAMPLES
        ));
    }

    let mut sorted: Vec<MemorySample> = samples.to_vec();
    sorted.sort_by_key(|s| s.timestamp);

    let span_hours = (sorted.last().unwrap().timestamp - sorted.first().unwrap().timestamp)
        .num_seconds() as f64
        / 3600.0;

    if span_hours < MIN_DURATION_HOURS {
        return LeakReport::insufficient(format!(
            "insufficient duration: {span_hours:.2}h < {MIN_DURATION_HOURS}h"
        ));
    }

    let t0 = sorted.first().unwrap().timestamp;
    let points: Vec<(f64, f64)> = sorted
        .iter()
        .map(|s| ((s.timestamp - t0).num_seconds() as f64 / 3600.0, s.bytes))
        .collect();

    let (_intercept, slope, r_squared) = linear_regression(&points);

    let start = sorted.first().unwrap().bytes;
    let end = sorted.last().unwrap().bytes;
    let growth_percent = if start == 0.0 {
        0.0
    } else {
        (end - start) / start * 100.0
    };

    let reset_count = count_resets(&sorted);

    let is_leak = slope > LEAK_SLOPE_FLOOR_BYTES_PER_HOUR
        && r_squared >= LEAK_R2_FLOOR
        && reset_count <= LEAK_MAX_RESETS
        && growth_percent >= LEAK_GROWTH_FLOOR_PCT;

    let growth_per_hour_pct = if span_hours > 0.0 {
        growth_percent / span_hours
    } else {
        0.0
    };

    let severity = classify_severity(slope, growth_per_hour_pct);

    let confidence = (30.0 * (sorted.len() as f64 / 100.0).min(1.0)
        + 50.0 * r_squared
        + 20.0 * (growth_percent / 50.0).clamp(0.0, 1.0))
    .clamp(0.0, 100.0);

    let projection_24h = Some(end + slope * 24.0);
    let projection_7d = Some(end + slope * 24.0 * 7.0);

    let time_to_limit_hours = memory_limit_bytes.and_then(|limit| {
        if slope > 0.0 {
            Some((limit - end) / slope)
        } else {
            None
        }
    });

    let trend = if slope > 0.01 {
        TrendDirection::Increasing
    } else if slope < -0.01 {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    };

    let description = if is_leak {
        format!(
            "memory growing at {:.1} MiB/h (R²={:.2}, growth={:.1}%, resets={})",
            slope / BYTES_PER_MIB,
            r_squared,
            growth_percent,
            reset_count
        )
    } else {
        "no sustained memory growth detected".to_string()
    };

    debug!(is_leak, ?severity, slope, r_squared, "leak analysis complete");

    LeakReport {
        is_leak,
        severity,
        slope_bytes_per_hour: slope,
        r_squared,
        growth_percent,
        reset_count,
        confidence,
        projection_24h,
        projection_7d,
        time_to_limit_hours,
        description,
        trend,
    }
}

fn count_resets(sorted: &[MemorySample]) -> u32 {
    let mut resets = 0u32;
    let mut peak = sorted[0].bytes;

    for sample in &sorted[1..] {
        if sample.bytes > peak {
            peak = sample.bytes;
        } else if peak > 0.0 && sample.bytes < peak * (1.0 - RESET_THRESHOLD) {
            resets += 1;
            peak = sample.bytes;
        }
    }

    resets
}

fn classify_severity(slope_bytes_per_hour: f64, growth_pct_per_hour: f64) -> LeakSeverity {
    let slope_mib_per_hour = slope_bytes_per_hour / BYTES_PER_MIB;

    if slope_mib_per_hour >= 100.0 || growth_pct_per_hour >= 10.0 {
        LeakSeverity::Critical
    } else if slope_mib_per_hour >= 50.0 || growth_pct_per_hour >= 5.0 {
        LeakSeverity::High
    } else if slope_mib_per_hour >= 10.0 || growth_pct_per_hour >= 2.0 {
        LeakSeverity::Medium
    } else {
        LeakSeverity::Low
    }
}
