//! # Percentile & Confidence Kernel
//!
//! Pure, allocation-light statistical primitives shared by the recommender,
//! leak detector, and predictor. Nothing here holds a lock or awaits: every
//! function operates on an owned copy of its input.
//!
//! ## Example
//!
//! ```
//! use resource_optimizer::stats::percentile;
//!
//! let values = vec![10.0, 20.0, 30.0, 40.0, 50.0];
//! assert_eq!(percentile(&values, 50.0), 30.0);
//! ```

use crate::types::{ConfidenceBreakdown, ConfidenceLevel};

/// Default weighted-sum coefficients for confidence scoring.
pub const WEIGHT_DURATION: f64 = 0.25;
pub const WEIGHT_SAMPLES: f64 = 0.25;
pub const WEIGHT_CONSISTENCY: f64 = 0.20;
pub const WEIGHT_RECENCY: f64 = 0.15;
pub const WEIGHT_COVERAGE: f64 = 0.15;

const MIN_HOURS: f64 = 1.0;
const IDEAL_HOURS: f64 = 168.0;
const MIN_SAMPLES: f64 = 10.0;
const IDEAL_SAMPLES: f64 = 500.0;
const CV_FLOOR: f64 = 0.1;
const CV_MAX: f64 = 0.5;
const RECENCY_MAX_HOURS: f64 = 1.0;
const RECENCY_FLOOR_HOURS: f64 = 24.0;
const COVERAGE_GOOD_PCT: f64 = 5.0;
const COVERAGE_BAD_PCT: f64 = 50.0;

/// Nearest-rank percentile over a sorted *copy* of `values`.
///
/// `rank = round(n * p / 100)`, clamped to `[1, n]`. Does not mutate the
/// caller's slice (testable property 2).
///
/// # Panics
///
/// Never panics; returns `0.0` for an empty slice.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = sorted.len() as f64;
    let rank = (n * p / 100.0).round().clamp(1.0, n) as usize;
    sorted[rank - 1]
}

/// Arithmetic mean. `0.0` for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation. `0.0` for fewer than two samples.
pub fn stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Coefficient of variation (σ/μ). `0.0` when μ is `0.0` (callers treat
/// this as the neutral, maximally-stable case).
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    let m = mean(values);
    if m == 0.0 {
        return 0.0;
    }
    stddev(values) / m
}

/// Simple linear regression `y = a + b*x` via ordinary least squares.
///
/// Returns `(intercept, slope, r_squared)`. `r_squared` is clamped to
/// `[0,1]`. Returns `(0.0, 0.0, 0.0)` for fewer than two points or when
/// all `x` values coincide.
pub fn linear_regression(points: &[(f64, f64)]) -> (f64, f64, f64) {
    let n = points.len() as f64;
    if points.len() < 2 {
        return (0.0, 0.0, 0.0);
    }

    let x_mean = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let y_mean = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut num = 0.0;
    let mut den = 0.0;
    for (x, y) in points {
        num += (x - x_mean) * (y - y_mean);
        den += (x - x_mean).powi(2);
    }

    if den == 0.0 {
        return (y_mean, 0.0, 0.0);
    }

    let slope = num / den;
    let intercept = y_mean - slope * x_mean;

    let ss_tot: f64 = points.iter().map(|(_, y)| (y - y_mean).powi(2)).sum();
    let ss_res: f64 = points
        .iter()
        .map(|(x, y)| {
            let predicted = intercept + slope * x;
            (y - predicted).powi(2)
        })
        .sum();

    let r_squared = if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    };

    (intercept, slope, r_squared.clamp(0.0, 1.0))
}

/// Inputs to the confidence kernel, already reduced to scalars by the
/// caller (recommender) from a window of samples.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceInputs {
    /// Hours of observed span (newest - oldest sample).
    pub span_hours: f64,
    /// Number of samples in the window.
    pub sample_count: usize,
    /// Coefficient of variation of the sized metric.
    pub coefficient_of_variation: f64,
    /// Hours since the newest sample.
    pub newest_age_hours: f64,
    /// Fraction (0.0-1.0) of total span consumed by gaps larger than 2x
    /// the expected sampling interval.
    pub gap_fraction: f64,
}

fn log_ramp(value: f64, min: f64, ideal: f64) -> f64 {
    if value <= 0.0 {
        return 0.0;
    }
    if value < min {
        // Linear ramp toward zero below the minimum.
        return (value / min * 20.0).clamp(0.0, 20.0);
    }
    if value >= ideal {
        return 100.0;
    }
    let ratio = (value / min).ln() / (ideal / min).ln();
    (ratio * 100.0).clamp(0.0, 100.0)
}

fn consistency_score(cv: f64) -> f64 {
    if cv <= CV_FLOOR {
        100.0
    } else if cv >= CV_MAX {
        20.0
    } else {
        let t = (cv - CV_FLOOR) / (CV_MAX - CV_FLOOR);
        100.0 - t * 80.0
    }
}

fn recency_score(age_hours: f64) -> f64 {
    if age_hours <= RECENCY_MAX_HOURS {
        100.0
    } else if age_hours >= RECENCY_FLOOR_HOURS {
        20.0
    } else {
        let t = (age_hours - RECENCY_MAX_HOURS) / (RECENCY_FLOOR_HOURS - RECENCY_MAX_HOURS);
        100.0 - t * 80.0
    }
}

fn coverage_score(gap_fraction: f64) -> f64 {
    let gap_pct = gap_fraction * 100.0;
    if gap_pct <= COVERAGE_GOOD_PCT {
        100.0
    } else if gap_pct >= COVERAGE_BAD_PCT {
        20.0
    } else {
        let t = (gap_pct - COVERAGE_GOOD_PCT) / (COVERAGE_BAD_PCT - COVERAGE_GOOD_PCT);
        100.0 - t * 80.0
    }
}

/// Compute the weighted confidence breakdown and overall score from raw
/// inputs. The overall score is always in `[0,100]`, including for
/// degenerate (empty, single-sample, constant) inputs (testable
/// property 3).
pub fn confidence(inputs: ConfidenceInputs) -> (ConfidenceBreakdown, f64) {
    let duration = log_ramp(inputs.span_hours, MIN_HOURS, IDEAL_HOURS);
    let samples = log_ramp(inputs.sample_count as f64, MIN_SAMPLES, IDEAL_SAMPLES);
    // μ = 0 (encoded upstream as cv = 0.0 from coefficient_of_variation)
    // yields the neutral midpoint, not the "perfectly consistent" 100.
    let consistency = if inputs.sample_count < 2 {
        50.0
    } else {
        consistency_score(inputs.coefficient_of_variation)
    };
    let recency = recency_score(inputs.newest_age_hours);
    let coverage = coverage_score(inputs.gap_fraction);

    let breakdown = ConfidenceBreakdown {
        duration,
        samples,
        consistency,
        recency,
        coverage,
    };

    let score = (duration * WEIGHT_DURATION
        + samples * WEIGHT_SAMPLES
        + consistency * WEIGHT_CONSISTENCY
        + recency * WEIGHT_RECENCY
        + coverage * WEIGHT_COVERAGE)
        .clamp(0.0, 100.0);

    (breakdown, score)
}

/// Map a numeric confidence score to its categorical level, at thresholds
/// 20/40/60/80.
pub fn confidence_level(score: f64) -> ConfidenceLevel {
    if score < 20.0 {
        ConfidenceLevel::VeryLow
    } else if score < 40.0 {
        ConfidenceLevel::Low
    } else if score < 60.0 {
        ConfidenceLevel::Moderate
    } else if score < 80.0 {
        ConfidenceLevel::High
    } else {
        ConfidenceLevel::VeryHigh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_nearest_rank() {
        let values = vec![10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(percentile(&values, 50.0), 30.0);
        assert_eq!(percentile(&values, 95.0), 50.0);
        assert_eq!(percentile(&values, 1.0), 10.0);
    }

    #[test]
    fn percentile_does_not_mutate_input() {
        let values = vec![50.0, 10.0, 30.0];
        let copy = values.clone();
        let _ = percentile(&values, 50.0);
        assert_eq!(values, copy);
    }

    #[test]
    fn percentile_monotonic_in_p() {
        let values = vec![5.0, 1.0, 9.0, 3.0, 7.0, 2.0, 8.0];
        let p50 = percentile(&values, 50.0);
        let p95 = percentile(&values, 95.0);
        assert!(p50 <= p95);
    }

    #[test]
    fn percentile_empty_is_zero() {
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn confidence_bounds_on_empty() {
        let inputs = ConfidenceInputs {
            span_hours: 0.0,
            sample_count: 0,
            coefficient_of_variation: 0.0,
            newest_age_hours: 1000.0,
            gap_fraction: 1.0,
        };
        let (_, score) = confidence(inputs);
        assert!((0.0..=100.0).contains(&score));
    }

    #[test]
    fn confidence_bounds_on_ideal() {
        let inputs = ConfidenceInputs {
            span_hours: 1000.0,
            sample_count: 10_000,
            coefficient_of_variation: 0.0,
            newest_age_hours: 0.0,
            gap_fraction: 0.0,
        };
        let (_, score) = confidence(inputs);
        assert!((0.0..=100.0).contains(&score));
        assert!(score > 90.0);
    }

    #[test]
    fn linear_regression_recovers_known_line() {
        let points: Vec<(f64, f64)> = (0..10).map(|i| (i as f64, 2.0 * i as f64 + 3.0)).collect();
        let (intercept, slope, r2) = linear_regression(&points);
        assert!((intercept - 3.0).abs() < 1e-6);
        assert!((slope - 2.0).abs() < 1e-6);
        assert!((r2 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn confidence_level_thresholds() {
        assert_eq!(confidence_level(0.0), ConfidenceLevel::VeryLow);
        assert_eq!(confidence_level(19.9), ConfidenceLevel::VeryLow);
        assert_eq!(confidence_level(20.0), ConfidenceLevel::Low);
        assert_eq!(confidence_level(59.9), ConfidenceLevel::Moderate);
        assert_eq!(confidence_level(80.0), ConfidenceLevel::VeryHigh);
    }

    proptest::proptest! {
        #[test]
        fn prop_percentile_monotonic(mut values in proptest::collection::vec(-1e6f64..1e6, 1..200), p1 in 1.0f64..100.0, p2 in 1.0f64..100.0) {
            values.retain(|v| v.is_finite());
            if values.is_empty() {
                return Ok(());
            }
            let (lo, hi) = if p1 <= p2 { (p1, p2) } else { (p2, p1) };
            let before = values.clone();
            let v_lo = percentile(&values, lo);
            let v_hi = percentile(&values, hi);
            prop_assert!(v_lo <= v_hi + 1e-9);
            prop_assert_eq!(values, before);
        }

        #[test]
        fn prop_confidence_always_bounded(
            span in 0.0f64..10_000.0,
            n in 0usize..5000,
            cv in 0.0f64..10.0,
            age in 0.0f64..10_000.0,
            gap in 0.0f64..1.0,
        ) {
            let (_, score) = confidence(ConfidenceInputs {
                span_hours: span,
                sample_count: n,
                coefficient_of_variation: cv,
                newest_age_hours: age,
                gap_fraction: gap,
            });
            prop_assert!((0.0..=100.0).contains(&score));
        }
    }
}
