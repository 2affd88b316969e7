//! # Time-Pattern Analyzer
//!
//! Buckets samples by hour-of-day and classifies the workload's diurnal
//! shape: aggregate into a fixed 24-bucket layout, then classify the
//! shape from the bucket means.

use crate::stats::{coefficient_of_variation, mean, stddev};
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Minimum number of samples required before a pattern can be classified:
/// two days of hourly samples, enough to populate every hour-of-day bucket
/// at least once.
const MIN_SAMPLES: usize = 48;
/// A bucket's mean must exceed the 24h mean by this fraction to count as
/// significant.
const PATTERN_SIGNIFICANCE_PCT: f64 = 20.0;
/// Overall coefficient of variation below which, absent a dominant bucket,
/// usage counts as flat rather than merely unclassified.
const STABLE_CV_THRESHOLD: f64 = 0.15;

/// One observation of resource usage at a point in time.
#[derive(Debug, Clone, Copy)]
pub struct TimedSample {
    /// When the sample was taken (used for hour-of-day and weekday).
    pub timestamp: DateTime<Utc>,
    /// Usage value (millicores or bytes; caller picks the unit).
    pub value: f64,
}

/// Aggregate statistics for a single hour-of-day bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourBucket {
    /// Hour of day, UTC, `0..24`.
    pub hour: u32,
    /// Mean usage within the bucket.
    pub mean: f64,
    /// Standard deviation within the bucket.
    pub stddev: f64,
    /// Number of samples contributing to the bucket.
    pub count: usize,
}

/// Diurnal/weekly shape classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternType {
    /// Usage is materially higher during conventional business hours
    /// (09:00-17:00 UTC) on weekdays.
    BusinessHours,
    /// Usage is materially higher overnight (00:00-06:00).
    NightBatch,
    /// Usage is materially higher on weekdays than weekends, without a
    /// strong hour-of-day signal.
    Weekday,
    /// No bucket deviates from the mean by more than the significance
    /// threshold.
    Stable,
    /// Not enough samples to classify.
    Unknown,
}

/// Recommended schedule-based adjustment for a classified pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRecommendation {
    /// Cron expression (5-field, UTC) marking the start of the peak window.
    pub peak_cron: String,
    /// CPU multiplier to apply outside the peak window.
    pub off_peak_cpu_multiplier: f64,
    /// Memory multiplier to apply outside the peak window.
    pub off_peak_memory_multiplier: f64,
    /// Estimated percent cost reduction from applying off-peak multipliers.
    pub estimated_savings_percent: f64,
}

/// Result of classifying a time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternReport {
    /// Classified shape.
    pub pattern_type: PatternType,
    /// Whether a statistically significant pattern was found.
    pub has_pattern: bool,
    /// Per-hour aggregate statistics.
    pub hourly: Vec<HourBucket>,
    /// Suggested schedule override, when a clear pattern was found.
    pub schedule: Option<ScheduleRecommendation>,
}

impl PatternReport {
    fn unknown() -> Self {
        Self {
            pattern_type: PatternType::Unknown,
            has_pattern: false,
            hourly: Vec::new(),
            schedule: None,
        }
    }
}

/// Classify the diurnal/weekly shape of a time series.
pub fn analyze(samples: &[TimedSample]) -> PatternReport {
    if samples.len() < MIN_SAMPLES {
        return PatternReport::unknown();
    }

    let overall_mean = mean(&samples.iter().map(|s| s.value).collect::<Vec<_>>());

    let mut hourly_values: Vec<Vec<f64>> = vec![Vec::new(); 24];
    let mut weekday_values: Vec<Vec<f64>> = vec![Vec::new(); 7];

    for sample in samples {
        hourly_values[sample.timestamp.hour() as usize].push(sample.value);
        weekday_values[weekday_index(sample.timestamp.weekday())].push(sample.value);
    }

    let hourly: Vec<HourBucket> = hourly_values
        .iter()
        .enumerate()
        .map(|(hour, values)| HourBucket {
            hour: hour as u32,
            mean: mean(values),
            stddev: stddev(values),
            count: values.len(),
        })
        .collect();

    let business_hours_mean = mean_of_hours(&hourly, 9..17);
    let night_mean = mean_of_hours(&hourly, 0..6);
    let weekday_mean = mean(&weekday_values[0..5].iter().flatten().copied().collect::<Vec<_>>());
    let weekend_mean = mean(&weekday_values[5..7].iter().flatten().copied().collect::<Vec<_>>());

    let deviation = |bucket_mean: f64| -> f64 {
        if overall_mean == 0.0 {
            0.0
        } else {
            (bucket_mean - overall_mean) / overall_mean * 100.0
        }
    };

    let business_dev = deviation(business_hours_mean);
    let night_dev = deviation(night_mean);
    let weekday_dev = if weekend_mean == 0.0 {
        0.0
    } else {
        (weekday_mean - weekend_mean) / weekend_mean * 100.0
    };

    let candidates = [
        (PatternType::BusinessHours, business_dev),
        (PatternType::NightBatch, night_dev),
        (PatternType::Weekday, weekday_dev),
    ];

    let strongest = candidates
        .iter()
        .filter(|(_, dev)| *dev >= PATTERN_SIGNIFICANCE_PCT)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap());

    let (pattern_type, has_pattern) = match strongest {
        Some((kind, _)) => (*kind, true),
        None => {
            let overall_cv = coefficient_of_variation(&samples.iter().map(|s| s.value).collect::<Vec<_>>());
            if overall_cv < STABLE_CV_THRESHOLD {
                (PatternType::Stable, false)
            } else {
                (PatternType::Unknown, false)
            }
        }
    };

    let schedule = match pattern_type {
        PatternType::BusinessHours => Some(ScheduleRecommendation {
            peak_cron: "0 9 * * 1-5".to_string(),
            off_peak_cpu_multiplier: (night_mean / overall_mean.max(1e-9)).clamp(0.25, 1.0),
            off_peak_memory_multiplier: (night_mean / overall_mean.max(1e-9)).clamp(0.5, 1.0),
            estimated_savings_percent: estimated_savings(business_hours_mean, night_mean),
        }),
        PatternType::NightBatch => Some(ScheduleRecommendation {
            peak_cron: "0 0 * * *".to_string(),
            off_peak_cpu_multiplier: (business_hours_mean / overall_mean.max(1e-9)).clamp(0.25, 1.0),
            off_peak_memory_multiplier: (business_hours_mean / overall_mean.max(1e-9)).clamp(0.5, 1.0),
            estimated_savings_percent: estimated_savings(night_mean, business_hours_mean),
        }),
        PatternType::Weekday => Some(ScheduleRecommendation {
            peak_cron: "0 0 * * 1".to_string(),
            off_peak_cpu_multiplier: (weekend_mean / overall_mean.max(1e-9)).clamp(0.25, 1.0),
            off_peak_memory_multiplier: (weekend_mean / overall_mean.max(1e-9)).clamp(0.5, 1.0),
            estimated_savings_percent: estimated_savings(weekday_mean, weekend_mean),
        }),
        PatternType::Stable | PatternType::Unknown => None,
    };

    PatternReport {
        pattern_type,
        has_pattern,
        hourly,
        schedule,
    }
}

fn estimated_savings(peak_mean: f64, off_peak_mean: f64) -> f64 {
    if peak_mean == 0.0 {
        return 0.0;
    }
    ((peak_mean - off_peak_mean) / (2.0 * peak_mean) * 100.0).clamp(0.0, 100.0)
}

fn weekday_index(weekday: Weekday) -> usize {
    weekday.num_days_from_monday() as usize
}

fn mean_of_hours(hourly: &[HourBucket], hours: std::ops::Range<usize>) -> f64 {
    let values: Vec<f64> = hours.map(|h| hourly[h].mean).collect();
    mean(&values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn business_hours_series(weeks: i64) -> Vec<TimedSample> {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap(); // a Monday
        let mut samples = Vec::new();
        for day in 0..(weeks * 7) {
            for hour in 0..24 {
                let ts = t0 + Duration::days(day) + Duration::hours(hour);
                let value = if (9..17).contains(&hour) { 800.0 } else { 100.0 };
                samples.push(TimedSample { timestamp: ts, value });
            }
        }
        samples
    }

    #[test]
    fn too_few_samples_is_unknown() {
        let samples = business_hours_series(1)[0..10].to_vec();
        let report = analyze(&samples);
        assert_eq!(report.pattern_type, PatternType::Unknown);
        assert!(!report.has_pattern);
    }

    #[test]
    fn business_hours_pattern_detected() {
        let samples = business_hours_series(4);
        let report = analyze(&samples);
        assert_eq!(report.pattern_type, PatternType::BusinessHours);
        assert!(report.has_pattern);
        let schedule = report.schedule.unwrap();
        assert!(schedule.off_peak_cpu_multiplier < 1.0);
        assert!(schedule.estimated_savings_percent > 0.0);
    }

    #[test]
    fn stable_series_has_no_schedule() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap();
        let samples: Vec<TimedSample> = (0..(24 * 14))
            .map(|h| TimedSample {
                timestamp: t0 + Duration::hours(h),
                value: 500.0,
            })
            .collect();
        let report = analyze(&samples);
        assert_eq!(report.pattern_type, PatternType::Stable);
        assert!(!report.has_pattern);
        assert!(report.schedule.is_none());
    }

    #[test]
    fn noisy_series_with_no_dominant_bucket_is_unknown() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap();
        let samples: Vec<TimedSample> = (0..(24 * 14))
            .map(|h| {
                let value = if h % 2 == 0 { 100.0 } else { 900.0 };
                TimedSample {
                    timestamp: t0 + Duration::hours(h),
                    value,
                }
            })
            .collect();
        let report = analyze(&samples);
        assert_eq!(report.pattern_type, PatternType::Unknown);
        assert!(!report.has_pattern);
        assert!(report.schedule.is_none());
    }

    #[test]
    fn hourly_buckets_cover_all_24_hours() {
        let samples = business_hours_series(2);
        let report = analyze(&samples);
        assert_eq!(report.hourly.len(), 24);
        assert!(report.hourly.iter().all(|b| b.count > 0));
    }
}
