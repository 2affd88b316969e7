//! # Predictor — Holt-Winters Triple Exponential Smoothing
//!
//! Fits an additive Holt-Winters model to a workload's usage series and
//! forecasts its near-term peak. Trend direction is classified from the
//! sign of the fitted trend component, reusing the shared
//! [`TrendDirection`] type rather than a parallel one.

use crate::error::{Error, Result};
use crate::types::TrendDirection;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

const MIN_PERIODS_FOR_FIT: usize = 2;

/// Fitted Holt-Winters additive model state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoltWintersModel {
    /// Current level estimate.
    pub level: f64,
    /// Current trend estimate (per-step).
    pub trend: f64,
    /// Current seasonal indices, one per step of `period`.
    pub seasonal: Vec<f64>,
    /// Level smoothing factor, `(0,1)`.
    pub alpha: f64,
    /// Trend smoothing factor, `(0,1)`.
    pub beta: f64,
    /// Seasonal smoothing factor, `(0,1)`.
    pub gamma: f64,
    /// Season length, in samples.
    pub period: usize,
    /// Root-mean-square one-step-ahead fitting error.
    pub rmse: f64,
}

/// A forecast produced by a fitted model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    /// The highest predicted value within the forecast horizon.
    pub peak_value: f64,
    /// When, relative to the fit's last observation, the peak occurs.
    pub peak_at: DateTime<Utc>,
    /// Trend direction implied by the fitted trend component's sign.
    pub trend: TrendDirection,
    /// Root-mean-square one-step-ahead fitting error of the source model.
    pub rmse: f64,
}

impl HoltWintersModel {
    /// Fit an additive Holt-Winters model to `series`, sampled at a fixed
    /// `interval` starting at `start`, with seasonal `period` (in samples).
    ///
    /// Requires at least two full periods of data; otherwise returns
    /// [`Error::DataInsufficient`].
    pub fn fit(series: &[f64], period: usize) -> Result<Self> {
        if period == 0 || series.len() < period * MIN_PERIODS_FOR_FIT {
            return Err(Error::DataInsufficient(format!(
                "need at least {} samples for period {period}, got {}",
                period * MIN_PERIODS_FOR_FIT,
                series.len()
            )));
        }

        let alpha = 0.3;
        let beta = 0.1;
        let gamma = 0.2;

        let first_period: Vec<f64> = series[0..period].to_vec();
        let second_period: Vec<f64> = series[period..period * 2].to_vec();

        let level0 = mean(&first_period);
        let trend0 = (mean(&second_period) - mean(&first_period)) / period as f64;
        let mut seasonal: Vec<f64> = first_period.iter().map(|v| v - level0).collect();

        let mut level = level0;
        let mut trend = trend0;
        let mut squared_error_sum = 0.0;
        let mut fitted_count = 0usize;

        for (t, &value) in series.iter().enumerate() {
            let season_idx = t % period;
            let forecast = level + trend + seasonal[season_idx];
            let error = value - forecast;
            squared_error_sum += error * error;
            fitted_count += 1;

            let prev_level = level;
            level = alpha * (value - seasonal[season_idx]) + (1.0 - alpha) * (level + trend);
            trend = beta * (level - prev_level) + (1.0 - beta) * trend;
            seasonal[season_idx] = gamma * (value - level) + (1.0 - gamma) * seasonal[season_idx];
        }

        let rmse = if fitted_count > 0 {
            (squared_error_sum / fitted_count as f64).sqrt()
        } else {
            0.0
        };

        Ok(Self {
            level,
            trend,
            seasonal,
            alpha,
            beta,
            gamma,
            period,
            rmse,
        })
    }

    /// Forecast `horizon` steps ahead and report the predicted peak within
    /// that horizon, anchored to `last_timestamp` at `interval` spacing.
    pub fn forecast(
        &self,
        horizon: usize,
        last_timestamp: DateTime<Utc>,
        interval: Duration,
    ) -> Forecast {
        let mut peak_value = f64::MIN;
        let mut peak_step = 0usize;

        for step in 1..=horizon {
            let season_idx = step % self.period;
            let value = self.level + self.trend * step as f64 + self.seasonal[season_idx];
            if value > peak_value {
                peak_value = value;
                peak_step = step;
            }
        }

        if horizon == 0 {
            peak_value = self.level;
        }

        let trend = if self.trend > 1e-6 {
            TrendDirection::Increasing
        } else if self.trend < -1e-6 {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        };

        Forecast {
            peak_value,
            peak_at: last_timestamp + interval * peak_step as i32,
            trend,
            rmse: self.rmse,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seasonal_series(cycles: usize, period: usize, level: f64, trend: f64) -> Vec<f64> {
        (0..(cycles * period))
            .map(|t| {
                let seasonal = ((t % period) as f64 / period as f64 * std::f64::consts::TAU).sin() * 50.0;
                level + trend * t as f64 + seasonal
            })
            .collect()
    }

    #[test]
    fn fit_rejects_insufficient_data() {
        let series = vec![1.0, 2.0, 3.0];
        let result = HoltWintersModel::fit(&series, 24);
        assert!(matches!(result, Err(Error::DataInsufficient(_))));
    }

    #[test]
    fn fit_tracks_rising_trend() {
        let series = seasonal_series(6, 24, 100.0, 2.0);
        let model = HoltWintersModel::fit(&series, 24).unwrap();
        assert!(model.trend > 0.0);
        assert!(model.rmse < 100.0);
    }

    #[test]
    fn forecast_reports_increasing_trend_direction() {
        let series = seasonal_series(6, 24, 100.0, 5.0);
        let model = HoltWintersModel::fit(&series, 24).unwrap();
        let forecast = model.forecast(24, Utc::now(), Duration::hours(1));
        assert_eq!(forecast.trend, TrendDirection::Increasing);
        assert!(forecast.peak_value > model.level);
    }

    #[test]
    fn forecast_flat_series_is_stable() {
        let series = vec![100.0; 48];
        let model = HoltWintersModel::fit(&series, 24).unwrap();
        let forecast = model.forecast(12, Utc::now(), Duration::hours(1));
        assert_eq!(forecast.trend, TrendDirection::Stable);
    }
}
