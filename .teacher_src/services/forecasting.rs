//! Time series forecasting using augurs (MSTL + ETS).
//!
//! This module provides cost forecasting capabilities using proper time series
//! forecasting techniques rather than simple averages.
//!
//! # Algorithm
//!
//! - For data with >= 14 days: Uses MSTL (Multiple Seasonal-Trend decomposition)
//!   with weekly seasonality (period=7) combined with AutoETS for trend forecasting.
//!   This captures weekly patterns (weekday vs weekend usage differences).
//!
//! - For data with < 14 days: Falls back to simple AutoETS without seasonal decomposition.
//!
//! # Prediction Intervals
//!
//! All forecasts include 95% prediction intervals (configurable) to express uncertainty.
//! Wider intervals indicate higher uncertainty in the forecast.

use augurs::{
    ets::AutoETS,
    forecaster::{Forecaster, transforms::LinearInterpolator},
    mstl::MSTLModel,
};
use chrono::{Duration, NaiveDate};

use crate::models::{DailySpend, ForecastTimeSeries};

/// Minimum number of data points required for any forecasting
const MIN_DATA_POINTS: usize = 7;

/// Minimum data points for seasonal (MSTL) forecasting (need at least 2 full weeks)
const MIN_SEASONAL_DATA_POINTS: usize = 14;

/// Weekly seasonality period (7 days)
const WEEKLY_PERIOD: usize = 7;

/// Default forecast horizon (days)
pub const DEFAULT_FORECAST_DAYS: usize = 7;

/// Default confidence level for prediction intervals
const DEFAULT_CONFIDENCE_LEVEL: f64 = 0.95;

/// Error type for forecasting operations
#[derive(Debug, thiserror::Error)]
pub enum ForecastError {
    #[error("Insufficient data: need at least {MIN_DATA_POINTS} days, got {0}")]
    InsufficientData(usize),

    #[error("Forecast model error: {0}")]
    ModelError(String),

    #[error("Invalid forecast horizon: {0}")]
    InvalidHorizon(String),
}

/// Generate a time series forecast from daily spend data.
///
/// # Arguments
///
/// * `daily_spend` - Historical daily spend data (should be sorted by date)
/// * `forecast_days` - Number of days to forecast ahead
/// * `confidence_level` - Confidence level for prediction intervals (default: 0.95)
///
/// # Returns
///
/// A `ForecastTimeSeries` containing point forecasts and prediction intervals,
/// or `None` if there's insufficient data for forecasting.
pub fn generate_forecast(
    daily_spend: &[DailySpend],
    forecast_days: usize,
    confidence_level: Option<f64>,
) -> Result<Option<ForecastTimeSeries>, ForecastError> {
    if daily_spend.len() < MIN_DATA_POINTS {
        return Ok(None);
    }

    if forecast_days == 0 {
        return Err(ForecastError::InvalidHorizon(
            "forecast_days must be > 0".to_string(),
        ));
    }

    let confidence = confidence_level.unwrap_or(DEFAULT_CONFIDENCE_LEVEL);

    // Prepare time series data
    let (values, last_date) = prepare_time_series(daily_spend);

    // Choose forecasting strategy based on data length
    let use_seasonal = values.len() >= MIN_SEASONAL_DATA_POINTS;

    let forecast_result = if use_seasonal {
        forecast_with_mstl(&values, forecast_days, confidence)
    } else {
        forecast_with_ets(&values, forecast_days, confidence)
    };

    let forecast = forecast_result.map_err(|e| ForecastError::ModelError(e.to_string()))?;

    // Generate dates for forecast points
    let dates: Vec<NaiveDate> = (1..=forecast_days)
        .map(|i| last_date + Duration::days(i as i64))
        .collect();

    // Extract point forecasts and intervals
    let point_forecasts: Vec<f64> = forecast.point.iter().map(|v| v.max(0.0)).collect();

    let (lower_bounds, upper_bounds) = if let Some(ref intervals) = forecast.intervals {
        let lower: Vec<f64> = intervals.lower.iter().map(|v| v.max(0.0)).collect();
        let upper: Vec<f64> = intervals.upper.iter().map(|v| v.max(0.0)).collect();
        (lower, upper)
    } else {
        // Fallback: use point forecast +/- 20% if no intervals available
        let lower: Vec<f64> = point_forecasts.iter().map(|v| (v * 0.8).max(0.0)).collect();
        let upper: Vec<f64> = point_forecasts.iter().map(|v| v * 1.2).collect();
        (lower, upper)
    };

    Ok(Some(ForecastTimeSeries {
        dates,
        point_forecasts,
        lower_bounds,
        upper_bounds,
        confidence_level: confidence,
        used_seasonal_decomposition: use_seasonal,
    }))
}

/// Prepare time series data from daily spend records.
///
/// Fills in missing dates with zero spend and sorts by date.
/// Returns the values and the last date in the series.
fn prepare_time_series(daily_spend: &[DailySpend]) -> (Vec<f64>, NaiveDate) {
    if daily_spend.is_empty() {
        return (vec![], NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
    }

    // Sort by date
    let mut sorted: Vec<&DailySpend> = daily_spend.iter().collect();
    sorted.sort_by_key(|d| d.date);

    let first_date = sorted.first().unwrap().date;
    let last_date = sorted.last().unwrap().date;

    // Create a map for quick lookup
    let spend_map: std::collections::HashMap<NaiveDate, i64> = sorted
        .iter()
        .map(|d| (d.date, d.total_cost_microcents))
        .collect();

    // Fill in all dates (including missing ones with zero)
    let mut values = Vec::new();
    let mut current_date = first_date;
    while current_date <= last_date {
        let value = spend_map.get(&current_date).copied().unwrap_or(0);
        values.push(value as f64);
        current_date += Duration::days(1);
    }

    (values, last_date)
}

/// Forecast using MSTL (seasonal decomposition) with AutoETS trend model.
fn forecast_with_mstl(
    values: &[f64],
    horizon: usize,
    confidence: f64,
) -> Result<augurs::Forecast, Box<dyn std::error::Error + Send + Sync>> {
    // Use AutoETS as the trend model within MSTL
    let ets = AutoETS::non_seasonal().into_trend_model();

    // MSTL with weekly seasonality
    let mstl = MSTLModel::new(vec![WEEKLY_PERIOD], ets);

    // Use Forecaster with linear interpolation for any NaN values
    let transformers: Vec<Box<dyn augurs::forecaster::Transformer>> =
        vec![Box::new(LinearInterpolator::default())];
    let mut forecaster = Forecaster::new(mstl).with_transformers(transformers);

    forecaster
        .fit(values)
        .map_err(|e| format!("MSTL fit error: {e}"))?;

    forecaster
        .predict(horizon, confidence)
        .map_err(|e| format!("MSTL predict error: {e}").into())
}

/// Forecast using simple AutoETS (no seasonal decomposition).
fn forecast_with_ets(
    values: &[f64],
    horizon: usize,
    confidence: f64,
) -> Result<augurs::Forecast, Box<dyn std::error::Error + Send + Sync>> {
    // Non-seasonal ETS model
    let ets = AutoETS::non_seasonal();

    // Use Forecaster with linear interpolation for any NaN values
    let transformers: Vec<Box<dyn augurs::forecaster::Transformer>> =
        vec![Box::new(LinearInterpolator::default())];
    let mut forecaster = Forecaster::new(ets).with_transformers(transformers);

    forecaster
        .fit(values)
        .map_err(|e| format!("ETS fit error: {e}"))?;

    forecaster
        .predict(horizon, confidence)
        .map_err(|e| format!("ETS predict error: {e}").into())
}
