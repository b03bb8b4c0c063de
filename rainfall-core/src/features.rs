//! Derived columns: cyclical time encodings, lags, rolling sums and location.

use chrono::{Datelike, Timelike};
use std::f64::consts::PI;

use crate::{
    error::ForecastError,
    model::{FeatureMatrix, GeoPoint, Granularity, RawObservation},
    schema::{PipelineSpec, daily},
};

const ROLLING_WINDOW: usize = 7;

/// Build the feature matrix for an aligned observation.
///
/// Lag and rolling columns are computed in row order over the aligned series,
/// padded rows included.
pub fn engineer(
    spec: &PipelineSpec,
    observation: &RawObservation,
    point: GeoPoint,
) -> Result<FeatureMatrix, ForecastError> {
    if observation.fields.len() != spec.raw_fields.len()
        || observation.records.iter().any(|r| r.values.len() != spec.raw_fields.len())
    {
        return Err(ForecastError::ShapeMismatch {
            stage: "features",
            expected_rows: observation.len(),
            expected_cols: spec.raw_fields.len(),
            rows: observation.len(),
            cols: observation.fields.len(),
        });
    }

    let rows = match spec.granularity {
        Granularity::Hour => hourly_rows(observation),
        Granularity::Day => daily_rows(observation, point),
    };

    let matrix = FeatureMatrix { columns: spec.feature_columns, rows };
    if !matrix.is_rectangular() {
        let cols = matrix.rows.first().map_or(0, Vec::len);
        return Err(ForecastError::ShapeMismatch {
            stage: "features",
            expected_rows: matrix.rows.len(),
            expected_cols: spec.width(),
            rows: matrix.rows.len(),
            cols,
        });
    }
    Ok(matrix)
}

/// `(sin, cos)` of `value` on a cycle of length `period`.
fn cyclical(value: f64, period: f64) -> (f64, f64) {
    let angle = 2.0 * PI * value / period;
    (angle.sin(), angle.cos())
}

fn hourly_rows(observation: &RawObservation) -> Vec<Vec<f64>> {
    observation
        .records
        .iter()
        .map(|record| {
            let hour = f64::from(record.time.hour());
            let month = f64::from(record.time.month());
            let (hour_sin, hour_cos) = cyclical(hour, 24.0);
            let (month_sin, month_cos) = cyclical(month, 12.0);

            let mut row = record.values.clone();
            row.extend([hour, month, hour_sin, hour_cos, month_sin, month_cos]);
            row
        })
        .collect()
}

fn daily_rows(observation: &RawObservation, point: GeoPoint) -> Vec<Vec<f64>> {
    let precip: Vec<f64> = observation.records.iter().map(|r| r.values[daily::PRECIPITATION]).collect();
    let temp_mean: Vec<f64> = observation.records.iter().map(|r| r.values[daily::TEMP_MEAN]).collect();

    observation
        .records
        .iter()
        .enumerate()
        .map(|(t, record)| {
            let v = &record.values;
            let month = f64::from(record.time.month());
            let (month_sin, month_cos) = cyclical(month, 12.0);

            let precip_lag_1 = lag(&precip, t, 1).unwrap_or(0.0);
            let precip_lag_3 = lag(&precip, t, 3).unwrap_or(0.0);
            let temp_mean_lag_1 = lag(&temp_mean, t, 1).unwrap_or(temp_mean[0]);

            let from = (t + 1).saturating_sub(ROLLING_WINDOW);
            let recent = &precip[from..=t];
            let precip_roll7 = recent.iter().sum::<f64>() / recent.len() as f64;

            vec![
                v[daily::TEMP_MEAN],
                v[daily::TEMP_MAX],
                v[daily::TEMP_MIN],
                v[daily::HUMIDITY],
                v[daily::PRESSURE],
                v[daily::WIND_SPEED],
                v[daily::WIND_DIRECTION],
                v[daily::CLOUD_COVER],
                v[daily::DEW_POINT],
                month,
                month_sin,
                month_cos,
                precip_lag_1,
                precip_lag_3,
                temp_mean_lag_1,
                precip_roll7,
                point.latitude(),
                point.longitude(),
            ]
        })
        .collect()
}

fn lag(series: &[f64], t: usize, by: usize) -> Option<f64> {
    t.checked_sub(by).map(|i| series[i])
}
