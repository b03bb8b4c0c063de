use chrono::{Duration, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::ForecastError;

/// A validated coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ForecastError> {
        let lat_ok = (-90.0..=90.0).contains(&latitude);
        let lon_ok = (-180.0..=180.0).contains(&longitude);
        if !lat_ok || !lon_ok {
            return Err(ForecastError::InvalidCoordinates { latitude, longitude });
        }
        Ok(Self { latitude, longitude })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    Day,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hour => "hourly",
            Granularity::Day => "daily",
        }
    }

    /// One step of the series.
    pub fn unit(&self) -> Duration {
        match self {
            Granularity::Hour => Duration::hours(1),
            Granularity::Day => Duration::days(1),
        }
    }

    /// Truncate a timestamp to the start of its hour or day.
    pub fn floor(&self, ts: NaiveDateTime) -> NaiveDateTime {
        match self {
            Granularity::Hour => ts.date().and_time(
                chrono::NaiveTime::from_hms_opt(ts.hour(), 0, 0).unwrap_or_default(),
            ),
            Granularity::Day => ts.date().and_time(chrono::NaiveTime::MIN),
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Absolute window a request covers, in the location's local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub granularity: Granularity,
    pub length: usize,
}

/// One provider record: a timestamp and the raw field values in the order of
/// the pipeline's `raw_fields`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawRecord {
    pub time: NaiveDateTime,
    pub values: Vec<f64>,
}

/// Raw series as returned by a weather source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawObservation {
    pub granularity: Granularity,
    pub fields: &'static [&'static str],
    pub records: Vec<RawRecord>,
}

impl RawObservation {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Value of a named field in the most recent record.
    pub fn latest(&self, field: &str) -> Option<f64> {
        let idx = self.fields.iter().position(|f| *f == field)?;
        self.records.last().and_then(|r| r.values.get(idx).copied())
    }
}

/// Fixed-shape model input. Rows are timesteps, columns follow `columns`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureMatrix {
    pub columns: &'static [&'static str],
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    /// `(rows, columns)`
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.columns.len())
    }

    /// Every row has exactly one value per column.
    pub fn is_rectangular(&self) -> bool {
        self.rows.iter().all(|r| r.len() == self.columns.len())
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.columns.iter().position(|c| *c == name)?;
        Some(self.rows.iter().map(|r| r[idx]).collect())
    }
}

/// Model output converted back to rainfall units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// mm per hour (hourly) or mm per day (daily).
    pub rain_amount: f64,
    pub log_value: f64,
    /// Heuristic percentage in [0, 100].
    pub chance_of_rain: f64,
}

impl PredictionResult {
    /// Display precision: amounts to 3 decimals, chance to 1.
    pub fn rounded(&self) -> Self {
        Self {
            rain_amount: round_to(self.rain_amount, 3),
            log_value: round_to(self.log_value, 3),
            chance_of_rain: round_to(self.chance_of_rain, 1),
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
