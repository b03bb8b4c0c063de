use thiserror::Error;

use crate::model::Granularity;

/// Request-scoped failures of the forecast pipeline.
///
/// Every variant is fatal to the request it occurred in. Nothing is retried
/// internally; retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("Coordinates out of range: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinates { latitude: f64, longitude: f64 },

    #[error("Day count must be positive, got {0}")]
    InvalidDayCount(i64),

    #[error("Hour offset {0} is out of range")]
    InvalidOffset(i64),

    /// Transport or HTTP status failure talking to the weather provider.
    #[error("Open-Meteo API request failed: {0}")]
    Fetch(String),

    #[error("API response missing required field: {0}")]
    MissingField(String),

    #[error("Malformed API response: {0}")]
    Malformed(String),

    #[error(
        "Insufficient {granularity} weather data: expected at least {required} of {expected} rows, got {actual}"
    )]
    InsufficientData {
        granularity: Granularity,
        expected: usize,
        required: usize,
        actual: usize,
    },

    #[error("The {0} prediction model is not available")]
    ModelUnavailable(Granularity),

    /// Column or row count disagrees with the schema. Always a bug.
    #[error("Shape mismatch in {stage}: expected {expected_rows}x{expected_cols}, got {rows}x{cols}")]
    ShapeMismatch {
        stage: &'static str,
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Sequence scoring failed: {0}")]
    Scoring(String),
}

impl ForecastError {
    /// True for the schema family (missing field or malformed body).
    pub fn is_schema(&self) -> bool {
        matches!(self, ForecastError::MissingField(_) | ForecastError::Malformed(_))
    }
}
