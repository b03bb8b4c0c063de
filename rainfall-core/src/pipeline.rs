//! End-to-end request flow: resolve, fetch, align, featurize, normalize,
//! score, interpret.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::{
    align::align,
    error::ForecastError,
    features::engineer,
    interpret::interpret,
    model::{FeatureMatrix, GeoPoint, Granularity, PredictionResult, RawObservation, TimeWindow},
    predictor::Predictors,
    schema::PipelineSpec,
    source::WeatherSource,
    window::{SourceKind, TimezoneResolver, WindowRequest, resolve_window},
};

/// Which model a request wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Horizon {
    /// Chosen from the hour offset: daily at 18 hours and beyond.
    Auto { offset_hours: i64 },
    /// Next-day prediction from the daily model only.
    Daily,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastRequest {
    pub point: GeoPoint,
    pub horizon: Horizon,
    /// Local wall-clock end of the window; defaults to "now" at the location.
    pub end: Option<NaiveDateTime>,
}

impl ForecastRequest {
    pub fn auto(point: GeoPoint, offset_hours: i64) -> Self {
        Self { point, horizon: Horizon::Auto { offset_hours }, end: None }
    }

    pub fn daily(point: GeoPoint) -> Self {
        Self { point, horizon: Horizon::Daily, end: None }
    }

    pub fn ending_at(mut self, end: NaiveDateTime) -> Self {
        self.end = Some(end);
        self
    }
}

/// Model input for one window, plus the aligned raw series it came from.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedSequence {
    pub window: TimeWindow,
    pub source: SourceKind,
    pub observation: RawObservation,
    /// Normalized `(length, columns)` matrix.
    pub sequence: FeatureMatrix,
}

#[derive(Debug, Clone, Serialize)]
pub struct Forecast {
    pub granularity: Granularity,
    #[serde(flatten)]
    pub prepared: PreparedSequence,
    pub prediction: PredictionResult,
}

/// Holds the process-wide, read-only collaborators. Build one at startup and
/// share it across requests; it holds no per-request state.
#[derive(Debug)]
pub struct Forecaster<S> {
    source: S,
    predictors: Predictors,
    timezones: Arc<dyn TimezoneResolver>,
}

impl<S: WeatherSource> Forecaster<S> {
    pub fn new(source: S, predictors: Predictors, timezones: Arc<dyn TimezoneResolver>) -> Self {
        Self { source, predictors, timezones }
    }

    pub fn predictors(&self) -> &Predictors {
        &self.predictors
    }

    pub async fn forecast(&self, request: &ForecastRequest) -> Result<Forecast, ForecastError> {
        self.forecast_at(request, Utc::now()).await
    }

    /// Run a request as if the current instant were `now`.
    ///
    /// The model is chosen, and its availability checked, before anything is
    /// fetched.
    pub async fn forecast_at(
        &self,
        request: &ForecastRequest,
        now: DateTime<Utc>,
    ) -> Result<Forecast, ForecastError> {
        let (adapter, offset_hours) = match request.horizon {
            Horizon::Auto { offset_hours } => (self.predictors.select(offset_hours)?, offset_hours),
            Horizon::Daily => (self.predictors.require(Granularity::Day)?, 0),
        };
        let spec = adapter.spec();

        let window_request = match spec.granularity {
            Granularity::Hour => WindowRequest::Hourly { offset_hours },
            Granularity::Day => WindowRequest::Daily { days: spec.window_length as i64 },
        };

        let prepared = self.prepare_at(request.point, window_request, request.end, now).await?;
        let log_value = adapter.predict(&prepared.sequence)?;
        let prediction = interpret(log_value, spec);

        log::info!(
            "{} prediction for ({}, {}): {:.3} (log {:.3}), chance {:.1}%",
            spec.granularity,
            request.point.latitude(),
            request.point.longitude(),
            prediction.rain_amount,
            prediction.log_value,
            prediction.chance_of_rain
        );

        Ok(Forecast { granularity: spec.granularity, prepared, prediction })
    }

    pub async fn prepare(
        &self,
        point: GeoPoint,
        request: WindowRequest,
        end: Option<NaiveDateTime>,
    ) -> Result<PreparedSequence, ForecastError> {
        self.prepare_at(point, request, end, Utc::now()).await
    }

    /// Fetch and shape the normalized sequence for a window, without scoring.
    pub async fn prepare_at(
        &self,
        point: GeoPoint,
        request: WindowRequest,
        end: Option<NaiveDateTime>,
        now: DateTime<Utc>,
    ) -> Result<PreparedSequence, ForecastError> {
        let resolved = resolve_window(point, request, end, now, self.timezones.as_ref())?;
        let spec = PipelineSpec::for_granularity(resolved.window.granularity);

        let raw = self.source.fetch(&resolved.source).await?;
        let observation = align(raw, &resolved.window)?;
        let features = engineer(spec, &observation, point)?;
        let sequence = spec.profile.apply(&features)?;

        Ok(PreparedSequence { window: resolved.window, source: resolved.source.kind, observation, sequence })
    }
}
