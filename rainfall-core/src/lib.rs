//! Core library for the `rainfall` CLI.
//!
//! This crate turns irregular weather observations into the fixed-shape,
//! normalized sequences two pre-trained rainfall models expect, and runs
//! them:
//! - Time window resolution and archive/forecast source choice
//! - Open-Meteo fetching and response validation
//! - Window alignment, feature engineering and normalization
//! - Model selection, scoring and result interpretation
//!
//! It is used by `rainfall-cli`, but can also be embedded in a service: build
//! one [`Forecaster`] at startup and share it across requests.

pub mod align;
pub mod config;
pub mod error;
pub mod features;
pub mod interpret;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod predictor;
pub mod schema;
pub mod source;
pub mod window;

pub use config::Config;
pub use error::ForecastError;
pub use model::{FeatureMatrix, GeoPoint, Granularity, PredictionResult, RawObservation, TimeWindow};
pub use pipeline::{Forecast, ForecastRequest, Forecaster, Horizon, PreparedSequence};
pub use predictor::{LinearCheckpoint, Predictors, SequenceScorer};
pub use source::{OpenMeteoSource, WeatherSource};
pub use window::{SourceKind, TimezoneResolver, TzfResolver, WindowRequest};
