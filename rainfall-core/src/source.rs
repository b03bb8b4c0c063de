use async_trait::async_trait;
use std::fmt::Debug;

use crate::{error::ForecastError, model::RawObservation, window::SourceRequest};

pub mod openmeteo;

pub use openmeteo::OpenMeteoSource;

/// Upstream provider of raw observation series.
///
/// One call per request, no retries: transport and status failures surface as
/// [`ForecastError::Fetch`], shape problems as the schema family.
#[async_trait]
pub trait WeatherSource: Send + Sync + Debug {
    async fn fetch(&self, request: &SourceRequest) -> Result<RawObservation, ForecastError>;
}
