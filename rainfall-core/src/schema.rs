//! Column schemas for the two pipelines.
//!
//! The hourly and daily pipelines run the same code, parameterized by a
//! [`PipelineSpec`]. Column orders here are what the checkpoints were trained
//! on; never reorder them without shipping a new profile and checkpoint.

use crate::{
    model::Granularity,
    normalize::{DAILY_PROFILE, HOURLY_PROFILE, NormalizationProfile},
};

#[derive(Debug)]
pub struct PipelineSpec {
    pub granularity: Granularity,
    /// Top-level key of the provider response (`hourly` / `daily`).
    pub series_key: &'static str,
    /// Provider fields, in the order they are stored in `RawRecord::values`.
    pub raw_fields: &'static [&'static str],
    pub feature_columns: &'static [&'static str],
    pub window_length: usize,
    pub profile: &'static NormalizationProfile,
    /// Linear factor turning predicted rainfall into a chance percentage.
    pub chance_scale: f64,
}

impl PipelineSpec {
    pub fn for_granularity(granularity: Granularity) -> &'static PipelineSpec {
        match granularity {
            Granularity::Hour => &HOURLY,
            Granularity::Day => &DAILY,
        }
    }

    pub fn width(&self) -> usize {
        self.feature_columns.len()
    }
}

pub mod daily {
    pub const TEMP_MEAN: usize = 0;
    pub const TEMP_MAX: usize = 1;
    pub const TEMP_MIN: usize = 2;
    pub const PRECIPITATION: usize = 3;
    pub const WIND_SPEED: usize = 4;
    pub const WIND_DIRECTION: usize = 5;
    pub const HUMIDITY: usize = 6;
    pub const PRESSURE: usize = 7;
    pub const CLOUD_COVER: usize = 8;
    pub const DEW_POINT: usize = 9;
}

pub static HOURLY: PipelineSpec = PipelineSpec {
    granularity: Granularity::Hour,
    series_key: "hourly",
    raw_fields: &[
        "temperature_2m",
        "relative_humidity_2m",
        "surface_pressure",
        "wind_speed_10m",
        "wind_direction_10m",
        "cloud_cover",
    ],
    feature_columns: &[
        "temperature_2m",
        "relative_humidity_2m",
        "surface_pressure",
        "wind_speed_10m",
        "wind_direction_10m",
        "cloud_cover",
        "hour",
        "month",
        "hour_sin",
        "hour_cos",
        "month_sin",
        "month_cos",
    ],
    window_length: 24,
    profile: &HOURLY_PROFILE,
    chance_scale: 20.0,
};

pub static DAILY: PipelineSpec = PipelineSpec {
    granularity: Granularity::Day,
    series_key: "daily",
    raw_fields: &[
        "temperature_2m_mean",
        "temperature_2m_max",
        "temperature_2m_min",
        "precipitation_sum",
        "wind_speed_10m_max",
        "wind_direction_10m_dominant",
        "relative_humidity_2m_mean",
        "surface_pressure_mean",
        "cloud_cover_mean",
        "dew_point_2m_mean",
    ],
    feature_columns: &[
        "temp_mean_C",
        "temp_max_C",
        "temp_min_C",
        "rh_mean_pct",
        "press_mean_hPa",
        "wind_mean_ms",
        "wind_dir_deg",
        "cloud_mean_pct",
        "dew_point_C",
        "month",
        "month_sin",
        "month_cos",
        "precip_lag_1",
        "precip_lag_3",
        "temp_mean_lag_1",
        "precip_roll7",
        "lat",
        "lon",
    ],
    window_length: 30,
    profile: &DAILY_PROFILE,
    chance_scale: 10.0,
};
