//! Time window resolution: which span of observations a request needs and
//! which upstream endpoint can serve it.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::fmt::Debug;

use crate::{
    error::ForecastError,
    model::{GeoPoint, Granularity, TimeWindow},
    schema::PipelineSpec,
};

/// The archive only holds data older than this many days.
pub const ARCHIVE_LAG_DAYS: i64 = 5;
/// Upper bound the forecast endpoint accepts for `past_days`.
pub const MAX_PAST_DAYS: i64 = 92;
pub const MAX_FORECAST_DAYS: i64 = 16;

/// Looks up the IANA zone identifier for a coordinate.
pub trait TimezoneResolver: Send + Sync + Debug {
    fn resolve(&self, latitude: f64, longitude: f64) -> Option<String>;
}

/// Offline polygon lookup backed by `tzf-rs`. Building the finder is
/// expensive, so construct one per process.
pub struct TzfResolver {
    finder: tzf_rs::DefaultFinder,
}

impl TzfResolver {
    pub fn new() -> Self {
        Self { finder: tzf_rs::DefaultFinder::new() }
    }
}

impl Default for TzfResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for TzfResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TzfResolver").finish_non_exhaustive()
    }
}

impl TimezoneResolver for TzfResolver {
    fn resolve(&self, latitude: f64, longitude: f64) -> Option<String> {
        let name = self.finder.get_tz_name(longitude, latitude);
        if name.is_empty() { None } else { Some(name.to_string()) }
    }
}

/// Always answers with the same zone (or none). Useful when the caller
/// already knows the zone, and in tests.
#[derive(Debug, Clone, Default)]
pub struct FixedTimezone(pub Option<String>);

impl TimezoneResolver for FixedTimezone {
    fn resolve(&self, _latitude: f64, _longitude: f64) -> Option<String> {
        self.0.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowRequest {
    /// 24 hours ending at (local now or the explicit end) + offset.
    Hourly { offset_hours: i64 },
    /// `days` days ending at local now or the explicit end.
    Daily { days: i64 },
}

impl WindowRequest {
    pub fn granularity(&self) -> Granularity {
        match self {
            WindowRequest::Hourly { .. } => Granularity::Hour,
            WindowRequest::Daily { .. } => Granularity::Day,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Stable historical records, queried by explicit date range.
    Archive,
    /// Recent and short-horizon values, queried by day counts.
    Forecast,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Archive => "archive",
            SourceKind::Forecast => "forecast",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRange {
    Explicit { start_date: NaiveDate, end_date: NaiveDate },
    Relative { past_days: u32, forecast_days: u32 },
}

/// Everything a weather source needs to issue the request.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRequest {
    pub kind: SourceKind,
    pub granularity: Granularity,
    pub latitude: f64,
    pub longitude: f64,
    pub series_key: &'static str,
    pub fields: &'static [&'static str],
    pub range: DateRange,
}

impl SourceRequest {
    /// Query string pairs, in the order they are sent.
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("latitude", self.latitude.to_string()),
            ("longitude", self.longitude.to_string()),
            (self.series_key, self.fields.join(",")),
            ("timezone", "auto".to_string()),
        ];

        match self.range {
            DateRange::Explicit { start_date, end_date } => {
                pairs.push(("start_date", start_date.format("%Y-%m-%d").to_string()));
                pairs.push(("end_date", end_date.format("%Y-%m-%d").to_string()));
            }
            DateRange::Relative { past_days, forecast_days } => {
                pairs.push(("past_days", past_days.to_string()));
                pairs.push(("forecast_days", forecast_days.to_string()));
            }
        }

        pairs
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedWindow {
    pub window: TimeWindow,
    pub source: SourceRequest,
}

/// Current wall-clock time at the location, or UTC if its zone is unknown.
pub fn local_now(
    point: GeoPoint,
    now: DateTime<Utc>,
    resolver: &dyn TimezoneResolver,
) -> NaiveDateTime {
    let zone = resolver
        .resolve(point.latitude(), point.longitude())
        .and_then(|name| name.parse::<Tz>().ok());

    match zone {
        Some(tz) => now.with_timezone(&tz).naive_local(),
        None => {
            log::debug!(
                "No timezone for ({}, {}), using UTC",
                point.latitude(),
                point.longitude()
            );
            now.naive_utc()
        }
    }
}

/// Fix the window for a request and choose the endpoint that serves it.
///
/// `explicit_end` is local wall-clock time at the location. `now` is passed
/// in so the archive/forecast split is reproducible.
pub fn resolve_window(
    point: GeoPoint,
    request: WindowRequest,
    explicit_end: Option<NaiveDateTime>,
    now: DateTime<Utc>,
    resolver: &dyn TimezoneResolver,
) -> Result<ResolvedWindow, ForecastError> {
    let base = explicit_end.unwrap_or_else(|| local_now(point, now, resolver));

    let (end, span, length) = match request {
        WindowRequest::Hourly { offset_hours } => {
            let end = Duration::try_hours(offset_hours)
                .and_then(|offset| base.checked_add_signed(offset))
                .ok_or(ForecastError::InvalidOffset(offset_hours))?;
            (end, Duration::hours(24), 24)
        }
        WindowRequest::Daily { days } => {
            if days <= 0 {
                return Err(ForecastError::InvalidDayCount(days));
            }
            let span = Duration::try_days(days).ok_or(ForecastError::InvalidDayCount(days))?;
            (base, span, days as usize)
        }
    };
    let start = end.checked_sub_signed(span).ok_or(match request {
        WindowRequest::Hourly { offset_hours } => ForecastError::InvalidOffset(offset_hours),
        WindowRequest::Daily { days } => ForecastError::InvalidDayCount(days),
    })?;

    let granularity = request.granularity();
    let spec = PipelineSpec::for_granularity(granularity);

    let today = now.date_naive();
    let days_ago = today.signed_duration_since(end.date()).num_days();

    let (kind, range) = if days_ago > ARCHIVE_LAG_DAYS {
        (
            SourceKind::Archive,
            DateRange::Explicit { start_date: start.date(), end_date: end.date() },
        )
    } else {
        let past_days = today.signed_duration_since(start.date()).num_days().max(0);
        let days_ahead = end.date().signed_duration_since(today).num_days().max(0);
        (
            SourceKind::Forecast,
            DateRange::Relative {
                past_days: (past_days + 1).min(MAX_PAST_DAYS) as u32,
                forecast_days: (days_ahead + 1).min(MAX_FORECAST_DAYS) as u32,
            },
        )
    };

    log::info!("{granularity} window {start} .. {end} ({days_ago} days ago) -> {kind} source");

    Ok(ResolvedWindow {
        window: TimeWindow { start, end, granularity, length },
        source: SourceRequest {
            kind,
            granularity,
            latitude: point.latitude(),
            longitude: point.longitude(),
            series_key: spec.series_key,
            fields: spec.raw_fields,
            range,
        },
    })
}
