use anyhow::Context;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::{
    config::Config,
    error::ForecastError,
    model::{RawObservation, RawRecord},
    window::{SourceKind, SourceRequest},
};

use super::WeatherSource;

pub const ARCHIVE_URL: &str = "https://archive-api.open-meteo.com/v1/archive";
pub const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct OpenMeteoSource {
    archive_url: String,
    forecast_url: String,
    http: Client,
}

impl OpenMeteoSource {
    pub fn new(archive_url: String, forecast_url: String, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Open-Meteo HTTP client")?;

        Ok(Self { archive_url, forecast_url, http })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(
            config.archive_url.clone(),
            config.forecast_url.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn url(&self, kind: SourceKind) -> &str {
        match kind {
            SourceKind::Archive => &self.archive_url,
            SourceKind::Forecast => &self.forecast_url,
        }
    }
}

#[async_trait]
impl WeatherSource for OpenMeteoSource {
    async fn fetch(&self, request: &SourceRequest) -> Result<RawObservation, ForecastError> {
        let url = self.url(request.kind);
        log::debug!("GET {url} ({} {})", request.kind, request.series_key);

        let res = self
            .http
            .get(url)
            .query(&request.query())
            .send()
            .await
            .map_err(|e| ForecastError::Fetch(format!("{} request to {url}: {e}", request.kind)))?;

        let status = res.status();
        let body = res.text().await.map_err(|e| {
            ForecastError::Fetch(format!("failed to read {} response body: {e}", request.kind))
        })?;

        if !status.is_success() {
            return Err(ForecastError::Fetch(format!(
                "{} request failed with status {}: {}",
                request.kind,
                status,
                truncate_body(&body),
            )));
        }

        parse_series(&body, request)
    }
}

/// Decode an Open-Meteo body into records, in the order received.
///
/// The series object must hold `time` plus every requested field, each an
/// array of the same length. Records with a `null` in any field are dropped;
/// the aligner's sufficiency check decides whether enough remain.
pub fn parse_series(body: &str, request: &SourceRequest) -> Result<RawObservation, ForecastError> {
    let data: Value = serde_json::from_str(body)
        .map_err(|e| ForecastError::Malformed(format!("invalid JSON body: {e}")))?;

    let series = data
        .get(request.series_key)
        .ok_or_else(|| ForecastError::MissingField(request.series_key.to_string()))?;

    let required = std::iter::once("time").chain(request.fields.iter().copied());
    for field in required {
        if series.get(field).is_none() {
            return Err(ForecastError::MissingField(field.to_string()));
        }
    }

    let times = Vec::<String>::deserialize(&series["time"])
        .map_err(|e| ForecastError::Malformed(format!("field 'time': {e}")))?;

    let mut columns = Vec::with_capacity(request.fields.len());
    for field in request.fields {
        let column = Vec::<Option<f64>>::deserialize(&series[*field])
            .map_err(|e| ForecastError::Malformed(format!("field '{field}': {e}")))?;
        if column.len() != times.len() {
            return Err(ForecastError::Malformed(format!(
                "field '{field}' has {} values, 'time' has {}",
                column.len(),
                times.len()
            )));
        }
        columns.push(column);
    }

    let mut records = Vec::with_capacity(times.len());
    let mut dropped = 0usize;
    for (i, raw_time) in times.iter().enumerate() {
        let time = parse_timestamp(raw_time)
            .ok_or_else(|| ForecastError::Malformed(format!("unparsable timestamp '{raw_time}'")))?;

        let values: Option<Vec<f64>> = columns.iter().map(|col| col[i]).collect();
        match values {
            Some(values) => records.push(RawRecord { time, values }),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        log::debug!("Dropped {dropped} {} records with missing values", request.series_key);
    }

    Ok(RawObservation { granularity: request.granularity, fields: request.fields, records })
}

/// Open-Meteo answers with `2024-06-01T13:00` for hourly and `2024-06-01` for
/// daily series.
fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().map(|d| d.and_time(NaiveTime::MIN)))
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{GeoPoint, Granularity},
        window::{FixedTimezone, WindowRequest, resolve_window},
    };
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn hourly_request() -> SourceRequest {
        let point = GeoPoint::new(35.68, 139.69).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 20, 12, 0, 0).unwrap();
        resolve_window(point, WindowRequest::Hourly { offset_hours: 0 }, None, now, &FixedTimezone(None))
            .unwrap()
            .source
    }

    fn daily_request() -> SourceRequest {
        let point = GeoPoint::new(35.68, 139.69).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 20, 12, 0, 0).unwrap();
        resolve_window(point, WindowRequest::Daily { days: 30 }, None, now, &FixedTimezone(None))
            .unwrap()
            .source
    }

    fn hourly_body() -> Value {
        json!({
            "latitude": 35.7,
            "longitude": 139.7,
            "hourly": {
                "time": ["2024-06-20T01:00", "2024-06-20T00:00", "2024-06-20T02:00"],
                "temperature_2m": [21.0, 20.5, 22.0],
                "relative_humidity_2m": [70.0, 72.0, 68.0],
                "surface_pressure": [1008.0, 1008.5, 1007.9],
                "wind_speed_10m": [5.0, 4.0, 6.0],
                "wind_direction_10m": [180.0, 170.0, 190.0],
                "cloud_cover": [40.0, 50.0, 30.0]
            }
        })
    }

    #[test]
    fn parses_hourly_series_in_received_order() {
        let obs = parse_series(&hourly_body().to_string(), &hourly_request()).unwrap();

        assert_eq!(obs.granularity, Granularity::Hour);
        assert_eq!(obs.len(), 3);
        assert_eq!(obs.records[0].time.to_string(), "2024-06-20 01:00:00");
        assert_eq!(obs.records[1].values, vec![20.5, 72.0, 1008.5, 4.0, 170.0, 50.0]);
    }

    #[test]
    fn parses_daily_dates_as_midnight() {
        let body = json!({
            "daily": {
                "time": ["2024-06-19"],
                "temperature_2m_mean": [20.0],
                "temperature_2m_max": [25.0],
                "temperature_2m_min": [15.0],
                "precipitation_sum": [1.2],
                "wind_speed_10m_max": [12.0],
                "wind_direction_10m_dominant": [200.0],
                "relative_humidity_2m_mean": [66.0],
                "surface_pressure_mean": [1011.0],
                "cloud_cover_mean": [55.0],
                "dew_point_2m_mean": [11.0]
            }
        });

        let obs = parse_series(&body.to_string(), &daily_request()).unwrap();
        assert_eq!(obs.records[0].time.to_string(), "2024-06-19 00:00:00");
        assert_eq!(obs.latest("precipitation_sum"), Some(1.2));
    }

    #[test]
    fn missing_series_key() {
        let err = parse_series(r#"{"daily": {}}"#, &hourly_request()).unwrap_err();
        assert!(matches!(err, ForecastError::MissingField(ref f) if f == "hourly"));
    }

    #[test]
    fn names_first_missing_field() {
        let mut body = hourly_body();
        let hourly = body["hourly"].as_object_mut().unwrap();
        hourly.remove("surface_pressure");
        hourly.remove("cloud_cover");

        let err = parse_series(&body.to_string(), &hourly_request()).unwrap_err();
        assert!(matches!(err, ForecastError::MissingField(ref f) if f == "surface_pressure"));
        assert!(err.to_string().contains("missing required field: surface_pressure"));
    }

    #[test]
    fn records_with_nulls_are_dropped() {
        let mut body = hourly_body();
        body["hourly"]["cloud_cover"] = json!([40.0, null, 30.0]);

        let obs = parse_series(&body.to_string(), &hourly_request()).unwrap();
        assert_eq!(obs.len(), 2);
        assert!(obs.records.iter().all(|r| r.time.to_string() != "2024-06-20 00:00:00"));
    }

    #[test]
    fn ragged_columns_are_malformed() {
        let mut body = hourly_body();
        body["hourly"]["temperature_2m"] = json!([21.0]);

        let err = parse_series(&body.to_string(), &hourly_request()).unwrap_err();
        assert!(err.is_schema());
        assert!(err.to_string().contains("temperature_2m"));
    }

    #[test]
    fn non_json_body_is_malformed() {
        let err = parse_series("<html>oops</html>", &hourly_request()).unwrap_err();
        assert!(matches!(err, ForecastError::Malformed(_)));
    }

    #[test]
    fn bad_timestamp_is_malformed() {
        let mut body = hourly_body();
        body["hourly"]["time"] = json!(["yesterday", "2024-06-20T00:00", "2024-06-20T02:00"]);

        let err = parse_series(&body.to_string(), &hourly_request()).unwrap_err();
        assert!(err.to_string().contains("yesterday"));
    }

    #[test]
    fn truncate_body_limits_length() {
        let long = "x".repeat(500);
        let short = truncate_body(&long);
        assert_eq!(short.len(), 203);
        assert!(short.ends_with("..."));
        assert_eq!(truncate_body("ok"), "ok");
    }

    #[tokio::test]
    async fn transport_failure_is_fetch_error() {
        let source = OpenMeteoSource::new(
            "http://127.0.0.1:9/archive".into(),
            "http://127.0.0.1:9/forecast".into(),
            Duration::from_secs(2),
        )
        .unwrap();

        let err = source.fetch(&hourly_request()).await.unwrap_err();
        assert!(matches!(err, ForecastError::Fetch(_)));
        assert!(err.to_string().starts_with("Open-Meteo API request failed"));
    }

    #[tokio::test]
    async fn error_status_is_fetch_error_with_body() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let body = r#"{"error":true,"reason":"bad range"}"#;

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 400 Bad Request\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });

        let source = OpenMeteoSource::new(
            format!("http://{addr}/archive"),
            format!("http://{addr}/forecast"),
            Duration::from_secs(5),
        )
        .unwrap();

        let err = source.fetch(&hourly_request()).await.unwrap_err();
        assert!(matches!(err, ForecastError::Fetch(_)));
        let msg = err.to_string();
        assert!(msg.contains("400"), "{msg}");
        assert!(msg.contains("bad range"), "{msg}");
    }
}
