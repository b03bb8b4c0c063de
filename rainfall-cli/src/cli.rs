use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use clap::{Args, Parser, Subcommand};
use rainfall_core::{
    Config, Forecast, ForecastRequest, Forecaster, GeoPoint, Granularity, OpenMeteoSource,
    Predictors, TzfResolver, WindowRequest,
};
use std::{path::PathBuf, sync::Arc};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "rainfall", version, about = "Rainfall prediction from recent weather")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args)]
pub struct Location {
    /// Latitude in degrees, -90..90.
    #[arg(long, allow_negative_numbers = true)]
    pub lat: f64,

    /// Longitude in degrees, -180..180.
    #[arg(long, allow_negative_numbers = true)]
    pub lon: f64,

    /// Local end of the observation window, e.g. "2024-06-01T14:00".
    /// If absent, means "now" at the location.
    #[arg(long)]
    pub at: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Set the checkpoint files for the hourly and daily models.
    Configure {
        #[arg(long)]
        hourly: Option<PathBuf>,

        #[arg(long)]
        daily: Option<PathBuf>,
    },

    /// Predict rainfall; offsets of 18 hours or more use the daily model.
    Predict {
        #[command(flatten)]
        location: Location,

        /// Target time relative to the window end, in hours.
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        offset: i64,

        /// Print the full result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Predict tomorrow's rainfall with the daily model.
    Daily {
        #[command(flatten)]
        location: Location,

        #[arg(long)]
        json: bool,
    },

    /// Print the normalized model input as JSON, without scoring it.
    Sequence {
        #[command(flatten)]
        location: Location,

        /// Build the daily sequence instead of the hourly one.
        #[arg(long)]
        daily: bool,

        /// Window length in days for `--daily`.
        #[arg(long, default_value_t = 30)]
        days: i64,

        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        offset: i64,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Configure { hourly, daily } => configure(hourly, daily),
            Command::Predict { location, offset, json } => {
                let request = location.request(|point| ForecastRequest::auto(point, offset))?;
                let forecast = build_forecaster()?.forecast(&request).await?;
                print_forecast(&forecast, json)
            }
            Command::Daily { location, json } => {
                let request = location.request(ForecastRequest::daily)?;
                let forecast = build_forecaster()?.forecast(&request).await?;
                print_forecast(&forecast, json)
            }
            Command::Sequence { location, daily, days, offset } => {
                let point = location.point()?;
                let end = location.end()?;
                let window = if daily {
                    WindowRequest::Daily { days }
                } else {
                    WindowRequest::Hourly { offset_hours: offset }
                };

                let prepared = build_forecaster()?.prepare(point, window, end).await?;
                println!("{}", serde_json::to_string_pretty(&prepared.sequence.rows)?);
                Ok(())
            }
        }
    }
}

impl Location {
    fn point(&self) -> Result<GeoPoint> {
        Ok(GeoPoint::new(self.lat, self.lon)?)
    }

    fn end(&self) -> Result<Option<NaiveDateTime>> {
        self.at.as_deref().map(parse_local_time).transpose()
    }

    fn request(&self, build: impl FnOnce(GeoPoint) -> ForecastRequest) -> Result<ForecastRequest> {
        let request = build(self.point()?);
        Ok(match self.end()? {
            Some(end) => request.ending_at(end),
            None => request,
        })
    }
}

/// Accepts `2024-06-01T14:00`, `2024-06-01 14:00` or a bare date (midnight).
fn parse_local_time(raw: &str) -> Result<NaiveDateTime> {
    const FORMATS: &[&str] = &["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"];

    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().map(|d| d.and_time(NaiveTime::MIN)))
        .ok_or_else(|| anyhow!("Invalid date/time '{raw}'. Expected e.g. 2024-06-01T14:00 or 2024-06-01."))
}

fn build_forecaster() -> Result<Forecaster<OpenMeteoSource>> {
    let config = Config::load()?;
    log::debug!("Using archive {} and forecast {}", config.archive_url, config.forecast_url);
    let source = OpenMeteoSource::from_config(&config)?;
    let predictors = Predictors::from_config(&config);
    Ok(Forecaster::new(source, predictors, Arc::new(TzfResolver::new())))
}

fn configure(hourly: Option<PathBuf>, daily: Option<PathBuf>) -> Result<()> {
    let mut config = Config::load()?;

    let interactive = hourly.is_none() && daily.is_none();
    let (hourly, daily) = if interactive {
        (prompt_path(&config, Granularity::Hour)?, prompt_path(&config, Granularity::Day)?)
    } else {
        (hourly, daily)
    };

    if let Some(path) = hourly {
        config.set_checkpoint(Granularity::Hour, path);
    }
    if let Some(path) = daily {
        config.set_checkpoint(Granularity::Day, path);
    }

    config.save()?;
    let path = Config::config_file_path()?;
    println!("Configuration saved to {}", path.display());
    Ok(())
}

fn prompt_path(config: &Config, granularity: Granularity) -> Result<Option<PathBuf>> {
    let current = config
        .checkpoint(granularity)
        .map(|p| p.display().to_string())
        .unwrap_or_default();

    let answer = inquire::Text::new(&format!("{granularity} model checkpoint:"))
        .with_initial_value(&current)
        .with_help_message("Path to the checkpoint JSON; leave empty to skip")
        .prompt()
        .context("Failed to read checkpoint path")?;

    let answer = answer.trim();
    Ok((!answer.is_empty()).then(|| PathBuf::from(answer)))
}

fn print_forecast(forecast: &Forecast, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(forecast)?);
        return Ok(());
    }

    let p = forecast.prediction.rounded();
    let window = &forecast.prepared.window;
    let unit = match forecast.granularity {
        Granularity::Hour => "mm/h",
        Granularity::Day => "mm/day",
    };

    println!(
        "{} model, {} data {} .. {}",
        forecast.granularity, forecast.prepared.source, window.start, window.end
    );
    println!("  Expected rainfall: {:.2} {unit}", p.rain_amount.max(0.0));
    println!("  Chance of rain:    {}%", p.chance_of_rain);

    let obs = &forecast.prepared.observation;
    let latest = match forecast.granularity {
        Granularity::Hour => [
            ("Temperature", "temperature_2m", "°C"),
            ("Humidity", "relative_humidity_2m", "%"),
            ("Wind speed", "wind_speed_10m", " km/h"),
        ],
        Granularity::Day => [
            ("Mean temperature", "temperature_2m_mean", "°C"),
            ("Humidity", "relative_humidity_2m_mean", "%"),
            ("Precipitation", "precipitation_sum", " mm"),
        ],
    };
    println!("Latest conditions:");
    for (label, field, suffix) in latest {
        if let Some(value) = obs.latest(field) {
            println!("  {label}: {value:.1}{suffix}");
        }
    }

    Ok(())
}
