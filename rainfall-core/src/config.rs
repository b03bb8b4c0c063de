use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    model::Granularity,
    source::openmeteo::{ARCHIVE_URL, DEFAULT_TIMEOUT, FORECAST_URL},
};

/// Checkpoint artifacts, one per granularity. A missing entry leaves that
/// model unavailable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPaths {
    pub hourly: Option<PathBuf>,
    pub daily: Option<PathBuf>,
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub archive_url: String,
    pub forecast_url: String,
    /// Timeout for the single provider request, in seconds.
    pub timeout_secs: u64,

    /// Example TOML:
    /// [models]
    /// hourly = "/opt/rainfall/checkpoint_best.json"
    pub models: ModelPaths,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            archive_url: ARCHIVE_URL.to_string(),
            forecast_url: FORECAST_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            models: ModelPaths::default(),
        }
    }
}

impl Config {
    /// Load config from the platform config directory, or defaults if it
    /// doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        if cfg.timeout_secs == 0 {
            return Err(anyhow!("timeout_secs must be positive in {}", path.display()));
        }

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "rainfall", "rainfall-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    pub fn checkpoint(&self, granularity: Granularity) -> Option<&Path> {
        match granularity {
            Granularity::Hour => self.models.hourly.as_deref(),
            Granularity::Day => self.models.daily.as_deref(),
        }
    }

    pub fn set_checkpoint(&mut self, granularity: Granularity, path: PathBuf) {
        match granularity {
            Granularity::Hour => self.models.hourly = Some(path),
            Granularity::Day => self.models.daily = Some(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_open_meteo() {
        let cfg = Config::default();
        assert_eq!(cfg.archive_url, "https://archive-api.open-meteo.com/v1/archive");
        assert_eq!(cfg.forecast_url, "https://api.open-meteo.com/v1/forecast");
        assert_eq!(cfg.timeout_secs, 30);
        assert!(cfg.checkpoint(Granularity::Hour).is_none());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.set_checkpoint(Granularity::Day, PathBuf::from("/models/daily.json"));
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.checkpoint(Granularity::Day), Some(Path::new("/models/daily.json")));
        assert!(loaded.checkpoint(Granularity::Hour).is_none());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "timeout_secs = 10\n[models]\nhourly = \"h.json\"\n").unwrap();

        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.timeout_secs, 10);
        assert_eq!(cfg.forecast_url, FORECAST_URL);
        assert_eq!(cfg.checkpoint(Granularity::Hour), Some(Path::new("h.json")));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "timeout_secs = 0\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("timeout_secs must be positive"));
    }
}
