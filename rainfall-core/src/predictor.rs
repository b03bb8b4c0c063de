//! Model selection and the seam to the pre-trained sequence model.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, path::Path, sync::Arc};

use crate::{
    config::Config,
    error::ForecastError,
    model::{FeatureMatrix, Granularity},
    schema::PipelineSpec,
};

/// Offsets at or beyond this many hours are answered by the daily model.
pub const DAILY_OFFSET_HOURS: i64 = 18;

/// A pre-trained model reduced to what the pipeline needs: one normalized
/// `(length, columns)` sequence in, one `log1p(rainfall)` scalar out.
pub trait SequenceScorer: Send + Sync + Debug {
    fn score(&self, sequence: &FeatureMatrix) -> Result<f64, ForecastError>;
}

/// Granularity the request needs, from its hour offset.
pub fn select_granularity(offset_hours: i64) -> Granularity {
    if offset_hours >= DAILY_OFFSET_HOURS { Granularity::Day } else { Granularity::Hour }
}

/// Loaded scorers, one optional slot per granularity. Built once at startup
/// and shared read-only.
#[derive(Debug, Clone, Default)]
pub struct Predictors {
    hourly: Option<Arc<dyn SequenceScorer>>,
    daily: Option<Arc<dyn SequenceScorer>>,
}

impl Predictors {
    pub fn new(
        hourly: Option<Arc<dyn SequenceScorer>>,
        daily: Option<Arc<dyn SequenceScorer>>,
    ) -> Self {
        Self { hourly, daily }
    }

    /// Load every configured checkpoint. A checkpoint that fails to load is
    /// logged and leaves its slot empty; requests needing it then fail with
    /// [`ForecastError::ModelUnavailable`].
    pub fn from_config(config: &Config) -> Self {
        let load = |granularity: Granularity| -> Option<Arc<dyn SequenceScorer>> {
            let path = config.checkpoint(granularity)?;
            match LinearCheckpoint::load(path, PipelineSpec::for_granularity(granularity)) {
                Ok(checkpoint) => {
                    log::info!("{granularity} model loaded from {}", path.display());
                    Some(Arc::new(checkpoint))
                }
                Err(err) => {
                    log::warn!("Could not load {granularity} model: {err:#}");
                    None
                }
            }
        };

        Self { hourly: load(Granularity::Hour), daily: load(Granularity::Day) }
    }

    pub fn is_available(&self, granularity: Granularity) -> bool {
        self.slot(granularity).is_some()
    }

    fn slot(&self, granularity: Granularity) -> Option<&Arc<dyn SequenceScorer>> {
        match granularity {
            Granularity::Hour => self.hourly.as_ref(),
            Granularity::Day => self.daily.as_ref(),
        }
    }

    /// Adapter for the given granularity. Never substitutes the other model:
    /// the two feature schemas are incompatible.
    pub fn require(&self, granularity: Granularity) -> Result<PredictorAdapter<'_>, ForecastError> {
        let scorer = self.slot(granularity).ok_or(ForecastError::ModelUnavailable(granularity))?;
        Ok(PredictorAdapter { spec: PipelineSpec::for_granularity(granularity), scorer: scorer.as_ref() })
    }

    /// Pick the pipeline for an hour offset and return its adapter.
    pub fn select(&self, offset_hours: i64) -> Result<PredictorAdapter<'_>, ForecastError> {
        let granularity = select_granularity(offset_hours);
        log::info!("Using {granularity} model (time_offset={offset_hours}h)");
        self.require(granularity)
    }
}

/// Checks a matrix against its granularity's shape before scoring it.
#[derive(Debug, Clone, Copy)]
pub struct PredictorAdapter<'a> {
    spec: &'static PipelineSpec,
    scorer: &'a dyn SequenceScorer,
}

impl PredictorAdapter<'_> {
    pub fn spec(&self) -> &'static PipelineSpec {
        self.spec
    }

    pub fn granularity(&self) -> Granularity {
        self.spec.granularity
    }

    /// Score a batch of one sequence, `(1, length, columns)`.
    pub fn predict(&self, sequence: &FeatureMatrix) -> Result<f64, ForecastError> {
        let (rows, cols) = sequence.shape();
        if rows != self.spec.window_length || cols != self.spec.width() || !sequence.is_rectangular() {
            return Err(ForecastError::ShapeMismatch {
                stage: "predict",
                expected_rows: self.spec.window_length,
                expected_cols: self.spec.width(),
                rows,
                cols,
            });
        }

        let log_value = self.scorer.score(sequence)?;
        if !log_value.is_finite() {
            return Err(ForecastError::Scoring(format!("non-finite output {log_value}")));
        }
        Ok(log_value)
    }
}

/// Portable checkpoint: a linear head over the time-averaged sequence,
/// `bias + weights . mean(rows)`.
///
/// ```json
/// { "granularity": "hour", "sequence_length": 24, "weights": [...12], "bias": 0.1 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearCheckpoint {
    pub granularity: Granularity,
    pub sequence_length: usize,
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl LinearCheckpoint {
    /// Read and validate a checkpoint against the schema it will serve.
    pub fn load(path: &Path, spec: &PipelineSpec) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read checkpoint: {}", path.display()))?;

        let checkpoint: LinearCheckpoint = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse checkpoint: {}", path.display()))?;

        if checkpoint.granularity != spec.granularity {
            return Err(anyhow!(
                "Checkpoint {} is for the {} model, expected {}",
                path.display(),
                checkpoint.granularity,
                spec.granularity
            ));
        }
        if checkpoint.sequence_length != spec.window_length || checkpoint.weights.len() != spec.width() {
            return Err(anyhow!(
                "Checkpoint {} expects ({}, {}) input, schema is ({}, {})",
                path.display(),
                checkpoint.sequence_length,
                checkpoint.weights.len(),
                spec.window_length,
                spec.width()
            ));
        }

        Ok(checkpoint)
    }
}

impl SequenceScorer for LinearCheckpoint {
    fn score(&self, sequence: &FeatureMatrix) -> Result<f64, ForecastError> {
        if sequence.rows.is_empty() {
            return Err(ForecastError::Scoring("empty sequence".to_string()));
        }

        let n = sequence.rows.len() as f64;
        let mut total = self.bias;
        for (j, w) in self.weights.iter().enumerate() {
            let mut sum = 0.0;
            for row in &sequence.rows {
                let value = row.get(j).ok_or_else(|| {
                    ForecastError::Scoring(format!(
                        "row has {} columns, checkpoint expects {}",
                        row.len(),
                        self.weights.len()
                    ))
                })?;
                sum += value;
            }
            total += w * sum / n;
        }

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DAILY, HOURLY};
    use approx::assert_relative_eq;
    use std::path::PathBuf;

    #[derive(Debug)]
    struct Constant(f64);

    impl SequenceScorer for Constant {
        fn score(&self, _sequence: &FeatureMatrix) -> Result<f64, ForecastError> {
            Ok(self.0)
        }
    }

    fn both() -> Predictors {
        Predictors::new(Some(Arc::new(Constant(0.1))), Some(Arc::new(Constant(0.2))))
    }

    fn hourly_only() -> Predictors {
        Predictors::new(Some(Arc::new(Constant(0.1))), None)
    }

    fn matrix(spec: &PipelineSpec) -> FeatureMatrix {
        FeatureMatrix { columns: spec.feature_columns, rows: vec![vec![1.0; spec.width()]; spec.window_length] }
    }

    #[test]
    fn offset_17_stays_hourly() {
        assert_eq!(select_granularity(17), Granularity::Hour);
        assert_eq!(select_granularity(-48), Granularity::Hour);
        assert_eq!(both().select(17).unwrap().granularity(), Granularity::Hour);
    }

    #[test]
    fn offset_18_goes_daily() {
        assert_eq!(select_granularity(18), Granularity::Day);
        assert_eq!(both().select(18).unwrap().granularity(), Granularity::Day);
    }

    #[test]
    fn missing_daily_model_is_an_error_not_a_fallback() {
        let err = hourly_only().select(18).unwrap_err();
        assert!(matches!(err, ForecastError::ModelUnavailable(Granularity::Day)));
        assert!(hourly_only().select(3).is_ok());
    }

    #[test]
    fn missing_hourly_model_is_an_error() {
        let predictors = Predictors::new(None, Some(Arc::new(Constant(0.2))));
        let err = predictors.select(0).unwrap_err();
        assert!(matches!(err, ForecastError::ModelUnavailable(Granularity::Hour)));
        assert!(!predictors.is_available(Granularity::Hour));
    }

    #[test]
    fn adapter_checks_shape() {
        let predictors = both();
        let adapter = predictors.require(Granularity::Hour).unwrap();
        assert_eq!(adapter.predict(&matrix(&HOURLY)).unwrap(), 0.1);

        let err = adapter.predict(&matrix(&DAILY)).unwrap_err();
        assert!(matches!(err, ForecastError::ShapeMismatch { stage: "predict", .. }));
    }

    #[test]
    fn adapter_rejects_non_finite_scores() {
        let predictors = Predictors::new(Some(Arc::new(Constant(f64::NAN))), None);
        let err = predictors.require(Granularity::Hour).unwrap().predict(&matrix(&HOURLY)).unwrap_err();
        assert!(matches!(err, ForecastError::Scoring(_)));
    }

    #[test]
    fn linear_checkpoint_scores_mean_pooled_rows() {
        let mut weights = vec![0.0; 12];
        weights[0] = 0.5;
        weights[1] = -1.0;
        let checkpoint = LinearCheckpoint { granularity: Granularity::Hour, sequence_length: 24, weights, bias: 0.25 };

        let mut m = matrix(&HOURLY);
        for (i, row) in m.rows.iter_mut().enumerate() {
            row[0] = i as f64; // mean 11.5
            row[1] = 2.0;
        }

        assert_relative_eq!(checkpoint.score(&m).unwrap(), 0.25 + 0.5 * 11.5 - 2.0);
    }

    #[test]
    fn linear_checkpoint_rejects_narrow_rows() {
        let checkpoint =
            LinearCheckpoint { granularity: Granularity::Hour, sequence_length: 24, weights: vec![1.0; 12], bias: 0.0 };
        let narrow = FeatureMatrix { columns: HOURLY.feature_columns, rows: vec![vec![0.0; 6]; 24] };

        let err = checkpoint.score(&narrow).unwrap_err();
        assert!(matches!(err, ForecastError::Scoring(_)));
        assert!(err.to_string().contains("checkpoint expects 12"));
    }

    fn write_checkpoint(dir: &Path, name: &str, checkpoint: &LinearCheckpoint) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, serde_json::to_string(checkpoint).unwrap()).unwrap();
        path
    }

    #[test]
    fn load_validates_against_schema() {
        let dir = tempfile::tempdir().unwrap();
        let good = LinearCheckpoint { granularity: Granularity::Day, sequence_length: 30, weights: vec![0.0; 18], bias: 0.0 };
        let path = write_checkpoint(dir.path(), "daily.json", &good);
        assert_eq!(LinearCheckpoint::load(&path, &DAILY).unwrap(), good);

        let err = LinearCheckpoint::load(&path, &HOURLY).unwrap_err();
        assert!(err.to_string().contains("expected hourly"));

        let narrow = LinearCheckpoint { weights: vec![0.0; 12], ..good };
        let path = write_checkpoint(dir.path(), "narrow.json", &narrow);
        assert!(LinearCheckpoint::load(&path, &DAILY).is_err());
    }

    #[test]
    fn from_config_leaves_broken_slots_empty() {
        let dir = tempfile::tempdir().unwrap();
        let hourly = LinearCheckpoint { granularity: Granularity::Hour, sequence_length: 24, weights: vec![0.0; 12], bias: 0.0 };
        let hourly_path = write_checkpoint(dir.path(), "hourly.json", &hourly);

        let mut config = Config::default();
        config.set_checkpoint(Granularity::Hour, hourly_path);
        config.set_checkpoint(Granularity::Day, dir.path().join("does-not-exist.json"));

        let predictors = Predictors::from_config(&config);
        assert!(predictors.is_available(Granularity::Hour));
        assert!(!predictors.is_available(Granularity::Day));
    }
}
