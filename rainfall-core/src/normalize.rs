use crate::{error::ForecastError, model::FeatureMatrix};

/// Added to every std so a zero-variance column never divides by zero.
pub const EPSILON: f64 = 1e-6;

/// Per-column (mean, std) computed offline from the training set.
///
/// A profile is versioned together with the checkpoint it was fitted for and
/// is never re-estimated from request data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationProfile {
    pub mean: &'static [f64],
    pub std: &'static [f64],
}

pub static HOURLY_PROFILE: NormalizationProfile = NormalizationProfile {
    mean: &[
        15.0,   // temperature_2m
        60.0,   // relative_humidity_2m
        1013.0, // surface_pressure
        10.0,   // wind_speed_10m
        180.0,  // wind_direction_10m
        50.0,   // cloud_cover
        11.5,   // hour
        6.5,    // month
        0.0, 0.0, 0.0, 0.0,
    ],
    std: &[10.0, 25.0, 10.0, 5.0, 100.0, 35.0, 6.9, 3.5, 0.7, 0.7, 0.7, 0.7],
};

pub static DAILY_PROFILE: NormalizationProfile = NormalizationProfile {
    mean: &[
        15.0,   // temp_mean
        20.0,   // temp_max
        10.0,   // temp_min
        65.0,   // humidity
        1013.0, // pressure
        3.5,    // wind_speed
        180.0,  // wind_direction
        50.0,   // cloud_cover
        8.0,    // dew_point
        6.5,    // month
        0.0,    // month_sin
        0.0,    // month_cos
        2.0,    // precip_lag_1
        2.0,    // precip_lag_3
        15.0,   // temp_mean_lag_1
        2.0,    // precip_roll7
        30.0,   // lat
        0.0,    // lon
    ],
    std: &[
        10.0, 10.0, 10.0, 20.0, 15.0, 2.0, 100.0, 30.0, 8.0, 3.5, 0.7, 0.7, 5.0, 5.0, 10.0, 4.0,
        30.0, 80.0,
    ],
};

impl NormalizationProfile {
    pub fn width(&self) -> usize {
        self.mean.len()
    }

    /// `(x - mean) / (std + EPSILON)` for every cell.
    pub fn apply(&self, matrix: &FeatureMatrix) -> Result<FeatureMatrix, ForecastError> {
        let (rows, cols) = matrix.shape();
        if cols != self.width() || self.std.len() != self.width() || !matrix.is_rectangular() {
            return Err(ForecastError::ShapeMismatch {
                stage: "normalize",
                expected_rows: rows,
                expected_cols: self.width(),
                rows,
                cols,
            });
        }

        let normalized: Vec<Vec<f64>> = matrix
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(self.mean.iter().zip(self.std))
                    .map(|(x, (mean, std))| (x - mean) / (std + EPSILON))
                    .collect()
            })
            .collect();

        Ok(FeatureMatrix { columns: matrix.columns, rows: normalized })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DAILY, HOURLY};
    use approx::assert_relative_eq;

    #[test]
    fn profiles_match_schemas() {
        assert_eq!(HOURLY_PROFILE.width(), HOURLY.feature_columns.len());
        assert_eq!(HOURLY_PROFILE.std.len(), 12);
        assert_eq!(DAILY_PROFILE.width(), DAILY.feature_columns.len());
        assert_eq!(DAILY_PROFILE.std.len(), 18);
    }

    #[test]
    fn round_trip_recovers_raw_values() {
        let raw = FeatureMatrix {
            columns: HOURLY.feature_columns,
            rows: (0..24)
                .map(|i| (0..12).map(|j| (i * 7 + j * 13) as f64 * 0.37 - 20.0).collect())
                .collect(),
        };

        let normalized = HOURLY_PROFILE.apply(&raw).unwrap();

        for (raw_row, norm_row) in raw.rows.iter().zip(&normalized.rows) {
            for (j, (x, z)) in raw_row.iter().zip(norm_row).enumerate() {
                let back = z * (HOURLY_PROFILE.std[j] + EPSILON) + HOURLY_PROFILE.mean[j];
                assert_relative_eq!(back, *x, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn mean_maps_to_zero() {
        let raw = FeatureMatrix { columns: DAILY.feature_columns, rows: vec![DAILY_PROFILE.mean.to_vec()] };
        let normalized = DAILY_PROFILE.apply(&raw).unwrap();
        assert!(normalized.rows[0].iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn column_mismatch_is_fatal() {
        let raw = FeatureMatrix { columns: HOURLY.feature_columns, rows: vec![vec![0.0; 12]] };
        let err = DAILY_PROFILE.apply(&raw).unwrap_err();
        assert!(matches!(err, ForecastError::ShapeMismatch { stage: "normalize", .. }));
    }
}
