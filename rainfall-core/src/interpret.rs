use crate::{model::PredictionResult, schema::PipelineSpec};

/// Turn a model's `log1p(rainfall)` output back into rainfall and a chance
/// percentage.
///
/// The raw amount is kept as is, so it can be slightly negative near zero.
/// The chance is a hand-tuned linear scaling of the amount (x20 hourly, x10
/// daily) clamped to [0, 100]; it is not a calibrated probability.
pub fn interpret(log_value: f64, spec: &PipelineSpec) -> PredictionResult {
    let rain_amount = log_value.exp_m1();
    let chance_of_rain = (rain_amount * spec.chance_scale).clamp(0.0, 100.0);

    PredictionResult { rain_amount, log_value, chance_of_rain }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DAILY, HOURLY};
    use approx::assert_relative_eq;

    #[test]
    fn zero_log_is_no_rain() {
        for spec in [&HOURLY, &DAILY] {
            let p = interpret(0.0, spec);
            assert_eq!(p.rain_amount, 0.0);
            assert_eq!(p.chance_of_rain, 0.0);
        }
    }

    #[test]
    fn five_mm_per_hour_saturates_chance() {
        let p = interpret(6f64.ln(), &HOURLY);
        assert_relative_eq!(p.rain_amount, 5.0, epsilon = 1e-9);
        assert_eq!(p.chance_of_rain, 100.0);
    }

    #[test]
    fn daily_scaling_is_half_of_hourly() {
        let hourly = interpret(0.2, &HOURLY);
        let daily = interpret(0.2, &DAILY);
        assert_relative_eq!(hourly.chance_of_rain, 2.0 * daily.chance_of_rain);
        assert_relative_eq!(daily.chance_of_rain, 0.2f64.exp_m1() * 10.0);
    }

    #[test]
    fn negative_output_keeps_raw_amount() {
        let p = interpret(-0.01, &HOURLY);
        assert!(p.rain_amount < 0.0);
        assert_eq!(p.log_value, -0.01);
        assert_eq!(p.chance_of_rain, 0.0);
    }
}
