//! Fit a raw series to the exact length a model expects.

use crate::{
    error::ForecastError,
    model::{RawObservation, RawRecord, TimeWindow},
};

/// Minimum share of the window that must be present: `SUFFICIENCY_NUM /
/// SUFFICIENCY_DEN` (80%).
const SUFFICIENCY_NUM: usize = 4;
const SUFFICIENCY_DEN: usize = 5;

/// Rows needed before a window is usable, `ceil(0.8 * length)`.
pub fn required_rows(length: usize) -> usize {
    (length * SUFFICIENCY_NUM).div_ceil(SUFFICIENCY_DEN)
}

/// Filter, sort, de-duplicate, then trim or pad to `window.length`.
///
/// The filter keeps `(start - 1 unit, end]` after flooring both bounds to
/// the granularity, so a boundary record the provider stamps one step early
/// still counts. Short windows are padded by carrying the last record
/// forward one unit at a time. That is an approximation, not interpolation.
pub fn align(observation: RawObservation, window: &TimeWindow) -> Result<RawObservation, ForecastError> {
    let granularity = window.granularity;
    let unit = granularity.unit();
    let lower = granularity.floor(window.start) - unit;
    let upper = granularity.floor(window.end);

    let mut records: Vec<RawRecord> = observation
        .records
        .into_iter()
        .filter(|r| r.time > lower && r.time <= upper)
        .collect();

    records.sort_by_key(|r| r.time);
    records.dedup_by_key(|r| r.time);

    let required = required_rows(window.length);
    if records.len() < required {
        return Err(ForecastError::InsufficientData {
            granularity,
            expected: window.length,
            required,
            actual: records.len(),
        });
    }

    if records.len() > window.length {
        records.drain(..records.len() - window.length);
    } else if let Some(last) = records.last().cloned() {
        let missing = window.length - records.len();
        if missing > 0 {
            log::debug!("Padding {granularity} window with {missing} carried-forward rows");
        }
        let mut time = last.time;
        for _ in 0..missing {
            time += unit;
            records.push(RawRecord { time, values: last.values.clone() });
        }
    }

    Ok(RawObservation { granularity, fields: observation.fields, records })
}
