//! Redshift grid generation.
//!
//! Grids are built deterministically from a range and a step so that two runs
//! with the same flags produce bit-identical redshift values (the extremum /
//! solution lookups rely on exact equality).

use crate::domain::{RedshiftGrid, RedshiftRange};
use crate::error::EngineError;

/// Slack used when counting steps, so `end` is kept despite rounding in `(end - begin) / step`.
const COUNT_EPS: f64 = 1e-9;

/// Refuse grids that would not fit comfortably in memory.
const MAX_SAMPLES: usize = 50_000_000;

/// Linear grid `begin, begin + step, ...` up to and including `end` (when it falls on a step).
///
/// A last sample that overshoots `end` by rounding is snapped onto `end`.
pub fn spread_over(range: &RedshiftRange, step: f64) -> Result<RedshiftGrid, EngineError> {
    check_step(step)?;
    let count = step_count(range.width(), step)?;
    let values = (0..=count)
        .map(|i| (range.begin + step * i as f64).min(range.end))
        .collect();
    RedshiftGrid::new(values)
}

/// Grid uniform in `ln(1 + z)` with the given log step.
///
/// This matches a log-lambda resampled spectrum, where a constant shift in
/// log-wavelength corresponds to a constant step in `ln(1 + z)`.
pub fn spread_over_log(range: &RedshiftRange, log_step: f64) -> Result<RedshiftGrid, EngineError> {
    check_step(log_step)?;
    if range.begin <= -1.0 {
        return Err(EngineError::invalid(
            "range",
            format!("log grid requires begin > -1, got {}", range.begin),
        ));
    }
    let log_begin = range.begin.ln_1p();
    let log_end = range.end.ln_1p();
    let count = step_count(log_end - log_begin, log_step)?;
    let values = (0..=count)
        .map(|i| (log_begin + log_step * i as f64).exp_m1().min(range.end))
        .collect();
    RedshiftGrid::new(values)
}

fn check_step(step: f64) -> Result<(), EngineError> {
    if !(step.is_finite() && step > 0.0) {
        return Err(EngineError::invalid("step", format!("must be finite and > 0, got {step}")));
    }
    Ok(())
}

fn step_count(width: f64, step: f64) -> Result<usize, EngineError> {
    let count = (width / step + COUNT_EPS).floor();
    if !(count.is_finite() && count >= 0.0) || count as usize >= MAX_SAMPLES {
        return Err(EngineError::invalid(
            "step",
            format!("width {width} / step {step} gives an unusable sample count"),
        ));
    }
    Ok(count as usize)
}
