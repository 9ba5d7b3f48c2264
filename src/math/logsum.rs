//! Log-domain accumulation.
//!
//! Chi-square values for real spectra span many orders of magnitude, so
//! `exp(-chi2 / 2)` underflows long before the posterior becomes meaningless.
//! Everything is kept in log space and summed with the running-max trick:
//!
//! ```text
//! log Σ exp(x_i) = m + log Σ exp(x_i - m),   m = max_i x_i
//! ```

/// `log(Σ exp(x_i))`, skipping `-inf` terms.
///
/// Returns `-inf` when every term is `-inf` (or the input is empty). Callers are
/// expected to have mapped non-finite inputs to `-inf` beforehand; a NaN term is
/// ignored the same way.
pub fn log_sum_exp<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
    I::IntoIter: Clone,
{
    let iter = values.into_iter();
    let max = iter
        .clone()
        .filter(|v| !v.is_nan())
        .fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    if max == f64::INFINITY {
        return f64::INFINITY;
    }
    let sum: f64 = iter
        .filter(|v| !v.is_nan())
        .map(|v| (v - max).exp())
        .sum();
    max + sum.ln()
}

/// Natural log of a non-negative weight, `-inf` for zero.
pub fn ln_weight(w: f64) -> f64 {
    if w > 0.0 { w.ln() } else { f64::NEG_INFINITY }
}
