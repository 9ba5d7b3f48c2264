//! Redshift prior construction.
//!
//! Priors are stored as log-weights so they can be added straight into the
//! log-likelihood. Both builders return priors that sum to one in linear space.

use crate::domain::PriorVector;
use crate::error::EngineError;

impl PriorVector {
    /// Uniform prior: `ln(1 / n)` at every redshift.
    pub fn constant(n: usize) -> Result<Self, EngineError> {
        if n == 0 {
            return Err(EngineError::EmptyInput("prior vector"));
        }
        Self::from_log_weights(vec![-(n as f64).ln(); n])
    }

    /// Prior favouring redshifts where a strong line is present.
    ///
    /// Weight `1` where `presence[i]` is true and `penalization` elsewhere,
    /// normalized to sum to one. `penalization = 1` degenerates to `constant`.
    pub fn strong_line_presence(presence: &[bool], penalization: f64) -> Result<Self, EngineError> {
        if presence.is_empty() {
            return Err(EngineError::EmptyInput("line presence"));
        }
        if !(penalization.is_finite() && penalization > 0.0) {
            return Err(EngineError::invalid(
                "penalization",
                format!("must be finite and > 0, got {penalization}"),
            ));
        }

        let weights: Vec<f64> = presence
            .iter()
            .map(|&present| if present { 1.0 } else { penalization })
            .collect();
        let log_sum = weights.iter().sum::<f64>().ln();
        Self::from_log_weights(weights.iter().map(|w| w.ln() - log_sum).collect())
    }
}
