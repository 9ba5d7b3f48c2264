//! Redshift posterior: marginalization over models and best-candidate rules.
//!
//! For every model `m` and grid index `i`:
//!
//! ```text
//! ll[m][i] = -0.5 * chi2[m][i] + log prior[m][i] + log modelPrior[m] - cstLog
//! ```
//!
//! Models are combined per index with a log-sum-exp, and the log-evidence is the
//! log-sum-exp of the combined curve over the whole grid. Samples that are
//! unusable (non-finite merit or non-OK status) contribute `-inf`; an index with
//! no usable model stays in the output as `-inf`, so the result always lines up
//! one-to-one with the grid.
//!
//! Two selection rules are exposed separately because they can legitimately
//! disagree: `best_proba` (posterior maximum) and `best_chi2` (raw minimum).

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::domain::{
    BestCandidate, DecisionRule, MeritCurve, PosteriorResult, PriorVector, RedshiftGrid,
    SolveConfig,
};
use crate::error::EngineError;
use crate::math::{ln_weight, log_sum_exp};

/// Combines per-model merit curves into a redshift posterior.
#[derive(Debug, Clone, Default)]
pub struct PosteriorEngine {
    cst_log: f64,
    model_priors: Option<Vec<f64>>,
}

impl PosteriorEngine {
    pub fn new(cst_log: f64) -> Result<Self, EngineError> {
        if !cst_log.is_finite() {
            return Err(EngineError::invalid("cst_log", format!("must be finite, got {cst_log}")));
        }
        Ok(Self {
            cst_log,
            model_priors: None,
        })
    }

    /// Per-model prior weights (linear, non-negative). Without them every model gets `1/M`.
    pub fn with_model_priors(mut self, weights: Vec<f64>) -> Result<Self, EngineError> {
        if let Some(bad) = weights.iter().find(|w| !(w.is_finite() && **w >= 0.0)) {
            return Err(EngineError::invalid(
                "model_priors",
                format!("weights must be finite and >= 0, got {bad}"),
            ));
        }
        self.model_priors = Some(weights);
        Ok(self)
    }

    pub fn from_config(config: &SolveConfig) -> Result<Self, EngineError> {
        let engine = Self::new(config.cst_log)?;
        if config.model_priors.is_empty() {
            Ok(engine)
        } else {
            engine.with_model_priors(config.model_priors.clone())
        }
    }

    pub fn cst_log(&self) -> f64 {
        self.cst_log
    }

    /// Posterior of a single curve (no model marginalization).
    pub fn compute(
        &self,
        grid: &RedshiftGrid,
        curve: &MeritCurve,
        prior: &PriorVector,
    ) -> Result<PosteriorResult, EngineError> {
        validate_curves(grid, std::slice::from_ref(curve))?;
        let priors = resolve_priors(grid, std::slice::from_ref(prior), 1)?;
        Ok(self.combine(grid, std::slice::from_ref(curve), &priors, &[0.0]))
    }

    /// Marginalize `curves` (one per model) over the shared `grid`.
    ///
    /// `priors` holds one vector per curve, or is empty for a uniform prior.
    /// Nothing is produced when any input is inconsistent.
    pub fn marginalize(
        &self,
        grid: &RedshiftGrid,
        curves: &[MeritCurve],
        priors: &[PriorVector],
    ) -> Result<PosteriorResult, EngineError> {
        validate_curves(grid, curves)?;
        let uniform;
        let priors = if priors.is_empty() {
            uniform = PriorVector::constant(grid.len())?;
            vec![&uniform; curves.len()]
        } else {
            resolve_priors(grid, priors, curves.len())?
        };
        let model_log_priors = self.model_log_priors(curves.len())?;
        Ok(self.combine(grid, curves, &priors, &model_log_priors))
    }

    /// Grid sample with the highest marginal posterior.
    pub fn best_proba(
        &self,
        grid: &RedshiftGrid,
        curves: &[MeritCurve],
        priors: &[PriorVector],
    ) -> Result<BestCandidate, EngineError> {
        let posterior = self.marginalize(grid, curves, priors)?;
        best_proba_of(&posterior)
    }

    /// Grid sample with the smallest raw chi-square over all models.
    ///
    /// Priors and model weights play no part here.
    pub fn best_chi2(
        &self,
        grid: &RedshiftGrid,
        curves: &[MeritCurve],
    ) -> Result<BestCandidate, EngineError> {
        validate_curves(grid, curves)?;

        let mut best: Option<(usize, usize, f64)> = None;
        for i in 0..grid.len() {
            for (m, curve) in curves.iter().enumerate() {
                if !curve.is_usable(i) {
                    continue;
                }
                let chi2 = curve.merits()[i];
                // Strict comparison: ties keep the lowest index, then the first model.
                if best.is_none_or(|(_, _, b)| chi2 < b) {
                    best = Some((i, m, chi2));
                }
            }
        }

        let Some((index, model, value)) = best else {
            return Err(EngineError::invalid(
                "merit curves",
                "no usable chi-square value in any curve",
            ));
        };
        Ok(BestCandidate {
            rule: DecisionRule::BestChi2,
            index,
            redshift: grid.as_slice()[index],
            value,
            model: Some(model),
        })
    }

    fn model_log_priors(&self, m: usize) -> Result<Vec<f64>, EngineError> {
        match &self.model_priors {
            Some(weights) => {
                if weights.len() != m {
                    return Err(EngineError::LengthMismatch {
                        what: "model priors",
                        expected: m,
                        found: weights.len(),
                    });
                }
                Ok(weights.iter().map(|&w| ln_weight(w)).collect())
            }
            None => Ok(vec![-(m as f64).ln(); m]),
        }
    }

    fn combine(
        &self,
        grid: &RedshiftGrid,
        curves: &[MeritCurve],
        priors: &[&PriorVector],
        model_log_priors: &[f64],
    ) -> PosteriorResult {
        let n = grid.len();

        // One row per model; rows are independent so they are built in parallel.
        let rows: Vec<Vec<f64>> = curves
            .par_iter()
            .zip(priors.par_iter())
            .zip(model_log_priors.par_iter())
            .map(|((curve, prior), &log_model_prior)| {
                let merits = curve.merits();
                let log_prior = prior.log_weights();
                (0..n)
                    .map(|i| {
                        if curve.is_usable(i) {
                            -0.5 * merits[i] + log_prior[i] + log_model_prior - self.cst_log
                        } else {
                            f64::NEG_INFINITY
                        }
                    })
                    .collect()
            })
            .collect();

        let log_pdf: Vec<f64> = (0..n)
            .map(|i| log_sum_exp(rows.iter().map(|row| row[i])))
            .collect();

        let dead = log_pdf.iter().filter(|v| **v == f64::NEG_INFINITY).count();
        if dead > 0 {
            warn!(dead, n, "grid samples without any usable model");
        }

        let log_evidence = log_sum_exp(log_pdf.iter().copied());
        debug!(n, models = curves.len(), log_evidence, "posterior built");

        PosteriorResult {
            redshifts: grid.as_slice().to_vec(),
            log_pdf,
            log_evidence,
        }
    }
}

/// Maximum of an existing posterior; ties go to the lowest redshift.
pub fn best_proba_of(posterior: &PosteriorResult) -> Result<BestCandidate, EngineError> {
    if posterior.is_empty() {
        return Err(EngineError::EmptyInput("posterior"));
    }

    let mut index = 0;
    for (i, &v) in posterior.log_pdf.iter().enumerate().skip(1) {
        if v > posterior.log_pdf[index] {
            index = i;
        }
    }

    let value = posterior.log_pdf[index];
    if value == f64::NEG_INFINITY {
        return Err(EngineError::invalid("posterior", "no grid sample has finite support"));
    }
    Ok(BestCandidate {
        rule: DecisionRule::BestProba,
        index,
        redshift: posterior.redshifts[index],
        value,
        model: None,
    })
}

/// Every curve must be sampled on exactly `grid`; no interpolation happens here.
fn validate_curves(grid: &RedshiftGrid, curves: &[MeritCurve]) -> Result<(), EngineError> {
    if curves.is_empty() {
        return Err(EngineError::EmptyInput("merit curves"));
    }
    for (m, curve) in curves.iter().enumerate() {
        if curve.len() != grid.len() {
            return Err(EngineError::LengthMismatch {
                what: "merit curve",
                expected: grid.len(),
                found: curve.len(),
            });
        }
        if curve.redshifts() != grid.as_slice() {
            return Err(EngineError::invalid(
                "merit curves",
                format!("curve {m} is not sampled on the shared redshift grid"),
            ));
        }
    }
    Ok(())
}

fn resolve_priors<'a>(
    grid: &RedshiftGrid,
    priors: &'a [PriorVector],
    m: usize,
) -> Result<Vec<&'a PriorVector>, EngineError> {
    if priors.len() != m {
        return Err(EngineError::LengthMismatch {
            what: "priors",
            expected: m,
            found: priors.len(),
        });
    }
    for prior in priors {
        if prior.len() != grid.len() {
            return Err(EngineError::LengthMismatch {
                what: "prior vector",
                expected: grid.len(),
                found: prior.len(),
            });
        }
    }
    Ok(priors.iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SampleStatus;
    use crate::error::ErrorKind;
    use approx::assert_relative_eq;

    fn grid(n: usize) -> RedshiftGrid {
        RedshiftGrid::new((0..n).map(|i| i as f64 * 0.01).collect()).unwrap()
    }

    fn curve(grid: &RedshiftGrid, merits: Vec<f64>) -> MeritCurve {
        MeritCurve::chi_square(grid, merits).unwrap()
    }

    #[test]
    fn output_aligned_with_grid() {
        let g = grid(7);
        let c = curve(&g, vec![5.0, 4.0, 3.0, 2.0, 3.0, 4.0, 5.0]);
        let engine = PosteriorEngine::default();
        let post = engine.marginalize(&g, &[c], &[]).unwrap();
        assert_eq!(post.len(), g.len());
        assert_eq!(post.redshifts, g.as_slice());
    }

    #[test]
    fn stable_for_widely_scaled_chi2() {
        let n = 50;
        let g = grid(n);
        let base: Vec<f64> = (0..n).map(|i| 1000.0 + (i as f64 - 20.0).powi(2)).collect();
        let scaled: Vec<f64> = base.iter().map(|c| c * 1e6).collect();
        let curves = [curve(&g, base.clone()), curve(&g, scaled.clone())];
        let engine = PosteriorEngine::default();
        let post = engine.marginalize(&g, &curves, &[]).unwrap();

        let ln_half = 0.5f64.ln();
        let ln_prior = -(n as f64).ln();
        for i in 0..n {
            let a = -0.5 * base[i] + ln_prior + ln_half;
            let b = -0.5 * scaled[i] + ln_prior + ln_half;
            let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
            let reference = hi + (lo - hi).exp().ln_1p();
            assert!(post.log_pdf[i].is_finite());
            assert_relative_eq!(post.log_pdf[i], reference, max_relative = 1e-9);
        }
        assert!(post.log_evidence.is_finite());
    }

    #[test]
    fn matches_direct_sum_for_small_chi2() {
        let g = grid(3);
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![2.0, 0.5, 4.0];
        let curves = [curve(&g, a.clone()), curve(&g, b.clone())];
        let engine = PosteriorEngine::new(0.25).unwrap();
        let post = engine.marginalize(&g, &curves, &[]).unwrap();

        let prior = 1.0 / 3.0;
        let mut total = 0.0;
        for i in 0..3 {
            let likelihood = (-0.5 * a[i]).exp() + (-0.5 * b[i]).exp();
            let direct = 0.5 * prior * likelihood * (-0.25f64).exp();
            assert_relative_eq!(post.log_pdf[i], direct.ln(), max_relative = 1e-12);
            total += direct;
        }
        assert_relative_eq!(post.log_evidence, total.ln(), max_relative = 1e-12);
    }

    #[test]
    fn non_finite_samples_are_excluded_not_propagated() {
        let g = grid(4);
        let a = curve(&g, vec![1.0, f64::NAN, 3.0, f64::INFINITY]);
        let b = curve(&g, vec![2.0, 1.0, f64::NAN, f64::NAN]);
        let engine = PosteriorEngine::default();
        let post = engine.marginalize(&g, &[a, b], &[]).unwrap();

        assert_eq!(post.len(), 4);
        assert!(post.log_pdf[..3].iter().all(|v| v.is_finite()));
        assert_eq!(post.log_pdf[3], f64::NEG_INFINITY);
        assert!(post.log_evidence.is_finite());
        assert!(post.log_pdf.iter().all(|v| !v.is_nan()));
    }

    #[test]
    fn invalid_status_is_excluded() {
        let g = grid(3);
        let status = vec![SampleStatus::Ok, SampleStatus::NoOverlap, SampleStatus::Ok];
        let a = curve(&g, vec![1.0, 1.0, 1.0]).with_status(status).unwrap();
        let engine = PosteriorEngine::default();
        let post = engine.marginalize(&g, &[a], &[]).unwrap();
        assert_eq!(post.log_pdf[1], f64::NEG_INFINITY);
    }

    #[test]
    fn best_rules_can_disagree() {
        let g = grid(10);
        let mut a = vec![100.0; 10];
        a[5] = 10.0;
        let mut b = vec![100.0; 10];
        b[7] = 14.0;
        let curves = [curve(&g, a), curve(&g, b)];

        let engine = PosteriorEngine::default()
            .with_model_priors(vec![1e-6, 1.0])
            .unwrap();
        let chi2 = engine.best_chi2(&g, &curves).unwrap();
        let proba = engine.best_proba(&g, &curves, &[]).unwrap();

        assert_eq!(chi2.index, 5);
        assert_eq!(chi2.model, Some(0));
        assert_eq!(chi2.value, 10.0);
        assert_eq!(chi2.rule, DecisionRule::BestChi2);
        assert_eq!(proba.index, 7);
        assert_eq!(proba.redshift, g.as_slice()[7]);
        assert_eq!(proba.rule, DecisionRule::BestProba);
    }

    #[test]
    fn best_proba_ties_break_to_lowest_redshift() {
        let g = grid(5);
        let engine = PosteriorEngine::default();
        let c = curve(&g, vec![3.0, 1.0, 2.0, 1.0, 3.0]);
        let best = engine.best_proba(&g, &[c], &[]).unwrap();
        assert_eq!(best.index, 1);

        let c = curve(&g, vec![3.0, 1.0, 2.0, 1.0, 3.0]);
        let best = engine.best_chi2(&g, &[c]).unwrap();
        assert_eq!(best.index, 1);
    }

    #[test]
    fn marginalize_is_deterministic() {
        let g = grid(200);
        let curves: Vec<MeritCurve> = (0..4)
            .map(|k| {
                let centre = 40.0 * k as f64;
                let merits = (0..200).map(|i| 50.0 + ((i as f64 - centre) * 0.3).powi(2));
                curve(&g, merits.collect())
            })
            .collect();
        let engine = PosteriorEngine::new(12.5).unwrap();
        let first = engine.marginalize(&g, &curves, &[]).unwrap();
        let second = engine.marginalize(&g, &curves, &[]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let g = grid(5);
        let ok = curve(&g, vec![1.0; 5]);
        let short = MeritCurve::chi_square(&grid(4), vec![1.0; 4]).unwrap();
        let engine = PosteriorEngine::default();
        let err = engine.marginalize(&g, &[ok, short], &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn curves_from_another_grid_are_rejected() {
        let g = RedshiftGrid::new(vec![0.0, 0.1, 0.2]).unwrap();
        let elsewhere = RedshiftGrid::new(vec![5.0, 6.0, 7.0]).unwrap();
        let curves = [
            curve(&g, vec![1.0, 2.0, 3.0]),
            curve(&elsewhere, vec![0.5, 2.0, 3.0]),
        ];
        let engine = PosteriorEngine::default();

        let err = engine.marginalize(&g, &curves, &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = engine.best_chi2(&g, &curves).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let uniform = PriorVector::constant(3).unwrap();
        assert!(engine.compute(&g, &curves[1], &uniform).is_err());
    }

    #[test]
    fn empty_and_mismatched_inputs_fail_both_rules() {
        let g = grid(5);
        let engine = PosteriorEngine::default();
        assert!(engine.best_chi2(&g, &[]).is_err());
        assert!(engine.best_proba(&g, &[], &[]).is_err());

        let c = curve(&g, vec![1.0; 5]);
        let err = engine.marginalize(&g, &[c.clone()], &[PriorVector::constant(4).unwrap()]);
        assert!(err.is_err());
        let weighted = engine.with_model_priors(vec![1.0, 1.0]).unwrap();
        assert!(weighted.marginalize(&g, &[c], &[]).is_err());
    }

    #[test]
    fn prior_shifts_the_maximum() {
        let g = grid(4);
        let c = curve(&g, vec![1.0, 1.2, 5.0, 5.0]);
        let prior = PriorVector::strong_line_presence(&[false, true, false, false], 0.1).unwrap();
        let post = PosteriorEngine::default().compute(&g, &c, &prior).unwrap();
        assert_eq!(best_proba_of(&post).unwrap().index, 1);
    }

    #[test]
    fn normalized_posterior_sums_to_one() {
        let g = grid(6);
        let c = curve(&g, vec![4.0, 3.0, 1.0, 2.0, 6.0, f64::NAN]);
        let engine = PosteriorEngine::default();
        let post = engine.marginalize(&g, &[c], &[]).unwrap();
        let total: f64 = post.probabilities().iter().sum();
        assert_relative_eq!(total, 1.0, max_relative = 1e-12);
    }

    #[test]
    fn all_dead_posterior_has_no_best() {
        let g = grid(3);
        let c = curve(&g, vec![f64::NAN; 3]);
        let engine = PosteriorEngine::default();
        let post = engine.marginalize(&g, &[c.clone()], &[]).unwrap();
        assert_eq!(post.log_evidence, f64::NEG_INFINITY);
        assert!(best_proba_of(&post).is_err());
        assert!(engine.best_chi2(&g, &[c]).is_err());
    }
}
