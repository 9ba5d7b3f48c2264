//! Blind redshift solve: correlation peaks first, chi-square on the peaks only.
//!
//! Per template:
//!
//! 1. correlation curve over the whole redshift grid
//! 2. coarse peak search, then refinement around each peak
//! 3. chi-square at the (few) candidate redshifts
//!
//! Both results are stored under the `blindsolve` scope. Computing correlation
//! or chi-square values is the job of a `MeritEvaluator`.

use tracing::{debug, warn};

use crate::domain::{RedshiftGrid, RedshiftRange, SolveConfig};
use crate::error::EngineError;
use crate::extremum::ExtremumFinder;
use crate::operator::{ChiSquareResult, CorrelationResult, OperatorResult};
use crate::store::ResultStore;

/// Source of merit values for one spectrum.
pub trait MeritEvaluator {
    /// Correlation of `template` against the spectrum at every grid redshift.
    fn correlation(
        &self,
        template: &str,
        grid: &RedshiftGrid,
    ) -> Result<CorrelationResult, EngineError>;

    /// Chi-square of `template` at the given redshifts.
    fn chi_square(&self, template: &str, redshifts: &[f64]) -> Result<ChiSquareResult, EngineError>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlindSolveSummary {
    pub solved: Vec<String>,
    /// `(template, reason)`
    pub skipped: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct BlindSolver {
    range: RedshiftRange,
    extremum_count: usize,
    min_separation: usize,
    refine_radius: f64,
}

impl BlindSolver {
    pub fn new(range: RedshiftRange, extremum_count: usize) -> Self {
        Self {
            range,
            extremum_count,
            min_separation: 1,
            refine_radius: 0.001,
        }
    }

    pub fn from_config(config: &SolveConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            range: config.range()?,
            extremum_count: config.extremum_count,
            min_separation: config.min_separation,
            refine_radius: config.refine_radius,
        })
    }

    /// Solve every template; a failing template is logged and skipped.
    pub fn solve<E: MeritEvaluator>(
        &self,
        store: &mut ResultStore,
        evaluator: &E,
        grid: &RedshiftGrid,
        templates: &[String],
    ) -> BlindSolveSummary {
        let mut store = store.scope("blindsolve");
        let mut summary = BlindSolveSummary::default();

        for template in templates {
            match self.solve_template(&mut store, evaluator, grid, template) {
                Ok(true) => summary.solved.push(template.clone()),
                Ok(false) => {
                    let reason = "no correlation peak in range".to_string();
                    summary.skipped.push((template.clone(), reason));
                }
                Err(e) => {
                    warn!(template = %template, error = %e, "template skipped");
                    summary.skipped.push((template.clone(), e.to_string()));
                }
            }
        }

        debug!(
            solved = summary.solved.len(),
            skipped = summary.skipped.len(),
            "blind solve done"
        );
        summary
    }

    /// `Ok(false)` when the correlation curve has no usable peak.
    pub fn solve_template<E: MeritEvaluator>(
        &self,
        store: &mut ResultStore,
        evaluator: &E,
        grid: &RedshiftGrid,
        template: &str,
    ) -> Result<bool, EngineError> {
        let correlation = evaluator.correlation(template, grid)?;
        let finder = ExtremumFinder::new(self.range, self.extremum_count)
            .with_min_separation(self.min_separation);
        let candidates = finder.find_refined(
            correlation.curve.redshifts(),
            correlation.curve.merits(),
            self.refine_radius,
        )?;
        let result = OperatorResult::Correlation(correlation);
        store.store_per_template(template, "correlation", result);

        if candidates.is_empty() {
            warn!(template, "no correlation peak in range");
            return Ok(false);
        }

        let redshifts: Vec<f64> = candidates.iter().map(|c| c.position).collect();
        let merit = evaluator.chi_square(template, &redshifts)?;
        if merit.curve.len() != redshifts.len() {
            return Err(EngineError::LengthMismatch {
                what: "chi-square at candidates",
                expected: redshifts.len(),
                found: merit.curve.len(),
            });
        }
        debug!(template, candidates = redshifts.len(), "template solved");
        store.store_per_template(template, "merit", OperatorResult::ChiSquare(merit));
        Ok(true)
    }
}
