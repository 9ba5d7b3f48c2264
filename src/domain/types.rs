//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - borrowed read-only by the search / marginalization code
//! - exported to JSON for later plotting or comparisons
//! - handed to an external reporting layer without conversion

use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Which kind of goodness-of-fit a merit curve holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MeritKind {
    /// Correlation coefficient: higher is better.
    Correlation,
    /// Chi-square statistic: lower is better.
    ChiSquare,
}

impl MeritKind {
    pub fn higher_is_better(self) -> bool {
        matches!(self, MeritKind::Correlation)
    }

    /// Column label used by the text table format.
    pub fn label(self) -> &'static str {
        match self {
            MeritKind::Correlation => "Correlation",
            MeritKind::ChiSquare => "ChiSquare",
        }
    }
}

/// Per-sample status reported by the fitting stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleStatus {
    #[default]
    Ok,
    /// Spectrum/template overlap below the requested threshold.
    NoOverlap,
    /// Input data could not be used at this redshift.
    DataError,
    /// The fit ran but produced unusable products.
    InvalidProducts,
}

impl SampleStatus {
    pub fn is_ok(self) -> bool {
        self == SampleStatus::Ok
    }
}

/// Which decision rule produced a `BestCandidate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DecisionRule {
    /// Maximum of the marginalized log-posterior.
    BestProba,
    /// Minimum raw chi-square over all models.
    BestChi2,
}

impl DecisionRule {
    pub fn display_name(self) -> &'static str {
        match self {
            DecisionRule::BestProba => "best-proba",
            DecisionRule::BestChi2 => "best-chi2",
        }
    }
}

/// Filter applied when looking for strong lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LineTypeFilter {
    #[default]
    All,
    Emission,
    Absorption,
}

/// Closed redshift interval `[begin, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RedshiftRange {
    pub begin: f64,
    pub end: f64,
}

impl RedshiftRange {
    pub fn new(begin: f64, end: f64) -> Result<Self, EngineError> {
        if !(begin.is_finite() && end.is_finite() && begin <= end) {
            return Err(EngineError::InvalidRange { begin, end });
        }
        Ok(Self { begin, end })
    }

    pub fn width(&self) -> f64 {
        self.end - self.begin
    }

    pub fn contains(&self, z: f64) -> bool {
        z >= self.begin && z <= self.end
    }

    /// Intersection with `other`, or `None` when they do not overlap.
    pub fn clip(&self, other: &RedshiftRange) -> Option<RedshiftRange> {
        let begin = self.begin.max(other.begin);
        let end = self.end.min(other.end);
        (begin <= end).then_some(RedshiftRange { begin, end })
    }
}

/// Ordered redshift samples shared by every curve combined in one call.
///
/// Invariant: non-empty, finite, strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct RedshiftGrid {
    values: Vec<f64>,
}

impl RedshiftGrid {
    pub fn new(values: Vec<f64>) -> Result<Self, EngineError> {
        if values.is_empty() {
            return Err(EngineError::EmptyInput("redshift grid"));
        }
        if let Some(i) = values.iter().position(|z| !z.is_finite()) {
            return Err(EngineError::UnorderedGrid(i));
        }
        if let Some(i) = values.windows(2).position(|w| w[1] <= w[0]) {
            return Err(EngineError::UnorderedGrid(i + 1));
        }
        Ok(Self { values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    /// Full extent of the grid as a range.
    pub fn range(&self) -> RedshiftRange {
        RedshiftRange {
            begin: self.values[0],
            end: self.values[self.values.len() - 1],
        }
    }

    /// Index of the sample that is exactly equal to `z`.
    ///
    /// No nearest-neighbour fallback: extrema always report grid values, so a
    /// miss means the value did not come from this grid.
    pub fn index_of(&self, z: f64) -> Option<usize> {
        let idx = self.values.partition_point(|&v| v < z);
        (idx < self.values.len() && self.values[idx] == z).then_some(idx)
    }
}

impl TryFrom<Vec<f64>> for RedshiftGrid {
    type Error = EngineError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        RedshiftGrid::new(values)
    }
}

impl From<RedshiftGrid> for Vec<f64> {
    fn from(grid: RedshiftGrid) -> Self {
        grid.values
    }
}

/// Per-redshift goodness-of-fit for one template / model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeritCurve {
    kind: MeritKind,
    redshifts: Vec<f64>,
    merits: Vec<f64>,
    status: Option<Vec<SampleStatus>>,
}

impl MeritCurve {
    pub fn new(
        kind: MeritKind,
        redshifts: Vec<f64>,
        merits: Vec<f64>,
    ) -> Result<Self, EngineError> {
        if merits.len() != redshifts.len() {
            return Err(EngineError::LengthMismatch {
                what: "merit values",
                expected: redshifts.len(),
                found: merits.len(),
            });
        }
        Ok(Self {
            kind,
            redshifts,
            merits,
            status: None,
        })
    }

    /// Convenience for a chi-square curve sampled on `grid`.
    pub fn chi_square(grid: &RedshiftGrid, merits: Vec<f64>) -> Result<Self, EngineError> {
        Self::new(MeritKind::ChiSquare, grid.as_slice().to_vec(), merits)
    }

    /// Convenience for a correlation curve sampled on `grid`.
    pub fn correlation(grid: &RedshiftGrid, merits: Vec<f64>) -> Result<Self, EngineError> {
        Self::new(MeritKind::Correlation, grid.as_slice().to_vec(), merits)
    }

    pub fn with_status(mut self, status: Vec<SampleStatus>) -> Result<Self, EngineError> {
        if status.len() != self.redshifts.len() {
            return Err(EngineError::LengthMismatch {
                what: "sample status",
                expected: self.redshifts.len(),
                found: status.len(),
            });
        }
        self.status = Some(status);
        Ok(self)
    }

    pub fn kind(&self) -> MeritKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.merits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merits.is_empty()
    }

    pub fn redshifts(&self) -> &[f64] {
        &self.redshifts
    }

    pub fn merits(&self) -> &[f64] {
        &self.merits
    }

    pub fn status(&self) -> Option<&[SampleStatus]> {
        self.status.as_deref()
    }

    pub fn status_at(&self, index: usize) -> SampleStatus {
        self.status
            .as_ref()
            .and_then(|s| s.get(index).copied())
            .unwrap_or_default()
    }

    /// Sample is usable: status OK and a finite merit.
    pub fn is_usable(&self, index: usize) -> bool {
        self.merits.get(index).is_some_and(|m| m.is_finite()) && self.status_at(index).is_ok()
    }
}

/// A local extremum found on a curve.
///
/// `position` is always the grid value at `index`, never an interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtremumCandidate {
    pub index: usize,
    pub position: f64,
    pub value: f64,
}

/// Log-prior per redshift sample.
///
/// `-inf` marks a redshift excluded a priori. `+inf` and NaN are rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorVector {
    log_weights: Vec<f64>,
}

impl PriorVector {
    pub fn from_log_weights(log_weights: Vec<f64>) -> Result<Self, EngineError> {
        if log_weights.is_empty() {
            return Err(EngineError::EmptyInput("prior vector"));
        }
        if let Some(bad) = log_weights.iter().find(|&&w| !allowed_log_weight(w)) {
            return Err(EngineError::invalid(
                "prior",
                format!("log-weight must be finite or -inf, got {bad}"),
            ));
        }
        Ok(Self { log_weights })
    }

    pub fn from_weights(weights: &[f64]) -> Result<Self, EngineError> {
        if let Some(bad) = weights.iter().find(|w| !(w.is_finite() && **w >= 0.0)) {
            return Err(EngineError::invalid(
                "prior",
                format!("weight must be finite and non-negative, got {bad}"),
            ));
        }
        Self::from_log_weights(weights.iter().map(|w| w.ln()).collect())
    }

    pub fn len(&self) -> usize {
        self.log_weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log_weights.is_empty()
    }

    pub fn log_weights(&self) -> &[f64] {
        &self.log_weights
    }
}

fn allowed_log_weight(w: f64) -> bool {
    w.is_finite() || w == f64::NEG_INFINITY
}

/// Marginalized log-posterior density over a redshift grid.
///
/// Not normalized: `log_evidence` holds the log of the total mass so callers can
/// normalize (see `normalized`) or compare model families.
#[derive(Debug, Clone, PartialEq)]
pub struct PosteriorResult {
    pub redshifts: Vec<f64>,
    pub log_pdf: Vec<f64>,
    pub log_evidence: f64,
}

impl PosteriorResult {
    pub fn len(&self) -> usize {
        self.log_pdf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log_pdf.is_empty()
    }

    /// Copy with `log_evidence` subtracted, so the samples sum to one in linear space.
    pub fn normalized(&self) -> PosteriorResult {
        let shift = if self.log_evidence.is_finite() {
            self.log_evidence
        } else {
            0.0
        };
        PosteriorResult {
            redshifts: self.redshifts.clone(),
            log_pdf: self.log_pdf.iter().map(|v| v - shift).collect(),
            log_evidence: if self.log_evidence.is_finite() {
                0.0
            } else {
                self.log_evidence
            },
        }
    }

    /// Normalized probability mass per grid sample.
    pub fn probabilities(&self) -> Vec<f64> {
        self.normalized().log_pdf.iter().map(|v| v.exp()).collect()
    }
}

/// A redshift chosen by one decision rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BestCandidate {
    pub rule: DecisionRule,
    pub index: usize,
    pub redshift: f64,
    /// Log-posterior density (`BestProba`) or chi-square (`BestChi2`).
    pub value: f64,
    /// Model whose chi-square won (`BestChi2` only).
    pub model: Option<usize>,
}

/// One ranked extremum with its quality diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtremaEntry {
    pub redshift: f64,
    pub merit: f64,
    /// Strong emission lines above the SNR / fit thresholds (distinct features).
    pub strong_lines_over_cut: usize,
    /// Whether a strong line (after filtering) falls in the usable range.
    pub strong_line_present: bool,
}

/// Ranked extrema for one spectrum (index 0 = best).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtremaResultSet {
    pub entries: Vec<ExtremaEntry>,
}

impl ExtremaResultSet {
    pub fn from_candidates(candidates: &[ExtremumCandidate]) -> Self {
        Self {
            entries: candidates
                .iter()
                .map(|c| ExtremaEntry {
                    redshift: c.position,
                    merit: c.value,
                    strong_lines_over_cut: 0,
                    strong_line_present: false,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn redshifts(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.redshift).collect()
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct SolveConfig {
    pub z_min: f64,
    pub z_max: f64,
    pub z_step: f64,
    /// Sample uniformly in `ln(1 + z)` instead of `z`.
    pub log_grid: bool,

    /// Maximum number of extrema kept by the coarse search.
    pub extremum_count: usize,
    /// Minimum index distance between two reported extrema.
    pub min_separation: usize,
    /// Half-width of the refinement window around each coarse extremum.
    pub refine_radius: f64,

    /// Redshift-independent log-likelihood normalization.
    pub cst_log: f64,
    /// Per-model prior weights (empty = uniform).
    pub model_priors: Vec<f64>,
    /// Prior weight (before normalization) where no strong line is present.
    pub line_prior_penalization: f64,
    pub use_line_prior: bool,

    pub snr_threshold: f64,
    pub fit_threshold: f64,
    pub line_filter: LineTypeFilter,

    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,
    pub export: Option<PathBuf>,

    pub seed: u64,
    pub template_count: usize,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            z_min: 0.0,
            z_max: 3.0,
            z_step: 0.0005,
            log_grid: false,
            extremum_count: 5,
            min_separation: 1,
            refine_radius: 0.001,
            cst_log: 0.0,
            model_priors: Vec::new(),
            line_prior_penalization: 0.1,
            use_line_prior: false,
            snr_threshold: 3.5,
            fit_threshold: 1.0,
            line_filter: LineTypeFilter::All,
            plot: false,
            plot_width: 100,
            plot_height: 20,
            export: None,
            seed: 42,
            template_count: 3,
        }
    }
}

impl SolveConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        RedshiftRange::new(self.z_min, self.z_max)?;
        let step = self.z_step;
        if !(step.is_finite() && step > 0.0) {
            return Err(EngineError::invalid("z_step", format!("must be > 0, got {step}")));
        }
        if !(self.refine_radius.is_finite() && self.refine_radius >= 0.0) {
            return Err(EngineError::invalid(
                "refine_radius",
                format!("must be >= 0, got {}", self.refine_radius),
            ));
        }
        if !self.cst_log.is_finite() {
            return Err(EngineError::invalid("cst_log", "must be finite"));
        }
        let priors = &self.model_priors;
        if priors.iter().any(|w| !(w.is_finite() && *w >= 0.0)) {
            return Err(EngineError::invalid("model_priors", "weights must be finite and >= 0"));
        }
        if !(self.line_prior_penalization.is_finite() && self.line_prior_penalization > 0.0) {
            return Err(EngineError::invalid(
                "line_prior_penalization",
                format!("must be > 0, got {}", self.line_prior_penalization),
            ));
        }
        if !(self.snr_threshold.is_finite() && self.fit_threshold.is_finite()) {
            return Err(EngineError::invalid("thresholds", "SNR and fit cuts must be finite"));
        }
        if self.min_separation == 0 {
            return Err(EngineError::invalid("min_separation", "must be >= 1"));
        }
        Ok(())
    }

    pub fn range(&self) -> Result<RedshiftRange, EngineError> {
        RedshiftRange::new(self.z_min, self.z_max)
    }
}
