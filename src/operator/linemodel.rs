//! Per-redshift accumulator for one line-model run.
//!
//! The fitting stage (external) writes into a `LineModelResult` sample by
//! sample; the extremum search and the posterior engine only read from it.
//!
//! Per-variant chi-square values (one row per template sub-shape) live in a
//! single arena allocated once at construction, `n_variants * N` long. Rows are
//! handed out as disjoint mutable slices so each template can be filled by its
//! own writer.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{
    ExtremaResultSet, ExtremumCandidate, LineTypeFilter, MeritCurve, MeritKind, RedshiftGrid,
    SampleStatus,
};
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Emission,
    Absorption,
}

/// A rest-frame spectral line from the line catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralLine {
    pub name: String,
    /// Rest-frame wavelength in Angstrom.
    pub rest_wavelength: f64,
    pub kind: LineKind,
    pub strong: bool,
}

impl SpectralLine {
    pub fn new(
        name: impl Into<String>,
        rest_wavelength: f64,
        kind: LineKind,
        strong: bool,
    ) -> Self {
        Self {
            name: name.into(),
            rest_wavelength,
            kind,
            strong,
        }
    }

    fn passes(&self, filter: LineTypeFilter) -> bool {
        match filter {
            LineTypeFilter::All => true,
            LineTypeFilter::Emission => self.kind == LineKind::Emission,
            LineTypeFilter::Absorption => self.kind == LineKind::Absorption,
        }
    }
}

/// Fitted amplitude of one catalog line at one redshift.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineFit {
    /// Index into the result's rest-line catalog.
    pub line: usize,
    /// Spectral feature the line belongs to. Several fitted components
    /// (e.g. a doublet) can share one element.
    pub element_id: usize,
    pub amplitude: f64,
    /// 1-sigma noise on the amplitude.
    pub noise: f64,
    pub fitting_error: f64,
    /// The observed line falls outside the spectrum's wavelength coverage.
    pub outside_lambda_range: bool,
}

/// All line fits at one redshift.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineModelSolution {
    pub fits: Vec<LineFit>,
}

/// Sums of squares of the observed flux, used to compare continuum strategies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContinuumNorms {
    pub d_transpose_d: f64,
    pub d_transpose_d_nocontinuum: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineModelResult {
    redshifts: RedshiftGrid,
    chi_square: Vec<f64>,
    status: Vec<SampleStatus>,
    rest_lines: Vec<SpectralLine>,
    n_variants: usize,
    variant_chi_square: Vec<f64>,
    solutions: Vec<LineModelSolution>,
    continuum_norms: Option<ContinuumNorms>,
    extrema: ExtremaResultSet,
}

impl LineModelResult {
    /// Unset samples read as `f64::MAX` so they never win a minimum.
    pub fn new(redshifts: RedshiftGrid, rest_lines: Vec<SpectralLine>, n_variants: usize) -> Self {
        let n = redshifts.len();
        Self {
            chi_square: vec![f64::MAX; n],
            status: vec![SampleStatus::Ok; n],
            rest_lines,
            n_variants,
            variant_chi_square: vec![f64::MAX; n_variants * n],
            solutions: vec![LineModelSolution::default(); n],
            continuum_norms: None,
            extrema: ExtremaResultSet::default(),
            redshifts,
        }
    }

    /// Number of redshift samples.
    pub fn len(&self) -> usize {
        self.redshifts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.redshifts.is_empty()
    }

    pub fn redshifts(&self) -> &RedshiftGrid {
        &self.redshifts
    }

    pub fn rest_lines(&self) -> &[SpectralLine] {
        &self.rest_lines
    }

    pub fn n_variants(&self) -> usize {
        self.n_variants
    }

    pub fn chi_square(&self) -> &[f64] {
        &self.chi_square
    }

    pub fn status(&self) -> &[SampleStatus] {
        &self.status
    }

    pub fn set_sample(
        &mut self,
        index: usize,
        chi_square: f64,
        status: SampleStatus,
    ) -> Result<(), EngineError> {
        self.check_index(index)?;
        self.chi_square[index] = chi_square;
        self.status[index] = status;
        Ok(())
    }

    /// Primary chi-square curve with its per-sample status.
    pub fn merit_curve(&self) -> Result<MeritCurve, EngineError> {
        MeritCurve::new(
            MeritKind::ChiSquare,
            self.redshifts.as_slice().to_vec(),
            self.chi_square.clone(),
        )?
        .with_status(self.status.clone())
    }

    /// Store one chi-square per variant at grid sample `index`.
    pub fn set_variant_merits(&mut self, index: usize, merits: &[f64]) -> Result<(), EngineError> {
        self.check_index(index)?;
        if merits.len() != self.n_variants {
            return Err(EngineError::LengthMismatch {
                what: "variant merits",
                expected: self.n_variants,
                found: merits.len(),
            });
        }
        if merits.is_empty() {
            return Err(EngineError::EmptyInput("variant merits"));
        }

        let n = self.len();
        for (k, &m) in merits.iter().enumerate() {
            self.variant_chi_square[k * n + index] = m;
        }
        Ok(())
    }

    /// Chi-square of every variant at `index`, or `None` past the end of the grid.
    pub fn variant_merits(&self, index: usize) -> Option<Vec<f64>> {
        if index >= self.len() {
            return None;
        }
        let n = self.len();
        let merits = (0..self.n_variants)
            .map(|k| self.variant_chi_square[k * n + index])
            .collect();
        Some(merits)
    }

    pub fn variant_row(&self, variant: usize) -> Option<&[f64]> {
        if variant >= self.n_variants {
            return None;
        }
        let n = self.len();
        Some(&self.variant_chi_square[variant * n..(variant + 1) * n])
    }

    /// Mutable rows, one per variant, in variant order.
    pub fn variant_rows_mut(&mut self) -> impl Iterator<Item = &mut [f64]> {
        let n = self.len();
        self.variant_chi_square.chunks_exact_mut(n)
    }

    /// Parallel mutable rows: `(variant, row)` pairs, one exclusive writer each.
    pub fn par_variant_rows_mut(
        &mut self,
    ) -> impl IndexedParallelIterator<Item = (usize, &mut [f64])> {
        let n = self.len();
        self.variant_chi_square.par_chunks_exact_mut(n).enumerate()
    }

    /// One chi-square curve per variant, sharing the primary status.
    pub fn variant_curves(&self) -> Result<Vec<MeritCurve>, EngineError> {
        let n = self.len();
        (0..self.n_variants)
            .map(|k| {
                MeritCurve::new(
                    MeritKind::ChiSquare,
                    self.redshifts.as_slice().to_vec(),
                    self.variant_chi_square[k * n..(k + 1) * n].to_vec(),
                )?
                .with_status(self.status.clone())
            })
            .collect()
    }

    pub fn set_solution(
        &mut self,
        index: usize,
        solution: LineModelSolution,
    ) -> Result<(), EngineError> {
        self.check_index(index)?;
        let n_lines = self.rest_lines.len();
        if let Some(fit) = solution.fits.iter().find(|f| f.line >= n_lines) {
            return Err(EngineError::IndexOutOfRange {
                what: "rest line",
                index: fit.line,
                len: n_lines,
            });
        }
        self.solutions[index] = solution;
        Ok(())
    }

    pub fn solution(&self, index: usize) -> Option<&LineModelSolution> {
        self.solutions.get(index)
    }

    /// Set once by the fitting stage; a second call fails.
    pub fn set_continuum_norms(&mut self, norms: ContinuumNorms) -> Result<(), EngineError> {
        if self.continuum_norms.is_some() {
            return Err(EngineError::AlreadySet("continuum norms"));
        }
        self.continuum_norms = Some(norms);
        Ok(())
    }

    pub fn continuum_norms(&self) -> Option<ContinuumNorms> {
        self.continuum_norms
    }

    /// Plain scan over every stored value; callers filter by status themselves.
    pub fn min_chi_square(&self) -> f64 {
        self.chi_square
            .iter()
            .fold(f64::MAX, |acc, &v| if v < acc { v } else { acc })
    }

    pub fn max_chi_square(&self) -> f64 {
        self.chi_square
            .iter()
            .fold(-f64::MAX, |acc, &v| if v > acc { v } else { acc })
    }

    pub fn set_extrema(&mut self, candidates: &[ExtremumCandidate]) {
        self.extrema = ExtremaResultSet::from_candidates(candidates);
    }

    pub fn extrema(&self) -> &ExtremaResultSet {
        &self.extrema
    }

    pub fn extrema_merit(&self, extremum: usize) -> Option<f64> {
        self.extrema.entries.get(extremum).map(|e| e.merit)
    }

    /// Grid index whose redshift is exactly the extremum's redshift.
    ///
    /// `None` when the extremum does not exist or has no matching sample.
    pub fn extrema_index(&self, extremum: usize) -> Option<usize> {
        let z = self.extrema.entries.get(extremum)?.redshift;
        self.redshifts.index_of(z)
    }

    /// Strong emission lines at the extremum whose SNR and fit ratio both reach
    /// the thresholds. Components of one spectral feature count once.
    pub fn n_lines_over_cut_threshold(
        &self,
        extremum: usize,
        snr_threshold: f64,
        fit_threshold: f64,
    ) -> usize {
        let Some(index) = self.extrema_index(extremum) else {
            return 0;
        };

        let mut counted: Vec<usize> = Vec::new();
        for fit in &self.solutions[index].fits {
            if counted.contains(&fit.element_id) {
                continue;
            }
            let line = &self.rest_lines[fit.line];
            if !line.strong || line.kind != LineKind::Emission || fit.noise <= 0.0 {
                continue;
            }
            let snr = fit.amplitude / fit.noise;
            let fit_snr = fit.amplitude / fit.fitting_error;
            if snr >= snr_threshold && fit_snr >= fit_threshold {
                counted.push(fit.element_id);
            }
        }
        counted.len()
    }

    /// Per redshift: is any strong line (after `filter`) inside the observed range?
    pub fn strong_lines_presence(&self, filter: LineTypeFilter) -> Vec<bool> {
        self.solutions
            .iter()
            .map(|solution| {
                solution.fits.iter().any(|fit| {
                    let line = &self.rest_lines[fit.line];
                    line.strong && line.passes(filter) && !fit.outside_lambda_range
                })
            })
            .collect()
    }

    /// Fill the line diagnostics of every stored extremum.
    pub fn enrich_extrema(
        &mut self,
        snr_threshold: f64,
        fit_threshold: f64,
        filter: LineTypeFilter,
    ) {
        let presence = self.strong_lines_presence(filter);
        for i in 0..self.extrema.len() {
            let over_cut = self.n_lines_over_cut_threshold(i, snr_threshold, fit_threshold);
            let present = self.extrema_index(i).is_some_and(|k| presence[k]);
            let entry = &mut self.extrema.entries[i];
            entry.strong_lines_over_cut = over_cut;
            entry.strong_line_present = present;
        }
        debug!(extrema = self.extrema.len(), "enriched extrema diagnostics");
    }

    fn check_index(&self, index: usize) -> Result<(), EngineError> {
        if index >= self.len() {
            return Err(EngineError::IndexOutOfRange {
                what: "redshift sample",
                index,
                len: self.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> RedshiftGrid {
        RedshiftGrid::new(vec![0.1, 0.2, 0.3, 0.4]).unwrap()
    }

    fn catalog() -> Vec<SpectralLine> {
        vec![
            SpectralLine::new("Halpha", 6562.8, LineKind::Emission, true),
            SpectralLine::new("[OIII]5007", 5006.8, LineKind::Emission, true),
            SpectralLine::new("[OIII]4959", 4958.9, LineKind::Emission, true),
            SpectralLine::new("CaII_K", 3933.7, LineKind::Absorption, true),
            SpectralLine::new("HeI", 5875.6, LineKind::Emission, false),
        ]
    }

    fn solution(fits: Vec<LineFit>) -> LineModelSolution {
        LineModelSolution { fits }
    }

    fn fit(line: usize, element_id: usize, amplitude: f64) -> LineFit {
        LineFit {
            line,
            element_id,
            amplitude,
            noise: 1.0,
            fitting_error: 1.0,
            outside_lambda_range: false,
        }
    }

    #[test]
    fn new_result_is_unset() {
        let r = LineModelResult::new(grid(), catalog(), 2);
        assert_eq!(r.len(), 4);
        assert!(r.chi_square().iter().all(|&c| c == f64::MAX));
        assert_eq!(r.variant_merits(0), Some(vec![f64::MAX, f64::MAX]));
        assert_eq!(r.variant_merits(4), None);
        assert_eq!(r.continuum_norms(), None);
    }

    #[test]
    fn variant_merits_validate_without_partial_writes() {
        let mut r = LineModelResult::new(grid(), catalog(), 2);
        r.set_variant_merits(1, &[3.0, 4.0]).unwrap();
        assert_eq!(r.variant_merits(1), Some(vec![3.0, 4.0]));
        assert_eq!(r.variant_row(1).unwrap()[1], 4.0);

        let before = r.clone();
        assert!(r.set_variant_merits(1, &[1.0, 2.0, 3.0]).is_err());
        assert!(r.set_variant_merits(9, &[1.0, 2.0]).is_err());
        assert!(r.set_sample(4, 1.0, SampleStatus::Ok).is_err());
        assert_eq!(r, before);

        let mut empty = LineModelResult::new(grid(), catalog(), 0);
        assert!(empty.set_variant_merits(0, &[]).is_err());
    }

    #[test]
    fn variant_rows_are_disjoint_writers() {
        let mut r = LineModelResult::new(grid(), catalog(), 3);
        r.par_variant_rows_mut().for_each(|(k, row)| {
            for (i, v) in row.iter_mut().enumerate() {
                *v = (10 * k + i) as f64;
            }
        });
        assert_eq!(r.variant_merits(2), Some(vec![2.0, 12.0, 22.0]));

        for row in r.variant_rows_mut() {
            row[0] = -1.0;
        }
        assert_eq!(r.variant_merits(0), Some(vec![-1.0, -1.0, -1.0]));

        let curves = r.variant_curves().unwrap();
        assert_eq!(curves.len(), 3);
        assert_eq!(curves[1].merits(), &[-1.0, 11.0, 12.0, 13.0]);
        assert_eq!(curves[2].merits(), &[-1.0, 21.0, 22.0, 23.0]);
    }

    #[test]
    fn min_max_scan_all_values() {
        let mut r = LineModelResult::new(grid(), catalog(), 1);
        r.set_sample(0, 5.0, SampleStatus::Ok).unwrap();
        r.set_sample(1, 2.0, SampleStatus::NoOverlap).unwrap();
        r.set_sample(2, 7.0, SampleStatus::Ok).unwrap();
        r.set_sample(3, 3.0, SampleStatus::Ok).unwrap();
        assert_eq!(r.min_chi_square(), 2.0);
        assert_eq!(r.max_chi_square(), 7.0);

        let curve = r.merit_curve().unwrap();
        assert!(!curve.is_usable(1));
    }

    #[test]
    fn continuum_norms_are_set_once() {
        let mut r = LineModelResult::new(grid(), catalog(), 1);
        let norms = ContinuumNorms {
            d_transpose_d: 12.0,
            d_transpose_d_nocontinuum: 3.5,
        };
        r.set_continuum_norms(norms).unwrap();
        let err = r
            .set_continuum_norms(ContinuumNorms {
                d_transpose_d: 0.0,
                d_transpose_d_nocontinuum: 0.0,
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::AlreadySet(_)));
        assert_eq!(r.continuum_norms(), Some(norms));
    }

    #[test]
    fn extrema_index_is_exact_grid_identity() {
        let g = grid();
        let mut r = LineModelResult::new(g.clone(), catalog(), 1);
        let candidates: Vec<ExtremumCandidate> = [2usize, 0, 3]
            .iter()
            .map(|&i| ExtremumCandidate {
                index: i,
                position: g.as_slice()[i],
                value: i as f64,
            })
            .collect();
        r.set_extrema(&candidates);

        for (k, c) in candidates.iter().enumerate() {
            assert_eq!(r.extrema_index(k), Some(c.index));
            assert_eq!(r.extrema_merit(k), Some(c.value));
        }
        assert_eq!(r.extrema_index(3), None);
        assert_eq!(r.extrema_merit(3), None);

        r.set_extrema(&[ExtremumCandidate {
            index: 2,
            position: 0.3 + 1e-12,
            value: 1.0,
        }]);
        assert_eq!(r.extrema_index(0), None);
        assert_eq!(r.n_lines_over_cut_threshold(0, 0.0, 0.0), 0);
    }

    #[test]
    fn lines_over_cut_dedupe_by_element() {
        let g = grid();
        let mut r = LineModelResult::new(g.clone(), catalog(), 1);
        let mut weak_fit = fit(0, 9, 10.0);
        weak_fit.fitting_error = 100.0;
        let mut no_noise = fit(0, 8, 10.0);
        no_noise.noise = 0.0;
        r.set_solution(
            1,
            LineModelSolution {
                fits: vec![
                    fit(1, 1, 10.0), // [OIII] doublet: one feature
                    fit(2, 1, 8.0),
                    fit(0, 2, 5.0),  // Halpha
                    fit(0, 3, 1.0),  // below SNR cut
                    fit(3, 4, 50.0), // absorption
                    fit(4, 5, 50.0), // not strong
                    weak_fit,
                    no_noise,
                ],
            },
        )
        .unwrap();
        r.set_extrema(&[ExtremumCandidate {
            index: 1,
            position: g.as_slice()[1],
            value: 1.0,
        }]);

        assert_eq!(r.n_lines_over_cut_threshold(0, 3.5, 1.0), 2);
        assert_eq!(r.n_lines_over_cut_threshold(1, 3.5, 1.0), 0);
    }

    #[test]
    fn strong_line_presence_respects_filter_and_range() {
        let g = grid();
        let mut r = LineModelResult::new(g.clone(), catalog(), 1);
        let mut outside = fit(0, 0, 1.0);
        outside.outside_lambda_range = true;
        r.set_solution(0, solution(vec![fit(0, 0, 1.0)])).unwrap();
        r.set_solution(1, solution(vec![fit(3, 0, 1.0)])).unwrap();
        let third = vec![outside, fit(4, 1, 1.0)];
        r.set_solution(2, solution(third)).unwrap();

        let all = r.strong_lines_presence(LineTypeFilter::All);
        assert_eq!(all, vec![true, true, false, false]);
        let emission = r.strong_lines_presence(LineTypeFilter::Emission);
        assert_eq!(emission, vec![true, false, false, false]);
        let absorption = r.strong_lines_presence(LineTypeFilter::Absorption);
        assert_eq!(absorption, vec![false, true, false, false]);

        r.set_extrema(&[
            ExtremumCandidate {
                index: 1,
                position: g.as_slice()[1],
                value: 2.0,
            },
            ExtremumCandidate {
                index: 2,
                position: g.as_slice()[2],
                value: 1.0,
            },
        ]);
        r.enrich_extrema(3.5, 1.0, LineTypeFilter::All);
        assert!(r.extrema().entries[0].strong_line_present);
        assert!(!r.extrema().entries[1].strong_line_present);
    }

    #[test]
    fn solution_with_unknown_line_is_rejected() {
        let mut r = LineModelResult::new(grid(), catalog(), 1);
        let err = r.set_solution(0, solution(vec![fit(99, 0, 1.0)]));
        assert!(err.is_err());
        assert!(r.solution(0).unwrap().fits.is_empty());
    }
}
