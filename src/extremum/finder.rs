//! Local-maximum search on a sampled curve.
//!
//! The search is a plain discrete one:
//!
//! 1. walk the curve once and record every sample where the discrete derivative
//!    changes sign from `+` to `-` (plateau tops report their first sample)
//! 2. keep the maxima whose position falls inside the requested range
//! 3. rank by value (descending, ties to the lower index) and accept greedily
//!    while honouring `max_count` and the minimum index separation
//!
//! Positions are never interpolated: a candidate always carries the exact grid
//! value at its index.
//!
//! `find_refined` adds a second pass: each coarse candidate is searched again in
//! a narrow window around it, with `max_count = 1`. On a discretized curve the
//! coarse ranking can pick a shoulder while a truer peak sits right next to it;
//! the narrow window isolates that neighbourhood.

use tracing::debug;

use crate::domain::{ExtremumCandidate, RedshiftRange};
use crate::error::EngineError;

/// Bounded, capped local-maximum search.
#[derive(Debug, Clone)]
pub struct ExtremumFinder {
    range: RedshiftRange,
    max_count: usize,
    min_separation: usize,
}

impl ExtremumFinder {
    pub fn new(range: RedshiftRange, max_count: usize) -> Self {
        Self {
            range,
            max_count,
            min_separation: 1,
        }
    }

    /// Minimum index distance between two accepted extrema (`1` = any distinct samples).
    pub fn with_min_separation(mut self, min_separation: usize) -> Self {
        self.min_separation = min_separation.max(1);
        self
    }

    pub fn range(&self) -> RedshiftRange {
        self.range
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    /// Local maxima of `values`, best first.
    ///
    /// An empty result (flat or monotone curve, zero-width range, no peak inside
    /// the range) is not an error.
    pub fn find(
        &self,
        positions: &[f64],
        values: &[f64],
    ) -> Result<Vec<ExtremumCandidate>, EngineError> {
        check_lengths(positions, values)?;
        Ok(self.find_unchecked(positions, values))
    }

    /// Local minima of `values` (for lower-is-better merits), best first.
    ///
    /// Candidates report the original (non-negated) values.
    pub fn find_minima(
        &self,
        positions: &[f64],
        values: &[f64],
    ) -> Result<Vec<ExtremumCandidate>, EngineError> {
        check_lengths(positions, values)?;
        let mut out = self.find_unchecked(positions, &negate(values));
        restore_values(&mut out, values);
        Ok(out)
    }

    /// `find_refined` on a lower-is-better curve. Candidates report the original values.
    pub fn find_refined_minima(
        &self,
        positions: &[f64],
        values: &[f64],
        radius: f64,
    ) -> Result<Vec<ExtremumCandidate>, EngineError> {
        let mut out = self.find_refined(positions, &negate(values), radius)?;
        restore_values(&mut out, values);
        Ok(out)
    }

    /// Coarse search over the full range, then a narrow re-search around each candidate.
    ///
    /// The refinement window is `[x - radius, x + radius]` clipped to this
    /// finder's range. A refined hit replaces the coarse candidate; no hit keeps it.
    /// Candidates that refine onto the same sample are merged (first one kept).
    pub fn find_refined(
        &self,
        positions: &[f64],
        values: &[f64],
        radius: f64,
    ) -> Result<Vec<ExtremumCandidate>, EngineError> {
        if !(radius.is_finite() && radius >= 0.0) {
            return Err(EngineError::invalid(
                "radius",
                format!("must be finite and >= 0, got {radius}"),
            ));
        }
        let mut candidates = self.find(positions, values)?;

        for candidate in &mut candidates {
            let window = RedshiftRange {
                begin: candidate.position - radius,
                end: candidate.position + radius,
            };
            let Some(window) = window.clip(&self.range) else {
                continue;
            };
            let fine = ExtremumFinder::new(window, 1).find_unchecked(positions, values);
            if let Some(best) = fine.first() {
                if best.index != candidate.index {
                    debug!(
                        coarse = candidate.position,
                        refined = best.position,
                        "refined extremum moved"
                    );
                }
                *candidate = *best;
            }
        }

        // Two coarse candidates can refine onto the same sample; keep the first.
        let before = candidates.len();
        let mut seen = Vec::with_capacity(before);
        candidates.retain(|c| {
            if seen.contains(&c.index) {
                false
            } else {
                seen.push(c.index);
                true
            }
        });
        if candidates.len() != before {
            debug!(merged = before - candidates.len(), "refined extrema merged");
        }

        Ok(candidates)
    }

    fn find_unchecked(&self, positions: &[f64], values: &[f64]) -> Vec<ExtremumCandidate> {
        if self.max_count == 0 || self.range.width() <= 0.0 {
            return Vec::new();
        }

        let mut peaks: Vec<usize> = local_maxima(values)
            .into_iter()
            .filter(|&i| self.range.contains(positions[i]))
            .collect();

        // Best value first; equal values keep grid order.
        peaks.sort_by(|&a, &b| values[b].total_cmp(&values[a]).then(a.cmp(&b)));

        let sep = self.min_separation;
        let mut accepted: Vec<usize> = Vec::with_capacity(self.max_count.min(peaks.len()));
        for i in peaks {
            if accepted.len() >= self.max_count {
                break;
            }
            if accepted.iter().all(|&j| i.abs_diff(j) >= sep) {
                accepted.push(i);
            }
        }

        accepted
            .into_iter()
            .map(|i| ExtremumCandidate {
                index: i,
                position: positions[i],
                value: values[i],
            })
            .collect()
    }
}

fn negate(values: &[f64]) -> Vec<f64> {
    values.iter().map(|v| -v).collect()
}

fn restore_values(candidates: &mut [ExtremumCandidate], values: &[f64]) {
    for c in candidates {
        c.value = values[c.index];
    }
}

fn check_lengths(positions: &[f64], values: &[f64]) -> Result<(), EngineError> {
    if positions.len() != values.len() {
        return Err(EngineError::LengthMismatch {
            what: "extremum values",
            expected: positions.len(),
            found: values.len(),
        });
    }
    Ok(())
}

/// Indices where the discrete derivative switches from rising to falling.
///
/// Non-finite samples break the chain: a peak needs a finite rise and a finite fall.
fn local_maxima(values: &[f64]) -> Vec<usize> {
    let mut out = Vec::new();
    let mut rising = false;
    let mut plateau_start: Option<usize> = None;

    for i in 1..values.len() {
        let (prev, cur) = (values[i - 1], values[i]);
        if !(prev.is_finite() && cur.is_finite()) {
            rising = false;
            plateau_start = None;
            continue;
        }
        let d = cur - prev;
        if d > 0.0 {
            rising = true;
            plateau_start = None;
        } else if d == 0.0 {
            if rising && plateau_start.is_none() {
                plateau_start = Some(i - 1);
            }
        } else {
            if rising {
                out.push(plateau_start.unwrap_or(i - 1));
            }
            rising = false;
            plateau_start = None;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: usize, step: f64) -> Vec<f64> {
        (0..n).map(|i| i as f64 * step).collect()
    }

    fn gaussian(z: &[f64], z0: f64, sigma: f64) -> Vec<f64> {
        z.iter()
            .map(|&x| (-0.5 * ((x - z0) / sigma).powi(2)).exp())
            .collect()
    }

    fn full_range(z: &[f64]) -> RedshiftRange {
        RedshiftRange::new(z[0], z[z.len() - 1]).unwrap()
    }

    fn indices(found: &[ExtremumCandidate]) -> Vec<usize> {
        found.iter().map(|c| c.index).collect()
    }

    #[test]
    fn single_gaussian_peak_within_one_step() {
        let step = 0.001;
        let z = grid(3001, step);
        let z0 = 1.23456;
        let v = gaussian(&z, z0, 0.05);

        let found = ExtremumFinder::new(full_range(&z), 1).find(&z, &v).unwrap();
        assert_eq!(found.len(), 1);
        assert!((found[0].position - z0).abs() <= step);
        assert_eq!(found[0].position, z[found[0].index]);
    }

    #[test]
    fn refined_peak_close_to_truth_on_fine_grid() {
        let step = 0.00005;
        let z = grid(20001, step);
        let z0 = 0.7;
        let v = gaussian(&z, z0, 0.01);

        let found = ExtremumFinder::new(full_range(&z), 1)
            .find_refined(&z, &v, 0.001)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!((found[0].position - z0).abs() < 1e-4);
    }

    #[test]
    fn flat_and_monotone_curves_have_no_extrema() {
        let z = grid(50, 0.1);
        let finder = ExtremumFinder::new(full_range(&z), 5);
        assert!(finder.find(&z, &vec![1.0; 50]).unwrap().is_empty());
        let rising: Vec<f64> = z.iter().map(|x| 2.0 * x).collect();
        assert!(finder.find(&z, &rising).unwrap().is_empty());
    }

    #[test]
    fn zero_width_range_is_empty_not_error() {
        let z = grid(50, 0.1);
        let v = gaussian(&z, 2.0, 0.3);
        let range = RedshiftRange::new(2.0, 2.0).unwrap();
        let found = ExtremumFinder::new(range, 3).find(&z, &v).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn peaks_outside_range_are_dropped() {
        let z = grid(100, 0.1);
        let v = gaussian(&z, 8.0, 0.3);
        let range = RedshiftRange::new(0.0, 3.0).unwrap();
        let finder = ExtremumFinder::new(range, 3);
        assert!(finder.find(&z, &v).unwrap().is_empty());
        assert!(finder.find_refined(&z, &v, 0.001).unwrap().is_empty());
    }

    #[test]
    fn ranked_by_value_and_capped() {
        let z = grid(200, 0.01);
        let v: Vec<f64> = gaussian(&z, 0.5, 0.05)
            .iter()
            .zip(gaussian(&z, 1.0, 0.05))
            .zip(gaussian(&z, 1.5, 0.05))
            .map(|((a, b), c)| 0.3 * a + 1.0 * b + 0.6 * c)
            .collect();

        let found = ExtremumFinder::new(full_range(&z), 2).find(&z, &v).unwrap();
        assert_eq!(found.len(), 2);
        assert!((found[0].position - 1.0).abs() < 1e-9);
        assert!((found[1].position - 1.5).abs() < 1e-9);
        assert!(found[0].value > found[1].value);
    }

    #[test]
    fn min_separation_suppresses_close_peaks() {
        let z = grid(20, 1.0);
        let mut v = vec![0.0; 20];
        v[5] = 3.0;
        v[7] = 2.0;
        v[15] = 1.0;

        let range = full_range(&z);
        let all = ExtremumFinder::new(range, 5).find(&z, &v).unwrap();
        assert_eq!(indices(&all), vec![5, 7, 15]);

        let sep = ExtremumFinder::new(range, 5)
            .with_min_separation(3)
            .find(&z, &v)
            .unwrap();
        assert_eq!(indices(&sep), vec![5, 15]);
    }

    #[test]
    fn refinement_replaces_shoulder_with_nearby_peak() {
        // Index 12 is suppressed by the separation rule next to index 10, so the
        // coarse pass keeps the lower shoulder at 14. The narrow window around 14
        // reaches 12 but not 10.
        let z = grid(30, 0.0005);
        let mut v = vec![0.0; 30];
        v[10] = 2.0;
        v[12] = 1.5;
        v[14] = 1.0;

        let finder = ExtremumFinder::new(full_range(&z), 2).with_min_separation(3);
        let coarse = finder.find(&z, &v).unwrap();
        assert_eq!(indices(&coarse), vec![10, 14]);

        let refined = finder.find_refined(&z, &v, 0.0011).unwrap();
        assert_eq!(indices(&refined), vec![10, 12]);
        assert_eq!(refined[1].position, z[12]);
        assert_eq!(refined[1].value, 1.5);
    }

    #[test]
    fn refinement_merges_candidates_that_land_on_the_same_peak() {
        let z = grid(30, 0.0005);
        let mut v = vec![0.0; 30];
        v[10] = 1.0;
        v[12] = 1.5;

        let finder = ExtremumFinder::new(full_range(&z), 2);
        assert_eq!(finder.find(&z, &v).unwrap().len(), 2);

        let refined = finder.find_refined(&z, &v, 0.002).unwrap();
        assert_eq!(refined.len(), 1);
        assert_eq!(refined[0].index, 12);
    }

    #[test]
    fn refinement_keeps_coarse_candidate_when_window_is_too_narrow() {
        let z = grid(30, 0.01);
        let mut v = vec![0.0; 30];
        v[10] = 1.0;
        let finder = ExtremumFinder::new(full_range(&z), 1);
        let refined = finder.find_refined(&z, &v, 0.001).unwrap();
        assert_eq!(refined[0].index, 10);
    }

    #[test]
    fn plateau_reports_first_sample_and_nan_breaks_chain() {
        let z = grid(8, 1.0);
        let v = [0.0, 1.0, 2.0, 2.0, 2.0, 1.0, 0.0, 0.0];
        let found = ExtremumFinder::new(full_range(&z), 3).find(&z, &v).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].index, 2);

        let v = [0.0, 1.0, f64::NAN, 1.0, 0.0, 0.0, 0.0, 0.0];
        let found = ExtremumFinder::new(full_range(&z), 3).find(&z, &v).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn minima_report_original_values() {
        let z = grid(11, 0.1);
        let chi2: Vec<f64> = z.iter().map(|x| 10.0 + 100.0 * (x - 0.3).powi(2)).collect();
        let finder = ExtremumFinder::new(full_range(&z), 1);
        let found = finder.find_minima(&z, &chi2).unwrap();
        assert_eq!(found[0].index, 3);
        assert!((found[0].value - chi2[3]).abs() < 1e-12);
    }

    #[test]
    fn refined_minima_move_off_a_shoulder_and_keep_chi2_values() {
        let z = grid(30, 0.0005);
        let mut chi2 = vec![10.0; 30];
        chi2[10] = 8.0;
        chi2[12] = 8.5;
        chi2[14] = 9.0;

        let finder = ExtremumFinder::new(full_range(&z), 2).with_min_separation(3);
        let coarse = finder.find_minima(&z, &chi2).unwrap();
        assert_eq!(indices(&coarse), vec![10, 14]);

        let refined = finder.find_refined_minima(&z, &chi2, 0.0011).unwrap();
        assert_eq!(indices(&refined), vec![10, 12]);
        assert_eq!(refined[0].value, 8.0);
        assert_eq!(refined[1].value, 8.5);

        let err = finder.find_refined_minima(&z, &chi2, -1.0).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }

    #[test]
    fn length_mismatch_is_invalid_argument() {
        let z = grid(5, 0.1);
        let err = ExtremumFinder::new(full_range(&z), 1)
            .find(&z, &[1.0, 2.0])
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }
}
