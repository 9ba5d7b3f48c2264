//! Synthetic merit curves for the `demo` command and for tests.
//!
//! Each template gets a correlation curve peaking at its own redshift and a
//! chi-square curve with a well at the same place. Template 0 always sits at
//! the true redshift; the others sit at line-confusion aliases, i.e. redshifts
//! where one strong line lands on the observed wavelength of another.
//!
//! All noise comes from a seeded `StdRng`, so a given config always produces
//! the same curves.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use rayon::prelude::*;
use tracing::debug;

use crate::domain::{MeritCurve, MeritKind, RedshiftGrid, SampleStatus, SolveConfig};
use crate::error::EngineError;
use crate::math::{spread_over, spread_over_log};
use crate::operator::{
    ChiSquareResult, ContinuumNorms, CorrelationResult, LineFit, LineKind, LineModelResult,
    LineModelSolution, MeritResult, SpectralLine,
};
use crate::solve::MeritEvaluator;

/// Pixels in the fake spectrum; sets the chi-square floor.
const N_PIXELS: f64 = 2000.0;
/// Observed wavelength coverage (Angstrom).
const LAMBDA_MIN: f64 = 3800.0;
const LAMBDA_MAX: f64 = 9500.0;

#[derive(Debug, Clone)]
pub struct SyntheticTemplate {
    pub name: String,
    pub peak_z: f64,
    pub correlation: Vec<f64>,
    pub chi_square: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct SyntheticSpectrum {
    pub grid: RedshiftGrid,
    pub true_z: f64,
    pub templates: Vec<SyntheticTemplate>,
}

/// Rest-frame catalog used for the synthetic line fits.
pub fn line_catalog() -> Vec<SpectralLine> {
    vec![
        SpectralLine::new("Halpha", 6562.8, LineKind::Emission, true),
        SpectralLine::new("[OIII]5007", 5006.8, LineKind::Emission, true),
        SpectralLine::new("[OIII]4959", 4958.9, LineKind::Emission, true),
        SpectralLine::new("Hbeta", 4861.3, LineKind::Emission, false),
        SpectralLine::new("[OII]3727", 3727.3, LineKind::Emission, true),
        SpectralLine::new("CaII_K", 3933.7, LineKind::Absorption, true),
        SpectralLine::new("CaII_H", 3968.5, LineKind::Absorption, true),
    ]
}

/// Spectral feature of each catalog line; the [OIII] doublet is one feature.
const ELEMENT_IDS: [usize; 7] = [0, 1, 1, 2, 3, 4, 5];

pub fn generate_spectrum(config: &SolveConfig) -> Result<SyntheticSpectrum, EngineError> {
    config.validate()?;
    if config.template_count == 0 {
        return Err(EngineError::invalid("template_count", "must be > 0"));
    }

    let range = config.range()?;
    let grid = if config.log_grid {
        spread_over_log(&range, config.z_step)?
    } else {
        spread_over(&range, config.z_step)?
    };
    let mut rng = StdRng::seed_from_u64(config.seed);
    let noise = gaussian_noise(1.0)?;

    let margin = 0.1 * range.width();
    let true_z = rng.gen_range((range.begin + margin)..=(range.end - margin));

    let catalog = line_catalog();
    let mut templates = Vec::with_capacity(config.template_count);
    for k in 0..config.template_count {
        let peak_z = if k == 0 {
            true_z
        } else {
            let alias = alias_redshift(true_z, k, &catalog).filter(|z| range.contains(*z));
            alias.unwrap_or_else(|| rng.gen_range(range.begin..=range.end))
        };

        // Templates further down the list fit worse.
        let depth = 400.0 / (1.0 + k as f64);
        let width = 0.01 + 0.005 * k as f64;
        let floor = N_PIXELS + 25.0 * k as f64;
        let scale = (1.0 - 0.15 * k as f64).max(0.2);

        let mut correlation = Vec::with_capacity(grid.len());
        let mut chi_square = Vec::with_capacity(grid.len());
        for z in grid.iter() {
            let shape = (-0.5 * ((z - peak_z) / width).powi(2)).exp();
            correlation.push(scale * shape + 0.02 * noise.sample(&mut rng));
            chi_square.push(floor + depth * (1.0 - shape) + 2.0 * noise.sample(&mut rng));
        }

        templates.push(SyntheticTemplate {
            name: format!("template-{k:02}"),
            peak_z,
            correlation,
            chi_square,
        });
    }

    debug!(
        n = grid.len(),
        templates = templates.len(),
        true_z,
        "generated synthetic spectrum"
    );
    Ok(SyntheticSpectrum {
        grid,
        true_z,
        templates,
    })
}

/// Redshift at which catalog line `k` lands where line 0 sits at `true_z`.
fn alias_redshift(true_z: f64, k: usize, catalog: &[SpectralLine]) -> Option<f64> {
    let other = catalog.get(k % catalog.len())?;
    let z = (1.0 + true_z) * catalog[0].rest_wavelength / other.rest_wavelength - 1.0;
    (z >= 0.0 && z != true_z).then_some(z)
}

fn gaussian_noise(sigma: f64) -> Result<Normal<f64>, EngineError> {
    Normal::new(0.0, sigma).map_err(|e| EngineError::invalid("noise", e.to_string()))
}

fn line_observed(line: &SpectralLine, z: f64) -> bool {
    (LAMBDA_MIN..=LAMBDA_MAX).contains(&(line.rest_wavelength * (1.0 + z)))
}

/// Fraction of catalog lines that land inside the wavelength coverage at each redshift.
fn line_overlap(redshifts: &[f64]) -> Vec<f64> {
    let catalog = line_catalog();
    let total = catalog.len() as f64;
    redshifts
        .iter()
        .map(|&z| catalog.iter().filter(|l| line_observed(l, z)).count() as f64 / total)
        .collect()
}

impl SyntheticSpectrum {
    pub fn template_names(&self) -> Vec<String> {
        self.templates.iter().map(|t| t.name.clone()).collect()
    }

    pub fn chi_square_curves(&self) -> Result<Vec<MeritCurve>, EngineError> {
        self.templates
            .iter()
            .map(|t| MeritCurve::chi_square(&self.grid, t.chi_square.clone()))
            .collect()
    }

    fn template(&self, name: &str) -> Result<&SyntheticTemplate, EngineError> {
        self.templates
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| EngineError::invalid("template", format!("unknown template '{name}'")))
    }

    /// Line-model view of the best template: primary chi-square, one variant row
    /// per template, and line fits whose strength peaks at the true redshift.
    pub fn line_model(&self, seed: u64) -> Result<LineModelResult, EngineError> {
        let catalog = line_catalog();
        let n_variants = self.templates.len();
        let mut result = LineModelResult::new(self.grid.clone(), catalog.clone(), n_variants);
        let mut rng = StdRng::seed_from_u64(seed ^ 0x5eed);
        let noise = gaussian_noise(0.3)?;

        let Some(primary) = self.templates.first() else {
            return Err(EngineError::EmptyInput("templates"));
        };
        for (i, z) in self.grid.iter().enumerate() {
            let in_coverage = catalog.iter().any(|l| line_observed(l, z));
            let status = if in_coverage {
                SampleStatus::Ok
            } else {
                SampleStatus::NoOverlap
            };
            result.set_sample(i, primary.chi_square[i], status)?;

            let strength = (-0.5 * ((z - self.true_z) / 0.005).powi(2)).exp();
            let fits = catalog
                .iter()
                .enumerate()
                .map(|(j, line)| LineFit {
                    line: j,
                    element_id: ELEMENT_IDS[j],
                    amplitude: 10.0 * strength + noise.sample(&mut rng),
                    noise: 1.0,
                    fitting_error: 1.0,
                    outside_lambda_range: !line_observed(line, z),
                })
                .collect();
            result.set_solution(i, LineModelSolution { fits })?;
        }

        let templates = &self.templates;
        result.par_variant_rows_mut().for_each(|(k, row)| {
            row.copy_from_slice(&templates[k].chi_square);
        });

        result.set_continuum_norms(ContinuumNorms {
            d_transpose_d: N_PIXELS * 1.5,
            d_transpose_d_nocontinuum: N_PIXELS * 0.5,
        })?;
        Ok(result)
    }
}

/// Serves the synthetic curves through the `MeritEvaluator` interface.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticEvaluator<'a> {
    spectrum: &'a SyntheticSpectrum,
}

impl<'a> SyntheticEvaluator<'a> {
    pub fn new(spectrum: &'a SyntheticSpectrum) -> Self {
        Self { spectrum }
    }
}

impl MeritEvaluator for SyntheticEvaluator<'_> {
    fn correlation(
        &self,
        template: &str,
        grid: &RedshiftGrid,
    ) -> Result<CorrelationResult, EngineError> {
        if grid != &self.spectrum.grid {
            return Err(EngineError::invalid("grid", "does not match the synthetic spectrum grid"));
        }
        let t = self.spectrum.template(template)?;
        let curve = MeritCurve::correlation(grid, t.correlation.clone())?;
        MeritResult::new(curve).with_overlap(line_overlap(grid.as_slice()))
    }

    fn chi_square(
        &self,
        template: &str,
        redshifts: &[f64],
    ) -> Result<ChiSquareResult, EngineError> {
        let t = self.spectrum.template(template)?;
        let grid = &self.spectrum.grid;
        let mut merits = Vec::with_capacity(redshifts.len());
        for &z in redshifts {
            let Some(i) = grid.index_of(z) else {
                let message = format!("{z} is not a grid sample");
                return Err(EngineError::invalid("redshift", message));
            };
            merits.push(t.chi_square[i]);
        }
        let curve = MeritCurve::new(MeritKind::ChiSquare, redshifts.to_vec(), merits)?;
        MeritResult::new(curve).with_overlap(line_overlap(redshifts))
    }
}
