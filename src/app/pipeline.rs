//! Shared pipeline logic used by the CLI commands and the integration tests.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! merit curves -> (priors) -> marginalization -> best candidates -> extrema
//!
//! The CLI can then focus on presentation (printing, plotting, exporting).

use tracing::{debug, info, warn};

use crate::data::{SyntheticEvaluator, SyntheticSpectrum, generate_spectrum};
use crate::domain::{
    BestCandidate, ExtremaResultSet, ExtremumCandidate, MeritCurve, PosteriorResult, PriorVector,
    RedshiftGrid, SolveConfig,
};
use crate::error::EngineError;
use crate::extremum::ExtremumFinder;
use crate::io::{PosteriorFile, write_posterior_json};
use crate::operator::OperatorResult;
use crate::solve::{BlindSolveSummary, BlindSolver};
use crate::stats::{PosteriorEngine, best_proba_of};
use crate::store::ResultStore;

/// All computed outputs of a single run.
#[derive(Debug)]
pub struct RunOutput {
    pub grid: RedshiftGrid,
    pub posterior: PosteriorResult,
    /// `BestProba` first, then `BestChi2`.
    pub best: Vec<BestCandidate>,
    pub extrema: ExtremaResultSet,
    /// Grid index of each extremum, same order as `extrema`.
    pub extrema_indices: Vec<usize>,
    pub n_models: usize,
    pub store: ResultStore,
    pub blind: Option<BlindSolveSummary>,
    pub spectrum: Option<SyntheticSpectrum>,
}

/// Marginalize externally computed chi-square curves.
///
/// Extrema are the peaks of the marginal posterior.
pub fn run_marginalize(
    config: &SolveConfig,
    curves: Vec<MeritCurve>,
) -> Result<RunOutput, EngineError> {
    config.validate()?;
    let grid = shared_grid(&curves)?;
    let engine = PosteriorEngine::from_config(config)?;

    let posterior = engine.marginalize(&grid, &curves, &[])?;
    let best_proba = best_proba_of(&posterior)?;
    let best = vec![best_proba, engine.best_chi2(&grid, &curves)?];
    let peaks = posterior_peaks(config, &grid, &posterior)?;

    let mut store = ResultStore::new();
    store.store_global("zPDF", OperatorResult::PosteriorMargZ(posterior.clone()));

    let output = RunOutput {
        n_models: curves.len(),
        extrema: ExtremaResultSet::from_candidates(&peaks),
        extrema_indices: peaks.iter().map(|c| c.index).collect(),
        grid,
        posterior,
        best,
        store,
        blind: None,
        spectrum: None,
    };
    export_if_requested(config, &output)?;
    Ok(output)
}

/// Synthetic end-to-end run.
///
/// 1. blind solve (correlation peaks -> chi-square at candidates) per template
/// 2. line-model result with one chi-square row per template
/// 3. optional strong-line prior
/// 4. marginalization over templates, both decision rules
/// 5. chi-square minima of the best template, enriched with line diagnostics
pub fn run_demo(config: &SolveConfig) -> Result<RunOutput, EngineError> {
    let spectrum = generate_spectrum(config)?;
    let grid = spectrum.grid.clone();
    let mut store = ResultStore::new();

    let evaluator = SyntheticEvaluator::new(&spectrum);
    let names = spectrum.template_names();
    let solver = BlindSolver::from_config(config)?;
    let blind = solver.solve(&mut store, &evaluator, &grid, &names);

    let mut line_model = spectrum.line_model(config.seed)?;
    let curves = line_model.variant_curves()?;

    let priors = if config.use_line_prior {
        let presence = line_model.strong_lines_presence(config.line_filter);
        let prior = PriorVector::strong_line_presence(&presence, config.line_prior_penalization)?;
        vec![prior; curves.len()]
    } else {
        Vec::new()
    };

    let engine = PosteriorEngine::from_config(config)?;
    let posterior = engine.marginalize(&grid, &curves, &priors)?;
    let best_proba = best_proba_of(&posterior)?;
    let best = vec![best_proba, engine.best_chi2(&grid, &curves)?];

    let range = config.range()?;
    let chi2 = line_model.chi_square();
    let minima = ExtremumFinder::new(range, config.extremum_count)
        .with_min_separation(config.min_separation)
        .find_refined_minima(grid.as_slice(), chi2, config.refine_radius)?;
    line_model.set_extrema(&minima);
    let (snr, fit) = (config.snr_threshold, config.fit_threshold);
    line_model.enrich_extrema(snr, fit, config.line_filter);
    let extrema = line_model.extrema().clone();
    let extrema_indices = (0..extrema.len())
        .filter_map(|i| line_model.extrema_index(i))
        .collect();

    info!(
        true_z = spectrum.true_z,
        best_z = best[0].redshift,
        "demo run finished"
    );

    store.store_global("linemodel", OperatorResult::LineModel(line_model));
    store.store_global("zPDF", OperatorResult::PosteriorMargZ(posterior.clone()));

    let output = RunOutput {
        n_models: curves.len(),
        grid,
        posterior,
        best,
        extrema,
        extrema_indices,
        store,
        blind: Some(blind),
        spectrum: Some(spectrum),
    };
    export_if_requested(config, &output)?;
    Ok(output)
}

/// Peaks of the marginal posterior inside the configured range.
fn posterior_peaks(
    config: &SolveConfig,
    grid: &RedshiftGrid,
    posterior: &PosteriorResult,
) -> Result<Vec<ExtremumCandidate>, EngineError> {
    let Some(range) = config.range()?.clip(&grid.range()) else {
        warn!("search range does not overlap the curve grid");
        return Ok(Vec::new());
    };
    ExtremumFinder::new(range, config.extremum_count)
        .with_min_separation(config.min_separation)
        .find(&posterior.redshifts, &posterior.log_pdf)
}

/// Every curve must sit on exactly the same redshifts; no interpolation.
fn shared_grid(curves: &[MeritCurve]) -> Result<RedshiftGrid, EngineError> {
    let Some(first) = curves.first() else {
        return Err(EngineError::EmptyInput("merit curves"));
    };
    let grid = RedshiftGrid::new(first.redshifts().to_vec())?;
    for (m, curve) in curves.iter().enumerate().skip(1) {
        if curve.redshifts() != grid.as_slice() {
            return Err(EngineError::invalid(
                "merit curves",
                format!("curve {m} is not on the same redshift grid as curve 0"),
            ));
        }
    }
    Ok(grid)
}

fn export_if_requested(config: &SolveConfig, output: &RunOutput) -> Result<(), EngineError> {
    let Some(path) = &config.export else {
        return Ok(());
    };
    let file = PosteriorFile::new(
        &output.posterior,
        output.best.clone(),
        output.extrema.clone(),
    )?;
    write_posterior_json(path, &file)?;
    debug!(path = %path.display(), "exported posterior");
    Ok(())
}
