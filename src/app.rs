//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - installs the log subscriber
//! - reads merit curves or generates synthetic ones
//! - runs the pipeline and prints reports/plots
//! - writes optional exports

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, DemoArgs, ExtremaArgs, MarginalizeArgs, PlotArgs};
use crate::domain::{DecisionRule, MeritKind, RedshiftRange, SolveConfig};
use crate::error::{AppError, EngineError};
use crate::extremum::ExtremumFinder;
use crate::io::{read_merit_curve, read_posterior_json};
use crate::plot::{PosteriorScale, render_merit_plot, render_posterior_plot};
use crate::report::{format_blind_summary, format_candidates, format_extrema, format_run_summary};

pub mod pipeline;

/// Entry point for the `zpdf` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Marginalize(args) => handle_marginalize(args),
        Command::Extrema(args) => handle_extrema(args),
        Command::Demo(args) => handle_demo(args),
        Command::Plot(args) => handle_plot(args),
    }
}

/// Logs go to stderr so stdout stays clean for results.
///
/// `RUST_LOG` wins when set; otherwise `-v` / `-vv` raise the default `warn`.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A second init (e.g. from tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn handle_marginalize(args: MarginalizeArgs) -> Result<(), AppError> {
    let config = config_from_marginalize_args(&args);
    config.validate()?;

    let curves = args
        .curves
        .iter()
        .map(|path| read_merit_curve(path, MeritKind::ChiSquare))
        .collect::<Result<Vec<_>, EngineError>>()?;
    let run = pipeline::run_marginalize(&config, curves)?;

    let summary = format_run_summary("marginalize", &run.posterior, run.n_models, &config);
    println!("{summary}");
    println!("{}", format_candidates(&run.best));
    println!("{}", format_extrema(&run.extrema));

    if config.plot {
        let marks = best_proba_marks(&run.best);
        let plot = render_posterior_plot(
            &run.posterior,
            &marks,
            PosteriorScale::LogPdf,
            config.plot_width,
            config.plot_height,
        );
        println!("{plot}");
    }
    Ok(())
}

fn handle_extrema(args: ExtremaArgs) -> Result<(), AppError> {
    let curve = read_merit_curve(&args.curve, args.kind)?;
    let (first, last) = match (curve.redshifts().first(), curve.redshifts().last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return Err(EngineError::EmptyInput("merit curve").into()),
    };
    let range = RedshiftRange::new(args.min_z.unwrap_or(first), args.max_z.unwrap_or(last))?;

    let finder = ExtremumFinder::new(range, args.count).with_min_separation(args.min_separation);
    let (z, merits) = (curve.redshifts(), curve.merits());
    let candidates = if args.kind.higher_is_better() {
        finder.find_refined(z, merits, args.radius)?
    } else {
        finder.find_refined_minima(z, merits, args.radius)?
    };

    let (n, begin, end) = (candidates.len(), range.begin, range.end);
    println!("{n} candidates in z=[{begin:.5}, {end:.5}]:");
    for (i, c) in candidates.iter().enumerate() {
        let (index, z, merit) = (c.index, c.position, c.value);
        println!("{i:>4} index={index:<8} z={z:.6} merit={merit:.6}");
    }

    if args.plot {
        println!();
        let plot = render_merit_plot(&curve, &candidates, args.width, args.height);
        println!("{plot}");
    }
    Ok(())
}

fn handle_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = config_from_demo_args(&args);
    let run = pipeline::run_demo(&config)?;

    let summary = format_run_summary("demo", &run.posterior, run.n_models, &config);
    println!("{summary}");
    if let Some(spectrum) = &run.spectrum {
        println!("True redshift: {:.5}\n", spectrum.true_z);
    }
    if let Some(blind) = &run.blind {
        println!("{}", format_blind_summary(blind));
    }
    println!("{}", format_candidates(&run.best));
    println!("{}", format_extrema(&run.extrema));

    if config.plot {
        let marks = best_proba_marks(&run.best);
        let plot = render_posterior_plot(
            &run.posterior,
            &marks,
            PosteriorScale::LogPdf,
            config.plot_width,
            config.plot_height,
        );
        println!("{plot}");
    }
    Ok(())
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let file = read_posterior_json(&args.posterior)?;
    let posterior = file.posterior()?;
    let marks = best_proba_marks(&file.best);
    let scale = if args.probability {
        PosteriorScale::Probability
    } else {
        PosteriorScale::LogPdf
    };

    let plot = render_posterior_plot(&posterior, &marks, scale, args.width, args.height);
    println!("{plot}");
    Ok(())
}

fn best_proba_marks(best: &[crate::domain::BestCandidate]) -> Vec<usize> {
    best.iter()
        .filter(|b| b.rule == DecisionRule::BestProba)
        .map(|b| b.index)
        .collect()
}

pub fn config_from_marginalize_args(args: &MarginalizeArgs) -> SolveConfig {
    // The search covers whatever grid the curves were sampled on.
    SolveConfig {
        z_min: -1.0,
        z_max: f64::MAX,
        extremum_count: args.count,
        cst_log: args.cst_log,
        model_priors: args.model_priors.clone(),
        plot: args.output.plot,
        plot_width: args.output.width,
        plot_height: args.output.height,
        export: args.output.export.clone(),
        ..SolveConfig::default()
    }
}

pub fn config_from_demo_args(args: &DemoArgs) -> SolveConfig {
    SolveConfig {
        z_min: args.min_z,
        z_max: args.max_z,
        z_step: args.step,
        log_grid: args.log_grid,
        extremum_count: args.count,
        min_separation: args.min_separation,
        refine_radius: args.radius,
        cst_log: args.cst_log,
        model_priors: Vec::new(),
        line_prior_penalization: args.penalization,
        use_line_prior: args.line_prior,
        snr_threshold: args.snr,
        fit_threshold: args.fit_threshold,
        line_filter: args.line_filter,
        plot: args.output.plot,
        plot_width: args.output.width,
        plot_height: args.output.height,
        export: args.output.export.clone(),
        seed: args.seed,
        template_count: args.templates,
    }
}
