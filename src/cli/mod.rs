//! Command-line parsing for the redshift posterior tool.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the numeric code.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::domain::{LineTypeFilter, MeritKind};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "zpdf",
    version,
    about = "Redshift posterior marginalization and candidate search"
)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Marginalize chi-square curves into one posterior and print both best redshifts.
    Marginalize(MarginalizeArgs),
    /// Coarse + refined peak search on a single merit curve.
    Extrema(ExtremaArgs),
    /// Synthetic end-to-end run: blind solve, line model, priors, posterior.
    Demo(DemoArgs),
    /// Plot a previously exported posterior JSON.
    Plot(PlotArgs),
}

/// Options shared by commands that draw or export a posterior.
#[derive(Debug, Parser, Clone)]
pub struct OutputArgs {
    /// Render an ASCII plot in the terminal.
    #[arg(long)]
    pub plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,

    /// Export the posterior (grid, log-pdf, evidence, candidates) to JSON.
    #[arg(long, value_name = "JSON")]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct MarginalizeArgs {
    /// Chi-square table per model (`#Redshifts\tChiSquare` layout), all on one grid.
    #[arg(long = "curve", value_name = "FILE", required = true, num_args = 1..)]
    pub curves: Vec<PathBuf>,

    /// Prior weight per model, in the same order as `--curve` (default: uniform).
    #[arg(long = "model-prior", value_name = "W", num_args = 1..)]
    pub model_priors: Vec<f64>,

    /// Redshift-independent log-likelihood offset.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub cst_log: f64,

    /// Number of posterior peaks to report.
    #[arg(long, default_value_t = 5)]
    pub count: usize,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Parser, Clone)]
pub struct ExtremaArgs {
    /// Merit table to search.
    #[arg(long, value_name = "FILE")]
    pub curve: PathBuf,

    /// Correlation peaks are searched as maxima, chi-square wells as minima.
    #[arg(long, value_enum, default_value_t = MeritKind::Correlation)]
    pub kind: MeritKind,

    /// Maximum number of candidates.
    #[arg(long, default_value_t = 5)]
    pub count: usize,

    /// Lower bound of the search range (default: first grid sample).
    #[arg(long)]
    pub min_z: Option<f64>,

    /// Upper bound of the search range (default: last grid sample).
    #[arg(long)]
    pub max_z: Option<f64>,

    /// Minimum index distance between candidates.
    #[arg(long, default_value_t = 1)]
    pub min_separation: usize,

    /// Refinement half-width in redshift (0 keeps the coarse candidates).
    #[arg(long, default_value_t = 0.001)]
    pub radius: f64,

    /// Render the curve with its candidates.
    #[arg(long)]
    pub plot: bool,

    #[arg(long, default_value_t = 100)]
    pub width: usize,

    #[arg(long, default_value_t = 20)]
    pub height: usize,
}

#[derive(Debug, Parser, Clone)]
pub struct DemoArgs {
    /// Random seed for the synthetic curves.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Number of synthetic templates.
    #[arg(long, default_value_t = 3)]
    pub templates: usize,

    #[arg(long, default_value_t = 0.0)]
    pub min_z: f64,

    #[arg(long, default_value_t = 3.0)]
    pub max_z: f64,

    /// Grid step in redshift (in `ln(1 + z)` with `--log-grid`).
    #[arg(long, default_value_t = 0.0005)]
    pub step: f64,

    /// Space the grid uniformly in `ln(1 + z)`.
    #[arg(long)]
    pub log_grid: bool,

    /// Maximum number of extrema per search.
    #[arg(long, default_value_t = 5)]
    pub count: usize,

    /// Minimum index distance between extrema.
    #[arg(long, default_value_t = 1)]
    pub min_separation: usize,

    /// Refinement half-width in redshift.
    #[arg(long, default_value_t = 0.001)]
    pub radius: f64,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub cst_log: f64,

    /// Weight the posterior toward redshifts where a strong line is observable.
    #[arg(long)]
    pub line_prior: bool,

    /// Prior weight (before normalization) where no strong line is present.
    #[arg(long, default_value_t = 0.1)]
    pub penalization: f64,

    /// Which strong lines count for the line prior and presence flags.
    #[arg(long, value_enum, default_value_t = LineTypeFilter::All)]
    pub line_filter: LineTypeFilter,

    /// Line SNR cut for the extrema diagnostics.
    #[arg(long, default_value_t = 3.5)]
    pub snr: f64,

    /// Line fit-quality cut for the extrema diagnostics.
    #[arg(long, default_value_t = 1.0)]
    pub fit_threshold: f64,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Options for plotting a saved posterior.
#[derive(Debug, Parser)]
pub struct PlotArgs {
    /// Posterior JSON file produced by `--export`.
    #[arg(long, value_name = "JSON")]
    pub posterior: PathBuf,

    /// Plot normalized probabilities instead of the log-pdf.
    #[arg(long)]
    pub probability: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 20)]
    pub height: usize,
}
