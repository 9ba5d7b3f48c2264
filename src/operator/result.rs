//! Result kinds produced by the operators, and their text form.
//!
//! Every kind writes the same layout: a `#Redshifts\t<Label>` header, one
//! tab-separated row per sample, then `#`-prefixed metadata lines. Merit
//! values use scientific notation with round-trip precision.

use std::io::Write;

use crate::domain::{MeritCurve, PosteriorResult};
use crate::error::EngineError;
use crate::operator::linemodel::LineModelResult;

/// Merit curve plus the spectrum/template overlap at each redshift.
#[derive(Debug, Clone, PartialEq)]
pub struct MeritResult {
    pub curve: MeritCurve,
    /// Overlap fraction per sample (empty when not computed).
    pub overlap: Vec<f64>,
}

pub type CorrelationResult = MeritResult;
pub type ChiSquareResult = MeritResult;

impl MeritResult {
    pub fn new(curve: MeritCurve) -> Self {
        Self {
            curve,
            overlap: Vec::new(),
        }
    }

    pub fn with_overlap(mut self, overlap: Vec<f64>) -> Result<Self, EngineError> {
        if overlap.len() != self.curve.len() {
            return Err(EngineError::LengthMismatch {
                what: "overlap",
                expected: self.curve.len(),
                found: overlap.len(),
            });
        }
        self.overlap = overlap;
        Ok(self)
    }
}

/// Closed set of storable results.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorResult {
    Correlation(CorrelationResult),
    ChiSquare(ChiSquareResult),
    LineModel(LineModelResult),
    PosteriorMargZ(PosteriorResult),
}

impl OperatorResult {
    pub fn kind_name(&self) -> &'static str {
        match self {
            OperatorResult::Correlation(_) => "CorrelationResult",
            OperatorResult::ChiSquare(_) => "ChisquareResult",
            OperatorResult::LineModel(_) => "LineModelResult",
            OperatorResult::PosteriorMargZ(_) => "PdfMargZResult",
        }
    }

    /// Number of redshift samples held.
    pub fn len(&self) -> usize {
        match self {
            OperatorResult::Correlation(r) | OperatorResult::ChiSquare(r) => r.curve.len(),
            OperatorResult::LineModel(r) => r.len(),
            OperatorResult::PosteriorMargZ(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Full table.
    pub fn save<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        match self {
            OperatorResult::Correlation(r) | OperatorResult::ChiSquare(r) => {
                let curve = &r.curve;
                write_table(out, curve.kind().label(), curve.redshifts(), curve.merits())?;
                if !r.overlap.is_empty() {
                    write_brace_line(out, "Overlap", &r.overlap)?;
                }
            }
            OperatorResult::LineModel(r) => {
                write_table(out, "ChiSquare", r.redshifts().as_slice(), r.chi_square())?;
                let extrema = r.extrema();
                if !extrema.is_empty() {
                    write_brace_line(out, "Extrema for z", &extrema.redshifts())?;
                    let merits: Vec<f64> = extrema.entries.iter().map(|e| e.merit).collect();
                    write_brace_line(out, "ExtremaMerit", &merits)?;
                }
                if let Some(norms) = r.continuum_norms() {
                    let nocontinuum = [norms.d_transpose_d_nocontinuum];
                    write_brace_line(out, "dTransposeDNocontinuum", &nocontinuum)?;
                    write_brace_line(out, "dTransposeD", &[norms.d_transpose_d])?;
                }
            }
            OperatorResult::PosteriorMargZ(r) => {
                write_table(out, "LogPdf", &r.redshifts, &r.log_pdf)?;
                writeln!(out, "#LogEvidence = {:e}", r.log_evidence)?;
            }
        }
        Ok(())
    }

    /// One-line summary: `<Kind>\t<samples>`.
    pub fn save_line<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(out, "{}\t{}", self.kind_name(), self.len())
    }
}

fn write_table<W: Write>(
    out: &mut W,
    label: &str,
    redshifts: &[f64],
    values: &[f64],
) -> std::io::Result<()> {
    writeln!(out, "#Redshifts\t{label}")?;
    for (z, v) in redshifts.iter().zip(values) {
        writeln!(out, "{z}\t{v:e}")?;
    }
    Ok(())
}

fn write_brace_line<W: Write>(out: &mut W, name: &str, values: &[f64]) -> std::io::Result<()> {
    write!(out, "#{name} = {{")?;
    for v in values {
        write!(out, "{v}\t")?;
    }
    writeln!(out, "}}")
}
