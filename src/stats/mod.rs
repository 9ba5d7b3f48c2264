//! Posterior construction: priors, marginalization, and best-redshift rules.

pub mod pdfz;
pub mod prior;

pub use pdfz::*;
