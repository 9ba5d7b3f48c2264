//! Numeric utilities: grid construction and log-domain sums.

pub mod grid;
pub mod logsum;

pub use grid::*;
pub use logsum::*;
