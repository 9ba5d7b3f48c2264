//! `redshift-pdf` library crate.
//!
//! Turns per-template merit curves (chi-square or correlation over a redshift
//! grid) into a redshift posterior and best-redshift candidates.
//!
//! The binary (`zpdf`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the engine can be embedded in a larger fitting pipeline
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod extremum;
pub mod io;
pub mod math;
pub mod operator;
pub mod plot;
pub mod report;
pub mod solve;
pub mod stats;
pub mod store;
