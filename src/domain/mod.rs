//! Domain types used throughout the engine.
//!
//! This module defines:
//!
//! - the shared redshift grid and ranges (`RedshiftGrid`, `RedshiftRange`)
//! - per-template inputs (`MeritCurve`, `PriorVector`, `SampleStatus`)
//! - engine outputs (`PosteriorResult`, `BestCandidate`, `ExtremaResultSet`)
//! - the run configuration (`SolveConfig`)

pub mod types;

pub use types::*;
