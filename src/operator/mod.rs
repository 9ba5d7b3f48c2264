//! Operator results: what the fitting stage hands over to the engine.
//!
//! - per-redshift line-model accumulator (`linemodel`)
//! - the closed set of storable result kinds and their text form (`result`)

pub mod linemodel;
pub mod result;

pub use linemodel::*;
pub use result::*;
