//! Data sources for runs without real fitting output.

pub mod synth;

pub use synth::*;
