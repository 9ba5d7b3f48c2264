//! Solve orchestration over a template catalog.

pub mod blind;

pub use blind::*;
