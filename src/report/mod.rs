//! Reporting: text summaries of a run.

pub mod format;

pub use format::*;
