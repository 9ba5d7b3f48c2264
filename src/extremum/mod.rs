//! Candidate redshift search.
//!
//! Responsibilities:
//!
//! - locate local maxima (or minima) of a merit curve inside a redshift range
//! - cap and de-duplicate them (max count, minimum separation)
//! - refine each coarse candidate in a narrow window

pub mod finder;

pub use finder::*;
