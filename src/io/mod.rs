//! Input/output helpers.
//!
//! - merit-curve text tables (`merit`)
//! - posterior JSON export (`export`)

pub mod export;
pub mod merit;

pub use export::*;
pub use merit::*;
