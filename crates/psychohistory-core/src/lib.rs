//! Shared types and math for the PsychoHistory tree engine.
//!
//! Everything the layered crates exchange lives here: the tree data model,
//! the streamed event union, the error taxonomy, probability normalization,
//! and process settings.

pub mod error;
pub mod probability;
pub mod settings;
pub mod types;

pub use error::{PsychoHistoryError, Result};
pub use settings::Settings;
pub use types::*;
