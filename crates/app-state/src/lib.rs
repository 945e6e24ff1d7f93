//! Presentation-layer state for twinprefs
//!
//! This crate adapts a preference backend behind the repository interface
//! and folds its observable streams into a per-screen state snapshot.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod repository;
pub mod screen;

pub use repository::{PreferenceRepository, UserPreferencesRepository};
pub use screen::{ErrorMessage, PreferenceScreenModel, PreferenceScreenState};
