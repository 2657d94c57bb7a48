//! Localization state reported by the engine and the tracker holding it.

pub mod state;
pub mod tracker;

pub use state::{LocalizationFailureReason, LocalizationState, LocalizationStateUpdate};
pub use tracker::LocalizationTracker;
