//! Rating system built on the Elo model from the skillratings crate
//!
//! This module provides Elo delta computation, rating record storage, and
//! the updater that turns completed battles into rating adjustments.

pub mod elo;
pub mod store;
pub mod updater;

// Re-export commonly used types
pub use elo::{EloCalculator, EloSettings};
pub use store::{BattleOutcome, InMemoryRatingStore, RatingRecord, RatingStore};
pub use updater::RatingUpdater;
