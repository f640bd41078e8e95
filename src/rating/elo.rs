//! Elo rating computation
//!
//! This module wraps the skillratings crate's Elo implementation with the
//! integer-rating conventions used by the battle ladder: deltas are rounded
//! to whole points and ratings are clamped at a configurable floor.

use crate::error::MatchmakingError;
use crate::types::Outcome;
use serde::{Deserialize, Serialize};
use skillratings::elo::{elo, expected_score, EloConfig, EloRating};
use skillratings::Outcomes;

/// Configuration for the Elo ladder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EloSettings {
    /// K-factor controlling how fast ratings move
    pub k_factor: f64,
    /// Rating assigned to new players
    pub default_rating: i32,
    /// Floor below which no rating can fall
    pub min_rating: i32,
}

impl Default for EloSettings {
    fn default() -> Self {
        Self {
            k_factor: 32.0,
            default_rating: 1200,
            min_rating: 100,
        }
    }
}

impl EloSettings {
    /// Validate configuration parameters
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.k_factor <= 0.0 {
            return Err(MatchmakingError::ConfigurationError {
                message: "K-factor must be positive".to_string(),
            }
            .into());
        }
        if self.min_rating < 0 {
            return Err(MatchmakingError::ConfigurationError {
                message: "Minimum rating cannot be negative".to_string(),
            }
            .into());
        }
        if self.default_rating < self.min_rating {
            return Err(MatchmakingError::ConfigurationError {
                message: "Default rating cannot be below the minimum rating".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl From<Outcome> for Outcomes {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Win => Outcomes::WIN,
            Outcome::Loss => Outcomes::LOSS,
            Outcome::Draw => Outcomes::DRAW,
        }
    }
}

/// Elo calculator for head-to-head battles
#[derive(Debug, Clone)]
pub struct EloCalculator {
    settings: EloSettings,
}

impl EloCalculator {
    pub fn new(settings: EloSettings) -> crate::error::Result<Self> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn default_rating(&self) -> i32 {
        self.settings.default_rating
    }

    pub fn min_rating(&self) -> i32 {
        self.settings.min_rating
    }

    /// Probability of the first player beating the second
    pub fn expected(&self, own: i32, opponent: i32) -> f64 {
        let (own_expected, _) = expected_score(
            &EloRating {
                rating: own as f64,
            },
            &EloRating {
                rating: opponent as f64,
            },
        );
        own_expected
    }

    /// Whole-point rating delta for one player, `round(K * (S - E))`
    pub fn delta(&self, own: i32, opponent: i32, outcome: Outcome) -> i32 {
        let own_rating = EloRating {
            rating: own as f64,
        };
        let opponent_rating = EloRating {
            rating: opponent as f64,
        };
        let (updated, _) = elo(
            &own_rating,
            &opponent_rating,
            &outcome.into(),
            &EloConfig {
                k: self.settings.k_factor,
            },
        );

        (updated.rating - own_rating.rating).round() as i32
    }

    /// Deltas for both sides of a battle, computed from the same pre-match
    /// snapshots. Magnitudes may differ by a point when rounding is uneven;
    /// that asymmetry is a property of rounded Elo, not a defect.
    pub fn deltas(&self, first: i32, second: i32, first_outcome: Outcome) -> (i32, i32) {
        (
            self.delta(first, second, first_outcome),
            self.delta(second, first, first_outcome.opposite()),
        )
    }

    /// Apply a delta to a rating, clamping at the floor
    pub fn clamp(&self, rating: i32, delta: i32) -> i32 {
        (rating + delta).max(self.settings.min_rating)
    }
}

impl Default for EloCalculator {
    fn default() -> Self {
        Self {
            settings: EloSettings::default(),
        }
    }
}
