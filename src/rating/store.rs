//! Rating record storage
//!
//! This module defines the persisted per-player rating state and the
//! storage interface the rating updater writes through.

use crate::error::MatchmakingError;
use crate::types::{GameMode, Outcome, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Win/loss/draw counters for one game mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeStats {
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
}

impl ModeStats {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Win => self.wins += 1,
            Outcome::Loss => self.losses += 1,
            Outcome::Draw => self.draws += 1,
        }
    }
}

/// Persisted rating state for one player
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingRecord {
    pub user_id: UserId,
    /// One rating per game mode, keyed by the mode enum
    pub ratings: HashMap<GameMode, i32>,
    pub stats: HashMap<GameMode, ModeStats>,
    /// Consecutive wins across all modes; reset on any non-win
    pub win_streak: u32,
    pub total_battles: u64,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl RatingRecord {
    /// Create a fresh record with the default rating on every ladder
    pub fn new(user_id: UserId, default_rating: i32) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            ratings: GameMode::ALL
                .iter()
                .map(|mode| (*mode, default_rating))
                .collect(),
            stats: GameMode::ALL
                .iter()
                .map(|mode| (*mode, ModeStats::default()))
                .collect(),
            win_streak: 0,
            total_battles: 0,
            created_at: now,
            last_updated: now,
        }
    }

    /// Current rating for a mode
    pub fn rating(&self, mode: GameMode) -> i32 {
        self.ratings.get(&mode).copied().unwrap_or_default()
    }

    pub fn mode_stats(&self, mode: GameMode) -> ModeStats {
        self.stats.get(&mode).copied().unwrap_or_default()
    }

    /// Apply one battle's outcome: move the mode rating by `delta`
    /// (clamped at `min_rating`), bump the counters and the win streak.
    pub fn apply(&mut self, mode: GameMode, delta: i32, outcome: Outcome, min_rating: i32) {
        let rating = self.ratings.entry(mode).or_default();
        *rating = (*rating + delta).max(min_rating);

        self.stats.entry(mode).or_default().record(outcome);
        self.win_streak = match outcome {
            Outcome::Win => self.win_streak + 1,
            _ => 0,
        };
        self.total_battles += 1;
        self.last_updated = Utc::now();
    }
}

/// One player's share of a completed battle, as applied to their record
#[derive(Debug, Clone)]
pub struct BattleOutcome {
    pub user_id: UserId,
    pub mode: GameMode,
    pub delta: i32,
    pub outcome: Outcome,
}

/// Trait for rating storage operations
pub trait RatingStore: Send + Sync {
    /// Get a player's rating record
    fn get(&self, user_id: &str) -> crate::error::Result<Option<RatingRecord>>;

    /// Get a player's record, creating it lazily with the default rating
    fn get_or_create(&self, user_id: &str) -> crate::error::Result<RatingRecord>;

    /// Apply every outcome of one battle in a single atomic step and
    /// return the updated records. Missing records are created lazily.
    /// Implementations must apply all outcomes or none.
    fn apply_outcomes(
        &self,
        outcomes: &[BattleOutcome],
    ) -> crate::error::Result<Vec<RatingRecord>>;

    /// Total number of rated players
    fn count(&self) -> crate::error::Result<usize>;
}

/// In-memory rating store implementation
#[derive(Debug)]
pub struct InMemoryRatingStore {
    records: RwLock<HashMap<UserId, RatingRecord>>,
    default_rating: i32,
    min_rating: i32,
}

impl InMemoryRatingStore {
    pub fn new(default_rating: i32, min_rating: i32) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            default_rating,
            min_rating,
        }
    }
}

impl Default for InMemoryRatingStore {
    fn default() -> Self {
        Self::new(1200, 100)
    }
}

impl RatingStore for InMemoryRatingStore {
    fn get(&self, user_id: &str) -> crate::error::Result<Option<RatingRecord>> {
        let records = self
            .records
            .read()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire ratings read lock".to_string(),
            })?;

        Ok(records.get(user_id).cloned())
    }

    fn get_or_create(&self, user_id: &str) -> crate::error::Result<RatingRecord> {
        let mut records = self
            .records
            .write()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire ratings write lock".to_string(),
            })?;

        Ok(records
            .entry(user_id.to_string())
            .or_insert_with(|| RatingRecord::new(user_id.to_string(), self.default_rating))
            .clone())
    }

    fn apply_outcomes(
        &self,
        outcomes: &[BattleOutcome],
    ) -> crate::error::Result<Vec<RatingRecord>> {
        // One write-lock acquisition covers every record touched by the
        // battle, so a reader never observes one side updated without the
        // other. A database-backed store would use a transaction here.
        let mut records = self
            .records
            .write()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire ratings write lock".to_string(),
            })?;

        let mut updated = Vec::with_capacity(outcomes.len());
        for change in outcomes {
            let record = records
                .entry(change.user_id.clone())
                .or_insert_with(|| {
                    RatingRecord::new(change.user_id.clone(), self.default_rating)
                });
            record.apply(change.mode, change.delta, change.outcome, self.min_rating);
            updated.push(record.clone());
        }

        Ok(updated)
    }

    fn count(&self) -> crate::error::Result<usize> {
        let records = self
            .records
            .read()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire ratings read lock".to_string(),
            })?;

        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(user_id: &str, delta: i32, result: Outcome) -> BattleOutcome {
        BattleOutcome {
            user_id: user_id.to_string(),
            mode: GameMode::Standard,
            delta,
            outcome: result,
        }
    }

    #[test]
    fn test_new_record_defaults() {
        let record = RatingRecord::new("alice".to_string(), 1200);
        for mode in GameMode::ALL {
            assert_eq!(record.rating(mode), 1200);
            assert_eq!(record.mode_stats(mode), ModeStats::default());
        }
        assert_eq!(record.win_streak, 0);
        assert_eq!(record.total_battles, 0);
    }

    #[test]
    fn test_apply_win_and_loss() {
        let mut record = RatingRecord::new("alice".to_string(), 1200);

        record.apply(GameMode::Standard, 16, Outcome::Win, 100);
        assert_eq!(record.rating(GameMode::Standard), 1216);
        assert_eq!(record.mode_stats(GameMode::Standard).wins, 1);
        assert_eq!(record.win_streak, 1);
        assert_eq!(record.total_battles, 1);

        // Other ladders are untouched
        assert_eq!(record.rating(GameMode::Sprint), 1200);

        record.apply(GameMode::Standard, -16, Outcome::Loss, 100);
        assert_eq!(record.rating(GameMode::Standard), 1200);
        assert_eq!(record.mode_stats(GameMode::Standard).losses, 1);
        assert_eq!(record.win_streak, 0);
        assert_eq!(record.total_battles, 2);
    }

    #[test]
    fn test_win_streak_resets_on_draw() {
        let mut record = RatingRecord::new("alice".to_string(), 1200);
        record.apply(GameMode::Sprint, 16, Outcome::Win, 100);
        record.apply(GameMode::Standard, 16, Outcome::Win, 100);
        assert_eq!(record.win_streak, 2);

        record.apply(GameMode::Standard, 0, Outcome::Draw, 100);
        assert_eq!(record.win_streak, 0);
        assert_eq!(record.mode_stats(GameMode::Standard).draws, 1);
    }

    #[test]
    fn test_rating_floor_holds() {
        let mut record = RatingRecord::new("alice".to_string(), 1200);
        for _ in 0..100 {
            record.apply(GameMode::Standard, -50, Outcome::Loss, 100);
        }
        assert_eq!(record.rating(GameMode::Standard), 100);
    }

    #[test]
    fn test_get_or_create_is_lazy() {
        let store = InMemoryRatingStore::default();
        assert!(store.get("alice").unwrap().is_none());

        let record = store.get_or_create("alice").unwrap();
        assert_eq!(record.rating(GameMode::Standard), 1200);
        assert_eq!(store.count().unwrap(), 1);

        // Second call returns the same record, not a fresh one
        let again = store.get_or_create("alice").unwrap();
        assert_eq!(again.created_at, record.created_at);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_apply_outcomes_updates_both_records() {
        let store = InMemoryRatingStore::default();

        let updated = store
            .apply_outcomes(&[
                outcome("alice", 16, Outcome::Win),
                outcome("bob", -16, Outcome::Loss),
            ])
            .unwrap();

        assert_eq!(updated.len(), 2);
        assert_eq!(updated[0].rating(GameMode::Standard), 1216);
        assert_eq!(updated[1].rating(GameMode::Standard), 1184);

        // Records were created lazily
        assert_eq!(store.count().unwrap(), 2);
        let bob = store.get("bob").unwrap().unwrap();
        assert_eq!(bob.total_battles, 1);
        assert_eq!(bob.mode_stats(GameMode::Standard).losses, 1);
    }

    #[test]
    fn test_apply_outcomes_clamps_at_floor() {
        let store = InMemoryRatingStore::new(1200, 100);

        // Pre-drive a record down to the floor
        for _ in 0..80 {
            store
                .apply_outcomes(&[outcome("alice", -50, Outcome::Loss)])
                .unwrap();
        }

        let record = store.get("alice").unwrap().unwrap();
        assert_eq!(record.rating(GameMode::Standard), 100);
    }
}
