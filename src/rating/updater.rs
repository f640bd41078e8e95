//! Rating updater
//!
//! Turns a completed battle into symmetric Elo adjustments: decides each
//! participant's outcome from the recorded winner, computes both deltas
//! from the pre-match rating snapshots, writes them to the rating store in
//! one atomic step, stamps the deltas onto the session exactly once, and
//! publishes the resulting events.

use crate::amqp::publisher::EventPublisher;
use crate::error::{MatchmakingError, Result};
use crate::metrics::MetricsCollector;
use crate::rating::elo::EloCalculator;
use crate::rating::store::{BattleOutcome, RatingStore};
use crate::session::SessionStore;
use crate::types::{
    BattleCompleted, BattleKind, BattleResults, BattleSession, RatingChange, RatingsUpdated,
    SessionId, UserId,
};
use crate::utils::current_timestamp;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The rating updater
pub struct RatingUpdater {
    ratings: Arc<dyn RatingStore>,
    sessions: Arc<dyn SessionStore>,
    event_publisher: Arc<dyn EventPublisher>,
    calculator: EloCalculator,
    metrics: Arc<MetricsCollector>,
}

impl RatingUpdater {
    pub fn new(
        ratings: Arc<dyn RatingStore>,
        sessions: Arc<dyn SessionStore>,
        event_publisher: Arc<dyn EventPublisher>,
        calculator: EloCalculator,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            ratings,
            sessions,
            event_publisher,
            calculator,
            metrics,
        }
    }

    pub fn calculator(&self) -> &EloCalculator {
        &self.calculator
    }

    /// Complete a battle: record results and the winner on the session,
    /// then apply rating updates when the battle is ranked. Retries are
    /// safe; the session completes once and deltas are applied once.
    pub async fn complete_battle(
        &self,
        session_id: SessionId,
        results: HashMap<UserId, BattleResults>,
    ) -> Result<(BattleSession, Vec<RatingChange>)> {
        let already_completed = self
            .sessions
            .get(session_id)?
            .map(|s| s.is_completed())
            .unwrap_or(false);

        let session = self.sessions.complete(session_id, results)?;

        // A retried completion observes the stored result; events and
        // metrics fire only on the first transition
        if !already_completed {
            info!(
                "Battle {} completed, winner: {}",
                session.id,
                session.winner.as_deref().unwrap_or("none (draw)")
            );
            self.metrics
                .record_battle_completed(session.game_mode, session.kind);

            if let Err(e) = self
                .event_publisher
                .publish_battle_completed(BattleCompleted {
                    session_id: session.id,
                    game_mode: session.game_mode,
                    winner: session.winner.clone(),
                    timestamp: current_timestamp(),
                })
                .await
            {
                warn!(
                    "Failed to publish battle-completed for {}: {}",
                    session.id, e
                );
            }
        }

        let changes = match session.kind {
            BattleKind::Ranked => self.apply_completed(&session).await?,
            BattleKind::Friendly => {
                debug!("Friendly battle {}, ratings untouched", session.id);
                Vec::new()
            }
        };

        // Return the session as it stands after delta stamping
        let session = self
            .sessions
            .get(session_id)?
            .ok_or_else(|| MatchmakingError::SessionNotFound {
                session_id: session_id.to_string(),
            })?;

        Ok((session, changes))
    }

    /// Apply Elo updates for a completed ranked session. Idempotent: if
    /// deltas were already stamped onto the session, the recorded changes
    /// are reconstructed and returned without touching the store again.
    pub async fn apply_completed(&self, session: &BattleSession) -> Result<Vec<RatingChange>> {
        if !session.is_completed() {
            return Err(MatchmakingError::SessionNotCompleted {
                session_id: session.id.to_string(),
            }
            .into());
        }

        if session.deltas_applied() {
            debug!(
                "Ratings already applied for session {}, returning recorded deltas",
                session.id
            );
            return self.recorded_changes(session);
        }

        let [first, second] = &session.participants;
        let first_outcome =
            session
                .outcome_for(&first.user_id)
                .ok_or_else(|| MatchmakingError::InternalError {
                    message: format!("Completed session {} has no outcome", session.id),
                })?;
        let second_outcome = first_outcome.opposite();

        // Both deltas come from the same pre-match snapshots, so the
        // computation is order-independent
        let (first_delta, second_delta) = self.calculator.deltas(
            first.starting_rating,
            second.starting_rating,
            first_outcome,
        );

        // Lazily created records and both updates land in one store call
        let updated = self.ratings.apply_outcomes(&[
            BattleOutcome {
                user_id: first.user_id.clone(),
                mode: session.game_mode,
                delta: first_delta,
                outcome: first_outcome,
            },
            BattleOutcome {
                user_id: second.user_id.clone(),
                mode: session.game_mode,
                delta: second_delta,
                outcome: second_outcome,
            },
        ])?;

        self.sessions.set_rating_deltas(
            session.id,
            &[
                (first.user_id.clone(), first_delta),
                (second.user_id.clone(), second_delta),
            ],
        )?;

        let changes: Vec<RatingChange> = [
            (first, first_delta, first_outcome),
            (second, second_delta, second_outcome),
        ]
        .into_iter()
        .map(|(participant, delta, outcome)| {
            let new_rating = updated
                .iter()
                .find(|record| record.user_id == participant.user_id)
                .map(|record| record.rating(session.game_mode))
                .unwrap_or_else(|| self.calculator.clamp(participant.starting_rating, delta));

            RatingChange {
                user_id: participant.user_id.clone(),
                old_rating: participant.starting_rating,
                new_rating,
                delta,
                outcome,
            }
        })
        .collect();

        for change in &changes {
            info!(
                "Rating update for '{}': {} -> {} ({:+}) after {:?}",
                change.user_id, change.old_rating, change.new_rating, change.delta, change.outcome
            );
            self.metrics.record_rating_update(change.delta);
        }

        if let Err(e) = self
            .event_publisher
            .publish_ratings_updated(RatingsUpdated {
                session_id: session.id,
                game_mode: session.game_mode,
                changes: changes.clone(),
                timestamp: current_timestamp(),
            })
            .await
        {
            warn!(
                "Failed to publish ratings-updated for {}: {}",
                session.id, e
            );
        }

        Ok(changes)
    }

    /// Rebuild the rating changes a previous application produced, from
    /// the deltas stamped on the session and the current records
    fn recorded_changes(&self, session: &BattleSession) -> Result<Vec<RatingChange>> {
        session
            .participants
            .iter()
            .map(|participant| {
                let delta =
                    participant
                        .rating_delta
                        .ok_or_else(|| MatchmakingError::InternalError {
                            message: format!(
                                "Session {} participant {} is missing a recorded delta",
                                session.id, participant.user_id
                            ),
                        })?;
                let outcome = session.outcome_for(&participant.user_id).ok_or_else(|| {
                    MatchmakingError::InternalError {
                        message: format!("Completed session {} has no outcome", session.id),
                    }
                })?;

                Ok(RatingChange {
                    user_id: participant.user_id.clone(),
                    old_rating: participant.starting_rating,
                    new_rating: self
                        .calculator
                        .clamp(participant.starting_rating, delta),
                    delta,
                    outcome,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amqp::publisher::MockEventPublisher;
    use crate::rating::elo::EloSettings;
    use crate::rating::store::InMemoryRatingStore;
    use crate::session::{InMemorySessionStore, SessionStore};
    use crate::types::{GameMode, Outcome, Participant};

    struct TestSystem {
        updater: RatingUpdater,
        ratings: Arc<InMemoryRatingStore>,
        sessions: Arc<InMemorySessionStore>,
        publisher: Arc<MockEventPublisher>,
    }

    fn create_test_system() -> TestSystem {
        let ratings = Arc::new(InMemoryRatingStore::default());
        let sessions = Arc::new(InMemorySessionStore::new());
        let publisher = Arc::new(MockEventPublisher::new());

        let updater = RatingUpdater::new(
            ratings.clone(),
            sessions.clone(),
            publisher.clone(),
            EloCalculator::new(EloSettings::default()).unwrap(),
            Arc::new(MetricsCollector::default()),
        );

        TestSystem {
            updater,
            ratings,
            sessions,
            publisher,
        }
    }

    fn insert_session(system: &TestSystem, kind: BattleKind, first: i32, second: i32) -> SessionId {
        let session = BattleSession::new(
            GameMode::Standard,
            kind,
            Participant::new("alice".to_string(), "Alice".to_string(), first),
            Participant::new("bob".to_string(), "Bob".to_string(), second),
        );
        let id = session.id;
        system.sessions.insert(session).unwrap();
        id
    }

    fn results(alice: f64, bob: f64) -> HashMap<UserId, BattleResults> {
        HashMap::from([
            (
                "alice".to_string(),
                BattleResults {
                    final_value: alice,
                    return_pct: (alice - 10_000.0) / 100.0,
                    trade_count: 5,
                    max_drawdown_pct: 3.0,
                },
            ),
            (
                "bob".to_string(),
                BattleResults {
                    final_value: bob,
                    return_pct: (bob - 10_000.0) / 100.0,
                    trade_count: 7,
                    max_drawdown_pct: 4.5,
                },
            ),
        ])
    }

    #[tokio::test]
    async fn test_ranked_completion_moves_ratings() {
        let system = create_test_system();
        let id = insert_session(&system, BattleKind::Ranked, 1200, 1200);

        let (session, changes) = system
            .updater
            .complete_battle(id, results(11_000.0, 10_500.0))
            .await
            .unwrap();

        assert_eq!(session.winner, Some("alice".to_string()));
        assert_eq!(changes.len(), 2);

        let alice = &changes[0];
        assert_eq!(alice.user_id, "alice");
        assert_eq!(alice.delta, 16);
        assert_eq!(alice.new_rating, 1216);
        assert_eq!(alice.outcome, Outcome::Win);

        let bob = &changes[1];
        assert_eq!(bob.delta, -16);
        assert_eq!(bob.new_rating, 1184);

        // Records were created lazily and updated
        let record = system.ratings.get("alice").unwrap().unwrap();
        assert_eq!(record.rating(GameMode::Standard), 1216);
        assert_eq!(record.total_battles, 1);
        assert_eq!(record.win_streak, 1);

        // Deltas stamped onto the session
        assert_eq!(session.participant("alice").unwrap().rating_delta, Some(16));
        assert_eq!(session.participant("bob").unwrap().rating_delta, Some(-16));

        // Events went out
        assert_eq!(system.publisher.count_events_of_type("BattleCompleted"), 1);
        assert_eq!(system.publisher.count_events_of_type("RatingsUpdated"), 1);
    }

    #[tokio::test]
    async fn test_completion_is_idempotent() {
        let system = create_test_system();
        let id = insert_session(&system, BattleKind::Ranked, 1200, 1250);

        let (_, first_changes) = system
            .updater
            .complete_battle(id, results(11_000.0, 10_500.0))
            .await
            .unwrap();
        let (_, second_changes) = system
            .updater
            .complete_battle(id, results(1.0, 99_999.0))
            .await
            .unwrap();

        // Same deltas reported, not re-applied
        assert_eq!(first_changes[0].delta, second_changes[0].delta);
        assert_eq!(first_changes[1].delta, second_changes[1].delta);

        let record = system.ratings.get("alice").unwrap().unwrap();
        assert_eq!(record.total_battles, 1);
    }

    #[tokio::test]
    async fn test_friendly_battle_leaves_ratings_alone() {
        let system = create_test_system();
        let id = insert_session(&system, BattleKind::Friendly, 1200, 1250);

        let (session, changes) = system
            .updater
            .complete_battle(id, results(11_000.0, 10_500.0))
            .await
            .unwrap();

        assert!(changes.is_empty());
        assert_eq!(session.winner, Some("alice".to_string()));
        assert!(system.ratings.get("alice").unwrap().is_none());
        assert_eq!(system.publisher.count_events_of_type("RatingsUpdated"), 0);
    }

    #[tokio::test]
    async fn test_draw_splits_expected_points() {
        let system = create_test_system();
        // Favorite draws the underdog: favorite bleeds points
        let id = insert_session(&system, BattleKind::Ranked, 1400, 1000);

        let (_, changes) = system
            .updater
            .complete_battle(id, results(10_000.0, 10_000.0))
            .await
            .unwrap();

        assert_eq!(changes[0].outcome, Outcome::Draw);
        assert!(changes[0].delta < 0);
        assert!(changes[1].delta > 0);
    }

    #[tokio::test]
    async fn test_upset_pays_out_more() {
        let system = create_test_system();
        let id = insert_session(&system, BattleKind::Ranked, 1400, 1000);

        // The underdog wins
        let (_, changes) = system
            .updater
            .complete_battle(id, results(9_000.0, 12_000.0))
            .await
            .unwrap();

        let favorite = &changes[0];
        let underdog = &changes[1];
        assert_eq!(favorite.outcome, Outcome::Loss);
        assert_eq!(favorite.delta, -29);
        assert_eq!(underdog.delta, 29);
    }

    #[tokio::test]
    async fn test_rating_floor_is_enforced() {
        let system = create_test_system();

        // Drive Bob near the floor first
        for _ in 0..40 {
            let id = insert_session(&system, BattleKind::Ranked, 1200, 1200);
            system
                .updater
                .complete_battle(id, results(11_000.0, 10_000.0))
                .await
                .unwrap();
        }

        let record = system.ratings.get("bob").unwrap().unwrap();
        assert!(record.rating(GameMode::Standard) >= 100);
    }

    #[tokio::test]
    async fn test_apply_rejects_running_session() {
        let system = create_test_system();
        let id = insert_session(&system, BattleKind::Ranked, 1200, 1250);

        let session = system.sessions.get(id).unwrap().unwrap();
        assert!(system.updater.apply_completed(&session).await.is_err());
    }
}
