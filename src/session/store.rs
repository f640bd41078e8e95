//! Session storage interface and implementations

use crate::error::MatchmakingError;
use crate::types::{
    BattleResults, BattleSession, SessionId, SessionStatus, TradeRecord, UserId,
};
use std::collections::HashMap;
use std::sync::RwLock;

/// Decide the winner of a battle from both participants' results.
///
/// Higher final portfolio value wins; an exact tie is a draw (`None`).
/// Both values come from the same point-in-time valuation, so the
/// comparison is deterministic and symmetric.
pub fn decide_winner(
    first: (&UserId, &BattleResults),
    second: (&UserId, &BattleResults),
) -> Option<UserId> {
    match first
        .1
        .final_value
        .partial_cmp(&second.1.final_value)
        .unwrap_or(std::cmp::Ordering::Equal)
    {
        std::cmp::Ordering::Greater => Some(first.0.clone()),
        std::cmp::Ordering::Less => Some(second.0.clone()),
        std::cmp::Ordering::Equal => None,
    }
}

/// Trait for session storage operations
pub trait SessionStore: Send + Sync {
    /// Persist a newly created session
    fn insert(&self, session: BattleSession) -> crate::error::Result<()>;

    /// Get a session by ID
    fn get(&self, session_id: SessionId) -> crate::error::Result<Option<BattleSession>>;

    /// Append a trade to a participant's log. The first trade moves the
    /// session from Ready to InProgress; completed sessions reject trades.
    fn record_trade(
        &self,
        session_id: SessionId,
        user_id: &str,
        trade: TradeRecord,
    ) -> crate::error::Result<BattleSession>;

    /// Complete a session with both participants' final results and decide
    /// the winner. Idempotent: completing an already-completed session
    /// returns it unchanged.
    fn complete(
        &self,
        session_id: SessionId,
        results: HashMap<UserId, BattleResults>,
    ) -> crate::error::Result<BattleSession>;

    /// Write rating deltas onto a completed session's participants.
    /// Fails if any delta was already written; a battle's deltas are
    /// recorded exactly once.
    fn set_rating_deltas(
        &self,
        session_id: SessionId,
        deltas: &[(UserId, i32)],
    ) -> crate::error::Result<BattleSession>;

    /// Drop a session that never became visible to players (its pair
    /// commit failed). Not for completed battles, which are permanent.
    fn discard(&self, session_id: SessionId) -> crate::error::Result<bool>;

    /// Total number of stored sessions
    fn count(&self) -> crate::error::Result<usize>;
}

/// In-memory session store implementation
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, BattleSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_session_mut<T>(
        &self,
        session_id: SessionId,
        f: impl FnOnce(&mut BattleSession) -> crate::error::Result<T>,
    ) -> crate::error::Result<T> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire sessions write lock".to_string(),
            })?;

        let session =
            sessions
                .get_mut(&session_id)
                .ok_or_else(|| MatchmakingError::SessionNotFound {
                    session_id: session_id.to_string(),
                })?;

        f(session)
    }
}

impl SessionStore for InMemorySessionStore {
    fn insert(&self, session: BattleSession) -> crate::error::Result<()> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire sessions write lock".to_string(),
            })?;

        sessions.insert(session.id, session);
        Ok(())
    }

    fn get(&self, session_id: SessionId) -> crate::error::Result<Option<BattleSession>> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire sessions read lock".to_string(),
            })?;

        Ok(sessions.get(&session_id).cloned())
    }

    fn record_trade(
        &self,
        session_id: SessionId,
        user_id: &str,
        trade: TradeRecord,
    ) -> crate::error::Result<BattleSession> {
        self.with_session_mut(session_id, |session| {
            if session.is_completed() {
                return Err(MatchmakingError::SessionCompleted {
                    session_id: session_id.to_string(),
                }
                .into());
            }

            let participant = session.participant_mut(user_id).ok_or_else(|| {
                MatchmakingError::InvalidJoinRequest {
                    reason: format!("User {} is not a participant of this battle", user_id),
                }
            })?;
            participant.trades.push(trade);

            if session.status == SessionStatus::Ready {
                session.status = SessionStatus::InProgress;
            }

            Ok(session.clone())
        })
    }

    fn complete(
        &self,
        session_id: SessionId,
        results: HashMap<UserId, BattleResults>,
    ) -> crate::error::Result<BattleSession> {
        self.with_session_mut(session_id, |session| {
            // Idempotent: a retried completion observes the original result
            if session.is_completed() {
                return Ok(session.clone());
            }

            for participant in &session.participants {
                if !results.contains_key(&participant.user_id) {
                    return Err(MatchmakingError::InvalidJoinRequest {
                        reason: format!("Missing results for participant {}", participant.user_id),
                    }
                    .into());
                }
            }

            for participant in session.participants.iter_mut() {
                participant.results = results.get(&participant.user_id).cloned();
            }

            let [first, second] = &session.participants;
            session.winner = decide_winner(
                (
                    &first.user_id,
                    first.results.as_ref().expect("results set above"),
                ),
                (
                    &second.user_id,
                    second.results.as_ref().expect("results set above"),
                ),
            );
            session.status = SessionStatus::Completed;

            Ok(session.clone())
        })
    }

    fn set_rating_deltas(
        &self,
        session_id: SessionId,
        deltas: &[(UserId, i32)],
    ) -> crate::error::Result<BattleSession> {
        self.with_session_mut(session_id, |session| {
            if !session.is_completed() {
                return Err(MatchmakingError::SessionNotCompleted {
                    session_id: session_id.to_string(),
                }
                .into());
            }
            if session.deltas_applied() {
                return Err(MatchmakingError::InternalError {
                    message: format!("Rating deltas already written for session {}", session_id),
                }
                .into());
            }

            for (user_id, delta) in deltas {
                if let Some(participant) = session.participant_mut(user_id) {
                    participant.rating_delta = Some(*delta);
                }
            }

            Ok(session.clone())
        })
    }

    fn discard(&self, session_id: SessionId) -> crate::error::Result<bool> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire sessions write lock".to_string(),
            })?;

        match sessions.get(&session_id) {
            Some(session) if session.is_completed() => Err(MatchmakingError::SessionCompleted {
                session_id: session_id.to_string(),
            }
            .into()),
            Some(_) => {
                sessions.remove(&session_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn count(&self) -> crate::error::Result<usize> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire sessions read lock".to_string(),
            })?;

        Ok(sessions.len())
    }
}
