//! Matchmaking HTTP API
//!
//! Axum server exposing the queue and session endpoints. Validation
//! failures are rejected here and never reach the scanner; conflicts and
//! idempotent retries map onto the error taxonomy via status codes.

use crate::error::MatchmakingError;
use crate::matcher::scanner::{JoinOutcome, MatchScanner};
use crate::rating::store::RatingStore;
use crate::rating::updater::RatingUpdater;
use crate::session::SessionStore;
use crate::types::{BattleResults, BattleSession, GameMode, RatingChange, SessionId, UserId};
use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Port to bind the API server to
    pub port: u16,
    /// Host to bind to (typically "0.0.0.0" for all interfaces)
    pub host: String,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Shared state for the API handlers
#[derive(Clone)]
pub struct ApiState {
    pub scanner: Arc<MatchScanner>,
    pub updater: Arc<RatingUpdater>,
    pub ratings: Arc<dyn RatingStore>,
    pub sessions: Arc<dyn SessionStore>,
}

/// The matchmaking API server
pub struct ApiServer {
    config: ApiServerConfig,
    state: ApiState,
    shutdown_tx: broadcast::Sender<()>,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(config: ApiServerConfig, state: ApiState) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            state,
            shutdown_tx,
        }
    }

    /// Start the API server
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid API server address")?;

        let app = self.create_router();
        let listener = TcpListener::bind(addr).await?;

        info!("Matchmaking API listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("API server shutdown signal received");
            })
            .await?;

        info!("API server stopped");
        Ok(())
    }

    /// Create the Axum router with all matchmaking endpoints
    pub fn create_router(&self) -> Router {
        Router::new()
            .route("/matchmaking/join", post(join_handler))
            .route("/matchmaking/leave", post(leave_handler))
            .route("/matchmaking/status/{user_id}", get(status_handler))
            .route("/sessions/{session_id}", get(session_handler))
            .route("/sessions/{session_id}/complete", post(complete_handler))
            .with_state(self.state.clone())
    }

    /// Stop the API server
    pub async fn stop(&self) -> Result<()> {
        info!("Stopping API server...");

        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to API server: {}", e);
        }

        Ok(())
    }
}

/// Error wrapper mapping the matchmaking taxonomy onto HTTP statuses
#[derive(Debug)]
pub struct ApiError(anyhow::Error);

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self.0.downcast_ref::<MatchmakingError>() {
            Some(MatchmakingError::InvalidJoinRequest { .. }) => {
                (StatusCode::BAD_REQUEST, self.0.to_string())
            }
            Some(
                MatchmakingError::AlreadyQueued { .. }
                | MatchmakingError::SessionCompleted { .. }
                | MatchmakingError::SessionNotCompleted { .. }
                | MatchmakingError::EntryNotSearching { .. },
            ) => (StatusCode::CONFLICT, self.0.to_string()),
            Some(
                MatchmakingError::SessionNotFound { .. } | MatchmakingError::NotQueued { .. },
            ) => (StatusCode::NOT_FOUND, self.0.to_string()),
            _ => {
                error!("Internal error handling API request: {:#}", self.0);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Request body for joining the queue
#[derive(Debug, Clone, Deserialize)]
pub struct JoinRequest {
    pub user_id: UserId,
    pub username: String,
    pub game_mode: GameMode,
}

/// Opponent summary returned on an immediate match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpponentInfo {
    pub username: String,
    pub rating: i32,
}

/// Response for a join request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinResponse {
    pub matched: bool,
    pub in_queue: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opponent: Option<OpponentInfo>,
}

/// Request body for leaving the queue
#[derive(Debug, Clone, Deserialize)]
pub struct LeaveRequest {
    pub user_id: UserId,
}

/// Response for a status poll
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub in_queue: bool,
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

/// Request body for completing a battle
#[derive(Debug, Clone, Deserialize)]
pub struct CompleteRequest {
    pub results: HashMap<UserId, BattleResults>,
}

/// Response for a completed battle
#[derive(Debug, Clone, Serialize)]
pub struct CompleteResponse {
    pub session: BattleSession,
    pub winner: Option<UserId>,
    pub rating_changes: Vec<RatingChange>,
}

async fn join_handler(
    State(state): State<ApiState>,
    Json(request): Json<JoinRequest>,
) -> Result<Json<JoinResponse>, ApiError> {
    debug!(
        "Join request - user: '{}', mode: {}",
        request.user_id, request.game_mode
    );

    if request.user_id.is_empty() {
        return Err(MatchmakingError::InvalidJoinRequest {
            reason: "User ID cannot be empty".to_string(),
        }
        .into());
    }

    // Rating snapshot for the queue entry, created lazily on first join
    let record = state.ratings.get_or_create(&request.user_id)?;
    let current_rating = record.rating(request.game_mode);

    let outcome = state
        .scanner
        .join_queue(
            &request.user_id,
            &request.username,
            request.game_mode,
            current_rating,
        )
        .await?;

    let response = match outcome {
        JoinOutcome::Matched {
            session,
            opponent_username,
            opponent_rating,
        } => JoinResponse {
            matched: true,
            in_queue: false,
            session_id: Some(session.id),
            opponent: Some(OpponentInfo {
                username: opponent_username,
                rating: opponent_rating,
            }),
        },
        JoinOutcome::Queued(_) => JoinResponse {
            matched: false,
            in_queue: true,
            session_id: None,
            opponent: None,
        },
    };

    Ok(Json(response))
}

async fn leave_handler(
    State(state): State<ApiState>,
    Json(request): Json<LeaveRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if request.user_id.is_empty() {
        return Err(MatchmakingError::InvalidJoinRequest {
            reason: "User ID cannot be empty".to_string(),
        }
        .into());
    }

    state.scanner.leave_queue(&request.user_id).await?;
    Ok(Json(json!({ "ok": true })))
}

async fn status_handler(
    State(state): State<ApiState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<StatusResponse>, ApiError> {
    let entry = state.scanner.queue_status(&user_id).await?;

    let response = match entry {
        Some(entry) if entry.is_searching() => StatusResponse {
            in_queue: true,
            matched: false,
            session_id: None,
        },
        Some(entry) => StatusResponse {
            in_queue: false,
            matched: true,
            session_id: entry.matched_session,
        },
        None => StatusResponse {
            in_queue: false,
            matched: false,
            session_id: None,
        },
    };

    Ok(Json(response))
}

async fn session_handler(
    State(state): State<ApiState>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<BattleSession>, ApiError> {
    let session =
        state
            .sessions
            .get(session_id)?
            .ok_or_else(|| MatchmakingError::SessionNotFound {
                session_id: session_id.to_string(),
            })?;

    Ok(Json(session))
}

async fn complete_handler(
    State(state): State<ApiState>,
    Path(session_id): Path<SessionId>,
    Json(request): Json<CompleteRequest>,
) -> Result<Json<CompleteResponse>, ApiError> {
    debug!("Completion request for session {}", session_id);

    let (session, rating_changes) = state
        .updater
        .complete_battle(session_id, request.results)
        .await?;

    Ok(Json(CompleteResponse {
        winner: session.winner.clone(),
        session,
        rating_changes,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amqp::publisher::MockEventPublisher;
    use crate::matcher::MatcherConfig;
    use crate::metrics::MetricsCollector;
    use crate::queue::InMemoryQueueStore;
    use crate::rating::elo::{EloCalculator, EloSettings};
    use crate::rating::store::InMemoryRatingStore;
    use crate::session::InMemorySessionStore;

    fn create_test_state() -> ApiState {
        let queue = Arc::new(InMemoryQueueStore::new());
        let sessions: Arc<InMemorySessionStore> = Arc::new(InMemorySessionStore::new());
        let ratings: Arc<InMemoryRatingStore> = Arc::new(InMemoryRatingStore::default());
        let publisher = Arc::new(MockEventPublisher::new());
        let metrics = Arc::new(MetricsCollector::default());

        let scanner = Arc::new(MatchScanner::with_metrics(
            queue,
            sessions.clone(),
            publisher.clone(),
            MatcherConfig::default(),
            metrics.clone(),
        ));
        let updater = Arc::new(RatingUpdater::new(
            ratings.clone(),
            sessions.clone(),
            publisher,
            EloCalculator::new(EloSettings::default()).unwrap(),
            metrics,
        ));

        ApiState {
            scanner,
            updater,
            ratings,
            sessions,
        }
    }

    #[tokio::test]
    async fn test_join_then_status_flow() {
        let state = create_test_state();

        let response = join_handler(
            State(state.clone()),
            Json(JoinRequest {
                user_id: "alice".to_string(),
                username: "Alice".to_string(),
                game_mode: GameMode::Standard,
            }),
        )
        .await
        .unwrap();

        assert!(!response.0.matched);
        assert!(response.0.in_queue);

        let status = status_handler(State(state.clone()), Path("alice".to_string()))
            .await
            .unwrap();
        assert!(status.0.in_queue);
        assert!(!status.0.matched);
    }

    #[tokio::test]
    async fn test_second_join_matches_and_status_reports_it() {
        let state = create_test_state();

        join_handler(
            State(state.clone()),
            Json(JoinRequest {
                user_id: "alice".to_string(),
                username: "Alice".to_string(),
                game_mode: GameMode::Standard,
            }),
        )
        .await
        .unwrap();

        let response = join_handler(
            State(state.clone()),
            Json(JoinRequest {
                user_id: "bob".to_string(),
                username: "Bob".to_string(),
                game_mode: GameMode::Standard,
            }),
        )
        .await
        .unwrap();

        assert!(response.0.matched);
        let session_id = response.0.session_id.unwrap();
        assert_eq!(response.0.opponent.as_ref().unwrap().username, "Alice");

        // Alice's status poll observes the match during the grace window
        let status = status_handler(State(state.clone()), Path("alice".to_string()))
            .await
            .unwrap();
        assert!(status.0.matched);
        assert_eq!(status.0.session_id, Some(session_id));

        // Session document is retrievable
        let session = session_handler(State(state), Path(session_id)).await.unwrap();
        assert_eq!(session.0.participants.len(), 2);
    }

    #[tokio::test]
    async fn test_join_rejects_empty_user() {
        let state = create_test_state();

        let result = join_handler(
            State(state),
            Json(JoinRequest {
                user_id: String::new(),
                username: "Nobody".to_string(),
                game_mode: GameMode::Sprint,
            }),
        )
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_leave_is_a_noop_when_absent() {
        let state = create_test_state();

        let response = leave_handler(
            State(state),
            Json(LeaveRequest {
                user_id: "ghost".to_string(),
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.0["ok"], true);
    }

    #[tokio::test]
    async fn test_complete_unknown_session_is_not_found() {
        let state = create_test_state();

        let result = complete_handler(
            State(state),
            Path(crate::utils::generate_session_id()),
            Json(CompleteRequest {
                results: HashMap::new(),
            }),
        )
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_complete_flow_reports_winner_and_changes() {
        let state = create_test_state();

        join_handler(
            State(state.clone()),
            Json(JoinRequest {
                user_id: "alice".to_string(),
                username: "Alice".to_string(),
                game_mode: GameMode::Standard,
            }),
        )
        .await
        .unwrap();
        let joined = join_handler(
            State(state.clone()),
            Json(JoinRequest {
                user_id: "bob".to_string(),
                username: "Bob".to_string(),
                game_mode: GameMode::Standard,
            }),
        )
        .await
        .unwrap();
        let session_id = joined.0.session_id.unwrap();

        let results = HashMap::from([
            (
                "alice".to_string(),
                BattleResults {
                    final_value: 11_000.0,
                    return_pct: 10.0,
                    trade_count: 6,
                    max_drawdown_pct: 2.0,
                },
            ),
            (
                "bob".to_string(),
                BattleResults {
                    final_value: 10_200.0,
                    return_pct: 2.0,
                    trade_count: 3,
                    max_drawdown_pct: 1.0,
                },
            ),
        ]);

        let response = complete_handler(
            State(state),
            Path(session_id),
            Json(CompleteRequest { results }),
        )
        .await
        .unwrap();

        assert_eq!(response.0.winner, Some("alice".to_string()));
        assert_eq!(response.0.rating_changes.len(), 2);
        assert!(response.0.rating_changes[0].delta > 0);
        assert!(response.0.session.is_completed());
    }
}
