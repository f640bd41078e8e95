//! AMQP message definitions and serialization

use crate::error::{MatchmakingError, Result};
use crate::types::ArenaEvent;
use serde_json;

/// AMQP exchange names
pub const MATCH_EVENTS_EXCHANGE: &str = "arena.match_events";
pub const RATING_EVENTS_EXCHANGE: &str = "arena.rating_events";

/// Routing keys for events
pub const MATCH_FOUND_ROUTING_KEY: &str = "match.found";
pub const BATTLE_COMPLETED_ROUTING_KEY: &str = "battle.completed";
pub const RATINGS_UPDATED_ROUTING_KEY: &str = "rating.updated";

/// Message envelope with metadata
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MessageEnvelope<T> {
    pub payload: T,
    pub correlation_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub routing_key: String,
}

impl<T> MessageEnvelope<T>
where
    T: serde::Serialize + serde::de::DeserializeOwned,
{
    /// Create a new message envelope
    pub fn new(payload: T, routing_key: String) -> Self {
        Self {
            payload,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now(),
            routing_key,
        }
    }

    /// Serialize the envelope to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            MatchmakingError::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }

    /// Deserialize envelope from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            MatchmakingError::InternalError {
                message: format!("Failed to deserialize message: {}", e),
            }
            .into()
        })
    }
}

/// Get the exchange an event belongs on
pub fn exchange_for(event: &ArenaEvent) -> &'static str {
    match event {
        ArenaEvent::MatchFound(_) => MATCH_EVENTS_EXCHANGE,
        ArenaEvent::BattleCompleted(_) => MATCH_EVENTS_EXCHANGE,
        ArenaEvent::RatingsUpdated(_) => RATING_EVENTS_EXCHANGE,
    }
}

/// Get the routing key for an event
pub fn routing_key_for(event: &ArenaEvent) -> &'static str {
    match event {
        ArenaEvent::MatchFound(_) => MATCH_FOUND_ROUTING_KEY,
        ArenaEvent::BattleCompleted(_) => BATTLE_COMPLETED_ROUTING_KEY,
        ArenaEvent::RatingsUpdated(_) => RATINGS_UPDATED_ROUTING_KEY,
    }
}
