//! AMQP event publisher for outbound events

use crate::amqp::messages::{
    exchange_for, routing_key_for, MessageEnvelope, MATCH_EVENTS_EXCHANGE, RATING_EVENTS_EXCHANGE,
};
use crate::error::{MatchmakingError, Result};
use crate::types::{ArenaEvent, BattleCompleted, MatchFound, RatingsUpdated};
use amqprs::{
    channel::{BasicPublishArguments, Channel, ExchangeDeclareArguments},
    BasicProperties,
};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Trait for publishing matchmaking events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a MatchFound event to one participant
    async fn publish_match_found(&self, event: MatchFound) -> Result<()>;

    /// Publish a BattleCompleted event
    async fn publish_battle_completed(&self, event: BattleCompleted) -> Result<()>;

    /// Publish a RatingsUpdated event
    async fn publish_ratings_updated(&self, event: RatingsUpdated) -> Result<()>;
}

/// Configuration for event publishing
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub enable_deduplication: bool,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 500,
            enable_deduplication: true,
        }
    }
}

/// AMQP-based event publisher implementation
pub struct AmqpEventPublisher {
    channel: Channel,
    config: PublisherConfig,
    published_messages: std::sync::Mutex<std::collections::HashSet<String>>, // For deduplication
}

impl AmqpEventPublisher {
    /// Create a new event publisher
    pub async fn new(channel: Channel, config: PublisherConfig) -> Result<Self> {
        let publisher = Self {
            channel,
            config,
            published_messages: std::sync::Mutex::new(std::collections::HashSet::new()),
        };

        publisher.setup_exchanges().await?;

        Ok(publisher)
    }

    /// Declare the topic exchanges events are routed through
    async fn setup_exchanges(&self) -> Result<()> {
        for exchange in [MATCH_EVENTS_EXCHANGE, RATING_EVENTS_EXCHANGE] {
            let args = ExchangeDeclareArguments::new(exchange, "topic");
            self.channel.exchange_declare(args).await.map_err(|e| {
                MatchmakingError::AmqpConnectionFailed {
                    message: format!("Failed to declare exchange {}: {}", exchange, e),
                }
            })?;
        }

        debug!("AMQP exchanges declared");
        Ok(())
    }

    /// Publish an event with retry and deduplication
    async fn publish_event(&self, event: ArenaEvent) -> Result<()> {
        let exchange = exchange_for(&event);
        let routing_key = routing_key_for(&event).to_string();
        let envelope = MessageEnvelope::new(event, routing_key);

        if self.config.enable_deduplication {
            let published_messages =
                self.published_messages
                    .lock()
                    .map_err(|_| MatchmakingError::InternalError {
                        message: "Failed to acquire published messages lock".to_string(),
                    })?;
            if published_messages.contains(&envelope.correlation_id) {
                debug!(
                    "Message {} already published, skipping",
                    envelope.correlation_id
                );
                return Ok(());
            }
        }

        let mut retry_count = 0;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        loop {
            match self.try_publish(exchange, &envelope).await {
                Ok(_) => {
                    if self.config.enable_deduplication {
                        let mut published_messages =
                            self.published_messages.lock().map_err(|_| {
                                MatchmakingError::InternalError {
                                    message: "Failed to acquire published messages lock"
                                        .to_string(),
                                }
                            })?;
                        published_messages.insert(envelope.correlation_id.clone());
                    }

                    debug!(
                        "Published message {} to exchange {}",
                        envelope.correlation_id, exchange
                    );
                    return Ok(());
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        error!(
                            "Failed to publish message {} after {} retries: {}",
                            envelope.correlation_id, self.config.max_retries, e
                        );
                        return Err(e);
                    }

                    warn!(
                        "Publish attempt {} failed for message {}: {}. Retrying in {:?}",
                        retry_count, envelope.correlation_id, e, delay
                    );

                    sleep(delay).await;
                    delay = Duration::from_millis((delay.as_millis() as u64 * 2).min(5000));
                }
            }
        }
    }

    /// Single publish attempt
    async fn try_publish(
        &self,
        exchange: &str,
        envelope: &MessageEnvelope<ArenaEvent>,
    ) -> Result<()> {
        let payload = envelope.to_bytes()?;

        let args = BasicPublishArguments::new(exchange, &envelope.routing_key);
        let mut properties = BasicProperties::default();
        properties
            .with_message_id(&envelope.correlation_id)
            .with_timestamp(envelope.timestamp.timestamp() as u64)
            .with_content_type("application/json");

        self.channel
            .basic_publish(properties, payload, args)
            .await
            .map_err(|e| MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to publish message: {}", e),
            })?;

        Ok(())
    }

    /// Clear deduplication cache (useful for testing or memory management)
    pub fn clear_deduplication_cache(&self) {
        if let Ok(mut published_messages) = self.published_messages.lock() {
            published_messages.clear();
        }
    }

    /// Get number of cached message IDs (for monitoring)
    pub fn cached_message_count(&self) -> usize {
        self.published_messages
            .lock()
            .map(|cache| cache.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl EventPublisher for AmqpEventPublisher {
    async fn publish_match_found(&self, event: MatchFound) -> Result<()> {
        self.publish_event(ArenaEvent::MatchFound(event)).await
    }

    async fn publish_battle_completed(&self, event: BattleCompleted) -> Result<()> {
        self.publish_event(ArenaEvent::BattleCompleted(event)).await
    }

    async fn publish_ratings_updated(&self, event: RatingsUpdated) -> Result<()> {
        self.publish_event(ArenaEvent::RatingsUpdated(event)).await
    }
}

/// Mock event publisher for testing
#[derive(Debug, Default)]
pub struct MockEventPublisher {
    published_events: std::sync::Mutex<Vec<ArenaEvent>>,
}

impl MockEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all published events (for testing)
    pub fn get_published_events(&self) -> Vec<ArenaEvent> {
        self.published_events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Count events of a specific type (for testing)
    pub fn count_events_of_type(&self, event_type: &str) -> usize {
        self.get_published_events()
            .iter()
            .filter(|event| match event {
                ArenaEvent::MatchFound(_) => event_type == "MatchFound",
                ArenaEvent::BattleCompleted(_) => event_type == "BattleCompleted",
                ArenaEvent::RatingsUpdated(_) => event_type == "RatingsUpdated",
            })
            .count()
    }

    /// Clear published events (for testing)
    pub fn clear_events(&self) {
        if let Ok(mut events) = self.published_events.lock() {
            events.clear();
        }
    }
}

#[async_trait]
impl EventPublisher for MockEventPublisher {
    async fn publish_match_found(&self, event: MatchFound) -> Result<()> {
        if let Ok(mut events) = self.published_events.lock() {
            events.push(ArenaEvent::MatchFound(event));
        }
        Ok(())
    }

    async fn publish_battle_completed(&self, event: BattleCompleted) -> Result<()> {
        if let Ok(mut events) = self.published_events.lock() {
            events.push(ArenaEvent::BattleCompleted(event));
        }
        Ok(())
    }

    async fn publish_ratings_updated(&self, event: RatingsUpdated) -> Result<()> {
        if let Ok(mut events) = self.published_events.lock() {
            events.push(ArenaEvent::RatingsUpdated(event));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GameMode;
    use crate::utils::{current_timestamp, generate_session_id};

    fn create_test_match_found() -> MatchFound {
        MatchFound {
            user_id: "alice".to_string(),
            session_id: generate_session_id(),
            game_mode: GameMode::Standard,
            opponent_username: "Bob".to_string(),
            opponent_rating: 1250,
            timestamp: current_timestamp(),
        }
    }

    #[test]
    fn test_publisher_config_default() {
        let config = PublisherConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay_ms, 500);
        assert!(config.enable_deduplication);
    }

    #[tokio::test]
    async fn test_mock_publisher_records_events() {
        let publisher = MockEventPublisher::new();

        publisher
            .publish_match_found(create_test_match_found())
            .await
            .unwrap();
        publisher
            .publish_battle_completed(BattleCompleted {
                session_id: generate_session_id(),
                game_mode: GameMode::Standard,
                winner: Some("alice".to_string()),
                timestamp: current_timestamp(),
            })
            .await
            .unwrap();

        assert_eq!(publisher.count_events_of_type("MatchFound"), 1);
        assert_eq!(publisher.count_events_of_type("BattleCompleted"), 1);
        assert_eq!(publisher.count_events_of_type("RatingsUpdated"), 0);

        publisher.clear_events();
        assert!(publisher.get_published_events().is_empty());
    }

    // Note: Integration tests with an actual AMQP broker would go in tests/ directory
}
