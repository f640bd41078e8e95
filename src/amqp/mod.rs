//! AMQP integration for outbound matchmaking events
//!
//! The service publishes match-found, battle-completed and ratings-updated
//! events to topic exchanges. Delivery beyond the broker is the consuming
//! side's concern; publishing is fire-and-forget with retries.

pub mod connection;
pub mod messages;
pub mod publisher;

// Re-export commonly used types
pub use connection::{AmqpConfig, AmqpConnection};
pub use messages::*;
pub use publisher::EventPublisher;
