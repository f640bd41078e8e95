//! HTTP surface for the matchmaking service
//!
//! The matchmaking API (join/leave/status/complete) lives here; the
//! monitoring endpoints live in `metrics::health`.

pub mod api;

pub use api::{ApiServer, ApiServerConfig, ApiState};
