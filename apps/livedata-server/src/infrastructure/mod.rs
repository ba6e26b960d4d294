//! Infrastructure Layer
//!
//! Adapters behind the application ports plus process-level concerns.

/// Configuration loaded from environment variables.
pub mod config;

/// Bounded worker pool for combining fan-out.
pub mod pool;

/// In-memory live server adapter.
pub mod server;

/// Subscription store adapters (in-memory and JSON file).
pub mod storage;

/// Tracing setup.
pub mod telemetry;
