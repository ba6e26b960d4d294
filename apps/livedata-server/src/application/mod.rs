//! Application Layer
//!
//! Use cases and port definitions. Services are written against the
//! capability traits in [`ports`]; infrastructure adapters implement
//! them.

/// Capability traits for servers and storage.
pub mod ports;

/// Subscription reconciliation and combining dispatch.
pub mod services;
