//! Domain Layer
//!
//! Core market-data types and the normalization pipeline, free of
//! runtime and I/O concerns.

/// Tick message container: ordered, duplicate-tolerant typed fields.
pub mod message;

/// Normalization rules, rule sets and the per-security history store.
pub mod normalization;

/// Subscription specifications and persistent-subscription value objects.
pub mod subscription;
