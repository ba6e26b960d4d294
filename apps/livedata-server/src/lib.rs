#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Live Data Server - Market Data Distribution
//!
//! A market-data distribution service that normalizes raw provider
//! ticks through configurable rule pipelines, keeps persistent
//! subscriptions alive across restarts, and combines several backing
//! servers behind one subscription surface.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core data types and normalization logic
//!   - `message`: Ordered field container for ticks
//!   - `normalization`: Rule pipelines and per-security field history
//!   - `subscription`: Specifications and persistent-subscription values
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Interfaces for live servers and subscription storage
//!   - `services`: Persistent-subscription manager, combining server
//!
//! - **Infrastructure**: Adapters and process-level concerns
//!   - `server`: In-memory live server with broadcast fan-out
//!   - `storage`: In-memory and JSON-file subscription stores
//!   - `pool`: Bounded worker pool for combining dispatch
//!   - `config`: Configuration from environment variables
//!   - `telemetry`: Tracing setup
//!
//! # Data Flow
//!
//! ```text
//! Raw ticks ──► Normalization ──► Distributors ──► Topic channels ──► Consumers
//!                pipelines             ▲
//!                                      │ reconcile
//!                        Persistent subscription manager ◄── JSON store
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core data types and normalization logic.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and process-level concerns.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::message::{Field, FieldValue, Message};
pub use domain::normalization::{
    DividendYieldCalculator, FieldFilter, FieldHistoryStore, FieldHistoryUpdater, FieldNameChange,
    ImpliedVolatilityCalculator, MarketValueCalculator, NextDividendDateCalculator,
    NormalizationError, NormalizationRule, NormalizationRuleSet, Normalized, RequiredFieldFilter,
    SecurityRuleApplier, SecurityRuleProvider, UnitChange, fields,
};
pub use domain::subscription::{
    LiveDataSpec, PersistentSubscription, SecurityId, SubscriptionResult,
};

// Ports
pub use application::ports::{
    ActiveSubscription, Distributor, LiveDataServer, ServerError, StoreError, SubscriptionStore,
};

// Services
pub use application::services::{
    CombiningServer, ManagerConfig, ManagerError, PersistentSubscriptionManager, RoutingFn,
};

// Infrastructure config
pub use infrastructure::config::{
    DispatchSettings, LiveDataSettings, ManagerSettings, PipelineSettings,
};

// Adapters (for integration tests)
pub use infrastructure::pool::WorkerPool;
pub use infrastructure::server::{InMemoryDistributor, InMemoryServer};
pub use infrastructure::storage::{FileSubscriptionStore, InMemorySubscriptionStore};

// Telemetry
pub use infrastructure::telemetry::init as init_telemetry;
