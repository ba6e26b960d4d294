//! Port Interfaces
//!
//! Capability traits consumed by the application services, following
//! the hexagonal layering: the subscription manager and combining
//! server are written against these contracts, and the infrastructure
//! adapters implement them.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`LiveDataServer`]: subscription surface of a live server
//! - [`SubscriptionStore`]: durable desired-state storage
//!   (read-all / write-all only)
//!
//! The per-security rule provider lives with the normalization rules
//! in the domain layer, since it is consumed synchronously inside the
//! pipeline.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::domain::subscription::{LiveDataSpec, PersistentSubscription, SubscriptionResult};

// =============================================================================
// Server Capability
// =============================================================================

/// A live server's handle for one active outbound distribution.
pub trait Distributor: Send + Sync {
    /// The specification this distributor serves.
    fn spec(&self) -> &LiveDataSpec;

    /// Whether the distribution is flagged persistent (survives expiry).
    fn is_persistent(&self) -> bool;

    /// Flag or unflag the distribution as persistent, in place.
    fn set_persistent(&self, persistent: bool);
}

/// One currently active subscription with its distributor.
#[derive(Clone)]
pub struct ActiveSubscription {
    /// The distributed specification.
    pub spec: LiveDataSpec,
    /// The live distributor handle.
    pub distributor: Arc<dyn Distributor>,
}

impl std::fmt::Debug for ActiveSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveSubscription")
            .field("spec", &self.spec)
            .field("persistent", &self.distributor.is_persistent())
            .finish()
    }
}

/// Error from a live-data server operation.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// A subscription request failed as a whole.
    #[error("subscription request failed: {0}")]
    SubscriptionFailed(String),
    /// The server (or a backing server) is unavailable.
    #[error("server unavailable: {0}")]
    Unavailable(String),
    /// No backing server owns the specification. A configuration
    /// defect, not a transient condition.
    #[error("no backing server can distribute {0}")]
    Unroutable(LiveDataSpec),
    /// A fanned-out partition task could not be joined.
    #[error("dispatch task failed: {0}")]
    Dispatch(String),
}

/// Subscription surface of one logical live-data server.
///
/// Implemented both by real backing servers and by the combining
/// façade, so a manager never knows how many physical connections sit
/// behind its server.
#[async_trait]
pub trait LiveDataServer: Send + Sync {
    /// Subscribe to `specs`, optionally flagging them persistent.
    ///
    /// Returns one result per requested spec.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails as a whole; per-spec
    /// failures are reported in the result vector instead.
    async fn subscribe(
        &self,
        specs: &[LiveDataSpec],
        persistent: bool,
    ) -> Result<Vec<SubscriptionResult>, ServerError>;

    /// Tear down the distributions for `specs`.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails as a whole.
    async fn unsubscribe(&self, specs: &[LiveDataSpec]) -> Result<(), ServerError>;

    /// All currently active subscriptions with their distributors.
    async fn active_subscriptions(&self) -> Vec<ActiveSubscription>;

    /// Distributors for the subset of `specs` currently distributing.
    ///
    /// # Errors
    ///
    /// Returns an error when the lookup cannot be routed or fails.
    async fn distributors_for(
        &self,
        specs: &[LiveDataSpec],
    ) -> Result<HashMap<LiveDataSpec, Arc<dyn Distributor>>, ServerError>;

    /// Start the server (cascades to backing servers).
    ///
    /// # Errors
    ///
    /// Returns an error when startup fails.
    async fn start(&self) -> Result<(), ServerError>;

    /// Stop the server (cascades to backing servers).
    ///
    /// # Errors
    ///
    /// Returns an error when shutdown fails.
    async fn stop(&self) -> Result<(), ServerError>;
}

// =============================================================================
// Storage Capability
// =============================================================================

/// Error from the persistent-subscription store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading the stored set failed.
    #[error("storage read failed: {0}")]
    Read(String),
    /// Writing the stored set failed.
    #[error("storage write failed: {0}")]
    Write(String),
}

/// Durable desired-state storage with read-all / write-all semantics.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Read the complete stored set of persistent subscriptions.
    ///
    /// # Errors
    ///
    /// Returns an error when the backing storage cannot be read.
    async fn read_all(&self) -> Result<HashSet<PersistentSubscription>, StoreError>;

    /// Replace the complete stored set (full-replace semantics).
    ///
    /// # Errors
    ///
    /// Returns an error when the backing storage cannot be written.
    async fn write_all(
        &self,
        subscriptions: &HashSet<PersistentSubscription>,
    ) -> Result<(), StoreError>;
}
