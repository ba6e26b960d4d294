//! Persistent Subscription Manager
//!
//! Reconciliation control loop between a live server's subscription
//! state and a persisted desired set. The desired set is rebuilt each
//! pass as the union of storage contents and the server's currently
//! persistent-flagged subscriptions — storage is a lower bound, not the
//! sole source of truth — and the manager then drives the server toward
//! it. Passes are idempotent and cumulative: a failed pass only delays
//! convergence.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{LiveDataServer, ServerError, StoreError, SubscriptionStore};
use crate::domain::subscription::{LiveDataSpec, PersistentSubscription};

// =============================================================================
// Configuration
// =============================================================================

/// Tuning knobs for the reconciliation loop.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Period of the background refresh/reconcile/save pass.
    pub save_period: Duration,
    /// Maximum specs per bulk subscribe request.
    pub subscribe_batch_size: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            save_period: Duration::from_secs(60),
            subscribe_batch_size: 50,
        }
    }
}

/// Error from a caller-facing manager operation.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// The live server rejected an operation.
    #[error(transparent)]
    Server(#[from] ServerError),
    /// The subscription store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// =============================================================================
// Manager
// =============================================================================

/// Desired-state snapshot guarded by the manager mutex.
#[derive(Debug, Default)]
struct ManagerState {
    desired: HashSet<PersistentSubscription>,
    last_saved: Option<HashSet<PersistentSubscription>>,
}

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Keeps a live server's persistent subscriptions converged with
/// durable storage.
///
/// Every public entry point serializes through one mutex per manager:
/// desired-state mutation, server reconciliation and persistence always
/// observe one consistent snapshot. The periodic background task and
/// caller threads contend for the same lock.
pub struct PersistentSubscriptionManager {
    server: Arc<dyn LiveDataServer>,
    store: Arc<dyn SubscriptionStore>,
    config: ManagerConfig,
    state: Mutex<ManagerState>,
    task: Mutex<Option<RunningTask>>,
}

impl PersistentSubscriptionManager {
    /// Create a stopped manager over `server` and `store`.
    #[must_use]
    pub fn new(
        server: Arc<dyn LiveDataServer>,
        store: Arc<dyn SubscriptionStore>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            server,
            store,
            config,
            state: Mutex::new(ManagerState::default()),
            task: Mutex::new(None),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start the background reconciliation task.
    ///
    /// An initial refresh/reconcile/save pass runs asynchronously right
    /// away, then repeats every [`ManagerConfig::save_period`]. Calling
    /// `start` on a running manager is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let manager = Arc::clone(self);
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            manager.run(token).await;
        });
        *task = Some(RunningTask { cancel, handle });
        tracing::info!(period_secs = self.config.save_period.as_secs(), "Persistent subscription manager started");
    }

    /// Stop the background task, blocking until any in-flight pass has
    /// fully drained.
    pub async fn stop(&self) {
        let running = self.task.lock().await.take();
        if let Some(running) = running {
            running.cancel.cancel();
            if running.handle.await.is_err() {
                tracing::warn!("Reconciliation task panicked during shutdown");
            }
            tracing::info!("Persistent subscription manager stopped");
        }
    }

    async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.save_period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // The first tick fires immediately: the initial refresh.
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!("Reconciliation task cancelled");
                    break;
                }
                _ = interval.tick() => {
                    self.background_pass().await;
                }
            }
        }
    }

    /// One full background pass. Failures are logged and left to the
    /// next pass; desired state is never corrupted, only under-achieved
    /// until convergence.
    async fn background_pass(&self) {
        let mut state = self.state.lock().await;

        if let Err(err) = self.refresh_state(&mut state).await {
            tracing::warn!(error = %err, "Refresh failed, keeping previous desired state");
            return;
        }
        if let Err(err) = self.update_server(&state, true).await {
            tracing::warn!(error = %err, "Reconciliation incomplete, deferring to next pass");
        }
        if let Err(err) = self.save(&mut state).await {
            tracing::warn!(error = %err, "Persisting subscription state failed");
        }
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Rebuild the desired set from storage unioned with the server's
    /// persistent-flagged subscriptions.
    async fn refresh_state(&self, state: &mut ManagerState) -> Result<(), ManagerError> {
        let stored = self.store.read_all().await?;

        state.desired.clear();
        state.desired.extend(stored);
        for active in self.server.active_subscriptions().await {
            if active.distributor.is_persistent() {
                state
                    .desired
                    .insert(PersistentSubscription::new(active.spec));
            }
        }
        tracing::debug!(desired = state.desired.len(), "Desired state refreshed");
        Ok(())
    }

    /// Drive the server's actual subscriptions toward the desired set.
    ///
    /// Specs with an existing non-persistent distributor are upgraded
    /// in place (cheap, and avoids the expiry race of resubscribing);
    /// the remainder is subscribed persistent in fixed-size batches. A
    /// failed batch is retried per member, since a bulk failure does
    /// not imply every member failed. Single-member failures propagate
    /// only when `catch_errors` is false.
    async fn update_server(
        &self,
        state: &ManagerState,
        catch_errors: bool,
    ) -> Result<(), ManagerError> {
        let desired: Vec<LiveDataSpec> =
            state.desired.iter().map(|s| s.spec().clone()).collect();
        if desired.is_empty() {
            return Ok(());
        }

        let distributors = self.server.distributors_for(&desired).await?;

        let mut to_subscribe = Vec::new();
        for spec in desired {
            match distributors.get(&spec) {
                Some(dist) if dist.is_persistent() => {}
                Some(dist) => {
                    tracing::debug!(spec = %spec, "Upgrading existing distributor to persistent");
                    dist.set_persistent(true);
                }
                None => to_subscribe.push(spec),
            }
        }
        // Deterministic batch composition across passes.
        to_subscribe.sort();

        for batch in to_subscribe.chunks(self.config.subscribe_batch_size) {
            match self.server.subscribe(batch, true).await {
                Ok(results) => {
                    for result in results.iter().filter(|r| !r.succeeded) {
                        tracing::warn!(spec = %result.spec, detail = %result.description, "Subscription not established");
                    }
                }
                Err(err) => {
                    tracing::warn!(batch = batch.len(), error = %err, "Bulk subscribe failed, retrying individually");
                    self.retry_individually(batch, catch_errors).await?;
                }
            }
        }
        Ok(())
    }

    async fn retry_individually(
        &self,
        batch: &[LiveDataSpec],
        catch_errors: bool,
    ) -> Result<(), ManagerError> {
        for spec in batch {
            match self.server.subscribe(std::slice::from_ref(spec), true).await {
                Ok(_) => {}
                Err(err) if catch_errors => {
                    tracing::warn!(spec = %spec, error = %err, "Subscription failed, deferring to next pass");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// Persist the server's actual persistent subscriptions, skipping
    /// the write when nothing changed since the last save.
    async fn save(&self, state: &mut ManagerState) -> Result<(), ManagerError> {
        let mut actual = HashSet::new();
        for active in self.server.active_subscriptions().await {
            if active.distributor.is_persistent() {
                actual.insert(PersistentSubscription::new(active.spec));
            }
        }

        if state.last_saved.as_ref() == Some(&actual) {
            tracing::debug!("Subscription state unchanged, skipping save");
            return Ok(());
        }

        self.store.write_all(&actual).await?;
        tracing::info!(count = actual.len(), "Persisted subscription state");
        state.last_saved = Some(actual);
        Ok(())
    }

    // =========================================================================
    // Caller-Facing Operations
    // =========================================================================

    /// Make `spec` persistent, synchronously.
    ///
    /// The desired set is mutated and reconciled against the server
    /// before this returns: the effect is observable immediately, with
    /// no wait for the periodic pass.
    ///
    /// # Errors
    ///
    /// Failures surface to the caller; the background path would
    /// instead swallow and retry.
    pub async fn add_persistent_subscription(
        &self,
        spec: LiveDataSpec,
    ) -> Result<(), ManagerError> {
        let mut state = self.state.lock().await;
        state.desired.insert(PersistentSubscription::new(spec));
        self.update_server(&state, false).await?;
        self.save(&mut state).await
    }

    /// Remove `spec` from the desired set, synchronously.
    ///
    /// A live distributor is downgraded in place so the subscription
    /// can expire naturally; the distribution itself is not torn down.
    ///
    /// Returns whether the subscription was present.
    ///
    /// # Errors
    ///
    /// Returns an error when the server lookup or the save fails.
    pub async fn remove_persistent_subscription(
        &self,
        spec: &LiveDataSpec,
    ) -> Result<bool, ManagerError> {
        let mut state = self.state.lock().await;
        let removed = state
            .desired
            .remove(&PersistentSubscription::new(spec.clone()));

        let distributors = self
            .server
            .distributors_for(std::slice::from_ref(spec))
            .await?;
        if let Some(dist) = distributors.get(spec) {
            tracing::debug!(spec = %spec, "Downgrading distributor to non-persistent");
            dist.set_persistent(false);
        }

        self.save(&mut state).await?;
        Ok(removed)
    }

    /// The current desired set, sorted for stable listings.
    pub async fn list_persistent_subscriptions(&self) -> Vec<PersistentSubscription> {
        let state = self.state.lock().await;
        let mut subs: Vec<_> = state.desired.iter().cloned().collect();
        subs.sort();
        subs
    }
}

// =============================================================================
// Tests
// =============================================================================
