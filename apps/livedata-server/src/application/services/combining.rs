//! Combining Server
//!
//! Presents several independently connected backing servers as one
//! logical live-data server. Multi-spec operations are partitioned by a
//! caller-supplied routing function, dispatched concurrently on a
//! shared bounded worker pool, and joined before returning: the caller
//! either gets a complete aggregated response or a failure, never a
//! response silently missing entries.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use tokio::task::JoinHandle;

use crate::application::ports::{
    ActiveSubscription, Distributor, LiveDataServer, ServerError,
};
use crate::domain::subscription::{LiveDataSpec, SubscriptionResult};
use crate::infrastructure::pool::WorkerPool;

/// Routing policy: which backing server (by registry index) owns a
/// specification. Supplied by the caller, not owned by this core.
pub type RoutingFn = Arc<dyn Fn(&LiveDataSpec) -> Option<usize> + Send + Sync>;

/// Façade combining a fixed registry of backing servers behind the
/// [`LiveDataServer`] port.
pub struct CombiningServer {
    backends: Vec<Arc<dyn LiveDataServer>>,
    route: RoutingFn,
    pool: Arc<WorkerPool>,
}

impl CombiningServer {
    /// Create a combining server over `backends`.
    ///
    /// `route` maps each specification to the index of its owning
    /// backend; `pool` bounds fan-out concurrency and is shared with
    /// the rest of the process.
    #[must_use]
    pub fn new(
        backends: Vec<Arc<dyn LiveDataServer>>,
        route: RoutingFn,
        pool: Arc<WorkerPool>,
    ) -> Self {
        Self {
            backends,
            route,
            pool,
        }
    }

    /// Number of backing servers.
    #[must_use]
    pub fn backend_count(&self) -> usize {
        self.backends.len()
    }

    /// Partition `specs` by owning backend.
    ///
    /// # Errors
    ///
    /// An unroutable specification is a fatal configuration error,
    /// returned immediately and never retried.
    fn group_by_server(
        &self,
        specs: &[LiveDataSpec],
    ) -> Result<HashMap<usize, Vec<LiveDataSpec>>, ServerError> {
        let mut partitions: HashMap<usize, Vec<LiveDataSpec>> = HashMap::new();
        for spec in specs {
            let index = (self.route)(spec)
                .filter(|i| *i < self.backends.len())
                .ok_or_else(|| ServerError::Unroutable(spec.clone()))?;
            partitions.entry(index).or_default().push(spec.clone());
        }
        Ok(partitions)
    }

    /// Dispatch one closure per non-empty partition on the pool.
    fn dispatch<T, F, Fut>(
        &self,
        partitions: HashMap<usize, Vec<LiveDataSpec>>,
        call: F,
    ) -> Vec<JoinHandle<Result<T, ServerError>>>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn LiveDataServer>, Vec<LiveDataSpec>) -> Fut,
        Fut: std::future::Future<Output = Result<T, ServerError>> + Send + 'static,
    {
        partitions
            .into_iter()
            .map(|(index, specs)| {
                let backend = Arc::clone(&self.backends[index]);
                self.pool.spawn(call(backend, specs))
            })
            .collect()
    }

    /// Join all partition tasks; any failure fails the whole call.
    ///
    /// Dropped sibling handles detach rather than cancel, so a failed
    /// partition never leaves another backend mid-subscribed.
    async fn join_all<T>(
        handles: Vec<JoinHandle<Result<T, ServerError>>>,
    ) -> Result<Vec<T>, ServerError> {
        let joined = try_join_all(handles)
            .await
            .map_err(|err| ServerError::Dispatch(err.to_string()))?;
        joined.into_iter().collect()
    }
}

#[async_trait]
impl LiveDataServer for CombiningServer {
    async fn subscribe(
        &self,
        specs: &[LiveDataSpec],
        persistent: bool,
    ) -> Result<Vec<SubscriptionResult>, ServerError> {
        let partitions = self.group_by_server(specs)?;
        let handles = self.dispatch(partitions, |backend, specs| async move {
            backend.subscribe(&specs, persistent).await
        });
        let per_partition = Self::join_all(handles).await?;
        Ok(per_partition.into_iter().flatten().collect())
    }

    async fn unsubscribe(&self, specs: &[LiveDataSpec]) -> Result<(), ServerError> {
        let partitions = self.group_by_server(specs)?;
        let handles = self.dispatch(partitions, |backend, specs| async move {
            backend.unsubscribe(&specs).await
        });
        Self::join_all(handles).await?;
        Ok(())
    }

    async fn active_subscriptions(&self) -> Vec<ActiveSubscription> {
        let mut all = Vec::new();
        for backend in &self.backends {
            all.extend(backend.active_subscriptions().await);
        }
        all
    }

    async fn distributors_for(
        &self,
        specs: &[LiveDataSpec],
    ) -> Result<HashMap<LiveDataSpec, Arc<dyn Distributor>>, ServerError> {
        let partitions = self.group_by_server(specs)?;
        let handles = self.dispatch(partitions, |backend, specs| async move {
            backend.distributors_for(&specs).await
        });
        let per_partition = Self::join_all(handles).await?;
        Ok(per_partition.into_iter().flatten().collect())
    }

    /// Start every backing server, sequentially and in registration
    /// order. A deliberate simplification carried forward.
    async fn start(&self) -> Result<(), ServerError> {
        for backend in &self.backends {
            backend.start().await?;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServerError> {
        for backend in &self.backends {
            backend.stop().await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for CombiningServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CombiningServer")
            .field("backends", &self.backends.len())
            .field("pool_capacity", &self.pool.capacity())
            .finish()
    }
}
