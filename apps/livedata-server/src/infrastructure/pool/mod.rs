//! Shared Worker Pool
//!
//! A bounded concurrent spawner used for combining-server fan-out. The
//! pool is injected explicitly wherever it is needed rather than held
//! as process-global state, so startup, shutdown and tests stay
//! deterministic.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Bounded pool of concurrently running tasks.
///
/// Tasks beyond the bound queue on the internal semaphore. Spawned
/// tasks are detached: dropping the returned handle abandons the
/// caller's interest but never cancels the task itself.
#[derive(Debug)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    /// Create a pool running at most `capacity` tasks at once.
    ///
    /// A capacity of zero is rounded up to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Maximum number of concurrently running tasks.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of free worker slots right now.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Spawn a task onto the pool.
    ///
    /// The future starts once a worker slot frees up and always runs to
    /// completion, even if the returned handle is dropped.
    #[allow(clippy::expect_used)]
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            // The semaphore is never closed, so acquisition cannot fail.
            let _permit = permits
                .acquire_owned()
                .await
                .expect("worker pool semaphore closed");
            future.await
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn runs_tasks_to_completion() {
        let pool = WorkerPool::new(4);
        let handle = pool.spawn(async { 41 + 1 });
        assert_eq!(handle.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn bounds_concurrency() {
        let pool = Arc::new(WorkerPool::new(2));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            handles.push(pool.spawn(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn dropped_handle_does_not_cancel_task() {
        let pool = WorkerPool::new(1);
        let done = Arc::new(AtomicUsize::new(0));

        let done_clone = Arc::clone(&done);
        let handle = pool.spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            done_clone.fetch_add(1, Ordering::SeqCst);
        });
        drop(handle);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_capacity_rounds_up() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.capacity(), 1);
    }
}
