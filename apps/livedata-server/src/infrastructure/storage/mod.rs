//! Subscription Store Adapters
//!
//! Implementations of the [`SubscriptionStore`] port: an in-memory
//! store for tests and ephemeral deployments, and a JSON-file store
//! for durable persistent subscriptions. Both carry the port's
//! read-all / write-all full-replace semantics.

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::application::ports::{StoreError, SubscriptionStore};
use crate::domain::subscription::PersistentSubscription;

// =============================================================================
// In-Memory Store
// =============================================================================

/// Volatile store; contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemorySubscriptionStore {
    subscriptions: Mutex<HashSet<PersistentSubscription>>,
}

impl InMemorySubscriptionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with `subscriptions`.
    #[must_use]
    pub fn with_contents(subscriptions: HashSet<PersistentSubscription>) -> Self {
        Self {
            subscriptions: Mutex::new(subscriptions),
        }
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn read_all(&self) -> Result<HashSet<PersistentSubscription>, StoreError> {
        Ok(self.subscriptions.lock().clone())
    }

    async fn write_all(
        &self,
        subscriptions: &HashSet<PersistentSubscription>,
    ) -> Result<(), StoreError> {
        *self.subscriptions.lock() = subscriptions.clone();
        Ok(())
    }
}

// =============================================================================
// JSON File Store
// =============================================================================

/// File-backed store: one JSON array of specifications.
///
/// A missing file reads as the empty set; every write replaces the
/// whole file.
#[derive(Debug)]
pub struct FileSubscriptionStore {
    path: PathBuf,
}

impl FileSubscriptionStore {
    /// Create a store backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SubscriptionStore for FileSubscriptionStore {
    async fn read_all(&self) -> Result<HashSet<PersistentSubscription>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let subscriptions: Vec<PersistentSubscription> =
                    serde_json::from_slice(&bytes).map_err(|e| StoreError::Read(e.to_string()))?;
                Ok(subscriptions.into_iter().collect())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(HashSet::new()),
            Err(err) => Err(StoreError::Read(err.to_string())),
        }
    }

    async fn write_all(
        &self,
        subscriptions: &HashSet<PersistentSubscription>,
    ) -> Result<(), StoreError> {
        // Stable ordering keeps the file diffable.
        let mut ordered: Vec<_> = subscriptions.iter().cloned().collect();
        ordered.sort();
        let json = serde_json::to_vec_pretty(&ordered)
            .map_err(|e| StoreError::Write(e.to_string()))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| StoreError::Write(e.to_string()))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::subscription::LiveDataSpec;

    fn sub(security: &str) -> PersistentSubscription {
        PersistentSubscription::new(LiveDataSpec::new(security, "standard"))
    }

    #[tokio::test]
    async fn in_memory_write_replaces_contents() {
        let store = InMemorySubscriptionStore::new();

        store
            .write_all(&[sub("AAPL"), sub("MSFT")].into_iter().collect())
            .await
            .unwrap();
        store
            .write_all(&[sub("GOOG")].into_iter().collect())
            .await
            .unwrap();

        let contents = store.read_all().await.unwrap();
        assert_eq!(contents, [sub("GOOG")].into_iter().collect());
    }

    #[tokio::test]
    async fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSubscriptionStore::new(dir.path().join("subs.json"));

        let written: HashSet<_> = [sub("AAPL"), sub("MSFT")].into_iter().collect();
        store.write_all(&written).await.unwrap();

        let read = store.read_all().await.unwrap();
        assert_eq!(read, written);
    }

    #[tokio::test]
    async fn file_store_missing_file_is_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSubscriptionStore::new(dir.path().join("does-not-exist.json"));

        assert!(store.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_store_write_is_full_replace() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSubscriptionStore::new(dir.path().join("subs.json"));

        store
            .write_all(&[sub("AAPL")].into_iter().collect())
            .await
            .unwrap();
        store
            .write_all(&[sub("MSFT")].into_iter().collect())
            .await
            .unwrap();

        let read = store.read_all().await.unwrap();
        assert_eq!(read, [sub("MSFT")].into_iter().collect());
    }

    #[tokio::test]
    async fn file_store_corrupt_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subs.json");
        tokio::fs::write(&path, b"not json").await.unwrap();
        let store = FileSubscriptionStore::new(path);

        assert!(matches!(
            store.read_all().await,
            Err(StoreError::Read(_))
        ));
    }
}
