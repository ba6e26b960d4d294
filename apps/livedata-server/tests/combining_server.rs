//! Combining Server Integration Tests
//!
//! Tests multi-backend routing, fan-out and failure aggregation.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use livedata_server::{
    ActiveSubscription, CombiningServer, Distributor, LiveDataServer, LiveDataSpec, RoutingFn,
    ServerError, SubscriptionResult, WorkerPool,
};

/// Backend that records calls and can be told to fail whole requests.
#[derive(Default)]
struct RecordingServer {
    subscribe_calls: AtomicUsize,
    subscribed: Mutex<Vec<LiveDataSpec>>,
    started: AtomicUsize,
    stopped: AtomicUsize,
    fail_subscribe: bool,
}

impl RecordingServer {
    fn failing() -> Self {
        Self {
            fail_subscribe: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl LiveDataServer for RecordingServer {
    async fn subscribe(
        &self,
        specs: &[LiveDataSpec],
        _persistent: bool,
    ) -> Result<Vec<SubscriptionResult>, ServerError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_subscribe {
            return Err(ServerError::Unavailable("backend down".to_owned()));
        }
        self.subscribed.lock().extend(specs.iter().cloned());
        Ok(specs
            .iter()
            .map(|s| SubscriptionResult::success(s.clone(), "ok"))
            .collect())
    }

    async fn unsubscribe(&self, specs: &[LiveDataSpec]) -> Result<(), ServerError> {
        let mut subscribed = self.subscribed.lock();
        subscribed.retain(|s| !specs.contains(s));
        Ok(())
    }

    async fn active_subscriptions(&self) -> Vec<ActiveSubscription> {
        Vec::new()
    }

    async fn distributors_for(
        &self,
        _specs: &[LiveDataSpec],
    ) -> Result<HashMap<LiveDataSpec, Arc<dyn Distributor>>, ServerError> {
        Ok(HashMap::new())
    }

    async fn start(&self) -> Result<(), ServerError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServerError> {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Route equities (single-letter-prefix "E") to backend 0, everything
/// else to backend 1.
fn prefix_route() -> RoutingFn {
    Arc::new(|spec: &LiveDataSpec| {
        if spec.security.as_str().starts_with('E') {
            Some(0)
        } else {
            Some(1)
        }
    })
}

fn combining(backends: Vec<Arc<RecordingServer>>, route: RoutingFn) -> CombiningServer {
    let backends = backends
        .into_iter()
        .map(|b| b as Arc<dyn LiveDataServer>)
        .collect();
    CombiningServer::new(backends, route, Arc::new(WorkerPool::new(4)))
}

fn spec(security: &str) -> LiveDataSpec {
    LiveDataSpec::new(security, "standard")
}

#[tokio::test]
async fn one_subscribe_call_per_owning_backend() {
    let equities = Arc::new(RecordingServer::default());
    let options = Arc::new(RecordingServer::default());
    let server = combining(
        vec![Arc::clone(&equities), Arc::clone(&options)],
        prefix_route(),
    );

    let results = server
        .subscribe(&[spec("E:AAPL"), spec("E:MSFT"), spec("O:AAPL240621C")], false)
        .await
        .unwrap();

    // Aggregate cardinality matches the request.
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.succeeded));

    // Each owning backend saw exactly one bulk call.
    assert_eq!(equities.subscribe_calls.load(Ordering::SeqCst), 1);
    assert_eq!(options.subscribe_calls.load(Ordering::SeqCst), 1);
    assert_eq!(equities.subscribed.lock().len(), 2);
    assert_eq!(options.subscribed.lock().len(), 1);
}

#[tokio::test]
async fn backend_without_specs_is_not_called() {
    let equities = Arc::new(RecordingServer::default());
    let options = Arc::new(RecordingServer::default());
    let server = combining(
        vec![Arc::clone(&equities), Arc::clone(&options)],
        prefix_route(),
    );

    server.subscribe(&[spec("E:AAPL")], false).await.unwrap();

    assert_eq!(equities.subscribe_calls.load(Ordering::SeqCst), 1);
    assert_eq!(options.subscribe_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn partition_failure_fails_the_whole_call() {
    let equities = Arc::new(RecordingServer::default());
    let options = Arc::new(RecordingServer::failing());
    let server = combining(
        vec![Arc::clone(&equities), Arc::clone(&options)],
        prefix_route(),
    );

    let err = server
        .subscribe(&[spec("E:AAPL"), spec("O:AAPL240621C")], false)
        .await
        .unwrap_err();

    assert!(matches!(err, ServerError::Unavailable(_)));
}

#[tokio::test]
async fn unroutable_spec_is_fatal_and_skips_all_backends() {
    let equities = Arc::new(RecordingServer::default());
    let route: RoutingFn = Arc::new(|_| None);
    let server = combining(vec![Arc::clone(&equities)], route);

    let err = server.subscribe(&[spec("E:AAPL")], false).await.unwrap_err();

    assert!(matches!(err, ServerError::Unroutable(_)));
    // Routing failed before any backend was reached.
    assert_eq!(equities.subscribe_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn out_of_range_route_index_is_unroutable() {
    let equities = Arc::new(RecordingServer::default());
    let route: RoutingFn = Arc::new(|_| Some(7));
    let server = combining(vec![equities], route);

    let err = server.subscribe(&[spec("E:AAPL")], false).await.unwrap_err();
    assert!(matches!(err, ServerError::Unroutable(_)));
}

#[tokio::test]
async fn start_and_stop_cascade_to_every_backend() {
    let equities = Arc::new(RecordingServer::default());
    let options = Arc::new(RecordingServer::default());
    let server = combining(
        vec![Arc::clone(&equities), Arc::clone(&options)],
        prefix_route(),
    );

    server.start().await.unwrap();
    server.stop().await.unwrap();

    assert_eq!(equities.started.load(Ordering::SeqCst), 1);
    assert_eq!(options.started.load(Ordering::SeqCst), 1);
    assert_eq!(equities.stopped.load(Ordering::SeqCst), 1);
    assert_eq!(options.stopped.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unsubscribe_routes_like_subscribe() {
    let equities = Arc::new(RecordingServer::default());
    let options = Arc::new(RecordingServer::default());
    let server = combining(
        vec![Arc::clone(&equities), Arc::clone(&options)],
        prefix_route(),
    );

    server
        .subscribe(&[spec("E:AAPL"), spec("O:AAPL240621C")], false)
        .await
        .unwrap();
    server.unsubscribe(&[spec("E:AAPL")]).await.unwrap();

    assert!(equities.subscribed.lock().is_empty());
    assert_eq!(options.subscribed.lock().len(), 1);
}
