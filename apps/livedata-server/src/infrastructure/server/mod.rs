//! In-Memory Live Server
//!
//! A [`LiveDataServer`] adapter that keeps every distribution in
//! process memory. Each active subscription owns a distributor that
//! runs raw ticks through its normalization rule set against a private
//! field history and fans delivered messages out on a broadcast
//! channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::application::ports::{ActiveSubscription, Distributor, LiveDataServer, ServerError};
use crate::domain::message::Message;
use crate::domain::normalization::{FieldHistoryStore, NormalizationRuleSet, Normalized};
use crate::domain::subscription::{LiveDataSpec, SecurityId, SubscriptionResult};

/// Buffered messages per distribution topic before slow receivers lag.
const TOPIC_CAPACITY: usize = 256;

// =============================================================================
// Distributor
// =============================================================================

/// One active distribution: rule set, private field history and the
/// outbound topic channel.
pub struct InMemoryDistributor {
    spec: LiveDataSpec,
    topic: String,
    ruleset: Arc<NormalizationRuleSet>,
    history: Mutex<FieldHistoryStore>,
    persistent: AtomicBool,
    sender: broadcast::Sender<Message>,
}

impl InMemoryDistributor {
    fn new(spec: LiveDataSpec, ruleset: Arc<NormalizationRuleSet>, persistent: bool) -> Self {
        let topic = format!("{}{}", spec.security, ruleset.topic_suffix());
        let (sender, _) = broadcast::channel(TOPIC_CAPACITY);
        Self {
            spec,
            topic,
            ruleset,
            history: Mutex::new(FieldHistoryStore::new()),
            persistent: AtomicBool::new(persistent),
            sender,
        }
    }

    /// The distribution topic (security id plus rule-set suffix).
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Subscribe to the normalized message stream for this topic.
    #[must_use]
    pub fn receiver(&self) -> broadcast::Receiver<Message> {
        self.sender.subscribe()
    }

    /// Run one raw tick through the pipeline and fan out the result.
    ///
    /// Dropped ticks and pipeline errors are absorbed here; a bad tick
    /// must never take the distribution down.
    fn distribute(&self, raw: Message) {
        let mut history = self.history.lock();
        match self.ruleset.normalize(raw, &self.spec.security, &mut history) {
            Ok(Normalized::Delivered(message)) => {
                // A send error just means nobody is listening right now.
                let _ = self.sender.send(message);
            }
            Ok(Normalized::Dropped) => {
                debug!(topic = %self.topic, "tick dropped by normalization");
            }
            Err(err) => {
                warn!(topic = %self.topic, error = %err, "normalization failed, tick discarded");
            }
        }
    }
}

impl Distributor for InMemoryDistributor {
    fn spec(&self) -> &LiveDataSpec {
        &self.spec
    }

    fn is_persistent(&self) -> bool {
        self.persistent.load(Ordering::SeqCst)
    }

    fn set_persistent(&self, persistent: bool) {
        self.persistent.store(persistent, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for InMemoryDistributor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDistributor")
            .field("spec", &self.spec)
            .field("topic", &self.topic)
            .field("persistent", &self.is_persistent())
            .finish()
    }
}

// =============================================================================
// Server
// =============================================================================

/// In-process live server holding all distributions in memory.
pub struct InMemoryServer {
    rulesets: HashMap<String, Arc<NormalizationRuleSet>>,
    distributors: Mutex<HashMap<LiveDataSpec, Arc<InMemoryDistributor>>>,
    running: AtomicBool,
}

impl InMemoryServer {
    /// Create a server distributing through the given rule sets, keyed
    /// by rule-set name.
    #[must_use]
    pub fn new(rulesets: Vec<Arc<NormalizationRuleSet>>) -> Self {
        let rulesets = rulesets
            .into_iter()
            .map(|rs| (rs.name().to_owned(), rs))
            .collect();
        Self {
            rulesets,
            distributors: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
        }
    }

    /// Whether the server has been started and not yet stopped.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The distributor for `spec`, if currently active.
    #[must_use]
    pub fn distributor(&self, spec: &LiveDataSpec) -> Option<Arc<InMemoryDistributor>> {
        self.distributors.lock().get(spec).cloned()
    }

    /// Feed one raw tick for `security` into every distribution of that
    /// security.
    pub fn distribute(&self, security: &SecurityId, raw: &Message) {
        let targets: Vec<_> = self
            .distributors
            .lock()
            .values()
            .filter(|d| &d.spec.security == security)
            .cloned()
            .collect();
        for distributor in targets {
            distributor.distribute(raw.clone());
        }
    }

    fn subscribe_single(&self, spec: &LiveDataSpec, persistent: bool) -> SubscriptionResult {
        let Some(ruleset) = self.rulesets.get(&spec.normalization) else {
            return SubscriptionResult::failure(
                spec.clone(),
                format!("unknown normalization rule set '{}'", spec.normalization),
            );
        };

        let mut distributors = self.distributors.lock();
        let distributor = distributors.entry(spec.clone()).or_insert_with(|| {
            Arc::new(InMemoryDistributor::new(
                spec.clone(),
                Arc::clone(ruleset),
                persistent,
            ))
        });
        // Re-subscribing persistently upgrades an existing distribution,
        // never the other way around.
        if persistent {
            distributor.set_persistent(true);
        }
        SubscriptionResult::success(spec.clone(), distributor.topic().to_owned())
    }
}

#[async_trait]
impl LiveDataServer for InMemoryServer {
    async fn subscribe(
        &self,
        specs: &[LiveDataSpec],
        persistent: bool,
    ) -> Result<Vec<SubscriptionResult>, ServerError> {
        if !self.is_running() {
            return Err(ServerError::Unavailable("server not started".to_owned()));
        }
        Ok(specs
            .iter()
            .map(|spec| self.subscribe_single(spec, persistent))
            .collect())
    }

    async fn unsubscribe(&self, specs: &[LiveDataSpec]) -> Result<(), ServerError> {
        let mut distributors = self.distributors.lock();
        for spec in specs {
            if distributors.remove(spec).is_some() {
                debug!(spec = %spec, "distribution torn down");
            }
        }
        Ok(())
    }

    async fn active_subscriptions(&self) -> Vec<ActiveSubscription> {
        self.distributors
            .lock()
            .values()
            .map(|d| ActiveSubscription {
                spec: d.spec.clone(),
                distributor: Arc::clone(d) as Arc<dyn Distributor>,
            })
            .collect()
    }

    async fn distributors_for(
        &self,
        specs: &[LiveDataSpec],
    ) -> Result<HashMap<LiveDataSpec, Arc<dyn Distributor>>, ServerError> {
        let distributors = self.distributors.lock();
        Ok(specs
            .iter()
            .filter_map(|spec| {
                distributors
                    .get(spec)
                    .map(|d| (spec.clone(), Arc::clone(d) as Arc<dyn Distributor>))
            })
            .collect())
    }

    async fn start(&self) -> Result<(), ServerError> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ServerError> {
        self.running.store(false, Ordering::SeqCst);
        self.distributors.lock().clear();
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryServer")
            .field("rulesets", &self.rulesets.len())
            .field("distributions", &self.distributors.lock().len())
            .field("running", &self.is_running())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::normalization::{FieldFilter, FieldHistoryUpdater, NormalizationRule};

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn standard_ruleset() -> Arc<NormalizationRuleSet> {
        let rules: Vec<Arc<dyn NormalizationRule>> = vec![
            Arc::new(FieldFilter::new(["BID", "ASK"])),
            Arc::new(FieldHistoryUpdater),
        ];
        Arc::new(NormalizationRuleSet::new("standard", rules))
    }

    async fn started_server() -> InMemoryServer {
        let server = InMemoryServer::new(vec![standard_ruleset()]);
        server.start().await.unwrap();
        server
    }

    #[tokio::test]
    async fn subscribe_creates_distribution_with_topic() {
        let server = started_server().await;
        let spec = LiveDataSpec::new("AAPL", "standard");

        let results = server.subscribe(&[spec.clone()], false).await.unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].succeeded);
        assert_eq!(results[0].description, "AAPL.standard");
        assert!(server.distributor(&spec).is_some());
    }

    #[tokio::test]
    async fn subscribe_to_unknown_ruleset_fails_per_spec() {
        let server = started_server().await;
        let good = LiveDataSpec::new("AAPL", "standard");
        let bad = LiveDataSpec::new("AAPL", "nonexistent");

        let results = server
            .subscribe(&[good.clone(), bad.clone()], false)
            .await
            .unwrap();

        assert!(results[0].succeeded);
        assert!(!results[1].succeeded);
        assert!(server.distributor(&bad).is_none());
    }

    #[tokio::test]
    async fn subscribe_before_start_is_unavailable() {
        let server = InMemoryServer::new(vec![standard_ruleset()]);
        let spec = LiveDataSpec::new("AAPL", "standard");

        let err = server.subscribe(&[spec], false).await.unwrap_err();
        assert!(matches!(err, ServerError::Unavailable(_)));
    }

    #[tokio::test]
    async fn persistent_resubscribe_upgrades_in_place() {
        let server = started_server().await;
        let spec = LiveDataSpec::new("AAPL", "standard");

        server.subscribe(&[spec.clone()], false).await.unwrap();
        let before = server.distributor(&spec).unwrap();
        assert!(!before.is_persistent());

        server.subscribe(&[spec.clone()], true).await.unwrap();
        let after = server.distributor(&spec).unwrap();
        assert!(Arc::ptr_eq(&before, &after), "same distribution object");
        assert!(after.is_persistent());

        // A later non-persistent subscribe must not downgrade it.
        server.subscribe(&[spec.clone()], false).await.unwrap();
        assert!(server.distributor(&spec).unwrap().is_persistent());
    }

    #[tokio::test]
    async fn distribute_normalizes_and_fans_out() {
        let server = started_server().await;
        let spec = LiveDataSpec::new("AAPL", "standard");
        server.subscribe(&[spec.clone()], false).await.unwrap();

        let mut rx = server.distributor(&spec).unwrap().receiver();
        let raw = Message::new()
            .with("BID", dec("50.80"))
            .with("NOISE", dec("1"));
        server.distribute(&SecurityId::new("AAPL"), &raw);

        let delivered = rx.try_recv().unwrap();
        assert_eq!(delivered.first_decimal("BID"), Some(dec("50.80")));
        assert!(!delivered.contains("NOISE"));
    }

    #[tokio::test]
    async fn dropped_ticks_are_not_fanned_out() {
        let server = started_server().await;
        let spec = LiveDataSpec::new("AAPL", "standard");
        server.subscribe(&[spec.clone()], false).await.unwrap();

        let mut rx = server.distributor(&spec).unwrap().receiver();
        // Nothing survives the field filter.
        server.distribute(&SecurityId::new("AAPL"), &Message::new().with("NOISE", dec("1")));

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn each_distribution_keeps_private_history() {
        let server = started_server().await;
        let aapl = LiveDataSpec::new("AAPL", "standard");
        let msft = LiveDataSpec::new("MSFT", "standard");
        server
            .subscribe(&[aapl.clone(), msft.clone()], false)
            .await
            .unwrap();

        let mut msft_rx = server.distributor(&msft).unwrap().receiver();
        server.distribute(&SecurityId::new("AAPL"), &Message::new().with("BID", dec("50")));

        // The tick only reached the AAPL distribution.
        assert!(msft_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_tears_down_distribution() {
        let server = started_server().await;
        let spec = LiveDataSpec::new("AAPL", "standard");
        server.subscribe(&[spec.clone()], false).await.unwrap();

        server.unsubscribe(&[spec.clone()]).await.unwrap();

        assert!(server.distributor(&spec).is_none());
        assert!(server.active_subscriptions().await.is_empty());
    }

    #[tokio::test]
    async fn distributors_for_returns_only_active_subset() {
        let server = started_server().await;
        let active = LiveDataSpec::new("AAPL", "standard");
        let inactive = LiveDataSpec::new("MSFT", "standard");
        server.subscribe(&[active.clone()], false).await.unwrap();

        let found = server
            .distributors_for(&[active.clone(), inactive])
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert!(found.contains_key(&active));
    }

    #[tokio::test]
    async fn stop_clears_distributions() {
        let server = started_server().await;
        let spec = LiveDataSpec::new("AAPL", "standard");
        server.subscribe(&[spec.clone()], false).await.unwrap();

        server.stop().await.unwrap();

        assert!(!server.is_running());
        assert!(server.distributor(&spec).is_none());
    }
}
