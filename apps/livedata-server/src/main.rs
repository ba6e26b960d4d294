//! Live Data Server Binary
//!
//! Starts the market-data distribution server.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin livedata-server
//! ```
//!
//! # Environment Variables
//!
//! ## Optional
//! - `LIVEDATA_SUBSCRIPTION_FILE`: JSON file of persistent subscriptions
//!   (default: in-memory only)
//! - `LIVEDATA_SAVE_PERIOD_SECS`: Reconciliation period (default: 60)
//! - `LIVEDATA_SUBSCRIBE_BATCH_SIZE`: Specs per bulk subscribe (default: 50)
//! - `LIVEDATA_LIQUIDITY_THRESHOLD`: Bid/ask spread beyond which the last
//!   trade overrides the mid (default: 10)
//! - `LIVEDATA_WORKER_POOL_SIZE`: Combining fan-out pool size (default: 8)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use livedata_server::application::ports::SubscriptionStore;
use livedata_server::infrastructure::telemetry;
use livedata_server::{
    FieldHistoryUpdater, FileSubscriptionStore, InMemoryServer, InMemorySubscriptionStore,
    LiveDataServer, LiveDataSettings, ManagerConfig, MarketValueCalculator, NormalizationRule,
    NormalizationRuleSet, PersistentSubscriptionManager, fields,
};
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    telemetry::init();

    tracing::info!("Starting live data server");

    let settings = LiveDataSettings::from_env();
    log_config(&settings);

    let server = Arc::new(InMemoryServer::new(vec![
        standard_ruleset(&settings),
        raw_ruleset(),
    ]));
    server.start().await?;

    let store: Arc<dyn SubscriptionStore> = match &settings.subscription_file {
        Some(path) => Arc::new(FileSubscriptionStore::new(path.clone())),
        None => Arc::new(InMemorySubscriptionStore::new()),
    };

    let manager = Arc::new(PersistentSubscriptionManager::new(
        Arc::clone(&server) as Arc<dyn LiveDataServer>,
        store,
        ManagerConfig::from(&settings.manager),
    ));
    manager.start().await;

    tracing::info!("Live data server ready");

    await_shutdown().await;

    manager.stop().await;
    server.stop().await?;

    tracing::info!("Live data server stopped");
    Ok(())
}

/// The default normalization pipeline: scrub to the canonical fields,
/// derive the market value and record history.
fn standard_ruleset(settings: &LiveDataSettings) -> Arc<NormalizationRuleSet> {
    let rules: Vec<Arc<dyn NormalizationRule>> = vec![
        Arc::new(livedata_server::FieldFilter::new([
            fields::BID,
            fields::ASK,
            fields::LAST,
            fields::MID,
            fields::CLOSE,
            fields::CLOSING_BID,
            fields::CLOSING_ASK,
            fields::IMPLIED_VOLATILITY,
            fields::BEST_IMPLIED_VOLATILITY,
            fields::MID_IMPLIED_VOLATILITY,
            fields::LAST_IMPLIED_VOLATILITY,
            fields::BID_IMPLIED_VOLATILITY,
            fields::ASK_IMPLIED_VOLATILITY,
            fields::ANNUAL_DIVIDEND,
            fields::NEXT_DIVIDEND_DATE,
        ])),
        Arc::new(MarketValueCalculator::with_threshold(
            settings.pipeline.liquidity_threshold,
        )),
        Arc::new(livedata_server::ImpliedVolatilityCalculator),
        Arc::new(livedata_server::DividendYieldCalculator),
        Arc::new(livedata_server::NextDividendDateCalculator),
        Arc::new(FieldHistoryUpdater),
        Arc::new(livedata_server::RequiredFieldFilter::new([
            fields::MARKET_VALUE,
        ])),
    ];
    Arc::new(NormalizationRuleSet::new("standard", rules))
}

/// Pass-through pipeline that still records field history.
fn raw_ruleset() -> Arc<NormalizationRuleSet> {
    let rules: Vec<Arc<dyn NormalizationRule>> = vec![Arc::new(FieldHistoryUpdater)];
    Arc::new(NormalizationRuleSet::new("", rules))
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(settings: &LiveDataSettings) {
    tracing::info!(
        save_period_secs = settings.manager.save_period.as_secs(),
        subscribe_batch_size = settings.manager.subscribe_batch_size,
        liquidity_threshold = %settings.pipeline.liquidity_threshold,
        worker_pool_size = settings.dispatch.worker_pool_size,
        subscription_file = ?settings.subscription_file,
        "Configuration loaded"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
