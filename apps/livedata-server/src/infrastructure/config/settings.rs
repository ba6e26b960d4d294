//! Server Configuration Settings
//!
//! Configuration types for the live-data server, loaded from
//! environment variables.

use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::application::services::ManagerConfig;
use crate::domain::normalization::MarketValueCalculator;

/// Reconciliation-loop settings.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Period of the background refresh/reconcile/save pass.
    pub save_period: Duration,
    /// Maximum specs per bulk subscribe request.
    pub subscribe_batch_size: usize,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            save_period: Duration::from_secs(60),
            subscribe_batch_size: 50,
        }
    }
}

impl From<&ManagerSettings> for ManagerConfig {
    fn from(settings: &ManagerSettings) -> Self {
        Self {
            save_period: settings.save_period,
            subscribe_batch_size: settings.subscribe_batch_size,
        }
    }
}

/// Normalization-pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Spread beyond which the market-value rule trusts the last trade
    /// over the bid/ask mid.
    pub liquidity_threshold: Decimal,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            liquidity_threshold: MarketValueCalculator::DEFAULT_LIQUIDITY_THRESHOLD,
        }
    }
}

/// Combining-dispatch settings.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Size of the shared worker pool used for combining fan-out.
    pub worker_pool_size: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            worker_pool_size: 8,
        }
    }
}

/// Complete server configuration.
#[derive(Debug, Clone, Default)]
pub struct LiveDataSettings {
    /// Reconciliation-loop settings.
    pub manager: ManagerSettings,
    /// Normalization-pipeline settings.
    pub pipeline: PipelineSettings,
    /// Combining-dispatch settings.
    pub dispatch: DispatchSettings,
    /// Optional path of the JSON subscription file; `None` keeps
    /// persistent subscriptions in memory only.
    pub subscription_file: Option<PathBuf>,
}

impl LiveDataSettings {
    /// Create configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let manager = ManagerSettings {
            save_period: parse_env_duration_secs(
                "LIVEDATA_SAVE_PERIOD_SECS",
                ManagerSettings::default().save_period,
            ),
            subscribe_batch_size: parse_env_usize(
                "LIVEDATA_SUBSCRIBE_BATCH_SIZE",
                ManagerSettings::default().subscribe_batch_size,
            ),
        };

        let pipeline = PipelineSettings {
            liquidity_threshold: parse_env_decimal(
                "LIVEDATA_LIQUIDITY_THRESHOLD",
                PipelineSettings::default().liquidity_threshold,
            ),
        };

        let dispatch = DispatchSettings {
            worker_pool_size: parse_env_usize(
                "LIVEDATA_WORKER_POOL_SIZE",
                DispatchSettings::default().worker_pool_size,
            ),
        };

        let subscription_file = std::env::var("LIVEDATA_SUBSCRIPTION_FILE")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        Self {
            manager,
            pipeline,
            dispatch,
            subscription_file,
        }
    }
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_decimal(key: &str, default: Decimal) -> Decimal {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn manager_settings_defaults() {
        let settings = ManagerSettings::default();
        assert_eq!(settings.save_period, Duration::from_secs(60));
        assert_eq!(settings.subscribe_batch_size, 50);
    }

    #[test]
    fn pipeline_settings_defaults() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.liquidity_threshold, Decimal::from_str("10").unwrap());
    }

    #[test]
    fn dispatch_settings_defaults() {
        let settings = DispatchSettings::default();
        assert_eq!(settings.worker_pool_size, 8);
    }

    #[test]
    fn manager_config_conversion() {
        let settings = ManagerSettings {
            save_period: Duration::from_secs(5),
            subscribe_batch_size: 7,
        };
        let config = ManagerConfig::from(&settings);
        assert_eq!(config.save_period, Duration::from_secs(5));
        assert_eq!(config.subscribe_batch_size, 7);
    }

    #[test]
    fn subscription_file_defaults_to_none() {
        let settings = LiveDataSettings::default();
        assert!(settings.subscription_file.is_none());
    }
}
