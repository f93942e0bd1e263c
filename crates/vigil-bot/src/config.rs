//! Application configuration.
//!
//! One TOML file with a section per component. Every field has a serde
//! default, so a partial file (or none at all) still yields a runnable
//! configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;
use vigil_executor::ExecutorConfig;
use vigil_monitor::MonitorConfig;
use vigil_queue::QueueConfig;
use vigil_reconciler::ReconcilerConfig;
use vigil_risk::RiskConfig;

use crate::error::{AppError, AppResult};

/// Paper exchange settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperConfig {
    /// Starting account balance in USD.
    #[serde(default = "default_starting_balance")]
    pub starting_balance: Decimal,
}

fn default_starting_balance() -> Decimal {
    Decimal::from(1000)
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            starting_balance: default_starting_balance(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub paper: PaperConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    /// Daily-summary log interval in seconds.
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

fn default_stats_interval_secs() -> u64 {
    3600
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            paper: PaperConfig::default(),
            queue: QueueConfig::default(),
            risk: RiskConfig::default(),
            executor: ExecutorConfig::default(),
            monitor: MonitorConfig::default(),
            reconciler: ReconcilerConfig::default(),
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("failed to read {path}: {e}")))?;
        toml::from_str(&contents)
            .map_err(|e| AppError::Config(format!("failed to parse {path}: {e}")))
    }

    /// Load from a file, falling back to defaults when it is absent or
    /// malformed.
    pub fn load_or_default(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(err) => {
                warn!(%err, path, "config not loaded, using defaults");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_are_runnable() {
        let config = AppConfig::default();
        assert_eq!(config.paper.starting_balance, dec!(1000));
        assert_eq!(config.queue.capacity, 100);
        assert_eq!(config.executor.limit_validity_candles, 3);
        assert_eq!(config.stats_interval_secs, 3600);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [paper]
            starting_balance = "2500"

            [risk]
            max_positions = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.paper.starting_balance, dec!(2500));
        assert_eq!(config.risk.max_positions, 8);
        // Unspecified sections keep their defaults.
        assert_eq!(config.risk.max_per_side, 3);
        assert_eq!(config.monitor.poll_interval_ms, 2000);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_or_default("/nonexistent/vigil.toml");
        assert_eq!(config.queue.capacity, 100);
    }
}
