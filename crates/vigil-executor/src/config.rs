//! Executor configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Executor configuration. All thresholds are tunable policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Safe fallback leverage when the requested leverage is rejected by
    /// the exchange.
    #[serde(default = "default_fallback_leverage")]
    pub fallback_leverage: u32,
    /// Bounded retries for protective-order creation.
    #[serde(default = "default_protect_retries")]
    pub protect_retries: u32,
    /// Backoff between protective-order retries, in milliseconds.
    #[serde(default = "default_protect_backoff_ms")]
    pub protect_backoff_ms: u64,
    /// First take-profit distance in R-multiples of the actual risk.
    #[serde(default = "default_tp1_r_multiple")]
    pub tp1_r_multiple: Decimal,
    /// Second take-profit distance in R-multiples of the actual risk.
    #[serde(default = "default_tp2_r_multiple")]
    pub tp2_r_multiple: Decimal,
    /// Limit-order validity in candle periods of the signal timeframe.
    #[serde(default = "default_limit_validity_candles")]
    pub limit_validity_candles: u32,
}

fn default_fallback_leverage() -> u32 {
    5
}

fn default_protect_retries() -> u32 {
    3
}

fn default_protect_backoff_ms() -> u64 {
    500
}

fn default_tp1_r_multiple() -> Decimal {
    Decimal::new(12, 1) // 1.2R
}

fn default_tp2_r_multiple() -> Decimal {
    Decimal::from(4) // 4R
}

fn default_limit_validity_candles() -> u32 {
    3
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            fallback_leverage: default_fallback_leverage(),
            protect_retries: default_protect_retries(),
            protect_backoff_ms: default_protect_backoff_ms(),
            tp1_r_multiple: default_tp1_r_multiple(),
            tp2_r_multiple: default_tp2_r_multiple(),
            limit_validity_candles: default_limit_validity_candles(),
        }
    }
}
