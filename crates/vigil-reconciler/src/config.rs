//! Reconciler configuration.
//!
//! Every rule threshold is independently tunable; the defaults mirror the
//! values the rest of the system is tested against.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Pass interval, in seconds.
    #[serde(default = "default_pass_interval_secs")]
    pub pass_interval_secs: u64,
    /// Wait between first sighting of an unknown position and acting on
    /// it, so a fresh placement by the executor is never raced.
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,
    /// Lookback window for matching a recent signal to an exchange
    /// position, in minutes.
    #[serde(default = "default_signal_lookback_mins")]
    pub signal_lookback_mins: i64,
    /// Adopt unsignaled exchange positions with emergency protection
    /// instead of closing them.
    #[serde(default)]
    pub adopt_unsignaled: bool,
    /// Position margin above this fraction of total capital is oversized.
    #[serde(default = "default_margin_capital_fraction")]
    pub margin_capital_fraction: Decimal,
    /// Absolute position-margin ceiling in USD.
    #[serde(default = "default_margin_ceiling")]
    pub margin_ceiling: Decimal,
    /// Remaining-quantity fraction at or below which the first take-profit
    /// tier is considered filled and the stop moves to break-even.
    #[serde(default = "default_break_even_remaining_fraction")]
    pub break_even_remaining_fraction: Decimal,
    /// How long an open position may sit without a live stop-loss before
    /// it is force-closed, in seconds.
    #[serde(default = "default_missing_stop_grace_secs")]
    pub missing_stop_grace_secs: i64,
    /// Emergency stop-loss distance from entry, in percent, used when no
    /// valid planned stop exists.
    #[serde(default = "default_fallback_stop_pct")]
    pub fallback_stop_pct: Decimal,
    /// Emergency take-profit distance from entry (or from current price
    /// when recentering), in percent.
    #[serde(default = "default_fallback_tp_pct")]
    pub fallback_tp_pct: Decimal,
    /// Consecutive protective-order creation failures per symbol before
    /// escalating to forced liquidation.
    #[serde(default = "default_protect_failure_limit")]
    pub protect_failure_limit: u32,
    /// Maximum holding time in candle periods of the position's timeframe.
    #[serde(default = "default_stale_after_candles")]
    pub stale_after_candles: i32,
    /// Cooldown after a forced close of a symbol, in seconds. Re-detecting
    /// the same anomaly inside the window is a no-op.
    #[serde(default = "default_force_close_cooldown_secs")]
    pub force_close_cooldown_secs: i64,
    /// Price tolerance for nearest-target close classification, in
    /// percent.
    #[serde(default = "default_classify_tolerance_pct")]
    pub classify_tolerance_pct: Decimal,
}

fn default_pass_interval_secs() -> u64 {
    10
}

fn default_debounce_secs() -> u64 {
    5
}

fn default_signal_lookback_mins() -> i64 {
    30
}

fn default_margin_capital_fraction() -> Decimal {
    Decimal::new(3, 1) // 0.3
}

fn default_margin_ceiling() -> Decimal {
    Decimal::from(300)
}

fn default_break_even_remaining_fraction() -> Decimal {
    Decimal::new(35, 2) // 0.35
}

fn default_missing_stop_grace_secs() -> i64 {
    300
}

fn default_fallback_stop_pct() -> Decimal {
    Decimal::TWO
}

fn default_fallback_tp_pct() -> Decimal {
    Decimal::from(3)
}

fn default_protect_failure_limit() -> u32 {
    3
}

fn default_stale_after_candles() -> i32 {
    60
}

fn default_force_close_cooldown_secs() -> i64 {
    120
}

fn default_classify_tolerance_pct() -> Decimal {
    Decimal::new(3, 1) // 0.3
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            pass_interval_secs: default_pass_interval_secs(),
            debounce_secs: default_debounce_secs(),
            signal_lookback_mins: default_signal_lookback_mins(),
            adopt_unsignaled: false,
            margin_capital_fraction: default_margin_capital_fraction(),
            margin_ceiling: default_margin_ceiling(),
            break_even_remaining_fraction: default_break_even_remaining_fraction(),
            missing_stop_grace_secs: default_missing_stop_grace_secs(),
            fallback_stop_pct: default_fallback_stop_pct(),
            fallback_tp_pct: default_fallback_tp_pct(),
            protect_failure_limit: default_protect_failure_limit(),
            stale_after_candles: default_stale_after_candles(),
            force_close_cooldown_secs: default_force_close_cooldown_secs(),
            classify_tolerance_pct: default_classify_tolerance_pct(),
        }
    }
}
