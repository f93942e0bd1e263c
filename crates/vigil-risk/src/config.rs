//! Risk gate configuration.
//!
//! Every threshold is tunable; serde defaults carry the operating values.
//! Percentage limits are inclusive-of-equal: reaching a limit exactly
//! triggers it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Risk gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Daily loss limit as a fraction of day-start capital. Admissions stop
    /// for the rest of the trading day once cumulative realized P&L is at
    /// or below the negative of this fraction.
    #[serde(default = "default_daily_loss_limit")]
    pub daily_loss_limit: Decimal,
    /// Global slot limit: open + pending positions.
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    /// Per-direction slot limit.
    #[serde(default = "default_max_per_side")]
    pub max_per_side: usize,
    /// Losses on a symbol before it is blacklisted for the day.
    #[serde(default = "default_blacklist_loss_limit")]
    pub blacklist_loss_limit: u32,
    /// Simultaneous exposure cap per sector.
    #[serde(default = "default_max_per_sector")]
    pub max_per_sector: usize,
    /// Extra slots allowed when correlated sectors are counted together.
    #[serde(default = "default_correlated_relaxation")]
    pub correlated_relaxation: usize,
    /// Below this account capital, sizing runs in small-capital mode.
    #[serde(default = "default_small_capital_threshold")]
    pub small_capital_threshold: Decimal,
    /// Fixed margin per trade in small-capital mode (USD).
    #[serde(default = "default_fixed_margin")]
    pub fixed_margin: Decimal,
    /// Margin floor (USD).
    #[serde(default = "default_min_margin")]
    pub min_margin: Decimal,
    /// Margin ceiling (USD).
    #[serde(default = "default_max_margin")]
    pub max_margin: Decimal,
    /// Per-strategy capital allocation fractions.
    #[serde(default)]
    pub strategy_allocation: HashMap<String, Decimal>,
    /// Allocation fraction for strategies not listed above.
    #[serde(default = "default_allocation")]
    pub default_allocation: Decimal,
    /// Fraction of the strategy allocation risked per trade.
    #[serde(default = "default_risk_fraction")]
    pub risk_fraction: Decimal,
    /// Required margin must stay at or below this fraction of available
    /// balance, or sizing rejects.
    #[serde(default = "default_max_balance_fraction")]
    pub max_balance_fraction: Decimal,
    /// Balance cache TTL in seconds.
    #[serde(default = "default_balance_ttl_secs")]
    pub balance_ttl_secs: u64,
    /// Capital assumed when the balance has never been fetched (USD).
    #[serde(default = "default_fallback_balance")]
    pub fallback_balance: Decimal,
}

fn default_daily_loss_limit() -> Decimal {
    Decimal::new(10, 2) // 0.10 = 10%
}

fn default_max_positions() -> usize {
    5
}

fn default_max_per_side() -> usize {
    3
}

fn default_blacklist_loss_limit() -> u32 {
    2
}

fn default_max_per_sector() -> usize {
    2
}

fn default_correlated_relaxation() -> usize {
    1
}

fn default_small_capital_threshold() -> Decimal {
    Decimal::from(1000)
}

fn default_fixed_margin() -> Decimal {
    Decimal::from(10)
}

fn default_min_margin() -> Decimal {
    Decimal::from(5)
}

fn default_max_margin() -> Decimal {
    Decimal::from(100)
}

fn default_allocation() -> Decimal {
    Decimal::new(25, 2) // 0.25
}

fn default_risk_fraction() -> Decimal {
    Decimal::new(2, 2) // 0.02
}

fn default_max_balance_fraction() -> Decimal {
    Decimal::new(90, 2) // 0.90
}

fn default_balance_ttl_secs() -> u64 {
    60
}

fn default_fallback_balance() -> Decimal {
    Decimal::from(500)
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            daily_loss_limit: default_daily_loss_limit(),
            max_positions: default_max_positions(),
            max_per_side: default_max_per_side(),
            blacklist_loss_limit: default_blacklist_loss_limit(),
            max_per_sector: default_max_per_sector(),
            correlated_relaxation: default_correlated_relaxation(),
            small_capital_threshold: default_small_capital_threshold(),
            fixed_margin: default_fixed_margin(),
            min_margin: default_min_margin(),
            max_margin: default_max_margin(),
            strategy_allocation: HashMap::new(),
            default_allocation: default_allocation(),
            risk_fraction: default_risk_fraction(),
            max_balance_fraction: default_max_balance_fraction(),
            balance_ttl_secs: default_balance_ttl_secs(),
            fallback_balance: default_fallback_balance(),
        }
    }
}

impl RiskConfig {
    /// Allocation fraction for a strategy tag.
    pub fn allocation_for(&self, strategy: &str) -> Decimal {
        self.strategy_allocation
            .get(strategy)
            .copied()
            .unwrap_or(self.default_allocation)
    }
}
