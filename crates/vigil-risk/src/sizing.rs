//! Position sizing.
//!
//! Two modes: small-capital (fixed margin times the leverage hint) below a
//! capital threshold, and standard (per-strategy allocation, fixed risk
//! fraction, divided by the stop distance) above it. Margin is always
//! clamped post-hoc to the configured band, and sizing rejects outright
//! when the required margin would eat more than the configured fraction of
//! available balance.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use vigil_core::{Price, Qty, Signal, Usd};

use crate::error::Result;
use crate::gate::RiskGate;

/// A sizing decision for an admitted signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSizing {
    /// Notional position value.
    pub notional: Usd,
    /// Required isolated margin.
    pub margin: Usd,
    /// Order quantity at the planned entry.
    pub qty: Qty,
    /// Leverage the sizing assumes.
    pub leverage: u32,
    /// Planned entry the quantity was computed against.
    pub entry: Price,
}

impl PositionSizing {
    /// Re-derive the sizing for a reduced leverage, keeping the requested
    /// margin: notional shrinks, quantity follows.
    pub fn with_leverage(&self, leverage: u32) -> Self {
        let leverage = leverage.max(1);
        let notional = self.margin * Decimal::from(leverage);
        let qty = Qty::new(notional.inner() / self.entry.inner());
        Self {
            notional,
            margin: self.margin,
            qty,
            leverage,
            entry: self.entry,
        }
    }
}

impl RiskGate {
    /// Compute position size for an admitted signal.
    ///
    /// Returns `None` when the required margin exceeds the configured
    /// fraction of available balance, or when the signal's stop distance is
    /// degenerate.
    pub async fn size_position(&self, signal: &Signal) -> Result<Option<PositionSizing>> {
        let balance = self.balance.get().await;
        let capital = balance.total;
        let leverage = signal.leverage.max(1);
        let lev = Decimal::from(leverage);

        let min = Usd::new(self.config.min_margin);
        let max = Usd::new(self.config.max_margin);

        let (notional, margin) = if capital.inner() < self.config.small_capital_threshold {
            // Small-capital mode: fixed margin, leverage hint sets notional.
            let margin = Usd::new(self.config.fixed_margin).clamp(min, max);
            (margin * lev, margin)
        } else {
            // Standard mode: risk a fraction of the strategy allocation and
            // let the stop distance determine notional.
            let stop_fraction = signal.stop_distance_pct() / Decimal::from(100);
            if stop_fraction <= Decimal::ZERO {
                return Ok(None);
            }
            let allocation = capital * self.config.allocation_for(&signal.strategy);
            let risk = allocation * self.config.risk_fraction;
            let mut notional = risk / stop_fraction;
            let raw_margin = notional / lev;
            let margin = raw_margin.clamp(min, max);
            if margin != raw_margin {
                notional = margin * lev;
            }
            (notional, margin)
        };

        let margin_cap = balance.available * self.config.max_balance_fraction;
        if margin > margin_cap {
            debug!(
                symbol = %signal.symbol,
                %margin,
                %margin_cap,
                "sizing rejected: margin exceeds available balance budget"
            );
            return Ok(None);
        }

        let qty = Qty::new(notional.inner() / signal.entry.inner());
        Ok(Some(PositionSizing {
            notional,
            margin,
            qty,
            leverage,
            entry: signal.entry,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::BalanceCache;
    use crate::blacklist::DailyBlacklist;
    use crate::config::RiskConfig;
    use crate::sector::SectorMap;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::Duration;
    use vigil_core::{Side, SignalId, SignalStatus, Timeframe};
    use vigil_exchange::{AccountBalance, MockExchangeClient};
    use vigil_store::MemoryStore;

    fn signal() -> Signal {
        Signal {
            id: SignalId::new(),
            symbol: "BTCUSDT".to_string(),
            side: Side::Long,
            entry: Price::new(dec!(100)),
            zone_low: Price::new(dec!(99)),
            zone_high: Price::new(dec!(101)),
            stop_loss: Price::new(dec!(98)),
            take_profit_1: Price::new(dec!(103)),
            take_profit_2: None,
            leverage: 5,
            confidence: dec!(0.7),
            strategy: "trend".to_string(),
            tp_split: dec!(0.7),
            timeframe: Timeframe::M15,
            status: SignalStatus::Pending,
            created_at: Utc::now(),
        }
    }

    fn gate_with_balance(total: Decimal, available: Decimal) -> RiskGate {
        let mut mock = MockExchangeClient::new();
        mock.expect_account_balance().returning(move || {
            Ok(AccountBalance {
                total: Usd::new(total),
                available: Usd::new(available),
            })
        });
        let config = RiskConfig::default();
        let balance = Arc::new(BalanceCache::new(
            Arc::new(mock),
            Duration::from_secs(60),
            Usd::new(dec!(500)),
        ));
        let blacklist = Arc::new(DailyBlacklist::new(config.blacklist_loss_limit));
        RiskGate::new(
            config,
            Arc::new(MemoryStore::new()),
            balance,
            blacklist,
            SectorMap::default(),
        )
    }

    #[tokio::test]
    async fn test_small_capital_mode() {
        let gate = gate_with_balance(dec!(500), dec!(450));
        let sizing = gate.size_position(&signal()).await.unwrap().unwrap();
        // Fixed $10 margin times 5x leverage.
        assert_eq!(sizing.margin, Usd::new(dec!(10)));
        assert_eq!(sizing.notional, Usd::new(dec!(50)));
        assert_eq!(sizing.qty, Qty::new(dec!(0.5)));
        assert_eq!(sizing.leverage, 5);
    }

    #[tokio::test]
    async fn test_standard_mode() {
        let gate = gate_with_balance(dec!(2000), dec!(1800));
        let sizing = gate.size_position(&signal()).await.unwrap().unwrap();
        // allocation 2000*0.25=500, risk 500*0.02=10, stop 2% -> notional 500.
        assert_eq!(sizing.notional, Usd::new(dec!(500)));
        assert_eq!(sizing.margin, Usd::new(dec!(100)));
        assert_eq!(sizing.qty, Qty::new(dec!(5)));
    }

    #[tokio::test]
    async fn test_margin_clamped_recomputes_notional() {
        let gate = gate_with_balance(dec!(20000), dec!(18000));
        let sizing = gate.size_position(&signal()).await.unwrap().unwrap();
        // allocation 5000, risk 100, stop 2% -> raw notional 5000 and raw
        // margin 1000; clamped to 100, notional recomputed to 500.
        assert_eq!(sizing.margin, Usd::new(dec!(100)));
        assert_eq!(sizing.notional, Usd::new(dec!(500)));
    }

    #[tokio::test]
    async fn test_rejects_when_margin_exceeds_available_budget() {
        // Small-capital mode wants $10 margin but only $10 available:
        // 10 > 0.9 * 10.
        let gate = gate_with_balance(dec!(10), dec!(10));
        assert!(gate.size_position(&signal()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_with_leverage_preserves_margin() {
        let sizing = PositionSizing {
            notional: Usd::new(dec!(50)),
            margin: Usd::new(dec!(10)),
            qty: Qty::new(dec!(0.5)),
            leverage: 5,
            entry: Price::new(dec!(100)),
        };
        let reduced = sizing.with_leverage(3);
        assert_eq!(reduced.margin, Usd::new(dec!(10)));
        assert_eq!(reduced.notional, Usd::new(dec!(30)));
        assert_eq!(reduced.qty, Qty::new(dec!(0.3)));
        assert_eq!(reduced.leverage, 3);
    }
}
