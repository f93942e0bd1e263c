//! Protective-order attachment.
//!
//! Invoked synchronously on an immediate fill and asynchronously by the
//! order monitor on a monitored fill. Preserves the planned risk structure
//! but shifts it by the realized entry slippage, then re-derives the take
//! profits at fixed R-multiples from the actual entry and stop.
//!
//! Stop-loss placement failure is fatal-and-urgent: the position is closed
//! at market. Take-profit failures are non-fatal; the stop already
//! protects capital.

use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use vigil_core::{Price, Qty, Side, Signal};
use vigil_exchange::{AlgoKind, AlgoOrderRequest, InstrumentSpec};

use crate::executor::OrderExecutor;

/// Stop and take-profit levels with the quantity split between tiers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProtectiveLevels {
    pub stop_loss: Price,
    pub take_profit_1: Price,
    /// None when partials were collapsed into a single full take-profit.
    pub take_profit_2: Option<Price>,
    pub tp1_qty: Qty,
    pub tp2_qty: Qty,
}

/// Outcome of a protective-order attachment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectOutcome {
    /// Stop-loss is live (take-profits best-effort).
    Protected,
    /// Stop-loss could not be placed; the position was closed at market.
    EmergencyClosed,
    /// The emergency close itself failed. Manual intervention required.
    Critical,
}

/// Re-derive protective levels from the realized entry.
///
/// `actual_stop = planned_stop + (actual_entry - planned_entry)`, and the
/// take-profits sit at `tp1_r`/`tp2_r` R-multiples from the actual
/// entry/stop.
pub fn compute_levels(
    signal: &Signal,
    actual_entry: Price,
    qty: Qty,
    tp1_r: Decimal,
    tp2_r: Decimal,
) -> ProtectiveLevels {
    let shift = actual_entry.inner() - signal.entry.inner();
    let stop_loss = Price::new(signal.stop_loss.inner() + shift);
    let risk = actual_entry.distance(stop_loss);
    let sign = signal.side.sign();
    let take_profit_1 = Price::new(actual_entry.inner() + sign * tp1_r * risk);
    let take_profit_2 = Price::new(actual_entry.inner() + sign * tp2_r * risk);

    let tp1_qty = Qty::new(qty.inner() * signal.tp_split);
    let tp2_qty = qty - tp1_qty;
    ProtectiveLevels {
        stop_loss,
        take_profit_1,
        take_profit_2: Some(take_profit_2),
        tp1_qty,
        tp2_qty,
    }
}

/// Collapse partial take-profits into one full-position tier when either
/// partial would sit below the instrument minimum notional.
pub fn collapse_if_below_min_notional(
    levels: ProtectiveLevels,
    qty: Qty,
    spec: &InstrumentSpec,
) -> ProtectiveLevels {
    let tp1_ok = spec.meets_min_notional(levels.take_profit_1, levels.tp1_qty);
    let tp2_ok = match levels.take_profit_2 {
        Some(tp2) => spec.meets_min_notional(tp2, levels.tp2_qty),
        None => true,
    };
    if tp1_ok && tp2_ok {
        return levels;
    }
    debug!("partial take-profits below min notional, collapsing to single tier");
    ProtectiveLevels {
        take_profit_2: None,
        tp1_qty: qty,
        tp2_qty: Qty::ZERO,
        ..levels
    }
}

impl OrderExecutor {
    /// Attach stop-loss and take-profit orders to a filled position.
    ///
    /// Shared by the immediate-fill path and the order monitor. Never
    /// returns an error: every failure mode resolves to one of the
    /// explicit outcomes.
    pub async fn attach_protective_orders(
        &self,
        symbol: &str,
        side: Side,
        qty: Qty,
        signal: &Signal,
        actual_entry: Price,
    ) -> (ProtectOutcome, ProtectiveLevels) {
        let mut levels = compute_levels(
            signal,
            actual_entry,
            qty,
            self.config.tp1_r_multiple,
            self.config.tp2_r_multiple,
        );

        // Clear any conflicting protective orders left on the symbol.
        if let Err(err) = self.exchange.cancel_all_algo_orders(symbol).await {
            warn!(symbol, %err, "failed to cancel pre-existing algo orders");
        }

        // Stop-loss first. This one is mandatory.
        if !self
            .place_algo_with_retry(AlgoOrderRequest {
                symbol: symbol.to_string(),
                kind: AlgoKind::StopLoss,
                position_side: side,
                trigger_price: levels.stop_loss,
                qty,
            })
            .await
        {
            return (self.emergency_close(symbol, side, qty).await, levels);
        }

        // Take-profits are best-effort.
        match self.exchange.instrument_spec(symbol).await {
            Ok(spec) => levels = collapse_if_below_min_notional(levels, qty, &spec),
            Err(err) => {
                warn!(symbol, %err, "instrument spec unavailable, keeping partial take-profits");
            }
        }

        let tp1_placed = self
            .place_algo_with_retry(AlgoOrderRequest {
                symbol: symbol.to_string(),
                kind: AlgoKind::TakeProfit,
                position_side: side,
                trigger_price: levels.take_profit_1,
                qty: levels.tp1_qty,
            })
            .await;
        if !tp1_placed {
            warn!(symbol, "take-profit 1 placement failed, stop-loss still protects the position");
        }

        if let Some(tp2) = levels.take_profit_2 {
            if levels.tp2_qty.is_positive() {
                let tp2_placed = self
                    .place_algo_with_retry(AlgoOrderRequest {
                        symbol: symbol.to_string(),
                        kind: AlgoKind::TakeProfit,
                        position_side: side,
                        trigger_price: tp2,
                        qty: levels.tp2_qty,
                    })
                    .await;
                if !tp2_placed {
                    warn!(symbol, "take-profit 2 placement failed");
                }
            }
        }

        info!(
            symbol,
            stop = %levels.stop_loss,
            tp1 = %levels.take_profit_1,
            "protective orders attached"
        );
        (ProtectOutcome::Protected, levels)
    }

    /// Place a conditional order with bounded retry and backoff.
    ///
    /// "Already exists in this direction" is idempotent success, not a
    /// failure.
    async fn place_algo_with_retry(&self, request: AlgoOrderRequest) -> bool {
        for attempt in 0..=self.config.protect_retries {
            match self.exchange.place_algo_order(request.clone()).await {
                Ok(_) => return true,
                Err(err) if err.is_idempotent_conflict() => {
                    debug!(symbol = %request.symbol, kind = %request.kind, "conditional order already in place");
                    return true;
                }
                Err(err) => {
                    warn!(
                        symbol = %request.symbol,
                        kind = %request.kind,
                        attempt,
                        %err,
                        "conditional order placement failed"
                    );
                    if attempt < self.config.protect_retries {
                        tokio::time::sleep(Duration::from_millis(self.config.protect_backoff_ms))
                            .await;
                    }
                }
            }
        }
        false
    }

    /// Close the position at market because it cannot be protected.
    pub(crate) async fn emergency_close(
        &self,
        symbol: &str,
        side: Side,
        qty: Qty,
    ) -> ProtectOutcome {
        error!(symbol, "stop-loss placement exhausted retries, closing position at market");
        match self.exchange.market_close(symbol, side, qty).await {
            Ok(()) => ProtectOutcome::EmergencyClosed,
            Err(err) => {
                // The one failure class the system cannot self-heal.
                error!(
                    symbol,
                    %err,
                    "CRITICAL: emergency close failed, position is unprotected and needs manual intervention"
                );
                ProtectOutcome::Critical
            }
        }
    }
}
