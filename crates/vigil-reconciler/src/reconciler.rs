//! The reconciliation pass and its seven rules.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vigil_core::{
    BotEvent, CloseReason, EventBus, InFlightSet, Position, PositionMeta, PositionStatus, Price,
    Qty, Side, SignalStatus, TradingControl, Usd,
};
use vigil_exchange::{
    AlgoKind, AlgoOrderRequest, ExchangeClient, ExchangePosition,
};
use vigil_risk::{BalanceCache, DailyBlacklist};
use vigil_store::Store;

use crate::classify::classify_close;
use crate::config::ReconcilerConfig;
use crate::pending::PendingView;

/// Periodic exchange/ledger reconciliation.
pub struct Reconciler {
    config: ReconcilerConfig,
    exchange: Arc<dyn ExchangeClient>,
    store: Arc<dyn Store>,
    balance: Arc<BalanceCache>,
    blacklist: Arc<DailyBlacklist>,
    pending: Arc<dyn PendingView>,
    in_flight: InFlightSet,
    events: EventBus,
    running: AtomicBool,
    /// First sighting of an exchange position with no local explanation.
    unknown_since: DashMap<String, DateTime<Utc>>,
    /// How long each open position has been without a live stop-loss.
    missing_stop_since: DashMap<String, DateTime<Utc>>,
    /// Consecutive protective-order creation failures per symbol.
    protect_failures: DashMap<String, u32>,
    /// Recently force-closed symbols; re-detection inside the cooldown is
    /// a no-op.
    force_closed_at: DashMap<String, DateTime<Utc>>,
}

impl Reconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ReconcilerConfig,
        exchange: Arc<dyn ExchangeClient>,
        store: Arc<dyn Store>,
        balance: Arc<BalanceCache>,
        blacklist: Arc<DailyBlacklist>,
        pending: Arc<dyn PendingView>,
        in_flight: InFlightSet,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            exchange,
            store,
            balance,
            blacklist,
            pending,
            in_flight,
            events,
            running: AtomicBool::new(false),
            unknown_since: DashMap::new(),
            missing_stop_since: DashMap::new(),
            protect_failures: DashMap::new(),
            force_closed_at: DashMap::new(),
        }
    }

    /// Run passes on the configured interval until the task is aborted.
    pub fn spawn(self: Arc<Self>, control: TradingControl) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(self.config.pass_interval_secs));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!("reconciliation loop started");
            loop {
                interval.tick().await;
                if control.is_running() {
                    self.run_pass().await;
                }
            }
        })
    }

    /// One full pass. Single-flight: a pass that outlives the interval
    /// suppresses the next tick instead of stacking.
    pub async fn run_pass(&self) {
        if self.running.swap(true, Ordering::Acquire) {
            debug!("reconciliation pass still in progress, skipping tick");
            return;
        }
        let result = self.pass().await;
        self.running.store(false, Ordering::Release);
        if let Err(err) = result {
            warn!(%err, "reconciliation pass aborted");
        }
    }

    async fn pass(&self) -> crate::error::Result<()> {
        let exchange_positions = self.exchange.open_positions().await?;
        let local_open = self.store.open_positions().await?;

        self.detect_unknown_positions(&exchange_positions, &local_open)
            .await;
        self.detect_oversized_margin(&exchange_positions, &local_open)
            .await;
        self.relocate_break_even(&exchange_positions, &local_open)
            .await;
        self.watch_protective_orders(&exchange_positions, &local_open)
            .await;
        self.expire_stale_positions(&exchange_positions, &local_open)
            .await;
        self.sync_ledger(&exchange_positions, &local_open).await;
        self.cleanup_orphan_orders(&local_open).await;
        Ok(())
    }

    // === Rule 1: unknown positions ===

    /// Close exchange positions nothing local can explain. A debounce wait
    /// between first sighting and action avoids racing the executor's own
    /// ledger write.
    async fn detect_unknown_positions(
        &self,
        exchange_positions: &[ExchangePosition],
        local_open: &[Position],
    ) {
        let now = Utc::now();
        for pos in exchange_positions {
            let symbol = pos.symbol.as_str();
            if local_open.iter().any(|p| p.symbol == symbol)
                || self.in_flight.contains(symbol)
                || self.pending.has_pending(symbol)
            {
                self.unknown_since.remove(symbol);
                continue;
            }
            match self.recent_signal_exists(symbol).await {
                Ok(true) => {
                    self.unknown_since.remove(symbol);
                    continue;
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(symbol, %err, "signal lookup failed, deferring unknown-position check");
                    continue;
                }
            }
            if self.config.adopt_unsignaled {
                // The ledger sync rule adopts it instead.
                continue;
            }
            let first_seen = *self
                .unknown_since
                .entry(symbol.to_string())
                .or_insert(now)
                .value();
            let elapsed = now - first_seen;
            if elapsed < ChronoDuration::seconds(self.config.debounce_secs as i64) {
                debug!(symbol, "unknown position sighted, debouncing");
                continue;
            }
            warn!(symbol, side = %pos.side, qty = %pos.qty, "closing unauthorized position");
            if self.force_close(symbol, pos.side, pos.qty).await {
                self.unknown_since.remove(symbol);
            }
        }
    }

    /// Any PENDING or FILLED signal for the symbol inside the lookback
    /// window explains the position, on either side (the strategy may run
    /// reversed).
    async fn recent_signal_exists(&self, symbol: &str) -> crate::error::Result<bool> {
        let since = Utc::now() - ChronoDuration::minutes(self.config.signal_lookback_mins);
        let signals = self.store.signals_since(symbol, since).await?;
        Ok(signals.iter().any(|s| {
            matches!(s.status, SignalStatus::Pending | SignalStatus::Filled)
        }))
    }

    // === Rule 2: oversized margin ===

    async fn detect_oversized_margin(
        &self,
        exchange_positions: &[ExchangePosition],
        local_open: &[Position],
    ) {
        if exchange_positions.is_empty() {
            return;
        }
        let capital = self.balance.get().await.total;
        let fraction_cap = capital * self.config.margin_capital_fraction;
        let ceiling = Usd::new(self.config.margin_ceiling);
        for pos in exchange_positions {
            let margin = pos.margin();
            if margin <= fraction_cap && margin <= ceiling {
                continue;
            }
            warn!(
                symbol = %pos.symbol,
                %margin,
                %fraction_cap,
                %ceiling,
                "position margin oversized, force-closing"
            );
            if !self.force_close(&pos.symbol, pos.side, pos.qty).await {
                continue;
            }
            if let Some(local) = local_open.iter().find(|p| p.symbol == pos.symbol) {
                let pnl = local.pnl_at(pos.mark_price, pos.qty);
                self.close_in_ledger(local.clone(), CloseReason::OversizedMargin, pnl)
                    .await;
            }
        }
    }

    // === Rule 3: break-even relocation ===

    /// When live quantity has dropped to the post-TP1 remainder, move the
    /// stop to entry. Exactly once per position: the persisted
    /// `break_even_moved` flag is the authority.
    async fn relocate_break_even(
        &self,
        exchange_positions: &[ExchangePosition],
        local_open: &[Position],
    ) {
        for local in local_open {
            if local.meta.break_even_moved {
                continue;
            }
            let Some(exch) = exchange_positions.iter().find(|p| p.symbol == local.symbol) else {
                continue;
            };
            let Some(remaining) = exch.qty.fraction_of(local.qty) else {
                continue;
            };
            if remaining <= Decimal::ZERO || remaining > self.config.break_even_remaining_fraction {
                continue;
            }
            info!(
                symbol = %local.symbol,
                %remaining,
                entry = %local.entry_price,
                "first take-profit filled, moving stop to break-even"
            );
            if let Err(err) = self.cancel_algos_of_kind(&local.symbol, AlgoKind::StopLoss).await {
                warn!(symbol = %local.symbol, %err, "failed to clear old stop before break-even move");
                continue;
            }
            let request = AlgoOrderRequest {
                symbol: local.symbol.clone(),
                kind: AlgoKind::StopLoss,
                position_side: local.side,
                trigger_price: local.entry_price,
                qty: exch.qty,
            };
            match self.exchange.place_algo_order(request).await {
                Ok(_) => {
                    let mut updated = local.clone();
                    updated.stop_loss = Some(local.entry_price);
                    updated.meta.break_even_moved = true;
                    if let Err(err) = self.store.update_position(updated).await {
                        warn!(symbol = %local.symbol, %err, "break-even ledger update failed");
                    }
                }
                Err(err) if err.is_idempotent_conflict() => {
                    debug!(symbol = %local.symbol, "break-even stop already in place");
                }
                Err(err) => {
                    warn!(symbol = %local.symbol, %err, "break-even stop placement failed");
                }
            }
        }
    }

    // === Rule 4: missing protective orders ===

    async fn watch_protective_orders(
        &self,
        exchange_positions: &[ExchangePosition],
        local_open: &[Position],
    ) {
        let now = Utc::now();
        for local in local_open {
            let symbol = local.symbol.as_str();
            let Some(exch) = exchange_positions.iter().find(|p| p.symbol == symbol) else {
                continue;
            };
            if self.in_cooldown(symbol) {
                continue;
            }
            let algos = match self.exchange.open_algo_orders(Some(symbol.to_string())).await {
                Ok(algos) => algos,
                Err(err) => {
                    warn!(symbol, %err, "algo-order fetch failed");
                    continue;
                }
            };
            let has_stop = algos.iter().any(|a| a.kind == AlgoKind::StopLoss);
            let has_tp = algos.iter().any(|a| a.kind == AlgoKind::TakeProfit);

            if has_stop {
                self.missing_stop_since.remove(symbol);
            } else if self.handle_missing_stop(local, exch, now).await {
                // Position was force-closed; nothing more to do for it.
                continue;
            }

            if !has_tp {
                self.recreate_take_profit(local, exch).await;
            }
        }
    }

    /// Returns true when the position was force-closed.
    async fn handle_missing_stop(
        &self,
        local: &Position,
        exch: &ExchangePosition,
        now: DateTime<Utc>,
    ) -> bool {
        let symbol = local.symbol.as_str();
        let since = *self
            .missing_stop_since
            .entry(symbol.to_string())
            .or_insert(now)
            .value();
        if (now - since) >= ChronoDuration::seconds(self.config.missing_stop_grace_secs) {
            error!(symbol, "stop-loss absent past grace period, force-closing position");
            if self.force_close(symbol, local.side, exch.qty).await {
                let pnl = local.pnl_at(exch.mark_price, exch.qty);
                self.close_in_ledger(local.clone(), CloseReason::MissingStop, pnl)
                    .await;
                return true;
            }
            return false;
        }

        let (stop, emergency) = match self.valid_stop(local) {
            Some(stop) => (stop, false),
            None => (self.fallback_stop(local), true),
        };
        warn!(symbol, %stop, emergency, "stop-loss missing, recreating");
        let request = AlgoOrderRequest {
            symbol: symbol.to_string(),
            kind: AlgoKind::StopLoss,
            position_side: local.side,
            trigger_price: stop,
            qty: exch.qty,
        };
        match self.exchange.place_algo_order(request).await {
            Ok(_) => {
                self.missing_stop_since.remove(symbol);
                self.protect_failures.remove(symbol);
                let mut updated = local.clone();
                updated.stop_loss = Some(stop);
                updated.meta.emergency_stop = updated.meta.emergency_stop || emergency;
                if let Err(err) = self.store.update_position(updated).await {
                    warn!(symbol, %err, "stop recreation ledger update failed");
                }
                false
            }
            Err(err) if err.is_idempotent_conflict() => {
                self.missing_stop_since.remove(symbol);
                false
            }
            Err(err) => {
                let failures = {
                    let mut entry = self.protect_failures.entry(symbol.to_string()).or_insert(0);
                    *entry += 1;
                    *entry
                };
                warn!(symbol, failures, %err, "stop recreation failed");
                if failures >= self.config.protect_failure_limit {
                    error!(symbol, "stop recreation failures exhausted, force-closing position");
                    if self.force_close(symbol, local.side, exch.qty).await {
                        let pnl = local.pnl_at(exch.mark_price, exch.qty);
                        self.close_in_ledger(local.clone(), CloseReason::MissingStop, pnl)
                            .await;
                        self.protect_failures.remove(symbol);
                        return true;
                    }
                }
                false
            }
        }
    }

    /// Take-profit recreation is best-effort: the stop already protects
    /// capital, so absence never force-closes.
    async fn recreate_take_profit(&self, local: &Position, exch: &ExchangePosition) {
        let symbol = local.symbol.as_str();
        let mut tp = match local.take_profit_1 {
            Some(tp) if self.is_profit_side(local, tp) => tp,
            _ => self.fallback_tp(local),
        };
        // Price may have run past the planned target; recenter just beyond
        // the current mark so the order is still triggerable.
        if self.target_passed(local.side, tp, exch.mark_price) {
            tp = self.recentered_tp(local.side, exch.mark_price);
            debug!(symbol, %tp, "planned take-profit already passed, recentering");
        }
        if let Ok(spec) = self.exchange.instrument_spec(symbol).await {
            tp = spec.round_price(tp);
            if !spec.meets_min_notional(tp, exch.qty) {
                debug!(symbol, "remaining quantity below min notional, skipping take-profit");
                return;
            }
        }
        warn!(symbol, %tp, "take-profit missing, recreating");
        let request = AlgoOrderRequest {
            symbol: symbol.to_string(),
            kind: AlgoKind::TakeProfit,
            position_side: local.side,
            trigger_price: tp,
            qty: exch.qty,
        };
        match self.exchange.place_algo_order(request).await {
            Ok(_) => {
                let mut updated = local.clone();
                updated.take_profit_1 = Some(tp);
                if let Err(err) = self.store.update_position(updated).await {
                    warn!(symbol, %err, "take-profit recreation ledger update failed");
                }
            }
            Err(err) if err.is_idempotent_conflict() => {}
            Err(err) => warn!(symbol, %err, "take-profit recreation failed"),
        }
    }

    // === Rule 5: stale positions ===

    async fn expire_stale_positions(
        &self,
        exchange_positions: &[ExchangePosition],
        local_open: &[Position],
    ) {
        let now = Utc::now();
        for local in local_open {
            let Some(timeframe) = local.timeframe else {
                continue;
            };
            let max_holding = timeframe.candle_duration() * self.config.stale_after_candles;
            if local.holding_time(now) <= max_holding {
                continue;
            }
            let Some(exch) = exchange_positions.iter().find(|p| p.symbol == local.symbol) else {
                continue;
            };
            info!(
                symbol = %local.symbol,
                held_mins = local.holding_time(now).num_minutes(),
                "position past maximum holding time, force-closing"
            );
            if self.force_close(&local.symbol, local.side, exch.qty).await {
                let pnl = local.pnl_at(exch.mark_price, exch.qty);
                self.close_in_ledger(local.clone(), CloseReason::StaleExpiry, pnl)
                    .await;
            }
        }
    }

    // === Rule 6: exchange-authoritative ledger sync ===

    async fn sync_ledger(
        &self,
        exchange_positions: &[ExchangePosition],
        local_open: &[Position],
    ) {
        // Adopt exchange positions the ledger lost (crash between fill and
        // insert, or out-of-band entry when adoption is enabled).
        for exch in exchange_positions {
            let symbol = exch.symbol.as_str();
            if local_open.iter().any(|p| p.symbol == symbol)
                || self.in_flight.contains(symbol)
                || self.pending.has_pending(symbol)
            {
                continue;
            }
            if let Err(err) = self.adopt_position(exch).await {
                warn!(symbol, %err, "position adoption failed");
            }
        }

        // Close local positions the exchange no longer holds.
        for local in local_open {
            let symbol = local.symbol.as_str();
            if exchange_positions.iter().any(|p| p.symbol == symbol)
                || self.in_flight.contains(symbol)
            {
                continue;
            }
            self.close_out_of_band(local).await;
        }
    }

    async fn adopt_position(&self, exch: &ExchangePosition) -> crate::error::Result<()> {
        let symbol = exch.symbol.as_str();
        let since = Utc::now() - ChronoDuration::minutes(self.config.signal_lookback_mins);
        let signals = self.store.signals_since(symbol, since).await?;
        let matching = signals
            .iter()
            .filter(|s| matches!(s.status, SignalStatus::Pending | SignalStatus::Filled))
            .next_back();

        let (stop, tp1, tp2, signal_id, timeframe, meta) = match matching {
            Some(signal) => {
                // A realized side opposite to the signal means the strategy
                // ran reversed; stop and take-profit swap roles.
                let (stop, tp1, tp2) = if signal.side == exch.side {
                    (
                        signal.stop_loss,
                        signal.take_profit_1,
                        signal.take_profit_2,
                    )
                } else {
                    (signal.take_profit_1, signal.stop_loss, None)
                };
                (
                    stop,
                    tp1,
                    tp2,
                    Some(signal.id),
                    Some(signal.timeframe),
                    PositionMeta {
                        planned_entry: Some(signal.entry),
                        planned_stop: Some(signal.stop_loss),
                        planned_tp1: Some(signal.take_profit_1),
                        planned_tp2: signal.take_profit_2,
                        actual_entry: Some(exch.entry_price),
                        slippage: Some(exch.entry_price.inner() - signal.entry.inner()),
                        adopted: true,
                        ..PositionMeta::default()
                    },
                )
            }
            None if self.config.adopt_unsignaled => {
                let fallback = Position {
                    id: Uuid::nil(),
                    symbol: symbol.to_string(),
                    side: exch.side,
                    entry_price: exch.entry_price,
                    qty: exch.qty,
                    leverage: exch.leverage,
                    stop_loss: None,
                    take_profit_1: None,
                    take_profit_2: None,
                    status: PositionStatus::Open,
                    signal_id: None,
                    timeframe: None,
                    opened_at: Utc::now(),
                    closed_at: None,
                    realized_pnl: None,
                    meta: PositionMeta::default(),
                };
                (
                    self.fallback_stop(&fallback),
                    self.fallback_tp(&fallback),
                    None,
                    None,
                    None,
                    PositionMeta {
                        actual_entry: Some(exch.entry_price),
                        adopted: true,
                        emergency_stop: true,
                        ..PositionMeta::default()
                    },
                )
            }
            None => return Ok(()), // unknown-position rule owns this case
        };

        info!(symbol, side = %exch.side, qty = %exch.qty, "adopting exchange position into ledger");
        let position = Position {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            side: exch.side,
            entry_price: exch.entry_price,
            qty: exch.qty,
            leverage: exch.leverage,
            stop_loss: Some(stop),
            take_profit_1: Some(tp1),
            take_profit_2: tp2,
            status: PositionStatus::Open,
            signal_id,
            timeframe,
            opened_at: Utc::now(),
            closed_at: None,
            realized_pnl: None,
            meta,
        };
        self.store.insert_position(position).await?;
        self.events.publish(BotEvent::PositionOpened {
            symbol: symbol.to_string(),
            side: exch.side,
        });
        Ok(())
    }

    async fn close_out_of_band(&self, local: &Position) {
        let symbol = local.symbol.as_str();
        let (reason, pnl) = match self.exchange.trade_history(symbol, local.opened_at).await {
            Ok(fills) => {
                let closing: Vec<_> = fills
                    .iter()
                    .filter(|f| f.side == local.side.opposite())
                    .collect();
                match closing.last() {
                    Some(last) => {
                        let pnl = closing
                            .iter()
                            .fold(Usd::ZERO, |acc, f| acc + f.realized_pnl);
                        (
                            classify_close(local, last.price, self.config.classify_tolerance_pct),
                            pnl,
                        )
                    }
                    None => (CloseReason::Manual, Usd::ZERO),
                }
            }
            Err(err) => {
                warn!(symbol, %err, "trade history unavailable, recording manual close");
                (CloseReason::Manual, Usd::ZERO)
            }
        };
        info!(symbol, %reason, %pnl, "position closed out-of-band, updating ledger");
        // Leftover protective orders would orphan; clear them now.
        if let Err(err) = self.exchange.cancel_all_algo_orders(symbol).await {
            debug!(symbol, %err, "algo cleanup after out-of-band close failed");
        }
        self.close_in_ledger(local.clone(), reason, pnl).await;
    }

    // === Rule 7: orphan orders ===

    async fn cleanup_orphan_orders(&self, local_open: &[Position]) {
        let tracked = self.pending.pending_orders();
        match self.exchange.open_orders(None).await {
            Ok(orders) => {
                for order in orders {
                    let known = tracked.iter().any(|p| p.order_id == order.order_id)
                        || self.in_flight.contains(&order.symbol);
                    if known {
                        continue;
                    }
                    info!(symbol = %order.symbol, order_id = %order.order_id, "canceling orphan order");
                    if let Err(err) = self
                        .exchange
                        .cancel_order(&order.symbol, &order.order_id)
                        .await
                    {
                        warn!(symbol = %order.symbol, %err, "orphan order cancel failed");
                    }
                }
            }
            Err(err) => warn!(%err, "open-order fetch failed during orphan cleanup"),
        }

        match self.exchange.open_algo_orders(None).await {
            Ok(algos) => {
                for algo in algos {
                    let known = local_open.iter().any(|p| p.symbol == algo.symbol)
                        || self.in_flight.contains(&algo.symbol);
                    if known {
                        continue;
                    }
                    info!(symbol = %algo.symbol, algo_id = %algo.algo_id, "canceling orphan algo order");
                    if let Err(err) = self
                        .exchange
                        .cancel_algo_order(&algo.symbol, &algo.algo_id)
                        .await
                    {
                        warn!(symbol = %algo.symbol, %err, "orphan algo cancel failed");
                    }
                }
            }
            Err(err) => warn!(%err, "algo-order fetch failed during orphan cleanup"),
        }
    }

    // === Shared helpers ===

    fn in_cooldown(&self, symbol: &str) -> bool {
        self.force_closed_at
            .get(symbol)
            .map(|at| {
                (Utc::now() - *at.value())
                    < ChronoDuration::seconds(self.config.force_close_cooldown_secs)
            })
            .unwrap_or(false)
    }

    /// Cancel protection and close at market, guarded by the per-symbol
    /// cooldown so re-detecting the same anomaly never double-submits.
    async fn force_close(&self, symbol: &str, side: Side, qty: Qty) -> bool {
        if self.in_cooldown(symbol) {
            debug!(symbol, "force-close suppressed by cooldown");
            return false;
        }
        if let Err(err) = self.exchange.cancel_all_algo_orders(symbol).await {
            warn!(symbol, %err, "pre-close algo cancel failed");
        }
        match self.exchange.market_close(symbol, side, qty).await {
            Ok(()) => {
                self.force_closed_at.insert(symbol.to_string(), Utc::now());
                true
            }
            Err(err) => {
                error!(symbol, %err, "forced market close failed");
                false
            }
        }
    }

    async fn close_in_ledger(&self, mut position: Position, reason: CloseReason, pnl: Usd) {
        let symbol = position.symbol.clone();
        position.close(reason, pnl, Utc::now());
        if let Err(err) = self.store.update_position(position).await {
            warn!(symbol, %err, "ledger close failed");
            return;
        }
        self.missing_stop_since.remove(&symbol);
        self.protect_failures.remove(&symbol);
        self.unknown_since.remove(&symbol);
        // The blacklist counts money lost, whatever the close looked
        // like; a stop-out or liquidation counts even at break-even.
        if pnl.is_negative() || reason.is_loss() {
            self.blacklist.record_loss(&symbol);
        }
        self.events.publish(BotEvent::PositionClosed {
            symbol,
            reason,
            pnl,
        });
    }

    async fn cancel_algos_of_kind(
        &self,
        symbol: &str,
        kind: AlgoKind,
    ) -> crate::error::Result<()> {
        let algos = self.exchange.open_algo_orders(Some(symbol.to_string())).await?;
        for algo in algos.iter().filter(|a| a.kind == kind) {
            self.exchange
                .cancel_algo_order(symbol, &algo.algo_id)
                .await?;
        }
        Ok(())
    }

    /// The planned stop, if it sits on the losing side of entry.
    fn valid_stop(&self, position: &Position) -> Option<Price> {
        let stop = position.stop_loss?;
        let valid = match position.side {
            Side::Long => stop.inner() < position.entry_price.inner(),
            Side::Short => stop.inner() > position.entry_price.inner(),
        };
        valid.then_some(stop)
    }

    fn fallback_stop(&self, position: &Position) -> Price {
        let offset = position.entry_price.inner() * self.config.fallback_stop_pct
            / Decimal::from(100);
        Price::new(position.entry_price.inner() - position.side.sign() * offset)
    }

    fn fallback_tp(&self, position: &Position) -> Price {
        let offset =
            position.entry_price.inner() * self.config.fallback_tp_pct / Decimal::from(100);
        Price::new(position.entry_price.inner() + position.side.sign() * offset)
    }

    fn is_profit_side(&self, position: &Position, tp: Price) -> bool {
        match position.side {
            Side::Long => tp.inner() > position.entry_price.inner(),
            Side::Short => tp.inner() < position.entry_price.inner(),
        }
    }

    fn target_passed(&self, side: Side, target: Price, mark: Price) -> bool {
        match side {
            Side::Long => mark.inner() >= target.inner(),
            Side::Short => mark.inner() <= target.inner(),
        }
    }

    fn recentered_tp(&self, side: Side, mark: Price) -> Price {
        let offset = mark.inner() * self.config.fallback_tp_pct / Decimal::from(100);
        Price::new(mark.inner() + side.sign() * offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pending::NoPending;
    use rust_decimal_macros::dec;
    use vigil_core::{Signal, SignalId, Timeframe};
    use vigil_exchange::{AccountBalance, AlgoOrder, MockExchangeClient, OpenOrder};
    use vigil_store::MemoryStore;

    fn reconciler(
        mock: MockExchangeClient,
        store: Arc<MemoryStore>,
        config: ReconcilerConfig,
    ) -> Reconciler {
        let mut balance_mock = MockExchangeClient::new();
        balance_mock.expect_account_balance().returning(|| {
            Ok(AccountBalance {
                total: Usd::new(dec!(1000)),
                available: Usd::new(dec!(900)),
            })
        });
        let balance = Arc::new(BalanceCache::new(
            Arc::new(balance_mock),
            Duration::from_secs(60),
            Usd::new(dec!(500)),
        ));
        Reconciler::new(
            config,
            Arc::new(mock),
            store,
            balance,
            Arc::new(DailyBlacklist::new(2)),
            Arc::new(NoPending),
            InFlightSet::new(),
            EventBus::new(),
        )
    }

    fn exch_pos(symbol: &str, side: Side, qty: Decimal, mark: Decimal) -> ExchangePosition {
        ExchangePosition {
            symbol: symbol.to_string(),
            side,
            qty: Qty::new(qty),
            entry_price: Price::new(dec!(2000)),
            mark_price: Price::new(mark),
            leverage: 10,
        }
    }

    fn local_pos(symbol: &str) -> Position {
        Position {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            side: Side::Long,
            entry_price: Price::new(dec!(2000)),
            qty: Qty::new(dec!(1)),
            leverage: 10,
            stop_loss: Some(Price::new(dec!(1950))),
            take_profit_1: Some(Price::new(dec!(2060))),
            take_profit_2: Some(Price::new(dec!(2200))),
            status: PositionStatus::Open,
            signal_id: Some(SignalId::new()),
            timeframe: Some(Timeframe::H1),
            opened_at: Utc::now(),
            closed_at: None,
            realized_pnl: None,
            meta: PositionMeta::default(),
        }
    }

    fn signal(symbol: &str, side: Side, status: SignalStatus) -> Signal {
        Signal {
            id: SignalId::new(),
            symbol: symbol.to_string(),
            side,
            entry: Price::new(dec!(2000)),
            zone_low: Price::new(dec!(1990)),
            zone_high: Price::new(dec!(2010)),
            stop_loss: Price::new(dec!(1950)),
            take_profit_1: Price::new(dec!(2060)),
            take_profit_2: None,
            leverage: 10,
            confidence: dec!(0.7),
            strategy: "trend".to_string(),
            tp_split: dec!(0.7),
            timeframe: Timeframe::H1,
            status,
            created_at: Utc::now(),
        }
    }

    fn tp_algo(symbol: &str) -> AlgoOrder {
        AlgoOrder {
            symbol: symbol.to_string(),
            algo_id: "tp-1".to_string(),
            kind: AlgoKind::TakeProfit,
            position_side: Side::Long,
            trigger_price: Price::new(dec!(2060)),
            qty: Qty::new(dec!(1)),
        }
    }

    #[tokio::test]
    async fn test_unknown_position_closed_once() {
        let mut mock = MockExchangeClient::new();
        mock.expect_cancel_all_algo_orders().returning(|_| Ok(()));
        mock.expect_market_close()
            .times(1)
            .returning(|_, _, _| Ok(()));

        let store = Arc::new(MemoryStore::new());
        let rec = reconciler(
            mock,
            store,
            ReconcilerConfig {
                debounce_secs: 0,
                ..ReconcilerConfig::default()
            },
        );
        let positions = vec![exch_pos("DOGEUSDT", Side::Long, dec!(100), dec!(2000))];

        rec.detect_unknown_positions(&positions, &[]).await;
        // Same anomaly again inside the cooldown: no second close.
        rec.detect_unknown_positions(&positions, &[]).await;
    }

    #[tokio::test]
    async fn test_unknown_position_with_recent_signal_left_alone() {
        let mock = MockExchangeClient::new();
        let store = Arc::new(MemoryStore::new());
        store
            .insert_signal(signal("DOGEUSDT", Side::Short, SignalStatus::Pending))
            .await
            .unwrap();
        let rec = reconciler(
            mock,
            store,
            ReconcilerConfig {
                debounce_secs: 0,
                ..ReconcilerConfig::default()
            },
        );
        // Opposite side still counts: the strategy may run reversed.
        let positions = vec![exch_pos("DOGEUSDT", Side::Long, dec!(100), dec!(2000))];
        rec.detect_unknown_positions(&positions, &[]).await;
    }

    #[tokio::test]
    async fn test_unknown_position_debounced_on_first_sighting() {
        let mock = MockExchangeClient::new();
        let store = Arc::new(MemoryStore::new());
        let rec = reconciler(mock, store, ReconcilerConfig::default());
        let positions = vec![exch_pos("DOGEUSDT", Side::Long, dec!(100), dec!(2000))];
        // Default 5s debounce: first sighting only records, never closes.
        rec.detect_unknown_positions(&positions, &[]).await;
    }

    #[tokio::test]
    async fn test_oversized_margin_force_closes_and_annotates() {
        let mut mock = MockExchangeClient::new();
        mock.expect_cancel_all_algo_orders().returning(|_| Ok(()));
        mock.expect_market_close()
            .times(1)
            .returning(|_, _, _| Ok(()));

        let store = Arc::new(MemoryStore::new());
        let local = local_pos("ETHUSDT");
        let id = local.id;
        store.insert_position(local.clone()).await.unwrap();
        let rec = reconciler(mock, store.clone(), ReconcilerConfig::default());

        // (2100 * 20) / 10 = 4200 margin, over both the capital-fraction
        // cap (300) and the absolute ceiling.
        let positions = vec![exch_pos("ETHUSDT", Side::Long, dec!(20), dec!(2100))];
        rec.detect_oversized_margin(&positions, &[local]).await;

        assert!(store.open_position("ETHUSDT").await.unwrap().is_none());
        let closed = store.position(id).await.unwrap().unwrap();
        assert_eq!(closed.status, PositionStatus::Closed);
        assert_eq!(closed.meta.close_reason, Some(CloseReason::OversizedMargin));
    }

    #[tokio::test]
    async fn test_break_even_relocation_is_one_shot() {
        let mut mock = MockExchangeClient::new();
        mock.expect_open_algo_orders().returning(|symbol| {
            Ok(vec![AlgoOrder {
                symbol: symbol.unwrap_or_else(|| "ETHUSDT".to_string()),
                algo_id: "sl-1".to_string(),
                kind: AlgoKind::StopLoss,
                position_side: Side::Long,
                trigger_price: Price::new(dec!(1950)),
                qty: Qty::new(dec!(1)),
            }])
        });
        mock.expect_cancel_algo_order()
            .times(1)
            .returning(|_, _| Ok(()));
        mock.expect_place_algo_order()
            .times(1)
            .withf(|r| {
                r.kind == AlgoKind::StopLoss && r.trigger_price == Price::new(dec!(2000))
            })
            .returning(|_| Ok("sl-2".to_string()));

        let store = Arc::new(MemoryStore::new());
        let local = local_pos("ETHUSDT");
        store.insert_position(local.clone()).await.unwrap();
        let rec = reconciler(mock, store.clone(), ReconcilerConfig::default());

        // Live quantity down to 30% of original: TP1 tier (70%) filled.
        let positions = vec![exch_pos("ETHUSDT", Side::Long, dec!(0.3), dec!(2060))];
        rec.relocate_break_even(&positions, &[local]).await;

        let updated = store.open_position("ETHUSDT").await.unwrap().unwrap();
        assert!(updated.meta.break_even_moved);
        assert_eq!(updated.stop_loss, Some(Price::new(dec!(2000))));

        // Second pass with the updated ledger is a no-op (times(1) above).
        rec.relocate_break_even(&positions, &[updated]).await;
    }

    #[tokio::test]
    async fn test_break_even_not_triggered_by_full_quantity() {
        let mock = MockExchangeClient::new();
        let store = Arc::new(MemoryStore::new());
        let local = local_pos("ETHUSDT");
        let rec = reconciler(mock, store, ReconcilerConfig::default());
        let positions = vec![exch_pos("ETHUSDT", Side::Long, dec!(1), dec!(2060))];
        rec.relocate_break_even(&positions, &[local]).await;
    }

    #[tokio::test]
    async fn test_missing_stop_recreated_at_planned_level() {
        let mut mock = MockExchangeClient::new();
        mock.expect_open_algo_orders()
            .returning(|_| Ok(vec![tp_algo("ETHUSDT")]));
        mock.expect_place_algo_order()
            .times(1)
            .withf(|r| {
                r.kind == AlgoKind::StopLoss && r.trigger_price == Price::new(dec!(1950))
            })
            .returning(|_| Ok("sl-2".to_string()));

        let store = Arc::new(MemoryStore::new());
        let local = local_pos("ETHUSDT");
        store.insert_position(local.clone()).await.unwrap();
        let rec = reconciler(mock, store, ReconcilerConfig::default());

        let positions = vec![exch_pos("ETHUSDT", Side::Long, dec!(1), dec!(2010))];
        rec.watch_protective_orders(&positions, &[local]).await;
    }

    #[tokio::test]
    async fn test_missing_stop_wrong_side_uses_fallback() {
        let mut mock = MockExchangeClient::new();
        mock.expect_open_algo_orders()
            .returning(|_| Ok(vec![tp_algo("ETHUSDT")]));
        // 2% below the 2000 entry.
        mock.expect_place_algo_order()
            .times(1)
            .withf(|r| {
                r.kind == AlgoKind::StopLoss && r.trigger_price == Price::new(dec!(1960))
            })
            .returning(|_| Ok("sl-2".to_string()));

        let store = Arc::new(MemoryStore::new());
        let mut local = local_pos("ETHUSDT");
        local.stop_loss = Some(Price::new(dec!(2100))); // above entry on a long
        store.insert_position(local.clone()).await.unwrap();
        let rec = reconciler(mock, store.clone(), ReconcilerConfig::default());

        let positions = vec![exch_pos("ETHUSDT", Side::Long, dec!(1), dec!(2010))];
        rec.watch_protective_orders(&positions, &[local]).await;

        let updated = store.open_position("ETHUSDT").await.unwrap().unwrap();
        assert!(updated.meta.emergency_stop);
        assert_eq!(updated.stop_loss, Some(Price::new(dec!(1960))));
    }

    #[tokio::test]
    async fn test_missing_stop_past_grace_force_closes() {
        let mut mock = MockExchangeClient::new();
        mock.expect_open_algo_orders()
            .returning(|_| Ok(vec![tp_algo("ETHUSDT")]));
        mock.expect_cancel_all_algo_orders().returning(|_| Ok(()));
        mock.expect_market_close()
            .times(1)
            .returning(|_, _, _| Ok(()));

        let store = Arc::new(MemoryStore::new());
        let local = local_pos("ETHUSDT");
        store.insert_position(local.clone()).await.unwrap();
        let rec = reconciler(
            mock,
            store.clone(),
            ReconcilerConfig {
                missing_stop_grace_secs: 0,
                ..ReconcilerConfig::default()
            },
        );

        let positions = vec![exch_pos("ETHUSDT", Side::Long, dec!(1), dec!(1990))];
        rec.watch_protective_orders(&positions, &[local]).await;

        assert!(store.open_position("ETHUSDT").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_position_force_closed() {
        let mut mock = MockExchangeClient::new();
        mock.expect_cancel_all_algo_orders().returning(|_| Ok(()));
        mock.expect_market_close()
            .times(1)
            .returning(|_, _, _| Ok(()));

        let store = Arc::new(MemoryStore::new());
        let mut local = local_pos("ETHUSDT");
        local.timeframe = Some(Timeframe::M5);
        local.opened_at = Utc::now() - ChronoDuration::hours(10);
        store.insert_position(local.clone()).await.unwrap();
        let rec = reconciler(
            mock,
            store.clone(),
            ReconcilerConfig {
                stale_after_candles: 60, // 5 hours of M5
                ..ReconcilerConfig::default()
            },
        );

        let positions = vec![exch_pos("ETHUSDT", Side::Long, dec!(1), dec!(2010))];
        rec.expire_stale_positions(&positions, &[local]).await;

        assert!(store.open_position("ETHUSDT").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_out_of_band_close_classified_and_blacklisted() {
        let mut mock = MockExchangeClient::new();
        mock.expect_trade_history().returning(|symbol, _| {
            Ok(vec![vigil_exchange::TradeFill {
                symbol: symbol.to_string(),
                side: Side::Short, // closing a long
                price: Price::new(dec!(1950)),
                qty: Qty::new(dec!(1)),
                realized_pnl: Usd::new(dec!(-50)),
                executed_at: Utc::now(),
            }])
        });
        mock.expect_cancel_all_algo_orders().returning(|_| Ok(()));

        let store = Arc::new(MemoryStore::new());
        let local = local_pos("ETHUSDT");
        let id = local.id;
        store.insert_position(local.clone()).await.unwrap();
        let rec = reconciler(mock, store.clone(), ReconcilerConfig::default());

        rec.sync_ledger(&[], &[local]).await;

        let closed = store.position(id).await.unwrap().unwrap();
        assert_eq!(closed.status, PositionStatus::Closed);
        assert_eq!(closed.meta.close_reason, Some(CloseReason::StopLoss));
        assert_eq!(closed.realized_pnl, Some(Usd::new(dec!(-50))));
        assert_eq!(rec.blacklist.losses_today("ETHUSDT"), 1);
    }

    #[tokio::test]
    async fn test_losing_manual_close_feeds_blacklist() {
        let mut mock = MockExchangeClient::new();
        // Closed by hand at 1990: nowhere near stop (1950) or TP1
        // (2060), but the long from 2000 still lost money.
        mock.expect_trade_history().returning(|symbol, _| {
            Ok(vec![vigil_exchange::TradeFill {
                symbol: symbol.to_string(),
                side: Side::Short,
                price: Price::new(dec!(1990)),
                qty: Qty::new(dec!(1)),
                realized_pnl: Usd::new(dec!(-100)),
                executed_at: Utc::now(),
            }])
        });
        mock.expect_cancel_all_algo_orders().returning(|_| Ok(()));

        let store = Arc::new(MemoryStore::new());
        let local = local_pos("ETHUSDT");
        let id = local.id;
        store.insert_position(local.clone()).await.unwrap();
        let rec = reconciler(mock, store.clone(), ReconcilerConfig::default());

        rec.sync_ledger(&[], &[local]).await;

        let closed = store.position(id).await.unwrap().unwrap();
        assert_eq!(closed.meta.close_reason, Some(CloseReason::Manual));
        assert_eq!(closed.realized_pnl, Some(Usd::new(dec!(-100))));
        assert_eq!(rec.blacklist.losses_today("ETHUSDT"), 1);
    }

    #[tokio::test]
    async fn test_adoption_recovers_from_matching_signal() {
        let mock = MockExchangeClient::new();
        let store = Arc::new(MemoryStore::new());
        store
            .insert_signal(signal("ETHUSDT", Side::Long, SignalStatus::Filled))
            .await
            .unwrap();
        let rec = reconciler(mock, store.clone(), ReconcilerConfig::default());

        let positions = vec![exch_pos("ETHUSDT", Side::Long, dec!(1), dec!(2005))];
        rec.sync_ledger(&positions, &[]).await;

        let adopted = store.open_position("ETHUSDT").await.unwrap().unwrap();
        assert!(adopted.meta.adopted);
        assert_eq!(adopted.stop_loss, Some(Price::new(dec!(1950))));
        assert_eq!(adopted.take_profit_1, Some(Price::new(dec!(2060))));
    }

    #[tokio::test]
    async fn test_reversed_adoption_swaps_protective_levels() {
        let mock = MockExchangeClient::new();
        let store = Arc::new(MemoryStore::new());
        store
            .insert_signal(signal("ETHUSDT", Side::Long, SignalStatus::Filled))
            .await
            .unwrap();
        let rec = reconciler(mock, store.clone(), ReconcilerConfig::default());

        // Realized side is the reverse of the signal's.
        let positions = vec![exch_pos("ETHUSDT", Side::Short, dec!(1), dec!(1995))];
        rec.sync_ledger(&positions, &[]).await;

        let adopted = store.open_position("ETHUSDT").await.unwrap().unwrap();
        assert_eq!(adopted.side, Side::Short);
        assert_eq!(adopted.stop_loss, Some(Price::new(dec!(2060))));
        assert_eq!(adopted.take_profit_1, Some(Price::new(dec!(1950))));
    }

    #[tokio::test]
    async fn test_orphan_orders_canceled() {
        let mut mock = MockExchangeClient::new();
        mock.expect_open_orders().returning(|_| {
            Ok(vec![OpenOrder {
                symbol: "XRPUSDT".to_string(),
                order_id: "777".to_string(),
                side: Side::Long,
                price: Price::new(dec!(0.5)),
                qty: Qty::new(dec!(100)),
                created_at: Utc::now(),
            }])
        });
        mock.expect_cancel_order()
            .times(1)
            .returning(|_, _| Ok(()));
        mock.expect_open_algo_orders()
            .returning(|_| Ok(vec![tp_algo("XRPUSDT")]));
        mock.expect_cancel_algo_order()
            .times(1)
            .returning(|_, _| Ok(()));

        let store = Arc::new(MemoryStore::new());
        let rec = reconciler(mock, store, ReconcilerConfig::default());
        rec.cleanup_orphan_orders(&[]).await;
    }
}
