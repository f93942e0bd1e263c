//! The order monitor task.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vigil_core::{BotEvent, EventBus, PendingLimitOrder, SignalStatus, TradingControl};
use vigil_exchange::{ExchangeClient, ExchangeError, OrderState, OrderStatus};
use vigil_executor::OrderExecutor;
use vigil_store::{Store, StoreError};

use crate::config::MonitorConfig;
use crate::error::Result;

/// Watches resting entry orders for fills, expiry, and zone exits.
///
/// The monitor owns the pending-order map: at most one entry per symbol,
/// and only the monitor mutates it after registration.
pub struct OrderMonitor {
    config: MonitorConfig,
    exchange: Arc<dyn ExchangeClient>,
    store: Arc<dyn Store>,
    executor: Arc<OrderExecutor>,
    events: EventBus,
    pending: DashMap<String, PendingLimitOrder>,
    scanning: AtomicBool,
}

impl OrderMonitor {
    pub fn new(
        config: MonitorConfig,
        exchange: Arc<dyn ExchangeClient>,
        store: Arc<dyn Store>,
        executor: Arc<OrderExecutor>,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            exchange,
            store,
            executor,
            events,
            pending: DashMap::new(),
            scanning: AtomicBool::new(false),
        }
    }

    /// Track a freshly placed resting order.
    pub fn register(&self, order: PendingLimitOrder) {
        if let Some(previous) = self.pending.insert(order.symbol.clone(), order) {
            warn!(
                symbol = %previous.symbol,
                order_id = %previous.order_id,
                "replaced a pending order that was still tracked"
            );
        }
    }

    /// Stop tracking a symbol's resting order.
    pub fn remove(&self, symbol: &str) -> Option<PendingLimitOrder> {
        self.pending.remove(symbol).map(|(_, order)| order)
    }

    pub fn has_pending(&self, symbol: &str) -> bool {
        self.pending.contains_key(symbol)
    }

    /// Snapshot of all tracked orders (slot accounting reads this).
    pub fn pending_orders(&self) -> Vec<PendingLimitOrder> {
        self.pending.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Run the fast poll and slow sync until trading stops.
    pub fn spawn(self: Arc<Self>, control: TradingControl) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut poll = tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms));
            let mut sync =
                tokio::time::interval(Duration::from_secs(self.config.sync_interval_secs));
            poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            sync.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!("order monitor started");
            loop {
                tokio::select! {
                    _ = poll.tick() => {
                        if control.is_running() {
                            self.poll_once().await;
                        }
                    }
                    _ = sync.tick() => {
                        if control.is_running() {
                            self.sync_once().await;
                        }
                    }
                }
            }
        })
    }

    /// One poll pass over every tracked order. Single-flight: a pass that
    /// outlives the interval suppresses the next tick instead of stacking.
    pub async fn poll_once(&self) {
        if self.scanning.swap(true, Ordering::Acquire) {
            debug!("poll pass still in progress, skipping tick");
            return;
        }
        let symbols: Vec<String> = self.pending.iter().map(|e| e.key().clone()).collect();
        for symbol in symbols {
            let Some(order) = self.pending.get(&symbol).map(|e| e.value().clone()) else {
                continue;
            };
            if let Err(err) = self.check_order(&order).await {
                warn!(symbol, order_id = %order.order_id, %err, "order check failed");
            }
        }
        self.scanning.store(false, Ordering::Release);
    }

    /// Reconcile the tracked map against the venue's open-order list,
    /// dropping entries the venue no longer knows about.
    pub async fn sync_once(&self) {
        let open = match self.exchange.open_orders(None).await {
            Ok(open) => open,
            Err(err) => {
                warn!(%err, "open-order sync fetch failed");
                return;
            }
        };
        let stale: Vec<PendingLimitOrder> = self
            .pending
            .iter()
            .filter(|entry| !open.iter().any(|o| o.order_id == entry.value().order_id))
            .map(|entry| entry.value().clone())
            .collect();
        for order in stale {
            // Not on the book anymore. Query to learn whether it filled on
            // the way out.
            match self.exchange.query_order(&order.symbol, &order.order_id).await {
                Ok(status) if status.state == OrderState::Filled => {
                    if let Err(err) = self.fill(&order, &status).await {
                        warn!(symbol = %order.symbol, %err, "fill handling failed during sync");
                    }
                }
                Ok(_) | Err(ExchangeError::OrderNotFound(_)) => {
                    info!(
                        symbol = %order.symbol,
                        order_id = %order.order_id,
                        "dropping pending order the venue no longer tracks"
                    );
                    if let Err(err) = self.mark_canceled(&order, "gone from venue").await {
                        warn!(symbol = %order.symbol, %err, "cancel bookkeeping failed");
                    }
                }
                Err(err) => {
                    warn!(symbol = %order.symbol, %err, "stale-order query failed");
                }
            }
        }
    }

    async fn check_order(&self, order: &PendingLimitOrder) -> Result<()> {
        let status = self
            .exchange
            .query_order(&order.symbol, &order.order_id)
            .await?;
        match status.state {
            OrderState::Filled => return self.fill(order, &status).await,
            OrderState::Canceled => return self.mark_canceled(order, "canceled on venue").await,
            OrderState::Expired => return self.mark_canceled(order, "expired on venue").await,
            OrderState::New | OrderState::PartiallyFilled => {}
        }

        if order.is_expired(Utc::now()) {
            return self.cancel_resting(order, "validity window elapsed").await;
        }

        let mark = self.exchange.mark_price(&order.symbol).await?;
        if order.zone_exited(mark, self.config.zone_buffer_pct) {
            return self.cancel_resting(order, "entry zone exited").await;
        }
        Ok(())
    }

    /// Cancel a resting order, then re-query to catch the race where it
    /// filled while the cancel was in flight. A late fill is a fill.
    async fn cancel_resting(&self, order: &PendingLimitOrder, reason: &str) -> Result<()> {
        info!(
            symbol = %order.symbol,
            order_id = %order.order_id,
            reason,
            "canceling resting entry order"
        );
        match self.exchange.cancel_order(&order.symbol, &order.order_id).await {
            Ok(()) | Err(ExchangeError::OrderNotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }
        match self.exchange.query_order(&order.symbol, &order.order_id).await {
            Ok(status) if status.state == OrderState::Filled => {
                debug!(symbol = %order.symbol, "order filled during cancel, treating as fill");
                self.fill(order, &status).await
            }
            Ok(_) | Err(ExchangeError::OrderNotFound(_)) => self.mark_canceled(order, reason).await,
            Err(err) => Err(err.into()),
        }
    }

    async fn fill(&self, order: &PendingLimitOrder, status: &OrderStatus) -> Result<()> {
        self.pending.remove(&order.symbol);
        let fill_price = status.avg_fill_price.unwrap_or(order.price);
        let fill_qty = if status.filled_qty.is_positive() {
            status.filled_qty
        } else {
            order.qty
        };
        info!(
            symbol = %order.symbol,
            order_id = %order.order_id,
            %fill_price,
            "resting entry order filled"
        );
        // Claim the symbol so the reconciliation loop does not treat the
        // freshly filled position as unknown mid-attachment.
        let _guard = self.executor.in_flight().claim(&order.symbol);
        self.executor
            .handle_fill(&order.signal, fill_price, fill_qty)
            .await?;
        Ok(())
    }

    async fn mark_canceled(&self, order: &PendingLimitOrder, reason: &str) -> Result<()> {
        self.pending.remove(&order.symbol);
        match self
            .store
            .set_signal_status(order.signal.id, SignalStatus::Canceled)
            .await
        {
            Ok(()) => {}
            // Lost a race against a fill that already finalized the signal.
            Err(StoreError::TerminalStatus(_)) => {
                debug!(symbol = %order.symbol, "signal already terminal, skipping cancel mark");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        }
        self.events.publish(BotEvent::OrderCanceled {
            signal_id: order.signal.id,
            symbol: order.symbol.clone(),
            reason: reason.to_string(),
        });
        Ok(())
    }
}
