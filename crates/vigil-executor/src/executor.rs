//! Limit-entry placement and the fill path.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use vigil_core::{
    BotEvent, EventBus, InFlightGuard, InFlightSet, PendingLimitOrder, Position, PositionMeta,
    PositionStatus, Price, Qty, Signal, SignalStatus, Usd,
};
use vigil_exchange::{ExchangeClient, ExchangeError, MarginMode, OrderState};
use vigil_risk::PositionSizing;
use vigil_store::Store;

use crate::config::ExecutorConfig;
use crate::error::Result;
use crate::protect::ProtectOutcome;

/// Terminal result of a placement attempt.
#[derive(Debug)]
pub enum ExecutionOutcome {
    /// Limit order resting on the book; the order monitor takes over.
    AwaitingFill {
        order: PendingLimitOrder,
        /// Keeps the symbol claimed until the caller has registered the
        /// order with the monitor; releasing earlier would let the
        /// reconciliation loop cancel the fresh order as an orphan.
        guard: InFlightGuard,
    },
    /// Filled immediately and fully protected.
    Protected(Position),
    /// Filled but could not be protected; closed at market.
    EmergencyClosed,
    /// Filled, unprotected, and the emergency close failed.
    Critical,
    /// Placement refused before touching the exchange.
    Skipped { reason: String },
    /// Exchange rejected the placement.
    Failed { reason: String },
}

/// Places entry orders and attaches protection on fill.
pub struct OrderExecutor {
    pub(crate) config: ExecutorConfig,
    pub(crate) exchange: Arc<dyn ExchangeClient>,
    store: Arc<dyn Store>,
    events: EventBus,
    in_flight: InFlightSet,
}

impl OrderExecutor {
    pub fn new(
        config: ExecutorConfig,
        exchange: Arc<dyn ExchangeClient>,
        store: Arc<dyn Store>,
        events: EventBus,
        in_flight: InFlightSet,
    ) -> Self {
        Self {
            config,
            exchange,
            store,
            events,
            in_flight,
        }
    }

    /// Symbols with a placement currently in progress. The reconciliation
    /// loop consults this to avoid racing a fresh order.
    pub fn in_flight(&self) -> &InFlightSet {
        &self.in_flight
    }

    /// Place the entry order for an admitted, sized signal.
    ///
    /// Holds the in-flight claim on the symbol for the whole placement,
    /// including synchronous protection on an immediate fill.
    pub async fn execute(
        &self,
        mut signal: Signal,
        sizing: PositionSizing,
    ) -> Result<ExecutionOutcome> {
        let symbol = signal.symbol.clone();
        let Some(guard) = self.in_flight.claim(&symbol) else {
            return self
                .skip(&signal, "placement already in progress".to_string())
                .await;
        };

        if self.store.open_position(&symbol).await?.is_some() {
            return self
                .skip(&signal, "open position already exists".to_string())
                .await;
        }

        // Isolated margin is a precondition; "already set" is success.
        if let Err(err) = self
            .exchange
            .set_margin_mode(&symbol, MarginMode::Isolated)
            .await
        {
            if !err.is_idempotent_conflict() {
                return self.fail(&signal, format!("margin mode: {err}")).await;
            }
        }

        let sizing = match self.apply_leverage(&symbol, sizing).await {
            Ok(sizing) => sizing,
            Err(err) => return self.fail(&signal, format!("leverage: {err}")).await,
        };
        signal.leverage = sizing.leverage;

        let spec = match self.exchange.instrument_spec(&symbol).await {
            Ok(spec) => spec,
            Err(err) => return self.fail(&signal, format!("instrument spec: {err}")).await,
        };
        let price = spec.round_price(sizing.entry);
        let qty = spec.round_qty(sizing.qty);
        if !spec.meets_min_notional(price, qty) {
            return self
                .skip(&signal, "sized below instrument minimum notional".to_string())
                .await;
        }

        let placed = match self
            .exchange
            .place_limit_order(&symbol, signal.side, price, qty)
            .await
        {
            Ok(placed) => placed,
            Err(err) => return self.fail(&signal, format!("limit order: {err}")).await,
        };
        self.events.publish(BotEvent::OrderPlaced {
            signal_id: signal.id,
            symbol: symbol.clone(),
            order_id: placed.order_id.clone(),
        });
        info!(
            symbol,
            order_id = %placed.order_id,
            %price,
            %qty,
            leverage = sizing.leverage,
            "limit entry placed"
        );

        if placed.state == OrderState::Filled {
            let fill_price = placed.avg_fill_price.unwrap_or(price);
            let fill_qty = if placed.filled_qty.is_positive() {
                placed.filled_qty
            } else {
                qty
            };
            return self.handle_fill(&signal, fill_price, fill_qty).await;
        }

        let now = Utc::now();
        let validity = signal.timeframe.candle_duration()
            * i32::try_from(self.config.limit_validity_candles).unwrap_or(i32::MAX);
        Ok(ExecutionOutcome::AwaitingFill {
            order: PendingLimitOrder {
                symbol,
                order_id: placed.order_id,
                side: signal.side,
                price,
                qty,
                zone_low: signal.zone_low,
                zone_high: signal.zone_high,
                created_at: now,
                expires_at: now + validity,
                signal,
            },
            guard,
        })
    }

    /// Handle a filled entry: record the fill, attach protection, and
    /// persist the resulting position.
    ///
    /// Called synchronously on immediate fills and by the order monitor
    /// when a resting order fills later.
    pub async fn handle_fill(
        &self,
        signal: &Signal,
        fill_price: Price,
        qty: Qty,
    ) -> Result<ExecutionOutcome> {
        self.store
            .set_signal_status(signal.id, SignalStatus::Filled)
            .await?;
        self.events.publish(BotEvent::OrderFilled {
            signal_id: signal.id,
            symbol: signal.symbol.clone(),
        });

        let (outcome, levels) = self
            .attach_protective_orders(&signal.symbol, signal.side, qty, signal, fill_price)
            .await;

        let now = Utc::now();
        let mut position = Position {
            id: Uuid::new_v4(),
            symbol: signal.symbol.clone(),
            side: signal.side,
            entry_price: fill_price,
            qty,
            leverage: signal.leverage,
            stop_loss: Some(levels.stop_loss),
            take_profit_1: Some(levels.take_profit_1),
            take_profit_2: levels.take_profit_2,
            status: PositionStatus::Open,
            signal_id: Some(signal.id),
            timeframe: Some(signal.timeframe),
            opened_at: now,
            closed_at: None,
            realized_pnl: None,
            meta: PositionMeta {
                planned_entry: Some(signal.entry),
                planned_stop: Some(signal.stop_loss),
                planned_tp1: Some(signal.take_profit_1),
                planned_tp2: signal.take_profit_2,
                actual_entry: Some(fill_price),
                slippage: Some(fill_price.inner() - signal.entry.inner()),
                ..PositionMeta::default()
            },
        };

        match outcome {
            ProtectOutcome::Protected => {
                self.store.insert_position(position.clone()).await?;
                self.events.publish(BotEvent::PositionOpened {
                    symbol: signal.symbol.clone(),
                    side: signal.side,
                });
                Ok(ExecutionOutcome::Protected(position))
            }
            ProtectOutcome::EmergencyClosed => {
                // Exit price unknown until the fill shows up in trade
                // history; the reconciliation loop refines the P&L.
                position.close(vigil_core::CloseReason::Emergency, Usd::ZERO, now);
                self.store.insert_position(position).await?;
                self.events.publish(BotEvent::PositionClosed {
                    symbol: signal.symbol.clone(),
                    reason: vigil_core::CloseReason::Emergency,
                    pnl: Usd::ZERO,
                });
                Ok(ExecutionOutcome::EmergencyClosed)
            }
            ProtectOutcome::Critical => {
                // The fill is live on the venue with nothing protecting
                // it. Record it open so the reconciliation watchdog can
                // re-arm the stop at the intended levels or close it.
                position.meta.unprotected = true;
                self.store.insert_position(position).await?;
                self.events.publish(BotEvent::PositionOpened {
                    symbol: signal.symbol.clone(),
                    side: signal.side,
                });
                Ok(ExecutionOutcome::Critical)
            }
        }
    }

    /// Set leverage, falling back to a conservative value when the venue
    /// caps it lower than requested.
    async fn apply_leverage(
        &self,
        symbol: &str,
        sizing: PositionSizing,
    ) -> std::result::Result<PositionSizing, ExchangeError> {
        match self.exchange.set_leverage(symbol, sizing.leverage).await {
            Ok(()) => Ok(sizing),
            Err(ExchangeError::LeverageRejected { max_allowed, .. }) => {
                let effective = max_allowed.min(self.config.fallback_leverage).max(1);
                warn!(
                    symbol,
                    requested = sizing.leverage,
                    effective,
                    "leverage rejected, applying fallback"
                );
                self.exchange.set_leverage(symbol, effective).await?;
                Ok(sizing.with_leverage(effective))
            }
            Err(err) => Err(err),
        }
    }

    async fn skip(&self, signal: &Signal, reason: String) -> Result<ExecutionOutcome> {
        info!(symbol = %signal.symbol, reason, "placement skipped");
        self.store
            .set_signal_status(signal.id, SignalStatus::Skipped)
            .await?;
        self.events.publish(BotEvent::SignalSkipped {
            signal_id: signal.id,
            symbol: signal.symbol.clone(),
            reason: reason.clone(),
        });
        Ok(ExecutionOutcome::Skipped { reason })
    }

    async fn fail(&self, signal: &Signal, reason: String) -> Result<ExecutionOutcome> {
        warn!(symbol = %signal.symbol, reason, "placement failed");
        self.store
            .set_signal_status(signal.id, SignalStatus::Failed)
            .await?;
        self.events.publish(BotEvent::OrderFailed {
            signal_id: signal.id,
            symbol: signal.symbol.clone(),
            reason: reason.clone(),
        });
        Ok(ExecutionOutcome::Failed { reason })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use mockall::predicate::eq;
    use rust_decimal_macros::dec;
    use vigil_core::{Side, SignalId, Timeframe};
    use vigil_exchange::{
        AlgoKind, InstrumentSpec, MockExchangeClient, PlacedOrder,
    };
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
            take_profit_1: Price::new(dec!(102.4)),
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

    fn sizing() -> PositionSizing {
        PositionSizing {
            notional: Usd::new(dec!(100)),
            margin: Usd::new(dec!(20)),
            qty: Qty::new(dec!(1)),
            leverage: 5,
            entry: Price::new(dec!(100)),
        }
    }

    fn spec() -> InstrumentSpec {
        InstrumentSpec {
            tick_size: dec!(0.1),
            lot_size: dec!(0.001),
            min_notional: dec!(5),
        }
    }

    fn executor(mock: MockExchangeClient, store: Arc<MemoryStore>) -> OrderExecutor {
        OrderExecutor::new(
            ExecutorConfig::default(),
            Arc::new(mock),
            store,
            EventBus::new(),
            InFlightSet::new(),
        )
    }

    fn expect_happy_preamble(mock: &mut MockExchangeClient) {
        mock.expect_set_margin_mode().returning(|_, _| Ok(()));
        mock.expect_set_leverage().returning(|_, _| Ok(()));
        mock.expect_instrument_spec().returning(|_| Ok(spec()));
    }

    #[tokio::test]
    async fn test_resting_order_becomes_pending() {
        let mut mock = MockExchangeClient::new();
        expect_happy_preamble(&mut mock);
        mock.expect_place_limit_order().returning(|_, _, _, _| {
            Ok(PlacedOrder {
                order_id: "42".to_string(),
                state: OrderState::New,
                avg_fill_price: None,
                filled_qty: Qty::ZERO,
            })
        });

        let store = Arc::new(MemoryStore::new());
        let sig = signal();
        store.insert_signal(sig.clone()).await.unwrap();
        let exec = executor(mock, store);

        match exec.execute(sig, sizing()).await.unwrap() {
            ExecutionOutcome::AwaitingFill { order, guard } => {
                assert_eq!(order.order_id, "42");
                // 3 candles of M15 = 45 minutes of validity.
                assert_eq!(order.expires_at - order.created_at, Duration::minutes(45));
                // The claim outlives execute() so the reconciliation
                // loop cannot treat the resting order as an orphan
                // before the monitor picks it up.
                assert!(exec.in_flight().contains("BTCUSDT"));
                drop(guard);
                assert!(!exec.in_flight().contains("BTCUSDT"));
            }
            other => panic!("expected AwaitingFill, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_immediate_fill_attaches_slippage_shifted_protection() {
        let mut mock = MockExchangeClient::new();
        expect_happy_preamble(&mut mock);
        // Fills at 100.5 against a planned 100 entry.
        mock.expect_place_limit_order().returning(|_, _, _, _| {
            Ok(PlacedOrder {
                order_id: "42".to_string(),
                state: OrderState::Filled,
                avg_fill_price: Some(Price::new(dec!(100.5))),
                filled_qty: Qty::new(dec!(1)),
            })
        });
        mock.expect_cancel_all_algo_orders().returning(|_| Ok(()));
        mock.expect_place_algo_order().returning(|request| {
            match request.kind {
                AlgoKind::StopLoss => {
                    assert_eq!(request.trigger_price, Price::new(dec!(98.5)));
                    assert_eq!(request.qty, Qty::new(dec!(1)));
                }
                AlgoKind::TakeProfit => {
                    // 1.2R and 4R from the actual entry/stop.
                    assert!(
                        request.trigger_price == Price::new(dec!(102.9))
                            || request.trigger_price == Price::new(dec!(108.5))
                    );
                }
            }
            Ok("algo-1".to_string())
        });

        let store = Arc::new(MemoryStore::new());
        let sig = signal();
        let id = sig.id;
        store.insert_signal(sig.clone()).await.unwrap();
        let exec = executor(mock, store.clone());

        match exec.execute(sig, sizing()).await.unwrap() {
            ExecutionOutcome::Protected(position) => {
                assert_eq!(position.entry_price, Price::new(dec!(100.5)));
                assert_eq!(position.meta.slippage, Some(dec!(0.5)));
                assert_eq!(position.stop_loss, Some(Price::new(dec!(98.5))));
            }
            other => panic!("expected Protected, got {other:?}"),
        }
        let stored = store.signal(id).await.unwrap().unwrap();
        assert_eq!(stored.status, SignalStatus::Filled);
        assert!(store.open_position("BTCUSDT").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_open_position_skips_without_exchange_calls() {
        let mock = MockExchangeClient::new();
        let store = Arc::new(MemoryStore::new());
        let sig = signal();
        store.insert_signal(sig.clone()).await.unwrap();
        store
            .insert_position(Position {
                id: Uuid::new_v4(),
                symbol: "BTCUSDT".to_string(),
                side: Side::Long,
                entry_price: Price::new(dec!(99)),
                qty: Qty::new(dec!(1)),
                leverage: 5,
                stop_loss: Some(Price::new(dec!(97))),
                take_profit_1: None,
                take_profit_2: None,
                status: PositionStatus::Open,
                signal_id: None,
                timeframe: None,
                opened_at: Utc::now(),
                closed_at: None,
                realized_pnl: None,
                meta: PositionMeta::default(),
            })
            .await
            .unwrap();

        let exec = executor(mock, store.clone());
        let id = sig.id;
        match exec.execute(sig, sizing()).await.unwrap() {
            ExecutionOutcome::Skipped { .. } => {}
            other => panic!("expected Skipped, got {other:?}"),
        }
        let stored = store.signal(id).await.unwrap().unwrap();
        assert_eq!(stored.status, SignalStatus::Skipped);
    }

    #[tokio::test]
    async fn test_leverage_fallback_resizes() {
        let mut mock = MockExchangeClient::new();
        mock.expect_set_margin_mode().returning(|_, _| Ok(()));
        mock.expect_set_leverage()
            .with(eq("BTCUSDT"), eq(5u32))
            .returning(|symbol, _| {
                Err(ExchangeError::LeverageRejected {
                    symbol: symbol.to_string(),
                    max_allowed: 3,
                })
            });
        mock.expect_set_leverage()
            .with(eq("BTCUSDT"), eq(3u32))
            .returning(|_, _| Ok(()));
        mock.expect_instrument_spec().returning(|_| Ok(spec()));
        // margin 20 at 3x = notional 60 = qty 0.6.
        mock.expect_place_limit_order()
            .withf(|_, _, _, qty| *qty == Qty::new(dec!(0.6)))
            .returning(|_, _, _, _| {
                Ok(PlacedOrder {
                    order_id: "42".to_string(),
                    state: OrderState::New,
                    avg_fill_price: None,
                    filled_qty: Qty::ZERO,
                })
            });

        let store = Arc::new(MemoryStore::new());
        let sig = signal();
        store.insert_signal(sig.clone()).await.unwrap();
        let exec = executor(mock, store);

        match exec.execute(sig, sizing()).await.unwrap() {
            ExecutionOutcome::AwaitingFill { order, .. } => {
                assert_eq!(order.qty, Qty::new(dec!(0.6)));
                assert_eq!(order.signal.leverage, 3);
            }
            other => panic!("expected AwaitingFill, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stop_failure_closes_at_market() {
        let mut mock = MockExchangeClient::new();
        expect_happy_preamble(&mut mock);
        mock.expect_place_limit_order().returning(|_, _, _, _| {
            Ok(PlacedOrder {
                order_id: "42".to_string(),
                state: OrderState::Filled,
                avg_fill_price: Some(Price::new(dec!(100))),
                filled_qty: Qty::new(dec!(1)),
            })
        });
        mock.expect_cancel_all_algo_orders().returning(|_| Ok(()));
        mock.expect_place_algo_order()
            .returning(|_| Err(ExchangeError::Transport("timeout".to_string())));
        mock.expect_market_close()
            .times(1)
            .returning(|_, _, _| Ok(()));

        let store = Arc::new(MemoryStore::new());
        let sig = signal();
        store.insert_signal(sig.clone()).await.unwrap();
        let exec = OrderExecutor::new(
            // No retries so the test does not sit in backoff sleeps.
            ExecutorConfig {
                protect_retries: 0,
                ..ExecutorConfig::default()
            },
            Arc::new(mock),
            store.clone(),
            EventBus::new(),
            InFlightSet::new(),
        );

        match exec.execute(sig, sizing()).await.unwrap() {
            ExecutionOutcome::EmergencyClosed => {}
            other => panic!("expected EmergencyClosed, got {other:?}"),
        }
        // Recorded as a closed position with the emergency reason.
        let positions = store.open_positions().await.unwrap();
        assert!(positions.is_empty());
    }

    #[tokio::test]
    async fn test_failed_emergency_close_is_critical() {
        let mut mock = MockExchangeClient::new();
        expect_happy_preamble(&mut mock);
        mock.expect_place_limit_order().returning(|_, _, _, _| {
            Ok(PlacedOrder {
                order_id: "42".to_string(),
                state: OrderState::Filled,
                avg_fill_price: Some(Price::new(dec!(100))),
                filled_qty: Qty::new(dec!(1)),
            })
        });
        mock.expect_cancel_all_algo_orders().returning(|_| Ok(()));
        mock.expect_place_algo_order()
            .returning(|_| Err(ExchangeError::Transport("timeout".to_string())));
        mock.expect_market_close()
            .returning(|_, _, _| Err(ExchangeError::Transport("timeout".to_string())));

        let store = Arc::new(MemoryStore::new());
        let sig = signal();
        store.insert_signal(sig.clone()).await.unwrap();
        let exec = OrderExecutor::new(
            ExecutorConfig {
                protect_retries: 0,
                ..ExecutorConfig::default()
            },
            Arc::new(mock),
            store.clone(),
            EventBus::new(),
            InFlightSet::new(),
        );

        match exec.execute(sig, sizing()).await.unwrap() {
            ExecutionOutcome::Critical => {}
            other => panic!("expected Critical, got {other:?}"),
        }
        // The unprotected fill is still recorded open, flagged for the
        // reconciliation watchdog, with the intended levels intact.
        let positions = store.open_positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert!(positions[0].meta.unprotected);
        assert_eq!(positions[0].stop_loss, Some(Price::new(dec!(98))));
    }

    #[tokio::test]
    async fn test_emergency_close_recorded_as_closed_position() {
        let mut mock = MockExchangeClient::new();
        mock.expect_cancel_all_algo_orders().returning(|_| Ok(()));
        mock.expect_place_algo_order()
            .returning(|_| Err(ExchangeError::Transport("timeout".to_string())));
        mock.expect_market_close().returning(|_, _, _| Ok(()));
        mock.expect_instrument_spec().returning(|_| Ok(spec()));

        let store = Arc::new(MemoryStore::new());
        let sig = signal();
        store.insert_signal(sig.clone()).await.unwrap();
        let exec = OrderExecutor::new(
            ExecutorConfig {
                protect_retries: 0,
                ..ExecutorConfig::default()
            },
            Arc::new(mock),
            store.clone(),
            EventBus::new(),
            InFlightSet::new(),
        );

        let outcome = exec
            .handle_fill(&sig, Price::new(dec!(100)), Qty::new(dec!(1)))
            .await
            .unwrap();
        assert!(matches!(outcome, ExecutionOutcome::EmergencyClosed));
        // The record is terminal, so the symbol is free for new entries.
        assert!(store.open_position("BTCUSDT").await.unwrap().is_none());
        let stored = store.signal(sig.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SignalStatus::Filled);
    }
}
