//! In-process paper exchange.
//!
//! A simulated venue for running the execution core without live keys.
//! Limit orders fill immediately and in full at their limit price, so the
//! binary exercises the synchronous protection path end to end. Positions,
//! conditional orders, and leverage are tracked per symbol; trade history
//! is not simulated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;
use vigil_core::{Price, Qty, Side, Usd};
use vigil_exchange::{
    AccountBalance, AlgoOrder, AlgoOrderRequest, ExchangeClient, ExchangeError, ExchangePosition,
    InstrumentSpec, MarginMode, OpenOrder, OrderState, OrderStatus, PlacedOrder, Result, TradeFill,
};

/// Highest leverage the paper venue accepts.
const MAX_LEVERAGE: u32 = 50;

/// Simulated exchange backing the binary in paper mode.
pub struct PaperExchange {
    balance: Mutex<Usd>,
    positions: DashMap<String, ExchangePosition>,
    algos: DashMap<String, AlgoOrder>,
    fills: DashMap<String, OrderStatus>,
    leverage: DashMap<String, u32>,
    marks: DashMap<String, Price>,
    next_id: AtomicU64,
}

impl PaperExchange {
    pub fn new(starting_balance: Decimal) -> Self {
        Self {
            balance: Mutex::new(Usd::new(starting_balance)),
            positions: DashMap::new(),
            algos: DashMap::new(),
            fills: DashMap::new(),
            leverage: DashMap::new(),
            marks: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn leverage_for(&self, symbol: &str) -> u32 {
        self.leverage.get(symbol).map(|l| *l).unwrap_or(1)
    }

    /// Apply a fill to the per-symbol position book.
    fn apply_fill(&self, symbol: &str, side: Side, price: Price, qty: Qty) {
        self.marks.insert(symbol.to_string(), price);
        match self.positions.get_mut(symbol) {
            Some(mut pos) if pos.side == side => {
                // Same direction: grow and re-average the entry.
                let total = pos.qty + qty;
                let notional =
                    pos.entry_price.inner() * pos.qty.inner() + price.inner() * qty.inner();
                pos.entry_price = Price::new(notional / total.inner());
                pos.qty = total;
                pos.mark_price = price;
            }
            Some(mut pos) => {
                // Opposite direction reduces; crossing through zero flips.
                if qty < pos.qty {
                    pos.qty = pos.qty - qty;
                    pos.mark_price = price;
                } else if qty == pos.qty {
                    drop(pos);
                    self.positions.remove(symbol);
                } else {
                    pos.side = side;
                    pos.qty = qty - pos.qty;
                    pos.entry_price = price;
                    pos.mark_price = price;
                }
            }
            None => {
                self.positions.insert(
                    symbol.to_string(),
                    ExchangePosition {
                        symbol: symbol.to_string(),
                        side,
                        qty,
                        entry_price: price,
                        mark_price: price,
                        leverage: self.leverage_for(symbol),
                    },
                );
            }
        }
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn place_limit_order(
        &self,
        symbol: &str,
        side: Side,
        price: Price,
        qty: Qty,
    ) -> Result<PlacedOrder> {
        let order_id = self.next_id("ord");
        self.apply_fill(symbol, side, price, qty);
        self.fills.insert(
            order_id.clone(),
            OrderStatus {
                order_id: order_id.clone(),
                state: OrderState::Filled,
                avg_fill_price: Some(price),
                filled_qty: qty,
            },
        );
        debug!(symbol, %side, %price, %qty, order_id, "paper fill");
        Ok(PlacedOrder {
            order_id,
            state: OrderState::Filled,
            avg_fill_price: Some(price),
            filled_qty: qty,
        })
    }

    async fn cancel_order(&self, _symbol: &str, order_id: &str) -> Result<()> {
        // Nothing rests on the paper book.
        Err(ExchangeError::OrderNotFound(order_id.to_string()))
    }

    async fn query_order(&self, _symbol: &str, order_id: &str) -> Result<OrderStatus> {
        self.fills
            .get(order_id)
            .map(|status| status.clone())
            .ok_or_else(|| ExchangeError::OrderNotFound(order_id.to_string()))
    }

    async fn market_close(&self, symbol: &str, position_side: Side, qty: Qty) -> Result<()> {
        let price = self
            .marks
            .get(symbol)
            .map(|p| *p)
            .ok_or_else(|| ExchangeError::Exchange {
                code: -4003,
                message: format!("no position to close on {symbol}"),
            })?;
        self.apply_fill(symbol, position_side.opposite(), price, qty);
        Ok(())
    }

    async fn place_algo_order(&self, request: AlgoOrderRequest) -> Result<String> {
        let algo_id = self.next_id("algo");
        self.algos.insert(
            algo_id.clone(),
            AlgoOrder {
                symbol: request.symbol,
                algo_id: algo_id.clone(),
                kind: request.kind,
                position_side: request.position_side,
                trigger_price: request.trigger_price,
                qty: request.qty,
            },
        );
        Ok(algo_id)
    }

    async fn cancel_algo_order(&self, _symbol: &str, algo_id: &str) -> Result<()> {
        self.algos
            .remove(algo_id)
            .map(|_| ())
            .ok_or_else(|| ExchangeError::OrderNotFound(algo_id.to_string()))
    }

    async fn cancel_all_algo_orders(&self, symbol: &str) -> Result<()> {
        self.algos.retain(|_, algo| algo.symbol != symbol);
        Ok(())
    }

    async fn open_positions(&self) -> Result<Vec<ExchangePosition>> {
        Ok(self.positions.iter().map(|p| p.clone()).collect())
    }

    async fn open_orders(&self, _symbol: Option<String>) -> Result<Vec<OpenOrder>> {
        Ok(Vec::new())
    }

    async fn open_algo_orders(&self, symbol: Option<String>) -> Result<Vec<AlgoOrder>> {
        Ok(self
            .algos
            .iter()
            .filter(|a| symbol.as_deref().map_or(true, |s| a.symbol == s))
            .map(|a| a.clone())
            .collect())
    }

    async fn account_balance(&self) -> Result<AccountBalance> {
        let balance = *self.balance.lock();
        Ok(AccountBalance {
            total: balance,
            available: balance,
        })
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        if leverage > MAX_LEVERAGE {
            return Err(ExchangeError::LeverageRejected {
                symbol: symbol.to_string(),
                max_allowed: MAX_LEVERAGE,
            });
        }
        self.leverage.insert(symbol.to_string(), leverage);
        Ok(())
    }

    async fn set_margin_mode(&self, _symbol: &str, _mode: MarginMode) -> Result<()> {
        Ok(())
    }

    async fn mark_price(&self, symbol: &str) -> Result<Price> {
        self.marks
            .get(symbol)
            .map(|p| *p)
            .ok_or_else(|| ExchangeError::Exchange {
                code: -1121,
                message: format!("unknown symbol {symbol}"),
            })
    }

    async fn trade_history(&self, _symbol: &str, _since: DateTime<Utc>) -> Result<Vec<TradeFill>> {
        Ok(Vec::new())
    }

    async fn instrument_spec(&self, _symbol: &str) -> Result<InstrumentSpec> {
        Ok(InstrumentSpec {
            tick_size: dec!(0.01),
            lot_size: dec!(0.001),
            min_notional: dec!(1),
        })
    }
}
