//! The `ExchangeClient` trait.
//!
//! Every call is a blocking RPC to the venue and the only suspension point
//! inside a loop iteration. Implementations live outside the core; tests
//! use the generated `MockExchangeClient`.

use async_trait::async_trait;
use mockall::automock;

use crate::error::Result;
use crate::types::{
    AccountBalance, AlgoOrder, AlgoOrderRequest, ExchangePosition, InstrumentSpec, MarginMode,
    OpenOrder, OrderStatus, PlacedOrder, TradeFill,
};
use chrono::{DateTime, Utc};
use vigil_core::{Price, Qty, Side};

/// Exchange operations consumed by the execution core.
#[automock]
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Place a limit entry order. The ack reports whether it crossed
    /// immediately.
    async fn place_limit_order(
        &self,
        symbol: &str,
        side: Side,
        price: Price,
        qty: Qty,
    ) -> Result<PlacedOrder>;

    /// Cancel a resting order by id.
    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()>;

    /// Query current status of an order by id.
    async fn query_order(&self, symbol: &str, order_id: &str) -> Result<OrderStatus>;

    /// Close position quantity at market (reduce-only).
    async fn market_close(&self, symbol: &str, position_side: Side, qty: Qty) -> Result<()>;

    /// Place a conditional (algo) order.
    async fn place_algo_order(&self, request: AlgoOrderRequest) -> Result<String>;

    /// Cancel a conditional order by id.
    async fn cancel_algo_order(&self, symbol: &str, algo_id: &str) -> Result<()>;

    /// Cancel every conditional order on a symbol.
    async fn cancel_all_algo_orders(&self, symbol: &str) -> Result<()>;

    /// All open positions on the account.
    async fn open_positions(&self) -> Result<Vec<ExchangePosition>>;

    /// All resting orders, optionally filtered by symbol.
    async fn open_orders(&self, symbol: Option<String>) -> Result<Vec<OpenOrder>>;

    /// All live conditional orders, optionally filtered by symbol.
    async fn open_algo_orders(&self, symbol: Option<String>) -> Result<Vec<AlgoOrder>>;

    /// Account balance snapshot.
    async fn account_balance(&self) -> Result<AccountBalance>;

    /// Set leverage for a symbol. Fails with `LeverageRejected` when the
    /// venue caps it lower.
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()>;

    /// Set margin mode for a symbol. `MarginModeAlreadySet` is an
    /// idempotent conflict.
    async fn set_margin_mode(&self, symbol: &str, mode: MarginMode) -> Result<()>;

    /// Current mark price for a symbol.
    async fn mark_price(&self, symbol: &str) -> Result<Price>;

    /// Recent fills on a symbol since a timestamp (for close
    /// classification).
    async fn trade_history(&self, symbol: &str, since: DateTime<Utc>) -> Result<Vec<TradeFill>>;

    /// Instrument precision constraints.
    async fn instrument_spec(&self, symbol: &str) -> Result<InstrumentSpec>;
}
