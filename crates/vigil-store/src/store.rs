//! The `Store` trait: CRUD plus the query shapes the core needs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use vigil_core::{Position, Signal, SignalId, SignalStatus, Usd};

use crate::error::Result;

/// Durable CRUD for signals and positions.
#[async_trait]
pub trait Store: Send + Sync {
    // === Signals ===

    /// Persist a new signal.
    async fn insert_signal(&self, signal: Signal) -> Result<()>;

    /// Fetch a signal by id.
    async fn signal(&self, id: SignalId) -> Result<Option<Signal>>;

    /// Set a signal's lifecycle status. Terminal statuses are immutable:
    /// attempting to leave a terminal state is an error.
    async fn set_signal_status(&self, id: SignalId, status: SignalStatus) -> Result<()>;

    /// All signals for a symbol created at or after `since`, any status.
    async fn signals_since(&self, symbol: &str, since: DateTime<Utc>) -> Result<Vec<Signal>>;

    // === Positions ===

    /// Persist a new position. Refuses a second OPEN position on the same
    /// symbol.
    async fn insert_position(&self, position: Position) -> Result<()>;

    /// Replace a position record (protective updates, break-even moves,
    /// closes).
    async fn update_position(&self, position: Position) -> Result<()>;

    /// Fetch a position by id.
    async fn position(&self, id: Uuid) -> Result<Option<Position>>;

    /// The OPEN position on a symbol, if one exists.
    async fn open_position(&self, symbol: &str) -> Result<Option<Position>>;

    /// All OPEN positions.
    async fn open_positions(&self) -> Result<Vec<Position>>;

    /// Sum of realized P&L over positions closed at or after `since`.
    async fn realized_pnl_since(&self, since: DateTime<Utc>) -> Result<Usd>;
}
