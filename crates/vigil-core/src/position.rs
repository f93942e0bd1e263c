//! Positions: open units of exchange risk and their metadata envelope.
//!
//! Exactly one OPEN position may exist per symbol at a time. The order
//! executor refuses duplicate placement and the reconciliation loop
//! force-closes violations.

use crate::decimal::{Price, Qty, Usd};
use crate::signal::{Side, SignalId, Timeframe};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Position lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// Structured close reason.
///
/// The first five are derived from exchange history by nearest-target
/// matching; the rest are assigned by the reconciliation loop when it
/// forces a liquidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloseReason {
    StopLoss,
    TakeProfit1,
    TakeProfit2,
    Manual,
    Liquidation,
    UnknownPosition,
    OversizedMargin,
    MissingStop,
    StaleExpiry,
    Emergency,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StopLoss => write!(f, "SL"),
            Self::TakeProfit1 => write!(f, "TP1"),
            Self::TakeProfit2 => write!(f, "TP2"),
            Self::Manual => write!(f, "MANUAL"),
            Self::Liquidation => write!(f, "LIQUIDATION"),
            Self::UnknownPosition => write!(f, "UNKNOWN_POSITION"),
            Self::OversizedMargin => write!(f, "OVERSIZED_MARGIN"),
            Self::MissingStop => write!(f, "MISSING_STOP"),
            Self::StaleExpiry => write!(f, "STALE_EXPIRY"),
            Self::Emergency => write!(f, "EMERGENCY"),
        }
    }
}

impl CloseReason {
    /// Whether the close came from the losing side (stopped out or
    /// liquidated), independent of the realized P&L sign.
    pub fn is_loss(&self) -> bool {
        matches!(self, Self::StopLoss | Self::Liquidation)
    }
}

/// Metadata envelope: planned values from the signal, actual values
/// post-slippage, and bookkeeping flags for the reconciliation loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionMeta {
    /// Planned entry from the signal.
    pub planned_entry: Option<Price>,
    /// Planned stop-loss from the signal.
    pub planned_stop: Option<Price>,
    /// Planned first take-profit from the signal.
    pub planned_tp1: Option<Price>,
    /// Planned second take-profit from the signal.
    pub planned_tp2: Option<Price>,
    /// Realized entry price.
    pub actual_entry: Option<Price>,
    /// Realized entry slippage (actual − planned), in price units.
    pub slippage: Option<Decimal>,
    /// Structured close reason, set when the position closes.
    pub close_reason: Option<CloseReason>,
    /// Whether the stop-loss has already been moved to break-even.
    pub break_even_moved: bool,
    /// Whether the stop-loss was assigned by the emergency fallback
    /// (no valid planned stop available).
    pub emergency_stop: bool,
    /// Whether protection attachment and the emergency close both
    /// failed, leaving the venue position open with no working stop.
    pub unprotected: bool,
    /// Whether this position was adopted from the exchange rather than
    /// opened by the executor.
    pub adopted: bool,
}

/// An open or closed unit of exchange risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Unique identifier.
    pub id: Uuid,
    /// Instrument symbol.
    pub symbol: String,
    /// Direction.
    pub side: Side,
    /// Average entry price.
    pub entry_price: Price,
    /// Original position quantity.
    pub qty: Qty,
    /// Leverage actually applied on the exchange.
    pub leverage: u32,
    /// Current stop-loss level, if one is attached.
    pub stop_loss: Option<Price>,
    /// Current first take-profit level.
    pub take_profit_1: Option<Price>,
    /// Current second take-profit level.
    pub take_profit_2: Option<Price>,
    /// Lifecycle status.
    pub status: PositionStatus,
    /// Originating signal, if any (None for adopted positions).
    pub signal_id: Option<SignalId>,
    /// Timeframe inherited from the signal (drives stale expiry).
    pub timeframe: Option<Timeframe>,
    /// Open timestamp.
    pub opened_at: DateTime<Utc>,
    /// Close timestamp.
    pub closed_at: Option<DateTime<Utc>>,
    /// Realized P&L at close.
    pub realized_pnl: Option<Usd>,
    /// Planned/actual metadata envelope.
    pub meta: PositionMeta,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Notional value at a mark price.
    pub fn notional(&self, mark: Price) -> Usd {
        self.qty.notional_at(mark)
    }

    /// Isolated margin at a mark price: (mark × qty) / leverage.
    pub fn margin(&self, mark: Price) -> Usd {
        if self.leverage == 0 {
            return self.notional(mark);
        }
        self.notional(mark) / Decimal::from(self.leverage)
    }

    /// How long the position has been held.
    pub fn holding_time(&self, now: DateTime<Utc>) -> Duration {
        now - self.opened_at
    }

    /// Signed P&L of closing `qty` at `exit` against the entry price.
    pub fn pnl_at(&self, exit: Price, qty: Qty) -> Usd {
        let diff = (exit.inner() - self.entry_price.inner()) * self.side.sign();
        Usd::new(diff * qty.inner())
    }

    /// Mark the position closed with a reason and realized P&L.
    pub fn close(&mut self, reason: CloseReason, pnl: Usd, now: DateTime<Utc>) {
        self.status = PositionStatus::Closed;
        self.closed_at = Some(now);
        self.realized_pnl = Some(pnl);
        self.meta.close_reason = Some(reason);
    }
}
