//! Core domain types for the vigil execution core.
//!
//! This crate provides the fundamental types shared by all components:
//! - `Price`, `Qty`, `Usd`: Precision-safe numeric types
//! - `Signal`: A candidate trade proposal from the strategy layer
//! - `Position`: An open or closed unit of exchange risk
//! - `PendingLimitOrder`: An in-flight, not-yet-filled entry order
//! - `TradingControl`: Operator start/stop state
//! - `InFlightSet`: Advisory lock over symbols currently being ordered
//! - `EventBus`: Best-effort broadcast of lifecycle events

pub mod control;
pub mod decimal;
pub mod error;
pub mod events;
pub mod inflight;
pub mod order;
pub mod position;
pub mod signal;

pub use control::{ControlState, TradingControl};
pub use decimal::{Price, Qty, Usd};
pub use error::{CoreError, Result};
pub use events::{BotEvent, EventBus};
pub use inflight::{InFlightGuard, InFlightSet};
pub use order::PendingLimitOrder;
pub use position::{CloseReason, Position, PositionMeta, PositionStatus};
pub use signal::{Side, Signal, SignalId, SignalStatus, Timeframe};
