//! Trade signals and their lifecycle.
//!
//! A `Signal` is a candidate trade proposal produced by the strategy layer.
//! The core only validates structural sanity of its numeric fields; strategy
//! logic is never re-checked here.

use crate::decimal::Price;
use crate::error::{CoreError, Result};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Returns the opposite side (also the strategy-reversed mapping used
    /// when correlating exchange positions to signals).
    pub fn opposite(&self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }

    /// Returns 1 for long, -1 for short (for signed price offsets).
    pub fn sign(&self) -> Decimal {
        match self {
            Self::Long => Decimal::ONE,
            Self::Short => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// Candle timeframe of the originating strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M5,
    M15,
    M30,
    H1,
    H4,
}

impl Timeframe {
    /// Duration of one candle at this timeframe.
    pub fn candle_duration(&self) -> Duration {
        match self {
            Self::M5 => Duration::minutes(5),
            Self::M15 => Duration::minutes(15),
            Self::M30 => Duration::minutes(30),
            Self::H1 => Duration::hours(1),
            Self::H4 => Duration::hours(4),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::M5 => write!(f, "5m"),
            Self::M15 => write!(f, "15m"),
            Self::M30 => write!(f, "30m"),
            Self::H1 => write!(f, "1h"),
            Self::H4 => write!(f, "4h"),
        }
    }
}

/// Signal lifecycle status.
///
/// Terminal statuses are immutable: the store refuses regressions from a
/// terminal state back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalStatus {
    /// Queued or awaiting fill.
    Pending,
    /// Entry order filled, position opened.
    Filled,
    /// Rejected by admission control or deduplication.
    Skipped,
    /// Entry order canceled (timeout, zone exit, operator).
    Canceled,
    /// Execution failed.
    Failed,
}

impl SignalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Filled => write!(f, "FILLED"),
            Self::Skipped => write!(f, "SKIPPED"),
            Self::Canceled => write!(f, "CANCELED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Unique signal identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalId(pub Uuid);

impl SignalId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SignalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A proposed trade from the strategy layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Unique identifier.
    pub id: SignalId,
    /// Instrument symbol (e.g. "BTCUSDT").
    pub symbol: String,
    /// Direction.
    pub side: Side,
    /// Planned entry price (midpoint of the anticipated entry zone).
    pub entry: Price,
    /// Lower bound of the anticipated entry zone.
    pub zone_low: Price,
    /// Upper bound of the anticipated entry zone.
    pub zone_high: Price,
    /// Planned stop-loss.
    pub stop_loss: Price,
    /// Planned first take-profit.
    pub take_profit_1: Price,
    /// Planned second take-profit, if the strategy splits exits.
    pub take_profit_2: Option<Price>,
    /// Leverage hint from the strategy.
    pub leverage: u32,
    /// Confidence score in [0, 1].
    pub confidence: Decimal,
    /// Strategy tag (keys per-strategy capital allocation).
    pub strategy: String,
    /// Fraction of the position closed at the first take-profit.
    pub tp_split: Decimal,
    /// Candle timeframe of the originating strategy.
    pub timeframe: Timeframe,
    /// Lifecycle status.
    pub status: SignalStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Signal {
    /// Validate structural sanity of the numeric fields.
    ///
    /// A malformed signal is fatal for that signal only; it never blocks
    /// queue processing.
    pub fn validate(&self) -> Result<()> {
        if !self.entry.is_positive() {
            return Err(CoreError::InvalidSignal(format!(
                "{}: entry must be positive, got {}",
                self.symbol, self.entry
            )));
        }
        if !self.stop_loss.is_positive() {
            return Err(CoreError::InvalidSignal(format!(
                "{}: stop-loss must be positive, got {}",
                self.symbol, self.stop_loss
            )));
        }
        let stop_ok = match self.side {
            Side::Long => self.stop_loss < self.entry,
            Side::Short => self.stop_loss > self.entry,
        };
        if !stop_ok {
            return Err(CoreError::InvalidSignal(format!(
                "{}: stop-loss {} on wrong side of entry {} for {}",
                self.symbol, self.stop_loss, self.entry, self.side
            )));
        }
        let tp_ok = match self.side {
            Side::Long => self.take_profit_1 > self.entry,
            Side::Short => self.take_profit_1 < self.entry,
        };
        if !tp_ok {
            return Err(CoreError::InvalidSignal(format!(
                "{}: take-profit {} on wrong side of entry {} for {}",
                self.symbol, self.take_profit_1, self.entry, self.side
            )));
        }
        if self.zone_low > self.zone_high {
            return Err(CoreError::InvalidSignal(format!(
                "{}: inverted entry zone [{}, {}]",
                self.symbol, self.zone_low, self.zone_high
            )));
        }
        if self.tp_split <= Decimal::ZERO || self.tp_split > Decimal::ONE {
            return Err(CoreError::InvalidSignal(format!(
                "{}: tp_split {} outside (0, 1]",
                self.symbol, self.tp_split
            )));
        }
        if self.leverage == 0 {
            return Err(CoreError::InvalidSignal(format!(
                "{}: leverage must be at least 1",
                self.symbol
            )));
        }
        Ok(())
    }

    /// Entry-to-stop distance (1R) in price units.
    pub fn risk_per_unit(&self) -> Decimal {
        self.entry.distance(self.stop_loss)
    }

    /// Stop-loss distance as a percentage of entry.
    pub fn stop_distance_pct(&self) -> Decimal {
        if self.entry.is_zero() {
            return Decimal::ZERO;
        }
        self.risk_per_unit() / self.entry.inner() * Decimal::from(100)
    }

    /// Whether `other` is a same-symbol, same-side duplicate for the
    /// deduplication window.
    pub fn duplicates(&self, symbol: &str, side: Side) -> bool {
        self.symbol == symbol && self.side == side
    }
}
