//! Pending limit orders awaiting fill.
//!
//! At most one `PendingLimitOrder` exists per symbol; the order monitor
//! owns the map and is the only component that mutates it.

use crate::decimal::{Price, Qty};
use crate::signal::{Side, Signal};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An in-flight, not-yet-filled entry order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingLimitOrder {
    /// Instrument symbol.
    pub symbol: String,
    /// Exchange order id.
    pub order_id: String,
    /// Direction.
    pub side: Side,
    /// Limit price.
    pub price: Price,
    /// Order quantity.
    pub qty: Qty,
    /// Lower bound of the anticipated entry zone.
    pub zone_low: Price,
    /// Upper bound of the anticipated entry zone.
    pub zone_high: Price,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Expiry timestamp (validity window derived from the timeframe).
    pub expires_at: DateTime<Utc>,
    /// Originating signal.
    pub signal: Signal,
}

impl PendingLimitOrder {
    /// Whether the validity window has elapsed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether `current` has left the anticipated entry zone by more than
    /// `buffer_pct` percent of the zone boundary.
    ///
    /// For longs the concern is price running up past the zone; for shorts,
    /// price falling below it. The buffer avoids cancelling on small
    /// overshoots that may still come back.
    pub fn zone_exited(&self, current: Price, buffer_pct: Decimal) -> bool {
        let factor = buffer_pct / Decimal::from(100);
        match self.side {
            Side::Long => {
                let ceiling = self.zone_high.inner() * (Decimal::ONE + factor);
                current.inner() > ceiling
            }
            Side::Short => {
                let floor = self.zone_low.inner() * (Decimal::ONE - factor);
                current.inner() < floor
            }
        }
    }
}
