//! Wire structs returned by the exchange client.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use vigil_core::{Price, Qty, Side, Usd};

/// Margin mode for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarginMode {
    Isolated,
    Cross,
}

/// State of an order on the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderState {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Expired,
}

impl OrderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Canceled | Self::Expired)
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            Self::Filled => write!(f, "FILLED"),
            Self::Canceled => write!(f, "CANCELED"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// Acknowledgement of a placed order.
///
/// `state` is `Filled` when the limit crossed immediately; the executor
/// branches on this to attach protection synchronously.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub order_id: String,
    pub state: OrderState,
    /// Average fill price, present when any quantity filled.
    pub avg_fill_price: Option<Price>,
    pub filled_qty: Qty,
}

/// Current status of an order queried by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatus {
    pub order_id: String,
    pub state: OrderState,
    pub avg_fill_price: Option<Price>,
    pub filled_qty: Qty,
}

/// An open (resting) order on the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub symbol: String,
    pub order_id: String,
    pub side: Side,
    pub price: Price,
    pub qty: Qty,
    pub created_at: DateTime<Utc>,
}

/// Kind of conditional (algo) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgoKind {
    StopLoss,
    TakeProfit,
}

impl fmt::Display for AlgoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StopLoss => write!(f, "stop_loss"),
            Self::TakeProfit => write!(f, "take_profit"),
        }
    }
}

/// Request to place a conditional order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgoOrderRequest {
    pub symbol: String,
    pub kind: AlgoKind,
    /// Side of the position being protected (the venue closes against it).
    pub position_side: Side,
    pub trigger_price: Price,
    pub qty: Qty,
}

/// A live conditional order on the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgoOrder {
    pub symbol: String,
    pub algo_id: String,
    pub kind: AlgoKind,
    pub position_side: Side,
    pub trigger_price: Price,
    pub qty: Qty,
}

/// An open position as the venue reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangePosition {
    pub symbol: String,
    pub side: Side,
    pub qty: Qty,
    pub entry_price: Price,
    pub mark_price: Price,
    pub leverage: u32,
}

impl ExchangePosition {
    /// Isolated margin implied by the venue numbers: (mark × qty) / leverage.
    pub fn margin(&self) -> Usd {
        let notional = self.qty.notional_at(self.mark_price);
        if self.leverage == 0 {
            return notional;
        }
        notional / Decimal::from(self.leverage)
    }
}

/// Account balance snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub total: Usd,
    pub available: Usd,
}

/// A single fill from the venue's trade history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeFill {
    pub symbol: String,
    pub side: Side,
    pub price: Price,
    pub qty: Qty,
    pub realized_pnl: Usd,
    pub executed_at: DateTime<Utc>,
}

/// Instrument precision constraints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    /// Price tick size.
    pub tick_size: Decimal,
    /// Quantity lot size.
    pub lot_size: Decimal,
    /// Minimum order notional in USD.
    pub min_notional: Decimal,
}

impl InstrumentSpec {
    /// Round a price down to the instrument tick.
    pub fn round_price(&self, price: Price) -> Price {
        if self.tick_size.is_zero() {
            return price;
        }
        Price::new((price.inner() / self.tick_size).floor() * self.tick_size)
    }

    /// Round a quantity down to the instrument lot.
    pub fn round_qty(&self, qty: Qty) -> Qty {
        if self.lot_size.is_zero() {
            return qty;
        }
        Qty::new((qty.inner() / self.lot_size).floor() * self.lot_size)
    }

    /// Whether an order of `qty` at `price` meets the minimum notional.
    pub fn meets_min_notional(&self, price: Price, qty: Qty) -> bool {
        qty.inner() * price.inner() >= self.min_notional
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_price_to_tick() {
        let spec = InstrumentSpec {
            tick_size: dec!(0.1),
            lot_size: dec!(0.001),
            min_notional: dec!(5),
        };
        assert_eq!(
            spec.round_price(Price::new(dec!(100.1799))),
            Price::new(dec!(100.1))
        );
        assert_eq!(
            spec.round_qty(Qty::new(dec!(0.12345))),
            Qty::new(dec!(0.123))
        );
    }

    #[test]
    fn test_min_notional() {
        let spec = InstrumentSpec {
            tick_size: dec!(0.1),
            lot_size: dec!(0.001),
            min_notional: dec!(5),
        };
        assert!(spec.meets_min_notional(Price::new(dec!(100)), Qty::new(dec!(0.05))));
        assert!(!spec.meets_min_notional(Price::new(dec!(100)), Qty::new(dec!(0.04))));
    }

    #[test]
    fn test_exchange_position_margin() {
        let pos = ExchangePosition {
            symbol: "BTCUSDT".to_string(),
            side: Side::Long,
            qty: Qty::new(dec!(0.5)),
            entry_price: Price::new(dec!(40000)),
            mark_price: Price::new(dec!(42000)),
            leverage: 10,
        };
        // (42000 * 0.5) / 10 = 2100
        assert_eq!(pos.margin(), Usd::new(dec!(2100)));
    }
}
