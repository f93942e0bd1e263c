//! Close-reason classification by nearest-target matching.

use rust_decimal::Decimal;
use vigil_core::{CloseReason, Position, Price, Side};

/// Classify an out-of-band close from its exit price.
///
/// The exit is matched against the position's stop and take-profit levels
/// within a percentage tolerance; the nearest match wins. An exit beyond
/// the stop on the losing side is a liquidation; anything unmatched is a
/// manual close.
pub fn classify_close(position: &Position, exit: Price, tolerance_pct: Decimal) -> CloseReason {
    let tolerance = tolerance_pct / Decimal::from(100);
    let within = |target: Price| -> Option<Decimal> {
        if target.inner().is_zero() {
            return None;
        }
        let deviation = (exit.inner() - target.inner()).abs() / target.inner();
        (deviation <= tolerance).then_some(deviation)
    };

    let mut best: Option<(Decimal, CloseReason)> = None;
    let candidates = [
        (position.stop_loss, CloseReason::StopLoss),
        (position.take_profit_1, CloseReason::TakeProfit1),
        (position.take_profit_2, CloseReason::TakeProfit2),
    ];
    for (target, reason) in candidates {
        if let Some(deviation) = target.and_then(within) {
            if best.map(|(d, _)| deviation < d).unwrap_or(true) {
                best = Some((deviation, reason));
            }
        }
    }
    if let Some((_, reason)) = best {
        return reason;
    }

    if let Some(stop) = position.stop_loss {
        let beyond_stop = match position.side {
            Side::Long => exit.inner() < stop.inner() * (Decimal::ONE - tolerance),
            Side::Short => exit.inner() > stop.inner() * (Decimal::ONE + tolerance),
        };
        if beyond_stop {
            return CloseReason::Liquidation;
        }
    }
    CloseReason::Manual
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;
    use vigil_core::{PositionMeta, PositionStatus, Qty};

    fn position(side: Side) -> Position {
        let (stop, tp1, tp2) = match side {
            Side::Long => (dec!(98), dec!(102.4), dec!(108)),
            Side::Short => (dec!(102), dec!(97.6), dec!(92)),
        };
        Position {
            id: Uuid::new_v4(),
            symbol: "BTCUSDT".to_string(),
            side,
            entry_price: Price::new(dec!(100)),
            qty: Qty::new(dec!(1)),
            leverage: 5,
            stop_loss: Some(Price::new(stop)),
            take_profit_1: Some(Price::new(tp1)),
            take_profit_2: Some(Price::new(tp2)),
            status: PositionStatus::Open,
            signal_id: None,
            timeframe: None,
            opened_at: Utc::now(),
            closed_at: None,
            realized_pnl: None,
            meta: PositionMeta::default(),
        }
    }

    #[test]
    fn test_exit_at_stop_is_stop_loss() {
        let pos = position(Side::Long);
        assert_eq!(
            classify_close(&pos, Price::new(dec!(98.1)), dec!(0.3)),
            CloseReason::StopLoss
        );
    }

    #[test]
    fn test_exit_at_targets() {
        let pos = position(Side::Long);
        assert_eq!(
            classify_close(&pos, Price::new(dec!(102.5)), dec!(0.3)),
            CloseReason::TakeProfit1
        );
        assert_eq!(
            classify_close(&pos, Price::new(dec!(108)), dec!(0.3)),
            CloseReason::TakeProfit2
        );
    }

    #[test]
    fn test_exit_far_below_stop_is_liquidation() {
        let pos = position(Side::Long);
        assert_eq!(
            classify_close(&pos, Price::new(dec!(90)), dec!(0.3)),
            CloseReason::Liquidation
        );
    }

    #[test]
    fn test_short_liquidation_is_above_stop() {
        let pos = position(Side::Short);
        assert_eq!(
            classify_close(&pos, Price::new(dec!(110)), dec!(0.3)),
            CloseReason::Liquidation
        );
        assert_eq!(
            classify_close(&pos, Price::new(dec!(102)), dec!(0.3)),
            CloseReason::StopLoss
        );
    }

    #[test]
    fn test_unmatched_exit_is_manual() {
        let pos = position(Side::Long);
        assert_eq!(
            classify_close(&pos, Price::new(dec!(100.7)), dec!(0.3)),
            CloseReason::Manual
        );
    }

    #[test]
    fn test_nearest_target_wins() {
        let mut pos = position(Side::Long);
        // Targets close together: 102.4 and 102.6, exit at 102.55.
        pos.take_profit_2 = Some(Price::new(dec!(102.6)));
        assert_eq!(
            classify_close(&pos, Price::new(dec!(102.55)), dec!(0.3)),
            CloseReason::TakeProfit2
        );
    }
}
