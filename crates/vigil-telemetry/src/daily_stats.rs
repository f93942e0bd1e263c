//! Daily trading summary output.
//!
//! Periodically logs a one-line summary of the UTC trading day: realized
//! P&L since midnight and current open exposure. Operators read this from
//! the log stream; there is no separate metrics endpoint.

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use vigil_core::Usd;
use vigil_store::Store;

use crate::error::TelemetryResult;

/// Snapshot of the current trading day.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub realized_pnl: Usd,
    pub open_positions: usize,
}

/// Periodic daily-summary reporter.
pub struct DailyStatsReporter {
    store: Arc<dyn Store>,
    start_time: DateTime<Utc>,
}

impl DailyStatsReporter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            start_time: Utc::now(),
        }
    }

    /// Compute the summary for the current UTC day.
    pub async fn summary(&self) -> TelemetryResult<DailySummary> {
        let date = Utc::now().date_naive();
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc())
            .unwrap_or(self.start_time);
        let realized_pnl = self.store.realized_pnl_since(midnight).await?;
        let open_positions = self.store.open_positions().await?.len();
        Ok(DailySummary {
            date,
            realized_pnl,
            open_positions,
        })
    }

    /// Log the summary on a fixed interval.
    pub fn spawn(self: Arc<Self>, interval_secs: u64) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                match self.summary().await {
                    Ok(summary) => info!(
                        date = %summary.date,
                        realized_pnl = %summary.realized_pnl,
                        open_positions = summary.open_positions,
                        "daily summary"
                    ),
                    Err(err) => warn!(%err, "daily summary failed"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;
    use uuid::Uuid;
    use vigil_core::{CloseReason, Position, PositionMeta, PositionStatus, Price, Qty, Side};
    use vigil_store::MemoryStore;

    fn closed_position(symbol: &str, pnl: rust_decimal::Decimal) -> Position {
        let now = Utc::now();
        let mut position = Position {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            side: Side::Long,
            entry_price: Price::new(dec!(100)),
            qty: Qty::new(dec!(1)),
            leverage: 5,
            stop_loss: None,
            take_profit_1: None,
            take_profit_2: None,
            status: PositionStatus::Open,
            signal_id: None,
            timeframe: None,
            opened_at: now - ChronoDuration::hours(1),
            closed_at: None,
            realized_pnl: None,
            meta: PositionMeta::default(),
        };
        position.close(CloseReason::Manual, Usd::new(pnl), now);
        position
    }

    #[tokio::test]
    async fn test_summary_sums_todays_pnl() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_position(closed_position("BTCUSDT", dec!(30)))
            .await
            .unwrap();
        store
            .insert_position(closed_position("ETHUSDT", dec!(-12)))
            .await
            .unwrap();

        let reporter = DailyStatsReporter::new(store);
        let summary = reporter.summary().await.unwrap();
        assert_eq!(summary.realized_pnl, Usd::new(dec!(18)));
        assert_eq!(summary.open_positions, 0);
    }
}
