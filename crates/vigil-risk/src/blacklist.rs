//! Daily symbol blacklist.
//!
//! Symbols that hit a configured loss count are rejected for the rest of
//! the trading day (UTC). The counter resets when the date rolls over.
//! Explicit state owned here, fed by the reconciliation loop when it
//! classifies a close as a loss.

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::info;

#[derive(Debug)]
struct DayCounters {
    date: NaiveDate,
    losses: HashMap<String, u32>,
}

/// Per-symbol daily loss counters.
#[derive(Debug)]
pub struct DailyBlacklist {
    loss_limit: u32,
    counters: Mutex<DayCounters>,
}

impl DailyBlacklist {
    pub fn new(loss_limit: u32) -> Self {
        Self {
            loss_limit,
            counters: Mutex::new(DayCounters {
                date: Utc::now().date_naive(),
                losses: HashMap::new(),
            }),
        }
    }

    /// Record a realized loss on a symbol.
    pub fn record_loss(&self, symbol: &str) {
        let mut counters = self.counters.lock();
        Self::roll_day(&mut counters);
        let count = counters.losses.entry(symbol.to_string()).or_insert(0);
        *count += 1;
        if *count >= self.loss_limit {
            info!(symbol, losses = *count, "symbol blacklisted for the day");
        }
    }

    /// Whether the symbol has reached the daily loss limit.
    pub fn is_blacklisted(&self, symbol: &str) -> bool {
        let mut counters = self.counters.lock();
        Self::roll_day(&mut counters);
        counters
            .losses
            .get(symbol)
            .map(|count| *count >= self.loss_limit)
            .unwrap_or(false)
    }

    /// Loss count for a symbol today.
    pub fn losses_today(&self, symbol: &str) -> u32 {
        let mut counters = self.counters.lock();
        Self::roll_day(&mut counters);
        counters.losses.get(symbol).copied().unwrap_or(0)
    }

    fn roll_day(counters: &mut DayCounters) {
        let today = Utc::now().date_naive();
        if counters.date != today {
            counters.date = today;
            counters.losses.clear();
        }
    }
}
