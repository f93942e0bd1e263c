//! Advisory lock over symbols currently being ordered.
//!
//! The executor claims a symbol for the duration of order placement; the
//! reconciliation loop consults the set to avoid racing a fresh placement.
//! This is advisory only: it suppresses defensive action, it does not
//! serialize exchange calls.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// Shared set of symbols with an order placement in progress.
#[derive(Debug, Clone, Default)]
pub struct InFlightSet {
    symbols: Arc<DashMap<String, DateTime<Utc>>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to claim a symbol. Returns a guard that releases the claim on
    /// drop, or None if the symbol is already claimed.
    pub fn claim(&self, symbol: &str) -> Option<InFlightGuard> {
        use dashmap::mapref::entry::Entry;
        match self.symbols.entry(symbol.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(entry) => {
                entry.insert(Utc::now());
                Some(InFlightGuard {
                    set: self.clone(),
                    symbol: symbol.to_string(),
                })
            }
        }
    }

    /// Whether a placement is in progress for this symbol.
    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains_key(symbol)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// RAII guard holding an in-flight claim on a symbol.
#[derive(Debug)]
pub struct InFlightGuard {
    set: InFlightSet,
    symbol: String,
}

impl InFlightGuard {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.symbols.remove(&self.symbol);
    }
}
