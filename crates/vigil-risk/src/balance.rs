//! Account balance cache.
//!
//! Capital for sizing is fetched from the exchange with a short TTL so the
//! gate compounds with the account. On fetch failure the last good value is
//! served; before the first successful fetch a configured fallback constant
//! stands in.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;
use vigil_core::Usd;
use vigil_exchange::{AccountBalance, ExchangeClient};

#[derive(Debug, Clone, Copy)]
struct CachedBalance {
    balance: AccountBalance,
    fetched_at: Instant,
}

/// TTL cache over `ExchangeClient::account_balance`.
pub struct BalanceCache {
    exchange: Arc<dyn ExchangeClient>,
    ttl: Duration,
    fallback: Usd,
    cached: Mutex<Option<CachedBalance>>,
}

impl BalanceCache {
    pub fn new(exchange: Arc<dyn ExchangeClient>, ttl: Duration, fallback: Usd) -> Self {
        Self {
            exchange,
            ttl,
            fallback,
            cached: Mutex::new(None),
        }
    }

    /// Current balance, refreshed from the exchange when the cache is
    /// stale. Never fails: degrades to last-good, then to the fallback.
    pub async fn get(&self) -> AccountBalance {
        if let Some(cached) = *self.cached.lock() {
            if cached.fetched_at.elapsed() < self.ttl {
                return cached.balance;
            }
        }

        match self.exchange.account_balance().await {
            Ok(balance) => {
                *self.cached.lock() = Some(CachedBalance {
                    balance,
                    fetched_at: Instant::now(),
                });
                balance
            }
            Err(err) => {
                let last_good = self.cached.lock().map(|c| c.balance);
                match last_good {
                    Some(balance) => {
                        warn!(%err, "balance fetch failed, serving last cached value");
                        balance
                    }
                    None => {
                        warn!(%err, fallback = %self.fallback, "balance fetch failed with cold cache, using fallback");
                        AccountBalance {
                            total: self.fallback,
                            available: self.fallback,
                        }
                    }
                }
            }
        }
    }
}
