//! Monitor configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Fast poll interval for fill/expiry detection, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Slow sync interval against the venue's open-order list, in seconds.
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    /// Percent buffer past the entry zone before a resting order is
    /// considered stranded and canceled.
    #[serde(default = "default_zone_buffer_pct")]
    pub zone_buffer_pct: Decimal,
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_sync_interval_secs() -> u64 {
    60
}

fn default_zone_buffer_pct() -> Decimal {
    Decimal::ONE
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            sync_interval_secs: default_sync_interval_secs(),
            zone_buffer_pct: default_zone_buffer_pct(),
        }
    }
}
