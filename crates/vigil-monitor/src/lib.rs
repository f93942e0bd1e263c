//! Pending limit-order monitor.
//!
//! Owns the map of resting entry orders. A fast poll detects fills,
//! expiries, and entry-zone exits; a slower sync drops entries the venue
//! no longer knows about. Fills are handed to the executor so protection
//! attachment is identical on both fill paths.

pub mod config;
pub mod error;
pub mod monitor;

pub use config::MonitorConfig;
pub use error::{MonitorError, Result};
pub use monitor::OrderMonitor;
