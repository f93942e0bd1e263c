//! Structured logging and daily statistics.

pub mod daily_stats;
pub mod error;
pub mod logging;

pub use daily_stats::{DailySummary, DailyStatsReporter};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
