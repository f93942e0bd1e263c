//! Order execution state machine.
//!
//! Takes an admitted signal plus a sizing decision, places the limit entry
//! order, and either attaches protection synchronously (immediate fill) or
//! hands the order back as a `PendingLimitOrder` for the monitor. The
//! protective-order attachment logic here is shared: the order monitor
//! invokes it when a monitored order fills later.
//!
//! States are explicit: placement can only end in one of
//! `AwaitingFill`, `Protected`, `EmergencyClosed`, `Critical`, `Skipped`,
//! or `Failed` — "filled and canceled" is unrepresentable.

pub mod config;
pub mod error;
pub mod executor;
pub mod protect;

pub use config::ExecutorConfig;
pub use error::{ExecutorError, Result};
pub use executor::{ExecutionOutcome, OrderExecutor};
pub use protect::{ProtectOutcome, ProtectiveLevels};
