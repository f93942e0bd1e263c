//! Risk gate: admission control and position sizing.
//!
//! Stateless per call, apart from the explicit state it owns: the daily
//! symbol blacklist, the balance cache, and the day-start capital anchor.
//! All checks are evaluated in a fixed order and the first violation
//! short-circuits the rest.

pub mod balance;
pub mod blacklist;
pub mod config;
pub mod error;
pub mod gate;
pub mod sector;
pub mod sizing;

pub use balance::BalanceCache;
pub use blacklist::DailyBlacklist;
pub use config::RiskConfig;
pub use error::{Result, RiskError};
pub use gate::{AdmissionDecision, RejectReason, RiskGate, SlotLedger};
pub use sector::SectorMap;
pub use sizing::PositionSizing;
