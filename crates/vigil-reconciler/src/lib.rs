//! Reconciliation loop.
//!
//! Periodically re-derives ground truth from the exchange and corrects the
//! local ledger: unmanaged positions, oversized margin, break-even
//! relocation after a first take-profit fill, missing protective orders,
//! stale positions, out-of-band closes, and orphaned orders. Every action
//! is idempotent; re-running a pass against unchanged exchange state
//! produces no further orders or mutations.

pub mod classify;
pub mod config;
pub mod error;
pub mod pending;
pub mod reconciler;

pub use classify::classify_close;
pub use config::ReconcilerConfig;
pub use error::{ReconcilerError, Result};
pub use pending::PendingView;
pub use reconciler::Reconciler;
