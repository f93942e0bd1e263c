//! View over the order monitor's pending map.
//!
//! The reconciler only needs to know which symbols and order ids are
//! legitimately tracked; the trait keeps it decoupled from the monitor
//! crate (the binary wires the two together).

use vigil_core::PendingLimitOrder;

/// Read-only snapshot of tracked resting orders.
pub trait PendingView: Send + Sync {
    fn pending_orders(&self) -> Vec<PendingLimitOrder>;

    fn has_pending(&self, symbol: &str) -> bool {
        self.pending_orders().iter().any(|o| o.symbol == symbol)
    }
}

/// Empty view for deployments without an order monitor (and for tests).
pub struct NoPending;

impl PendingView for NoPending {
    fn pending_orders(&self) -> Vec<PendingLimitOrder> {
        Vec::new()
    }
}
