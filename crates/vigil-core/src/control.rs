//! Operator trading control state.
//!
//! A four-state flag gating whether the signal queue accepts new
//! submissions. Exposed for operator start/stop commands; the command
//! transport itself lives outside the core.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Trading control state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ControlState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "STOPPED"),
            Self::Starting => write!(f, "STARTING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Stopping => write!(f, "STOPPING"),
        }
    }
}

/// Cloneable handle over the control state.
///
/// Backed by a watch channel so components can either snapshot the current
/// state or await transitions.
#[derive(Debug, Clone)]
pub struct TradingControl {
    tx: Arc<watch::Sender<ControlState>>,
}

impl TradingControl {
    /// Create a new control handle in the `Stopped` state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ControlState::Stopped);
        Self { tx: Arc::new(tx) }
    }

    /// Current state snapshot.
    pub fn state(&self) -> ControlState {
        *self.tx.borrow()
    }

    /// Whether the queue may accept new submissions.
    pub fn is_running(&self) -> bool {
        self.state() == ControlState::Running
    }

    /// Transition to a new state.
    pub fn set(&self, state: ControlState) {
        // send_replace never fails; the sender keeps the channel alive.
        self.tx.send_replace(state);
    }

    /// Subscribe to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ControlState> {
        self.tx.subscribe()
    }
}

impl Default for TradingControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_stopped() {
        let control = TradingControl::new();
        assert_eq!(control.state(), ControlState::Stopped);
        assert!(!control.is_running());
    }

    #[test]
    fn test_transitions() {
        let control = TradingControl::new();
        control.set(ControlState::Starting);
        control.set(ControlState::Running);
        assert!(control.is_running());
        control.set(ControlState::Stopping);
        assert!(!control.is_running());
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let control = TradingControl::new();
        let mut rx = control.subscribe();
        control.set(ControlState::Running);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), ControlState::Running);
    }
}
