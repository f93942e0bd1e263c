//! Lifecycle event broadcast.
//!
//! The core emits events for an external push layer to relay to clients.
//! Delivery is best-effort and lossy; correctness never depends on a
//! subscriber being present.

use crate::decimal::Usd;
use crate::position::CloseReason;
use crate::signal::{Side, SignalId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default broadcast channel capacity.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle events emitted by the execution core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BotEvent {
    SignalQueued {
        signal_id: SignalId,
        symbol: String,
        side: Side,
    },
    SignalSkipped {
        signal_id: SignalId,
        symbol: String,
        reason: String,
    },
    OrderPlaced {
        signal_id: SignalId,
        symbol: String,
        order_id: String,
    },
    OrderFilled {
        signal_id: SignalId,
        symbol: String,
    },
    OrderCanceled {
        signal_id: SignalId,
        symbol: String,
        reason: String,
    },
    OrderFailed {
        signal_id: SignalId,
        symbol: String,
        reason: String,
    },
    PositionOpened {
        symbol: String,
        side: Side,
    },
    PositionClosed {
        symbol: String,
        reason: CloseReason,
        pnl: Usd,
    },
}

/// Cloneable best-effort event bus.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BotEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event. A send error only means no subscriber is
    /// listening, which is fine for best-effort delivery.
    pub fn publish(&self, event: BotEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BotEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscriber_is_ok() {
        let bus = EventBus::new();
        bus.publish(BotEvent::PositionOpened {
            symbol: "BTCUSDT".to_string(),
            side: Side::Long,
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let event = BotEvent::SignalQueued {
            signal_id: SignalId::new(),
            symbol: "BTCUSDT".to_string(),
            side: Side::Short,
        };
        bus.publish(event.clone());
        assert_eq!(rx.recv().await.unwrap(), event);
    }
}
