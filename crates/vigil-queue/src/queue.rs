//! The bounded FIFO admission buffer.

use chrono::{Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vigil_core::{BotEvent, EventBus, Side, Signal, SignalStatus, TradingControl};
use vigil_store::Store;

use crate::error::Result;

/// Queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum queued signals before drop-oldest kicks in.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Same-symbol, same-side deduplication window in seconds.
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,
    /// Minimum delay between processed signals in milliseconds.
    #[serde(default = "default_min_process_delay_ms")]
    pub min_process_delay_ms: u64,
    /// Idle poll interval when the queue is empty, in milliseconds.
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
}

fn default_capacity() -> usize {
    100
}

fn default_dedup_window_secs() -> u64 {
    900 // 15 minutes
}

fn default_min_process_delay_ms() -> u64 {
    2_000
}

fn default_idle_poll_ms() -> u64 {
    500
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            dedup_window_secs: default_dedup_window_secs(),
            min_process_delay_ms: default_min_process_delay_ms(),
            idle_poll_ms: default_idle_poll_ms(),
        }
    }
}

/// Outcome of a `submit` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Enqueued for processing.
    Queued,
    /// Dropped: trading is not in a RUNNING control state.
    NotRunning,
    /// Dropped: a same-symbol, same-side signal was queued or filled
    /// inside the dedup window.
    Duplicate,
}

/// The signal admission queue.
pub struct SignalQueue {
    config: QueueConfig,
    buffer: Mutex<VecDeque<Signal>>,
    control: TradingControl,
    store: Arc<dyn Store>,
    events: EventBus,
}

impl SignalQueue {
    pub fn new(
        config: QueueConfig,
        control: TradingControl,
        store: Arc<dyn Store>,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            buffer: Mutex::new(VecDeque::new()),
            control,
            store,
            events,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Submit a signal for processing.
    ///
    /// Rejected signals are persisted with a SKIPPED terminal status so
    /// the dedup window and operators can see them.
    pub async fn submit(&self, mut signal: Signal) -> Result<SubmitOutcome> {
        if !self.control.is_running() {
            debug!(symbol = %signal.symbol, state = %self.control.state(), "signal dropped: trading not running");
            signal.status = SignalStatus::Skipped;
            self.store.insert_signal(signal.clone()).await?;
            self.events.publish(BotEvent::SignalSkipped {
                signal_id: signal.id,
                symbol: signal.symbol,
                reason: "trading not running".to_string(),
            });
            return Ok(SubmitOutcome::NotRunning);
        }

        if self.is_duplicate(&signal.symbol, signal.side).await? {
            info!(symbol = %signal.symbol, side = %signal.side, "signal dropped: duplicate inside dedup window");
            signal.status = SignalStatus::Skipped;
            self.store.insert_signal(signal.clone()).await?;
            self.events.publish(BotEvent::SignalSkipped {
                signal_id: signal.id,
                symbol: signal.symbol,
                reason: "duplicate".to_string(),
            });
            return Ok(SubmitOutcome::Duplicate);
        }

        self.store.insert_signal(signal.clone()).await?;

        let evicted = {
            let mut buffer = self.buffer.lock();
            let evicted = if buffer.len() >= self.config.capacity {
                buffer.pop_front()
            } else {
                None
            };
            buffer.push_back(signal.clone());
            evicted
        };

        // Drop-oldest backpressure: the evicted signal becomes SKIPPED.
        if let Some(old) = evicted {
            warn!(symbol = %old.symbol, "queue full, evicting oldest signal");
            self.store
                .set_signal_status(old.id, SignalStatus::Skipped)
                .await?;
            self.events.publish(BotEvent::SignalSkipped {
                signal_id: old.id,
                symbol: old.symbol,
                reason: "queue overflow".to_string(),
            });
        }

        self.events.publish(BotEvent::SignalQueued {
            signal_id: signal.id,
            symbol: signal.symbol,
            side: signal.side,
        });
        Ok(SubmitOutcome::Queued)
    }

    /// Pop the next signal in FIFO order.
    pub fn pop(&self) -> Option<Signal> {
        self.buffer.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    /// Queued or recently-filled duplicate check.
    async fn is_duplicate(&self, symbol: &str, side: Side) -> Result<bool> {
        if self
            .buffer
            .lock()
            .iter()
            .any(|s| s.duplicates(symbol, side))
        {
            return Ok(true);
        }

        let window = Duration::seconds(self.config.dedup_window_secs as i64);
        let since = Utc::now() - window;
        let recent = self.store.signals_since(symbol, since).await?;
        Ok(recent.iter().any(|s| {
            s.side == side
                && matches!(s.status, SignalStatus::Pending | SignalStatus::Filled)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use vigil_core::{ControlState, Price, SignalId, Timeframe};
    use vigil_store::MemoryStore;

    fn signal(symbol: &str, side: Side) -> Signal {
        let (stop, tp) = match side {
            Side::Long => (dec!(98), dec!(103)),
            Side::Short => (dec!(102), dec!(97)),
        };
        Signal {
            id: SignalId::new(),
            symbol: symbol.to_string(),
            side,
            entry: Price::new(dec!(100)),
            zone_low: Price::new(dec!(99)),
            zone_high: Price::new(dec!(101)),
            stop_loss: Price::new(stop),
            take_profit_1: Price::new(tp),
            take_profit_2: None,
            leverage: 5,
            confidence: dec!(0.7),
            strategy: "trend".to_string(),
            tp_split: dec!(0.7),
            timeframe: Timeframe::M15,
            status: SignalStatus::Pending,
            created_at: Utc::now(),
        }
    }

    fn running_queue(config: QueueConfig) -> SignalQueue {
        let control = TradingControl::new();
        control.set(ControlState::Running);
        SignalQueue::new(
            config,
            control,
            Arc::new(MemoryStore::new()),
            EventBus::new(),
        )
    }

    #[tokio::test]
    async fn test_rejects_when_not_running() {
        let queue = SignalQueue::new(
            QueueConfig::default(),
            TradingControl::new(),
            Arc::new(MemoryStore::new()),
            EventBus::new(),
        );
        let outcome = queue.submit(signal("BTCUSDT", Side::Long)).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::NotRunning);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_dedup_same_symbol_same_side() {
        let queue = running_queue(QueueConfig::default());
        assert_eq!(
            queue.submit(signal("BTCUSDT", Side::Long)).await.unwrap(),
            SubmitOutcome::Queued
        );
        assert_eq!(
            queue.submit(signal("BTCUSDT", Side::Long)).await.unwrap(),
            SubmitOutcome::Duplicate
        );
        // The other direction is not a duplicate.
        assert_eq!(
            queue.submit(signal("BTCUSDT", Side::Short)).await.unwrap(),
            SubmitOutcome::Queued
        );
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_drop_oldest_preserves_fifo() {
        let queue = running_queue(QueueConfig {
            capacity: 100,
            ..QueueConfig::default()
        });
        for i in 0..100 {
            let outcome = queue
                .submit(signal(&format!("SYM{i}USDT"), Side::Long))
                .await
                .unwrap();
            assert_eq!(outcome, SubmitOutcome::Queued);
        }
        assert_eq!(queue.len(), 100);

        // The 101st submission evicts the oldest.
        queue.submit(signal("SYM100USDT", Side::Long)).await.unwrap();
        assert_eq!(queue.len(), 100);

        // FIFO order of the survivors is preserved: head is now SYM1.
        let head = queue.pop().unwrap();
        assert_eq!(head.symbol, "SYM1USDT");
        // And the tail is the newly admitted signal.
        let mut last = None;
        while let Some(s) = queue.pop() {
            last = Some(s);
        }
        assert_eq!(last.unwrap().symbol, "SYM100USDT");
    }

    #[tokio::test]
    async fn test_filled_signal_inside_window_is_duplicate() {
        let queue = running_queue(QueueConfig::default());
        let mut filled = signal("ETHUSDT", Side::Short);
        filled.status = SignalStatus::Filled;
        queue.store.insert_signal(filled).await.unwrap();

        assert_eq!(
            queue.submit(signal("ETHUSDT", Side::Short)).await.unwrap(),
            SubmitOutcome::Duplicate
        );
    }

    #[tokio::test]
    async fn test_skipped_signal_does_not_block_resubmission() {
        let queue = running_queue(QueueConfig::default());
        let mut skipped = signal("ETHUSDT", Side::Short);
        skipped.status = SignalStatus::Skipped;
        queue.store.insert_signal(skipped).await.unwrap();

        assert_eq!(
            queue.submit(signal("ETHUSDT", Side::Short)).await.unwrap(),
            SubmitOutcome::Queued
        );
    }
}
