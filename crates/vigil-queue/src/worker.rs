//! The single queue worker.
//!
//! Dequeues strictly FIFO, one signal at a time, and enforces a minimum
//! inter-processing delay while the queue is non-empty to respect exchange
//! rate limits.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use vigil_core::{Signal, SignalStatus};

use crate::queue::SignalQueue;

/// Downstream processing for an admitted signal (risk gate + executor,
/// wired by the application).
#[async_trait]
pub trait SignalProcessor: Send + Sync {
    async fn process(&self, signal: Signal);
}

impl SignalQueue {
    /// Spawn the worker task. Runs until the process shuts down.
    pub fn spawn_worker(
        self: Arc<Self>,
        processor: Arc<dyn SignalProcessor>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("signal queue worker started");
            loop {
                match self.pop() {
                    Some(signal) => {
                        self.handle(signal, processor.as_ref()).await;
                        // Rate-limit spacing between processed signals.
                        tokio::time::sleep(Duration::from_millis(
                            self.config().min_process_delay_ms,
                        ))
                        .await;
                    }
                    None => {
                        tokio::time::sleep(Duration::from_millis(self.config().idle_poll_ms))
                            .await;
                    }
                }
            }
        })
    }

    /// Validate and process one signal. A malformed signal is discarded
    /// without blocking the queue.
    pub(crate) async fn handle(&self, signal: Signal, processor: &dyn SignalProcessor) {
        if let Err(err) = signal.validate() {
            warn!(symbol = %signal.symbol, %err, "malformed signal discarded");
            if let Err(store_err) = self
                .store()
                .set_signal_status(signal.id, SignalStatus::Failed)
                .await
            {
                error!(%store_err, "failed to mark malformed signal FAILED");
            }
            return;
        }
        processor.process(signal).await;
    }
}
