//! Signal processing pipeline.
//!
//! Glue between the queue worker and the rest of the core: each dequeued
//! signal passes the risk gate, gets sized, and goes to the executor.
//! Resting orders are handed to the monitor. Failures here are terminal for
//! the signal only; the worker loop never sees an error.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};
use vigil_core::{BotEvent, EventBus, Signal, SignalStatus};
use vigil_executor::{ExecutionOutcome, OrderExecutor};
use vigil_monitor::OrderMonitor;
use vigil_queue::SignalProcessor;
use vigil_risk::{AdmissionDecision, RiskGate, SlotLedger};
use vigil_store::Store;

/// Risk gate + executor pipeline behind the queue worker.
pub struct ExecutionPipeline {
    gate: Arc<RiskGate>,
    executor: Arc<OrderExecutor>,
    monitor: Arc<OrderMonitor>,
    store: Arc<dyn Store>,
    events: EventBus,
}

impl ExecutionPipeline {
    pub fn new(
        gate: Arc<RiskGate>,
        executor: Arc<OrderExecutor>,
        monitor: Arc<OrderMonitor>,
        store: Arc<dyn Store>,
        events: EventBus,
    ) -> Self {
        Self {
            gate,
            executor,
            monitor,
            store,
            events,
        }
    }

    /// Slots in use right now: open positions plus resting entry orders.
    async fn slot_ledger(&self) -> Result<SlotLedger, vigil_store::StoreError> {
        let mut entries: Vec<_> = self
            .store
            .open_positions()
            .await?
            .into_iter()
            .map(|p| (p.symbol, p.side))
            .collect();
        entries.extend(
            self.monitor
                .pending_orders()
                .into_iter()
                .map(|o| (o.symbol, o.side)),
        );
        Ok(SlotLedger::new(entries))
    }

    async fn skip(&self, signal: &Signal, reason: String) {
        info!(symbol = %signal.symbol, %reason, "signal skipped");
        if let Err(err) = self
            .store
            .set_signal_status(signal.id, SignalStatus::Skipped)
            .await
        {
            error!(%err, "failed to mark signal SKIPPED");
        }
        self.events.publish(BotEvent::SignalSkipped {
            signal_id: signal.id,
            symbol: signal.symbol.clone(),
            reason,
        });
    }

    async fn fail(&self, signal: &Signal, reason: String) {
        error!(symbol = %signal.symbol, %reason, "signal processing failed");
        if let Err(err) = self
            .store
            .set_signal_status(signal.id, SignalStatus::Failed)
            .await
        {
            error!(%err, "failed to mark signal FAILED");
        }
    }
}

#[async_trait]
impl SignalProcessor for ExecutionPipeline {
    async fn process(&self, signal: Signal) {
        let ledger = match self.slot_ledger().await {
            Ok(ledger) => ledger,
            Err(err) => {
                self.fail(&signal, format!("slot ledger unavailable: {err}"))
                    .await;
                return;
            }
        };

        match self.gate.check_admission(&signal, &ledger).await {
            Ok(AdmissionDecision::Allow) => {}
            Ok(AdmissionDecision::Reject(reason)) => {
                self.skip(&signal, reason.to_string()).await;
                return;
            }
            Err(err) => {
                self.fail(&signal, format!("admission check failed: {err}"))
                    .await;
                return;
            }
        }

        let sizing = match self.gate.size_position(&signal).await {
            Ok(Some(sizing)) => sizing,
            Ok(None) => {
                self.skip(&signal, "sizing rejected".to_string()).await;
                return;
            }
            Err(err) => {
                self.fail(&signal, format!("sizing failed: {err}")).await;
                return;
            }
        };

        match self.executor.execute(signal.clone(), sizing).await {
            Ok(ExecutionOutcome::AwaitingFill { order, guard }) => {
                // Register before releasing the in-flight claim so no
                // reconciliation pass sees the resting order untracked.
                self.monitor.register(order);
                drop(guard);
            }
            Ok(ExecutionOutcome::Protected(position)) => {
                info!(symbol = %position.symbol, side = %position.side, "position opened and protected");
            }
            Ok(ExecutionOutcome::EmergencyClosed) => {
                warn!(symbol = %signal.symbol, "position emergency-closed after protection failure");
            }
            Ok(ExecutionOutcome::Critical) => {
                error!(symbol = %signal.symbol, "CRITICAL: unprotected position may remain on the venue");
            }
            Ok(ExecutionOutcome::Skipped { .. } | ExecutionOutcome::Failed { .. }) => {
                // The executor already persisted the terminal status and
                // published the event.
            }
            Err(err) => {
                self.fail(&signal, format!("execution failed: {err}")).await;
            }
        }
    }
}
