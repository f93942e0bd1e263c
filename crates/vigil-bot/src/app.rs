//! Application wiring and lifecycle.
//!
//! Builds every component against the shared store, event bus, and
//! in-flight set, spawns the long-running tasks, and runs until SIGINT.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};
use vigil_core::{ControlState, EventBus, InFlightSet, PendingLimitOrder, TradingControl, Usd};
use vigil_exchange::ExchangeClient;
use vigil_executor::OrderExecutor;
use vigil_monitor::OrderMonitor;
use vigil_queue::SignalQueue;
use vigil_reconciler::{PendingView, Reconciler};
use vigil_risk::{BalanceCache, DailyBlacklist, RiskGate, SectorMap};
use vigil_store::{MemoryStore, Store};
use vigil_telemetry::DailyStatsReporter;

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::paper::PaperExchange;
use crate::pipeline::ExecutionPipeline;

/// Adapter exposing the monitor's resting orders to the reconciler.
struct MonitorPending(Arc<OrderMonitor>);

impl PendingView for MonitorPending {
    fn pending_orders(&self) -> Vec<PendingLimitOrder> {
        self.0.pending_orders()
    }

    fn has_pending(&self, symbol: &str) -> bool {
        self.0.has_pending(symbol)
    }
}

/// The assembled application.
pub struct Application {
    control: TradingControl,
    queue: Arc<SignalQueue>,
    pipeline: Arc<ExecutionPipeline>,
    monitor: Arc<OrderMonitor>,
    reconciler: Arc<Reconciler>,
    stats: Arc<DailyStatsReporter>,
    stats_interval_secs: u64,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let exchange: Arc<dyn ExchangeClient> =
            Arc::new(PaperExchange::new(config.paper.starting_balance));
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let events = EventBus::new();
        let in_flight = InFlightSet::new();
        let control = TradingControl::new();

        let balance = Arc::new(BalanceCache::new(
            exchange.clone(),
            Duration::from_secs(config.risk.balance_ttl_secs),
            Usd::new(config.risk.fallback_balance),
        ));
        let blacklist = Arc::new(DailyBlacklist::new(config.risk.blacklist_loss_limit));
        let gate = Arc::new(RiskGate::new(
            config.risk,
            store.clone(),
            balance.clone(),
            blacklist.clone(),
            SectorMap::default(),
        ));

        let executor = Arc::new(OrderExecutor::new(
            config.executor,
            exchange.clone(),
            store.clone(),
            events.clone(),
            in_flight.clone(),
        ));
        let monitor = Arc::new(OrderMonitor::new(
            config.monitor,
            exchange.clone(),
            store.clone(),
            executor.clone(),
            events.clone(),
        ));
        let reconciler = Arc::new(Reconciler::new(
            config.reconciler,
            exchange,
            store.clone(),
            balance,
            blacklist,
            Arc::new(MonitorPending(monitor.clone())),
            in_flight,
            events.clone(),
        ));

        let queue = Arc::new(SignalQueue::new(
            config.queue,
            control.clone(),
            store.clone(),
            events.clone(),
        ));
        let pipeline = Arc::new(ExecutionPipeline::new(
            gate,
            executor,
            monitor.clone(),
            store.clone(),
            events,
        ));
        let stats = Arc::new(DailyStatsReporter::new(store));

        Ok(Self {
            control,
            queue,
            pipeline,
            monitor,
            reconciler,
            stats,
            stats_interval_secs: config.stats_interval_secs,
        })
    }

    /// Queue handle for signal producers.
    pub fn queue(&self) -> Arc<SignalQueue> {
        self.queue.clone()
    }

    /// Operator control handle.
    pub fn control(&self) -> TradingControl {
        self.control.clone()
    }

    /// Run until SIGINT.
    pub async fn run(&self) -> AppResult<()> {
        self.control.set(ControlState::Starting);

        let handles: Vec<JoinHandle<()>> = vec![
            self.queue.clone().spawn_worker(self.pipeline.clone()),
            self.monitor.clone().spawn(self.control.clone()),
            self.reconciler.clone().spawn(self.control.clone()),
            self.stats.clone().spawn(self.stats_interval_secs),
        ];

        self.control.set(ControlState::Running);
        info!("vigil running, press Ctrl-C to stop");

        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(%err, "failed to listen for shutdown signal");
        }

        info!("shutting down");
        self.control.set(ControlState::Stopping);
        for handle in handles {
            handle.abort();
        }
        self.control.set(ControlState::Stopped);
        Ok(())
    }
}
