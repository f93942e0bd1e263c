//! In-process store implementation.
//!
//! Backs the binary and the test suites. All state lives in two maps
//! behind parking_lot RwLocks; every operation is a short critical
//! section, so holding the lock across an await never happens.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;
use vigil_core::{Position, PositionStatus, Signal, SignalId, SignalStatus, Usd};

use crate::error::{Result, StoreError};
use crate::store::Store;

/// In-memory `Store`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    signals: RwLock<HashMap<SignalId, Signal>>,
    positions: RwLock<HashMap<Uuid, Position>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_signal(&self, signal: Signal) -> Result<()> {
        self.signals.write().insert(signal.id, signal);
        Ok(())
    }

    async fn signal(&self, id: SignalId) -> Result<Option<Signal>> {
        Ok(self.signals.read().get(&id).cloned())
    }

    async fn set_signal_status(&self, id: SignalId, status: SignalStatus) -> Result<()> {
        let mut signals = self.signals.write();
        let signal = signals.get_mut(&id).ok_or(StoreError::SignalNotFound(id))?;
        if signal.status.is_terminal() && signal.status != status {
            return Err(StoreError::TerminalStatus(id));
        }
        signal.status = status;
        Ok(())
    }

    async fn signals_since(&self, symbol: &str, since: DateTime<Utc>) -> Result<Vec<Signal>> {
        Ok(self
            .signals
            .read()
            .values()
            .filter(|s| s.symbol == symbol && s.created_at >= since)
            .cloned()
            .collect())
    }

    async fn insert_position(&self, position: Position) -> Result<()> {
        let mut positions = self.positions.write();
        if position.is_open()
            && positions
                .values()
                .any(|p| p.is_open() && p.symbol == position.symbol)
        {
            return Err(StoreError::DuplicateOpenPosition(position.symbol));
        }
        positions.insert(position.id, position);
        Ok(())
    }

    async fn update_position(&self, position: Position) -> Result<()> {
        let mut positions = self.positions.write();
        if !positions.contains_key(&position.id) {
            return Err(StoreError::PositionNotFound(position.id));
        }
        positions.insert(position.id, position);
        Ok(())
    }

    async fn position(&self, id: Uuid) -> Result<Option<Position>> {
        Ok(self.positions.read().get(&id).cloned())
    }

    async fn open_position(&self, symbol: &str) -> Result<Option<Position>> {
        Ok(self
            .positions
            .read()
            .values()
            .find(|p| p.is_open() && p.symbol == symbol)
            .cloned())
    }

    async fn open_positions(&self) -> Result<Vec<Position>> {
        Ok(self
            .positions
            .read()
            .values()
            .filter(|p| p.is_open())
            .cloned()
            .collect())
    }

    async fn realized_pnl_since(&self, since: DateTime<Utc>) -> Result<Usd> {
        let total = self
            .positions
            .read()
            .values()
            .filter(|p| {
                p.status == PositionStatus::Closed
                    && p.closed_at.map(|t| t >= since).unwrap_or(false)
            })
            .filter_map(|p| p.realized_pnl)
            .fold(Usd::ZERO, |acc, pnl| acc + pnl);
        Ok(total)
    }
}
