//! Admission control.
//!
//! Checks run in a fixed order and the first violation short-circuits:
//! 1. daily loss limit
//! 2. global slot limit
//! 3. per-direction slot limit
//! 4. daily symbol blacklist
//! 5. sector / correlated-sector exposure
//!
//! All percentage thresholds are inclusive-of-equal: reaching the limit
//! exactly rejects.

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use vigil_core::{Side, Signal, Usd};
use vigil_store::Store;

use crate::balance::BalanceCache;
use crate::blacklist::DailyBlacklist;
use crate::config::RiskConfig;
use crate::error::Result;
use crate::sector::SectorMap;

// ============================================================================
// SlotLedger
// ============================================================================

/// Derived slot usage: every OPEN position and pending limit order, with
/// its side. Built by the caller from the store and the order monitor.
#[derive(Debug, Clone, Default)]
pub struct SlotLedger {
    /// (symbol, side) of each open position and pending order.
    pub entries: Vec<(String, Side)>,
}

impl SlotLedger {
    pub fn new(entries: Vec<(String, Side)>) -> Self {
        Self { entries }
    }

    /// Total slots in use (open + pending).
    pub fn total(&self) -> usize {
        self.entries.len()
    }

    /// Slots in use for one direction.
    pub fn for_side(&self, side: Side) -> usize {
        self.entries.iter().filter(|(_, s)| *s == side).count()
    }

    /// Whether any slot is held by this symbol.
    pub fn holds_symbol(&self, symbol: &str) -> bool {
        self.entries.iter().any(|(s, _)| s == symbol)
    }
}

// ============================================================================
// Decision types
// ============================================================================

/// Reason an admission was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    DailyLossLimit { realized: Usd, threshold: Usd },
    MaxPositions { used: usize, max: usize },
    MaxPerSide { side: Side, used: usize, max: usize },
    Blacklisted { symbol: String, losses: u32 },
    SectorExposure { sector: String, used: usize, max: usize },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DailyLossLimit {
                realized,
                threshold,
            } => write!(f, "daily loss limit: realized {realized} <= {threshold}"),
            Self::MaxPositions { used, max } => {
                write!(f, "max positions: {used}/{max} slots in use")
            }
            Self::MaxPerSide { side, used, max } => {
                write!(f, "max {side} positions: {used}/{max} slots in use")
            }
            Self::Blacklisted { symbol, losses } => {
                write!(f, "{symbol} blacklisted for the day after {losses} losses")
            }
            Self::SectorExposure { sector, used, max } => {
                write!(f, "sector {sector} exposure: {used}/{max}")
            }
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionDecision {
    Allow,
    Reject(RejectReason),
}

impl AdmissionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

// ============================================================================
// RiskGate
// ============================================================================

/// The risk gate.
pub struct RiskGate {
    pub(crate) config: RiskConfig,
    store: Arc<dyn Store>,
    pub(crate) balance: Arc<BalanceCache>,
    blacklist: Arc<DailyBlacklist>,
    sectors: SectorMap,
    /// Capital captured at the first check of each trading day; the daily
    /// loss threshold is a fraction of this, not of the live balance.
    day_anchor: Mutex<Option<(NaiveDate, Usd)>>,
}

impl RiskGate {
    pub fn new(
        config: RiskConfig,
        store: Arc<dyn Store>,
        balance: Arc<BalanceCache>,
        blacklist: Arc<DailyBlacklist>,
        sectors: SectorMap,
    ) -> Self {
        Self {
            config,
            store,
            balance,
            blacklist,
            sectors,
            day_anchor: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Evaluate whether a signal may proceed to order placement.
    pub async fn check_admission(
        &self,
        signal: &Signal,
        slots: &SlotLedger,
    ) -> Result<AdmissionDecision> {
        // Check 1: daily loss limit.
        let day_start = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always valid")
            .and_utc();
        let realized = self.store.realized_pnl_since(day_start).await?;
        let capital = self.day_start_capital().await;
        let threshold = Usd::new(-(self.config.daily_loss_limit * capital.inner()));
        if realized <= threshold {
            info!(%realized, %threshold, "admission rejected: daily loss limit");
            return Ok(AdmissionDecision::Reject(RejectReason::DailyLossLimit {
                realized,
                threshold,
            }));
        }

        // Check 2: global slot limit.
        if slots.total() >= self.config.max_positions {
            debug!(used = slots.total(), max = self.config.max_positions, "admission rejected: slots");
            return Ok(AdmissionDecision::Reject(RejectReason::MaxPositions {
                used: slots.total(),
                max: self.config.max_positions,
            }));
        }

        // Check 3: per-direction slot limit.
        let side_used = slots.for_side(signal.side);
        if side_used >= self.config.max_per_side {
            return Ok(AdmissionDecision::Reject(RejectReason::MaxPerSide {
                side: signal.side,
                used: side_used,
                max: self.config.max_per_side,
            }));
        }

        // Check 4: daily symbol blacklist.
        if self.blacklist.is_blacklisted(&signal.symbol) {
            return Ok(AdmissionDecision::Reject(RejectReason::Blacklisted {
                symbol: signal.symbol.clone(),
                losses: self.blacklist.losses_today(&signal.symbol),
            }));
        }

        // Check 5: sector / correlated-sector exposure.
        if let Some(decision) = self.check_sector(signal, slots) {
            return Ok(decision);
        }

        Ok(AdmissionDecision::Allow)
    }

    fn check_sector(&self, signal: &Signal, slots: &SlotLedger) -> Option<AdmissionDecision> {
        let sector = self.sectors.sector_of(&signal.symbol)?;

        let in_sector = slots
            .entries
            .iter()
            .filter(|(symbol, _)| self.sectors.sector_of(symbol) == Some(sector))
            .count();
        if in_sector >= self.config.max_per_sector {
            return Some(AdmissionDecision::Reject(RejectReason::SectorExposure {
                sector: sector.to_string(),
                used: in_sector,
                max: self.config.max_per_sector,
            }));
        }

        // Correlated sectors share a combined cap, relaxed by a small
        // allowance over the single-sector cap.
        let correlated = self.sectors.correlated_with(sector);
        if correlated.len() > 1 {
            let group_max = self.config.max_per_sector + self.config.correlated_relaxation;
            let in_group = slots
                .entries
                .iter()
                .filter(|(symbol, _)| {
                    self.sectors
                        .sector_of(symbol)
                        .map(|s| correlated.contains(&s))
                        .unwrap_or(false)
                })
                .count();
            if in_group >= group_max {
                return Some(AdmissionDecision::Reject(RejectReason::SectorExposure {
                    sector: correlated.join("+"),
                    used: in_group,
                    max: group_max,
                }));
            }
        }

        None
    }

    /// Capital anchored at the start of the trading day.
    pub(crate) async fn day_start_capital(&self) -> Usd {
        let today = Utc::now().date_naive();
        if let Some((date, capital)) = *self.day_anchor.lock() {
            if date == today {
                return capital;
            }
        }
        let capital = self.balance.get().await.total;
        *self.day_anchor.lock() = Some((today, capital));
        capital
    }

    /// Shared blacklist handle (also fed by the reconciliation loop).
    pub fn blacklist(&self) -> &Arc<DailyBlacklist> {
        &self.blacklist
    }
}
