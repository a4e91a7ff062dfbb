//! Downstream gate
//!
//! Every job reads the mode once, at start, and runs in the scope that
//! reading grants. A mode change mid-run does not affect the run.

use crate::config::MarketConfig;
use crate::error::Result;
use crate::mode::{ModeRecord, ModeStore, SystemMode};
use crate::types::L4Episode;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Why a run is reduced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReducedReason {
    Warning,
    Observation,
}

/// Scope granted to one job run
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// Core watchlist, explorer pool and universe
    Full,
    /// Core watchlist only; outputs carry reduced confidence
    Reduced { reason: ReducedReason },
    /// Nothing runs. `notify` carries the episode if this run owns the
    /// one-time halt notification.
    Halt { until: Option<DateTime<Utc>>, notify: Option<L4Episode> },
}

impl GateDecision {
    pub fn is_halt(&self) -> bool {
        matches!(self, GateDecision::Halt { .. })
    }

    pub fn reduced_confidence(&self) -> bool {
        matches!(self, GateDecision::Reduced { .. })
    }

    /// Symbols a forecast run may scan, deduplicated in order
    pub fn symbols(&self, market: &MarketConfig, explorer_pool: &[String]) -> Vec<String> {
        let candidates: Vec<&String> = match self {
            GateDecision::Halt { .. } => return Vec::new(),
            GateDecision::Reduced { .. } => market.core_watchlist.iter().collect(),
            GateDecision::Full => market
                .core_watchlist
                .iter()
                .chain(explorer_pool.iter())
                .chain(market.universe.iter())
                .collect(),
        };
        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .filter(|s| seen.insert(*s))
            .cloned()
            .collect()
    }
}

/// Map a mode record to a run scope, without side effects
pub fn evaluate(record: &ModeRecord, now: DateTime<Utc>) -> GateDecision {
    match record.mode {
        SystemMode::L4Active => GateDecision::Halt {
            until: record.pause_until,
            notify: None,
        },
        SystemMode::L3Warning => GateDecision::Reduced {
            reason: ReducedReason::Warning,
        },
        SystemMode::Normal if record.in_observation(now) => GateDecision::Reduced {
            reason: ReducedReason::Observation,
        },
        SystemMode::Normal => GateDecision::Full,
    }
}

/// Gate bound to the mode store
pub struct Gate<'a> {
    store: &'a ModeStore,
}

impl<'a> Gate<'a> {
    pub fn new(store: &'a ModeStore) -> Self {
        Self { store }
    }

    /// Read the mode once and decide the scope of this run
    pub async fn check(&self, job: &str, now: DateTime<Utc>) -> Result<GateDecision> {
        let record = self.store.current_mode(now).await?;
        let decision = match evaluate(&record, now) {
            GateDecision::Halt { until, .. } => {
                let notify = self.store.claim_halt_notification().await?;
                tracing::warn!(job, pause_until = ?until, "L4 active, job halted");
                GateDecision::Halt { until, notify }
            }
            other => other,
        };
        if let GateDecision::Reduced { reason } = &decision {
            tracing::info!(job, ?reason, mode = %record.mode, "Running in reduced mode");
        }
        Ok(decision)
    }
}
