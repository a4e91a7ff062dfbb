//! Explorer pool refresh
//!
//! Ranks a market's explorer universe by recent traded volume. The pool
//! only feeds full-mode forecast runs and is only refreshed in full mode.

use super::JobContext;
use crate::client::HistoryRange;
use crate::error::Result;
use crate::gate::GateDecision;
use crate::storage::Database;
use crate::types::{Bar, Market};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bars averaged for the volume ranking
pub const VOLUME_WINDOW: usize = 20;

/// Stored under `explorer_pool:{market}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorerPool {
    pub market: Market,
    pub updated_at: DateTime<Utc>,
    pub symbols: Vec<String>,
}

pub fn pool_key(market: Market) -> String {
    format!("explorer_pool:{}", market)
}

/// Current pool for `market`; empty when missing or unreadable
pub async fn load_pool(db: &Database, market: Market) -> Result<Vec<String>> {
    match db.get_state::<ExplorerPool>(&pool_key(market)).await {
        Ok(pool) => Ok(pool.map(|p| p.symbols).unwrap_or_default()),
        Err(crate::error::SentinelError::InvalidState { key, reason }) => {
            tracing::warn!(key = %key, reason = %reason, "Ignoring malformed explorer pool");
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}

/// Mean volume over the last `window` bars
pub fn mean_volume(bars: &[Bar], window: usize) -> Option<f64> {
    if bars.is_empty() || window == 0 {
        return None;
    }
    let recent = &bars[bars.len().saturating_sub(window)..];
    let mean = recent.iter().map(|b| b.volume).sum::<f64>() / recent.len() as f64;
    mean.is_finite().then_some(mean)
}

/// Highest volume first, at most `size` symbols
pub fn rank_by_volume(mut volumes: Vec<(String, f64)>, size: usize) -> Vec<String> {
    volumes.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    volumes.into_iter().take(size).map(|(symbol, _)| symbol).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExplorerReport {
    pub market: Market,
    pub halted: bool,
    /// L3 or observation: candidate search skipped, previous pool kept
    pub suppressed: bool,
    pub candidates: usize,
    pub with_data: usize,
    /// Size of the stored pool after the run
    pub pool_size: usize,
    /// Too few symbols had data; the previous pool was kept
    pub kept_previous: bool,
}

pub async fn run(ctx: &JobContext, market: Market, now: DateTime<Utc>) -> Result<ExplorerReport> {
    let market_config = ctx.market_config(market)?;
    let mut report = ExplorerReport {
        market,
        halted: false,
        suppressed: false,
        candidates: market_config.explorer_universe.len(),
        with_data: 0,
        pool_size: 0,
        kept_previous: false,
    };

    let decision = ctx.gate().check("explorer", now).await?;
    if let GateDecision::Halt { .. } = decision {
        super::announce_halt(ctx, "explorer", &decision).await;
        report.halted = true;
        return Ok(report);
    }
    if let GateDecision::Reduced { reason } = decision {
        report.suppressed = true;
        report.kept_previous = true;
        report.pool_size = load_pool(&ctx.db, market).await?.len();
        tracing::info!(%market, ?reason, pool_size = report.pool_size, "Candidate search suppressed, keeping previous explorer pool");
        return Ok(report);
    }

    let mut volumes = Vec::new();
    for symbol in &market_config.explorer_universe {
        match ctx.market_data.history(symbol, HistoryRange::ThreeMonths).await {
            Ok(bars) => {
                if let Some(volume) = mean_volume(&bars, VOLUME_WINDOW) {
                    volumes.push((symbol.clone(), volume));
                }
            }
            Err(e) => {
                tracing::debug!(symbol = %symbol, error = %e, "Explorer fetch failed");
            }
        }
    }
    report.with_data = volumes.len();

    if volumes.len() < market_config.explorer_min_symbols {
        report.kept_previous = true;
        report.pool_size = load_pool(&ctx.db, market).await?.len();
        tracing::warn!(
            %market,
            with_data = volumes.len(),
            required = market_config.explorer_min_symbols,
            "Too little market data, keeping previous explorer pool"
        );
        return Ok(report);
    }

    let pool = ExplorerPool {
        market,
        updated_at: now,
        symbols: rank_by_volume(volumes, market_config.explorer_pool_size),
    };
    ctx.db.put_state(&pool_key(market), &pool, now).await?;
    report.pool_size = pool.symbols.len();
    tracing::info!(%market, pool_size = report.pool_size, "Explorer pool updated");
    Ok(report)
}
