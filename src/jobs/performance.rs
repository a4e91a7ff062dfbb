//! Performance review
//!
//! Per market: snapshot the latest settled predictions, watch the hit-rate
//! trend, tune the forecast horizon and post a dashboard.

use super::{fmt_pct, JobContext};
use crate::config::PerformanceConfig;
use crate::error::{Result, SentinelError};
use crate::mode::{ModeEvent, SystemMode};
use crate::storage::Database;
use crate::types::{Market, PerformanceSnapshot, PredictionRecord};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Forecast horizon in force for one market, under `horizon_policy:{market}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonPolicy {
    pub horizon_days: u32,
    pub last_change: Option<NaiveDate>,
    /// Hit rate the last decision saw
    pub hit_rate: Option<f64>,
}

impl HorizonPolicy {
    pub fn initial(config: &PerformanceConfig) -> Self {
        Self {
            horizon_days: config.default_horizon_days,
            last_change: None,
            hit_rate: None,
        }
    }
}

pub fn horizon_key(market: Market) -> String {
    format!("horizon_policy:{}", market)
}

/// Horizon last announced by the change notifier
pub fn announced_key(market: Market) -> String {
    format!("horizon_policy_last:{}", market)
}

pub async fn load_policy(db: &Database, market: Market, config: &PerformanceConfig) -> Result<HorizonPolicy> {
    match db.get_state::<HorizonPolicy>(&horizon_key(market)).await {
        Ok(Some(policy)) => Ok(policy),
        Ok(None) => Ok(HorizonPolicy::initial(config)),
        Err(SentinelError::InvalidState { key, reason }) => {
            tracing::warn!(key = %key, reason = %reason, "Malformed horizon policy, using default");
            Ok(HorizonPolicy::initial(config))
        }
        Err(e) => Err(e),
    }
}

/// Horizon the forecast job should train on, never below the floor
pub async fn current_horizon(db: &Database, market: Market, config: &PerformanceConfig) -> Result<u32> {
    let policy = load_policy(db, market, config).await?;
    Ok(policy.horizon_days.max(config.min_horizon_days))
}

/// Snapshot over settled predictions, oldest first
pub fn compute_snapshot(
    market: Market,
    recorded_at: DateTime<Utc>,
    horizon_days: u32,
    settled: &[PredictionRecord],
) -> Option<PerformanceSnapshot> {
    let returns: Vec<f64> = settled.iter().filter_map(|p| p.realized_return).collect();
    if returns.is_empty() {
        return None;
    }
    let hits = settled.iter().filter(|p| p.hit == Some(true)).count();
    let n = returns.len() as f64;

    let mut equity = 1.0;
    let mut peak = 1.0_f64;
    let mut max_drawdown = 0.0_f64;
    for r in &returns {
        equity *= 1.0 + r;
        peak = peak.max(equity);
        max_drawdown = max_drawdown.min(equity / peak - 1.0);
    }

    Some(PerformanceSnapshot {
        market,
        recorded_at,
        horizon_days,
        hit_rate: hits as f64 / n,
        avg_return: returns.iter().sum::<f64>() / n,
        cum_return: equity - 1.0,
        max_drawdown,
        sample_count: returns.len(),
    })
}

/// Every value strictly below the one before it
pub fn is_deteriorating(hit_rates: &[f64]) -> bool {
    hit_rates.len() >= 2 && hit_rates.windows(2).all(|w| w[1] < w[0])
}

/// New horizon for `hit_rate`, if the guard changes it today
pub fn next_horizon(policy: &HorizonPolicy, hit_rate: f64, today: NaiveDate, config: &PerformanceConfig) -> Option<u32> {
    if let Some(last) = policy.last_change {
        if (today - last).num_days() < config.horizon_cooldown_days {
            return None;
        }
    }
    let step = if hit_rate < config.critical_hit_rate {
        2
    } else if hit_rate < config.warn_hit_rate {
        1
    } else {
        return None;
    };
    let next = policy.horizon_days.saturating_sub(step).max(config.min_horizon_days);
    (next != policy.horizon_days).then_some(next)
}

/// A horizon change that has not been announced yet
#[derive(Debug, Clone, PartialEq)]
pub struct HorizonChange {
    pub market: Market,
    pub from: Option<u32>,
    pub to: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerformanceReport {
    pub snapshots: Vec<PerformanceSnapshot>,
    /// Markets whose hit rate fell on every recent snapshot
    pub deteriorating: Vec<Market>,
    /// The degradation moved the mode to L3
    pub escalated: bool,
    pub horizon_changes: Vec<HorizonChange>,
}

pub async fn run(ctx: &JobContext, now: DateTime<Utc>) -> Result<PerformanceReport> {
    let config = &ctx.config.performance;
    let today = ctx.local_date(now);
    let mut report = PerformanceReport::default();

    for market_config in &ctx.config.markets {
        let market = market_config.market;
        let mut policy = load_policy(&ctx.db, market, config).await?;

        let mut settled = ctx.db.recent_settled(market, config.snapshot_window).await?;
        settled.reverse();
        let Some(snapshot) = compute_snapshot(market, now, policy.horizon_days, &settled) else {
            tracing::info!(%market, "No settled predictions yet");
            continue;
        };
        ctx.db.insert_snapshot(&snapshot).await?;

        let mut recent = ctx.db.recent_snapshots(market, config.deteriorating_runs).await?;
        recent.reverse();
        let rates: Vec<f64> = recent.iter().map(|s| s.hit_rate).collect();
        if rates.len() >= config.deteriorating_runs && is_deteriorating(&rates) {
            tracing::warn!(%market, ?rates, "Hit rate deteriorating");
            report.deteriorating.push(market);
            let transition = ctx
                .store
                .try_transition(ModeEvent::PerformanceDegraded { at: now, market })
                .await?;
            report.escalated |= transition.changed() && transition.after.mode == SystemMode::L3Warning;
        }

        if let Some(next) = next_horizon(&policy, snapshot.hit_rate, today, config) {
            tracing::warn!(%market, from = policy.horizon_days, to = next, hit_rate = snapshot.hit_rate, "Shortening forecast horizon");
            policy.horizon_days = next;
            policy.last_change = Some(today);
        }
        policy.hit_rate = Some(snapshot.hit_rate);
        ctx.db.put_state(&horizon_key(market), &policy, now).await?;

        let announced = match ctx.db.get_state::<u32>(&announced_key(market)).await {
            Ok(value) => value,
            Err(SentinelError::InvalidState { .. }) => None,
            Err(e) => return Err(e),
        };
        if announced != Some(policy.horizon_days) {
            report.horizon_changes.push(HorizonChange {
                market,
                from: announced,
                to: policy.horizon_days,
            });
            ctx.db.put_state(&announced_key(market), &policy.horizon_days, now).await?;
        }

        report.snapshots.push(snapshot);
    }

    if !report.horizon_changes.is_empty() {
        ctx.notifiers
            .report
            .deliver_text(&horizon_message(&report.horizon_changes))
            .await;
    }
    if !report.snapshots.is_empty() {
        let mode = ctx.store.current_mode(now).await?.mode;
        ctx.notifiers
            .report
            .deliver_text(&dashboard_message(&report.snapshots, mode, today))
            .await;
    }
    Ok(report)
}

pub fn horizon_message(changes: &[HorizonChange]) -> String {
    let mut msg = String::from("🚨 **Forecast horizon adjusted**\n\n");
    for change in changes {
        let from = change
            .from
            .map(|d| d.to_string())
            .unwrap_or_else(|| "none".to_string());
        let _ = writeln!(msg, "- {}: {} → **{} days**", change.market, from, change.to);
    }
    msg
}

pub fn dashboard_message(snapshots: &[PerformanceSnapshot], mode: SystemMode, today: NaiveDate) -> String {
    let mut msg = format!("📈 **Performance dashboard ({})**\nMode: `{}`\n", today, mode);
    for s in snapshots {
        let _ = write!(
            msg,
            "\n**{}** ({} samples, {}d horizon)\n• Hit rate: {:.1}%\n• Avg return: {}\n• Cumulative: {}\n• Max drawdown: {}\n",
            s.market,
            s.sample_count,
            s.horizon_days,
            s.hit_rate * 100.0,
            fmt_pct(s.avg_return),
            fmt_pct(s.cum_return),
            fmt_pct(s.max_drawdown),
        );
    }
    msg
}
