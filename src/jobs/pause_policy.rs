//! Pause-policy tuning
//!
//! Estimates what continuing to trade through the latest L4 episode would
//! have returned and stores the pause length the next episode will use.

use super::{range_since, JobContext};
use crate::error::Result;
use crate::mode::store::PAUSE_POLICY_KEY;
use crate::recovery::{decide_pause_hours, forward_return, simulated_continuation, PausePolicy};
use crate::types::{L4Episode, PredictionRecord};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq)]
pub struct PausePolicyReport {
    pub policy: PausePolicy,
    pub episode: Option<L4Episode>,
    /// Symbols with a forward return in the simulation
    pub sampled: usize,
}

pub async fn run(ctx: &JobContext, now: DateTime<Utc>) -> Result<PausePolicyReport> {
    let pause = &ctx.config.pause;
    let episode = ctx.db.latest_episode().await?;

    let (simulated, sampled) = match &episode {
        Some(episode) => simulate(ctx, episode, now).await?,
        None => (None, 0),
    };
    let (pause_hours, reason) = decide_pause_hours(simulated, pause);

    let policy = PausePolicy {
        pause_hours,
        reason: reason.to_string(),
        based_on: simulated,
        updated_at: now,
    };
    ctx.db.put_state(PAUSE_POLICY_KEY, &policy, now).await?;
    tracing::info!(
        pause_hours,
        reason,
        simulated = ?simulated,
        sampled,
        "L4 pause policy updated"
    );

    Ok(PausePolicyReport {
        policy,
        episode,
        sampled,
    })
}

/// Mean forward return, from the L4 start date, of the symbols predicted
/// in the days before it
async fn simulate(ctx: &JobContext, episode: &L4Episode, now: DateTime<Utc>) -> Result<(Option<f64>, usize)> {
    let (start, predictions) = predictions_before(ctx, episode).await?;
    let symbols: BTreeSet<String> = predictions.into_iter().map(|p| p.symbol).collect();
    continuation_return(ctx, &symbols, start, now).await
}

/// Local start date of `episode` and the predictions of the lookback
/// window ending on it
pub(crate) async fn predictions_before(
    ctx: &JobContext,
    episode: &L4Episode,
) -> Result<(NaiveDate, Vec<PredictionRecord>)> {
    let start = episode.started_at.with_timezone(&ctx.offset()).date_naive();
    let lookback = Duration::days(ctx.config.pause.simulation_lookback_days);
    let predictions = ctx.db.predictions_between(start - lookback, start).await?;
    Ok((start, predictions))
}

/// Mean forward return of `symbols` from `start`, and how many had one
pub(crate) async fn continuation_return(
    ctx: &JobContext,
    symbols: &BTreeSet<String>,
    start: NaiveDate,
    now: DateTime<Utc>,
) -> Result<(Option<f64>, usize)> {
    let range = range_since(start, ctx.local_date(now));
    let mut returns = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let ret = match ctx.market_data.history(symbol, range).await {
            Ok(bars) => forward_return(&bars, start, ctx.config.pause.simulation_forward_bars),
            Err(e) => {
                tracing::debug!(symbol = %symbol, error = %e, "Simulation fetch failed");
                None
            }
        };
        returns.push(ret);
    }

    let sampled = returns.iter().filter(|r| r.is_some()).count();
    Ok((simulated_continuation(&returns), sampled))
}
