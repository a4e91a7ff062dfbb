//! Market impact of L4 episodes
//!
//! Index returns T+0..T+10 days from each finished episode's start, for
//! the markets whose news drove it.

use super::{range_since, JobContext};
use crate::classifier::Severity;
use crate::error::Result;
use crate::types::{L4Episode, Market};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeSet;
use std::fmt::Write as _;

/// Calendar-day offsets from the episode start
pub const IMPACT_OFFSETS: [i64; 5] = [0, 1, 3, 5, 10];

#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeImpact {
    pub episode_id: i64,
    pub market: Market,
    pub index: String,
    pub started_on: NaiveDate,
    pub returns: Vec<(i64, Option<f64>)>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImpactReport {
    pub impacts: Vec<EpisodeImpact>,
    /// Mean return per offset over the impacts that have one
    pub averages: Vec<(i64, Option<f64>)>,
}

pub fn average_returns(impacts: &[EpisodeImpact]) -> Vec<(i64, Option<f64>)> {
    IMPACT_OFFSETS
        .iter()
        .map(|offset| {
            let values: Vec<f64> = impacts
                .iter()
                .flat_map(|i| i.returns.iter())
                .filter(|(d, _)| d == offset)
                .filter_map(|(_, r)| *r)
                .collect();
            let mean = (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64);
            (*offset, mean)
        })
        .collect()
}

pub async fn run(ctx: &JobContext, now: DateTime<Utc>) -> Result<ImpactReport> {
    let today = ctx.local_date(now);
    let mut impacts = Vec::new();

    for episode in ctx.db.closed_episodes().await? {
        let started_on = episode.started_at.with_timezone(&ctx.offset()).date_naive();
        for market in episode_markets(ctx, &episode).await? {
            let Some(market_config) = ctx.config.market(market) else { continue };
            let index = &market_config.index_symbol;
            let bars = match ctx.market_data.history(index, range_since(started_on, today)).await {
                Ok(bars) => bars,
                Err(e) => {
                    tracing::warn!(index = %index, error = %e, "Impact index fetch failed");
                    continue;
                }
            };
            impacts.push(EpisodeImpact {
                episode_id: episode.id,
                market,
                index: index.clone(),
                started_on,
                returns: crate::recovery::impact_returns(&bars, started_on, &IMPACT_OFFSETS),
            });
        }
    }

    let averages = average_returns(&impacts);
    if !impacts.is_empty() {
        ctx.notifiers
            .report
            .deliver_text(&impact_message(impacts.len(), &averages))
            .await;
    }
    tracing::info!(samples = impacts.len(), "Market impact computed");
    Ok(ImpactReport { impacts, averages })
}

/// Markets of the severe news inside the episode; every configured market
/// when none is known
async fn episode_markets(ctx: &JobContext, episode: &L4Episode) -> Result<Vec<Market>> {
    let end = episode.ended_at.unwrap_or(episode.pause_until);
    let events = ctx
        .db
        .severity_events_between(episode.started_at, end, Severity::Severe)
        .await?;
    let markets: BTreeSet<&'static str> = events
        .iter()
        .filter_map(|e| e.market)
        .map(|m| m.as_str())
        .collect();
    if markets.is_empty() {
        return Ok(ctx.config.markets.iter().map(|m| m.market).collect());
    }
    Ok(ctx
        .config
        .markets
        .iter()
        .map(|m| m.market)
        .filter(|m| markets.contains(m.as_str()))
        .collect())
}

pub fn impact_message(samples: usize, averages: &[(i64, Option<f64>)]) -> String {
    let mut msg = format!("📊 **L4 events × market impact**\n\nSamples: {}\n", samples);
    for (offset, mean) in averages.iter().filter(|(d, _)| *d > 0) {
        match mean {
            Some(r) => {
                let _ = writeln!(msg, "T+{}: {:+.2}%", offset, r * 100.0);
            }
            None => {
                let _ = writeln!(msg, "T+{}: n/a", offset);
            }
        }
    }
    msg.push_str("\n(source: recorded L4 episodes)");
    msg
}
