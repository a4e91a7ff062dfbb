//! Forecast reviews of finished L4 episodes
//!
//! `review_episode` records per-market hit rate and realized return once an
//! episode has ended. `compare` sets the forecasts made before each episode
//! against what continuing through it would have returned.

use super::pause_policy::{continuation_return, predictions_before};
use super::JobContext;
use crate::error::Result;
use crate::recovery::{ai_review_message, comparison_message, review_metrics, EpisodeComparison};
use crate::types::{AiReview, L4Episode, PredictionRecord};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Record and post the review of a closed episode. Only the run that
/// claims the episode does it.
pub async fn review_episode(ctx: &JobContext, episode: &L4Episode) -> Result<Option<Vec<AiReview>>> {
    let Some(ended_at) = episode.ended_at else {
        return Ok(None);
    };
    if !ctx.db.claim_review(episode.id).await? {
        return Ok(None);
    }

    let until = ended_at.with_timezone(&ctx.offset()).date_naive();
    let window = ctx.config.performance.snapshot_window;
    let mut reviews = Vec::with_capacity(ctx.config.markets.len());
    for market_config in &ctx.config.markets {
        let settled = ctx.db.settled_until(market_config.market, until, window).await?;
        let (sample_count, hit_rate, avg_return) = review_metrics(&settled);
        let review = AiReview {
            episode_id: episode.id,
            market: market_config.market,
            started_at: episode.started_at,
            ended_at,
            sample_count,
            hit_rate,
            avg_return,
        };
        ctx.db.insert_ai_review(&review).await?;
        reviews.push(review);
    }

    tracing::info!(episode = episode.id, markets = reviews.len(), "L4 forecast review recorded");
    ctx.notifiers
        .report
        .deliver_text(&ai_review_message(episode.id, &reviews, ctx.offset()))
        .await;
    Ok(Some(reviews))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComparisonReport {
    pub rows: Vec<EpisodeComparison>,
}

pub async fn compare(ctx: &JobContext, now: DateTime<Utc>) -> Result<ComparisonReport> {
    let mut rows = Vec::new();
    for episode in ctx.db.closed_episodes().await? {
        let (start, predictions) = predictions_before(ctx, &episode).await?;
        for market_config in &ctx.config.markets {
            let market = market_config.market;
            let before: Vec<&PredictionRecord> = predictions.iter().filter(|p| p.market == market).collect();
            if before.is_empty() {
                continue;
            }
            let normal_avg_pred = before.iter().map(|p| p.predicted_return).sum::<f64>() / before.len() as f64;
            let symbols: BTreeSet<String> = before.iter().map(|p| p.symbol.clone()).collect();
            let (simulated_return, sampled) = continuation_return(ctx, &symbols, start, now).await?;
            rows.push(EpisodeComparison {
                episode_id: episode.id,
                market,
                started_at: episode.started_at,
                normal_avg_pred: Some(normal_avg_pred),
                simulated_return,
                sampled,
            });
        }
    }

    if !rows.is_empty() {
        ctx.notifiers
            .black_swan
            .deliver_text(&comparison_message(&rows, ctx.offset()))
            .await;
    }
    tracing::info!(rows = rows.len(), "L4 forecast comparison computed");
    Ok(ComparisonReport { rows })
}
