//! Recovery sweep
//!
//! Applies the periodic sweep to the mode store. The run that commits a
//! downgrade reports the pause summary; the postmortem of a finished
//! episode and its forecast review are sent by whichever run claims them
//! first.

use super::{range_since, JobContext};
use crate::classifier::Severity;
use crate::error::Result;
use crate::mode::{ModeEffect, Transition};
use crate::recovery::{index_return, PauseSummary, Postmortem};
use crate::types::{AiReview, L4Episode};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct SweepReport {
    pub transition: Transition,
    pub summary: Option<PauseSummary>,
    pub postmortem: Option<Postmortem>,
    pub reviews: Option<Vec<AiReview>>,
}

pub async fn run(ctx: &JobContext, now: DateTime<Utc>) -> Result<SweepReport> {
    let transition = ctx.store.sweep(now).await?;
    let offset = ctx.offset();

    let mut summary = None;
    for effect in &transition.effects {
        if let ModeEffect::Downgraded { l4_started_at, ended_at, .. } = effect {
            let events = ctx
                .db
                .severity_events_between(*l4_started_at, *ended_at, Severity::Minor)
                .await?;
            let pause = PauseSummary::from_events(*l4_started_at, *ended_at, &events);
            pause.log();
            ctx.notifiers.black_swan.deliver_text(&pause.message(offset)).await;
            summary = Some(pause);
        }
    }

    let mut postmortem = None;
    let mut reviews = None;
    if let Some(episode) = ctx.db.latest_episode().await?.filter(|e| !e.is_open()) {
        if !episode.postmortem_sent {
            postmortem = send_postmortem(ctx, &episode, now).await?;
        }
        if !episode.review_sent {
            reviews = super::l4_review::review_episode(ctx, &episode).await?;
        }
    }

    Ok(SweepReport {
        transition,
        summary,
        postmortem,
        reviews,
    })
}

async fn send_postmortem(ctx: &JobContext, episode: &L4Episode, now: DateTime<Utc>) -> Result<Option<Postmortem>> {
    let Some(ended_at) = episode.ended_at else {
        return Ok(None);
    };
    if !ctx.db.claim_postmortem(episode.id).await? {
        return Ok(None);
    }

    let events = ctx
        .db
        .severity_events_between(episode.started_at, ended_at, Severity::Severe)
        .await?;

    let start = episode.started_at.date_naive();
    let end = ended_at.date_naive();
    let range = range_since(start, now.date_naive());
    let mut index_returns = Vec::new();
    for index in &ctx.config.pause.postmortem_indices {
        let ret = match ctx.market_data.history(index, range).await {
            Ok(bars) => index_return(&bars, start, end),
            Err(e) => {
                tracing::warn!(index = %index, error = %e, "Postmortem index fetch failed");
                None
            }
        };
        index_returns.push((index.clone(), ret));
    }

    let postmortem = Postmortem::new(episode.started_at, ended_at, &events, index_returns);
    tracing::info!(
        episode = episode.id,
        l3_count = postmortem.l3_count,
        duration_hours = postmortem.duration_hours(),
        "L4 postmortem"
    );
    ctx.notifiers
        .black_swan
        .deliver_text(&postmortem.message(ctx.offset()))
        .await;
    Ok(Some(postmortem))
}
