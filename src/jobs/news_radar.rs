//! News radar
//!
//! Watches the latest headline of each symbol of one market, classifies
//! it, logs level 1+ items and feeds level-3 items to the mode store.
//! Ordinary news goes to the news channel, L3/L4 items to the black swan
//! channel.

use super::JobContext;
use crate::classifier::{market_impact, Severity};
use crate::client::is_trading_day;
use crate::error::Result;
use crate::notify::{Embed, Message, COLOR_INFO, COLOR_L3, COLOR_L4, MAX_EMBEDS};
use crate::recovery::fmt_local;
use crate::types::{Headline, Market, SeverityEvent};
use chrono::{DateTime, Duration, Timelike, Utc};
use std::collections::BTreeSet;

/// Outcome counters of one radar run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewsRadarReport {
    pub market: Option<Market>,
    pub market_open: bool,
    pub watched: usize,
    pub fetched: usize,
    pub failed: usize,
    pub stale: usize,
    pub duplicate: usize,
    /// Level 1+ events written to the log
    pub logged: usize,
    pub severe: usize,
    /// Severe items that completed a cluster
    pub clusters: usize,
    pub news_items: usize,
    pub black_swan_items: usize,
}

/// TW before the local cutover hour, US after it
pub fn radar_market(now: DateTime<Utc>, offset: chrono::FixedOffset, cutover_hour: u32) -> Market {
    if now.with_timezone(&offset).hour() < cutover_hour {
        Market::Tw
    } else {
        Market::Us
    }
}

/// Search term for a symbol: the ticker without its exchange suffix
pub fn query_for(symbol: &str) -> &str {
    symbol.split('.').next().unwrap_or(symbol)
}

pub async fn run(ctx: &JobContext, now: DateTime<Utc>) -> Result<NewsRadarReport> {
    let news_config = &ctx.config.news;
    let market = radar_market(now, ctx.offset(), news_config.cutover_hour);
    let market_config = ctx.market_config(market)?;
    let today = ctx.local_date(now);
    let market_open = is_trading_day(ctx.market_data.as_ref(), &market_config.index_symbol, today).await;

    let symbols = watchlist(ctx, market, market_open).await?;
    tracing::info!(%market, market_open, symbols = symbols.len(), "News radar started");

    let mut report = NewsRadarReport {
        market: Some(market),
        market_open,
        watched: symbols.len(),
        ..NewsRadarReport::default()
    };
    let freshness = Duration::hours(news_config.freshness_hours);
    let trigger_count = ctx.config.escalation.trigger_count;
    let escalation_window = ctx.config.escalation.window();
    let offset = ctx.offset();
    let mut news_embeds = Vec::new();
    let mut black_swan_embeds = Vec::new();

    for symbol in &symbols {
        let headline = match ctx.news.latest_headline(query_for(symbol)).await {
            Ok(Some(headline)) => headline,
            Ok(None) => continue,
            Err(e) => {
                report.failed += 1;
                tracing::warn!(symbol = %symbol, error = %e, transient = e.is_transient(), "News fetch failed");
                continue;
            }
        };
        report.fetched += 1;

        if !headline.is_fresh(now, freshness) {
            report.stale += 1;
            continue;
        }

        let level = ctx.classifier.classify(&headline.title);

        // Severe items bypass the cache, but the same severe headline counts
        // once per escalation window
        let repeated = if level.is_severe() {
            ctx.db
                .event_logged_since(symbol, &headline.title, now - escalation_window)
                .await?
        } else {
            ctx.db.cached_title(symbol).await?.as_deref() == Some(headline.title.as_str())
        };
        if repeated {
            report.duplicate += 1;
            continue;
        }
        ctx.db.cache_title(symbol, &headline.title, now).await?;

        let mut display_level = level.level();
        if level != Severity::None {
            let event = SeverityEvent {
                occurred_at: now,
                symbol: symbol.clone(),
                market: Some(market),
                headline: headline.title.clone(),
                link: headline.link.clone(),
                level,
            };
            let transition = ctx.store.record_severity_event(&event).await?;
            report.logged += 1;
            if level.is_severe() {
                report.severe += 1;
            }
            if transition.map(|t| t.is_cluster(trigger_count)).unwrap_or(false) {
                report.clusters += 1;
                display_level = 4;
            }
        }

        let embed = headline_embed(symbol, &headline, display_level, offset);
        if display_level >= 3 {
            black_swan_embeds.push(embed);
        } else {
            news_embeds.push(embed);
        }
    }

    report.news_items = news_embeds.len();
    report.black_swan_items = black_swan_embeds.len();
    let stamp = fmt_local(now, offset);

    if !news_embeds.is_empty() {
        news_embeds.truncate(MAX_EMBEDS);
        let mut message = Message::embeds(news_embeds);
        message.content = format!("### Market news\n📅 {}", stamp);
        ctx.notifiers.news.deliver(&message).await;
    }
    if !black_swan_embeds.is_empty() {
        black_swan_embeds.truncate(MAX_EMBEDS);
        let mut message = Message::embeds(black_swan_embeds);
        message.content = format!("🚨 Black swan alert\n📅 {}", stamp);
        ctx.notifiers.black_swan.deliver(&message).await;
    }

    tracing::info!(
        %market,
        fetched = report.fetched,
        failed = report.failed,
        logged = report.logged,
        severe = report.severe,
        "News radar finished"
    );
    Ok(report)
}

/// Latest top picks while the market trades; otherwise every symbol ever
/// predicted for the market plus the core watchlist.
async fn watchlist(ctx: &JobContext, market: Market, market_open: bool) -> Result<Vec<String>> {
    let market_config = ctx.market_config(market)?;
    if market_open {
        let picks = ctx.db.latest_picks(market, ctx.config.news.top_picks).await?;
        if !picks.is_empty() {
            return Ok(picks.into_iter().map(|p| p.symbol).collect());
        }
        return Ok(market_config.core_watchlist.clone());
    }

    let mut symbols: BTreeSet<String> = ctx
        .db
        .predicted_symbols()
        .await?
        .into_iter()
        .filter(|s| market_impact(s) == market.as_str())
        .collect();
    symbols.extend(market_config.core_watchlist.iter().cloned());
    Ok(symbols.into_iter().collect())
}

fn headline_embed(symbol: &str, headline: &Headline, level: u8, offset: chrono::FixedOffset) -> Embed {
    let (label, color) = match level {
        4 => ("🚨🚨 Black swan L4 (systemic risk)", COLOR_L4),
        3 => ("🚨 Black swan L3", COLOR_L3),
        _ => ("📰 Market news", COLOR_INFO),
    };
    let time = headline.published_at.with_timezone(&offset).format("%H:%M");
    Embed::new(format!("{} | {}", symbol, market_impact(symbol)), color)
        .url(headline.link.clone())
        .field(
            label,
            format!("[{}]({})\n🕒 {}", headline.title, headline.link, time),
            false,
        )
}
