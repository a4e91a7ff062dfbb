//! Recovery reporting and pause-policy tuning
//!
//! The downgrade itself is a mode transition (see `mode`). This module
//! covers what happens around it: the pause summary, the postmortem, the
//! simulated cost of continuing through an L4 pause that decides the next
//! pause length, post-event index returns, and the forecast reviews sent
//! after an episode ends.


use crate::classifier::Severity;
use crate::config::PauseConfig;
use crate::types::{AiReview, Bar, Market, PredictionRecord, SeverityEvent};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

/// Tuned L4 pause length, stored under the `pause_policy` key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PausePolicy {
    pub pause_hours: i64,
    pub reason: String,
    /// Simulated continuation return the decision was based on
    pub based_on: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

/// Pause length for a simulated continuation return
pub fn decide_pause_hours(simulated: Option<f64>, config: &PauseConfig) -> (i64, &'static str) {
    match simulated {
        None => (config.base_pause_hours, "no_data"),
        Some(r) if r < config.severe_drawdown => (config.severe_pause_hours, "severe_drawdown"),
        Some(r) if r < config.moderate_drawdown => (config.base_pause_hours, "moderate_risk"),
        Some(_) => (config.mild_pause_hours, "low_impact"),
    }
}

/// Close-to-close return over `bars` closes starting at the first bar on or after `start`
pub fn forward_return(bars: &[Bar], start: NaiveDate, bars_ahead: usize) -> Option<f64> {
    let i = bars.iter().position(|b| b.date >= start)?;
    let base = bars.get(i)?.close;
    let end = bars.get(i + bars_ahead)?.close;
    pct_change(base, end)
}

/// Mean of the available forward returns
pub fn simulated_continuation(returns: &[Option<f64>]) -> Option<f64> {
    let values: Vec<f64> = returns.iter().flatten().copied().collect();
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Return from the first close on or after `start` to the last close on or before `end`
pub fn index_return(bars: &[Bar], start: NaiveDate, end: NaiveDate) -> Option<f64> {
    let window: Vec<&Bar> = bars.iter().filter(|b| b.date >= start && b.date <= end).collect();
    if window.len() < 2 {
        return None;
    }
    pct_change(window[0].close, window[window.len() - 1].close)
}

/// Index return `d` calendar days after `base`, for each offset.
/// The base is the first bar on or after `base`; each target is the first
/// bar on or after `base_bar.date + d`.
pub fn impact_returns(bars: &[Bar], base: NaiveDate, offsets: &[i64]) -> Vec<(i64, Option<f64>)> {
    let Some(base_bar) = bars.iter().find(|b| b.date >= base) else {
        return offsets.iter().map(|d| (*d, None)).collect();
    };
    offsets
        .iter()
        .map(|d| {
            let target = base_bar.date + Duration::days(*d);
            let ret = bars
                .iter()
                .find(|b| b.date >= target)
                .and_then(|b| pct_change(base_bar.close, b.close));
            (*d, ret)
        })
        .collect()
}

fn pct_change(from: f64, to: f64) -> Option<f64> {
    if from > 0.0 && from.is_finite() && to.is_finite() {
        Some(to / from - 1.0)
    } else {
        None
    }
}

/// Severity events logged while L4 was active
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PauseSummary {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub total: usize,
    pub by_level: BTreeMap<u8, usize>,
    pub by_symbol: BTreeMap<String, usize>,
}

impl PauseSummary {
    pub fn from_events(started_at: DateTime<Utc>, ended_at: DateTime<Utc>, events: &[SeverityEvent]) -> Self {
        let mut by_level = BTreeMap::new();
        let mut by_symbol = BTreeMap::new();
        let mut total = 0;
        for event in events
            .iter()
            .filter(|e| e.occurred_at >= started_at && e.occurred_at <= ended_at)
        {
            total += 1;
            *by_level.entry(event.level.level()).or_insert(0) += 1;
            *by_symbol.entry(event.symbol.clone()).or_insert(0) += 1;
        }
        Self {
            started_at,
            ended_at,
            total,
            by_level,
            by_symbol,
        }
    }

    pub fn duration_hours(&self) -> f64 {
        (self.ended_at - self.started_at).num_minutes() as f64 / 60.0
    }

    /// Emit the summary as one structured log event
    pub fn log(&self) {
        match serde_json::to_string(self) {
            Ok(payload) => tracing::info!(
                target: "pause_summary",
                total = self.total,
                hours = self.duration_hours(),
                payload = %payload,
                "L4 pause summary"
            ),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize pause summary"),
        }
    }

    pub fn message(&self, offset: FixedOffset) -> String {
        let mut msg = String::new();
        let _ = writeln!(msg, "🟢 **L4 pause lifted**");
        let _ = writeln!(
            msg,
            "Period: {} ~ {} ({:.1}h)",
            fmt_local(self.started_at, offset),
            fmt_local(self.ended_at, offset),
            self.duration_hours()
        );
        let _ = writeln!(msg, "Events during pause: {}", self.total);
        for (level, count) in self.by_level.iter().rev() {
            let _ = writeln!(msg, "• L{}: {}", level, count);
        }
        if !self.by_symbol.is_empty() {
            let mut symbols: Vec<(&String, &usize)> = self.by_symbol.iter().collect();
            symbols.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
            let top: Vec<String> = symbols
                .iter()
                .take(8)
                .map(|(s, c)| format!("{} ({})", s, c))
                .collect();
            let _ = writeln!(msg, "Symbols: {}", top.join(", "));
        }
        msg
    }
}

/// Review of a finished L4 episode
#[derive(Debug, Clone, PartialEq)]
pub struct Postmortem {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub l3_count: usize,
    pub symbols: Vec<String>,
    pub markets: Vec<String>,
    /// (index symbol, return over the episode)
    pub index_returns: Vec<(String, Option<f64>)>,
}

impl Postmortem {
    pub fn new(
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        events: &[SeverityEvent],
        index_returns: Vec<(String, Option<f64>)>,
    ) -> Self {
        let severe: Vec<&SeverityEvent> = events
            .iter()
            .filter(|e| e.level == Severity::Severe)
            .filter(|e| e.occurred_at >= started_at && e.occurred_at <= ended_at)
            .collect();
        let symbols: BTreeSet<String> = severe.iter().map(|e| e.symbol.clone()).collect();
        let markets: BTreeSet<String> = severe
            .iter()
            .filter_map(|e| e.market.map(|m| m.to_string()))
            .collect();
        Self {
            started_at,
            ended_at,
            l3_count: severe.len(),
            symbols: symbols.into_iter().collect(),
            markets: markets.into_iter().collect(),
            index_returns,
        }
    }

    pub fn duration_hours(&self) -> f64 {
        (self.ended_at - self.started_at).num_minutes() as f64 / 60.0
    }

    pub fn message(&self, offset: FixedOffset) -> String {
        let mut msg = String::new();
        let _ = writeln!(msg, "📊 **L4 postmortem**\n");
        let _ = writeln!(
            msg,
            "🕒 Period: {} ~ {}",
            fmt_local(self.started_at, offset),
            fmt_local(self.ended_at, offset)
        );
        let _ = writeln!(msg, "⏱ Duration: {:.1}h\n", self.duration_hours());
        let _ = writeln!(msg, "• L3 events: {}", self.l3_count);
        let markets = if self.markets.is_empty() {
            "GLOBAL".to_string()
        } else {
            self.markets.join(", ")
        };
        let _ = writeln!(msg, "• Markets: {}", markets);
        let shown: Vec<&str> = self.symbols.iter().take(8).map(String::as_str).collect();
        let more = if self.symbols.len() > 8 { "..." } else { "" };
        let _ = writeln!(msg, "• Symbols: {}{}\n", shown.join(", "), more);
        for (index, ret) in &self.index_returns {
            if let Some(r) = ret {
                let _ = writeln!(msg, "• {}: {:+.2}%", index, r * 100.0);
            }
        }
        let _ = write!(msg, "\n*Risk monitoring only, not investment advice*");
        msg
    }
}

pub fn fmt_local(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset).format("%Y-%m-%d %H:%M").to_string()
}

/// Sample count, hit rate and mean realized return of settled predictions
pub fn review_metrics(settled: &[PredictionRecord]) -> (usize, Option<f64>, Option<f64>) {
    let scored: Vec<(bool, f64)> = settled
        .iter()
        .filter_map(|p| Some((p.hit?, p.realized_return?)))
        .collect();
    if scored.is_empty() {
        return (0, None, None);
    }
    let n = scored.len() as f64;
    let hits = scored.iter().filter(|(hit, _)| *hit).count() as f64;
    let mean = scored.iter().map(|(_, r)| r).sum::<f64>() / n;
    (scored.len(), Some(hits / n), Some(mean))
}

pub fn ai_review_message(episode_id: i64, reviews: &[AiReview], offset: FixedOffset) -> String {
    let mut msg = format!("📊 **L4 review #{}**\n\n", episode_id);
    if let Some(first) = reviews.first() {
        let _ = writeln!(msg, "🕒 Ended: {}", fmt_local(first.ended_at, offset));
        let hours = (first.ended_at - first.started_at).num_minutes() as f64 / 60.0;
        let _ = writeln!(msg, "⏱ Duration: {:.1}h\n", hours);
    }
    for review in reviews {
        match (review.hit_rate, review.avg_return) {
            (Some(hit_rate), Some(avg)) => {
                let _ = writeln!(
                    msg,
                    "• {} forecasts: hit rate {:.0}%, avg return {:+.2}% ({} samples)",
                    review.market,
                    hit_rate * 100.0,
                    avg * 100.0,
                    review.sample_count
                );
            }
            _ => {
                let _ = writeln!(msg, "• {} forecasts: not enough data", review.market);
            }
        }
    }
    msg.push_str("\n*Risk monitoring only, not investment advice*");
    msg
}

/// Forecasts before an episode against what continuing through it would
/// have returned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeComparison {
    pub episode_id: i64,
    pub market: Market,
    pub started_at: DateTime<Utc>,
    /// Mean predicted return of the forecasts made before the episode
    pub normal_avg_pred: Option<f64>,
    /// Mean forward return of those symbols from the episode start
    pub simulated_return: Option<f64>,
    pub sampled: usize,
}

pub fn comparison_message(rows: &[EpisodeComparison], offset: FixedOffset) -> String {
    let fmt = |r: Option<f64>| r.map(|v| format!("{:+.2}%", v * 100.0)).unwrap_or_else(|| "n/a".to_string());
    let mut msg = String::from("📉 **L4 × forecast comparison**\n\n");
    for row in rows {
        let _ = writeln!(msg, "🕒 {} ({})", fmt_local(row.started_at, offset), row.market);
        let _ = writeln!(msg, "🟢 Forecast mean before L4: {}", fmt(row.normal_avg_pred));
        let _ = writeln!(msg, "🔴 If forecasting had continued: {}", fmt(row.simulated_return));
        let _ = writeln!(msg, "🛑 Actual: forecasts paused\n");
    }
    msg
}
