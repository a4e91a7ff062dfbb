//! Core types shared across modules

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::classifier::Severity;

/// Equity market covered by the forecast jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Market {
    #[serde(rename = "TW")]
    Tw,
    #[serde(rename = "US")]
    Us,
}

impl Market {
    pub fn as_str(&self) -> &'static str {
        match self {
            Market::Tw => "TW",
            Market::Us => "US",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Market {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TW" => Ok(Market::Tw),
            "US" => Ok(Market::Us),
            other => Err(format!("unknown market: {}", other)),
        }
    }
}

/// Daily OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Most recent headline returned by a news feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Headline {
    pub title: String,
    pub link: String,
    pub published_at: DateTime<Utc>,
}

impl Headline {
    /// Whether the item is within `max_age` of `now`
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        now - self.published_at <= max_age
    }
}

/// A classified news item above level 0. Immutable once logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityEvent {
    pub occurred_at: DateTime<Utc>,
    pub symbol: String,
    pub market: Option<Market>,
    pub headline: String,
    pub link: String,
    pub level: Severity,
}

/// One row of the append-only prediction log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: Option<i64>,
    pub market: Market,
    pub entry_date: NaiveDate,
    pub symbol: String,
    pub entry_price: Decimal,
    pub predicted_return: f64,
    pub horizon_days: u32,
    pub reduced_confidence: bool,
    pub settled: bool,
    pub realized_return: Option<f64>,
    pub hit: Option<bool>,
}

impl PredictionRecord {
    /// First calendar day on which the prediction can be settled
    pub fn settle_date(&self) -> NaiveDate {
        self.entry_date + chrono::Duration::days(self.horizon_days as i64)
    }

    pub fn is_due(&self, today: NaiveDate) -> bool {
        !self.settled && today >= self.settle_date()
    }
}

/// Direction agreement between a forecast and what happened
pub fn is_hit(predicted: f64, realized: f64) -> bool {
    (predicted > 0.0 && realized > 0.0) || (predicted < 0.0 && realized < 0.0)
}

/// Rolling accuracy snapshot for one market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub market: Market,
    pub recorded_at: DateTime<Utc>,
    pub horizon_days: u32,
    pub hit_rate: f64,
    pub avg_return: f64,
    pub cum_return: f64,
    pub max_drawdown: f64,
    pub sample_count: usize,
}

/// One L4 pause, from activation to downgrade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct L4Episode {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub pause_until: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub halt_notified: bool,
    pub postmortem_sent: bool,
    pub review_sent: bool,
}

impl L4Episode {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// Forecast accuracy for one market, recorded once when an L4 episode ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiReview {
    pub episode_id: i64,
    pub market: Market,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub sample_count: usize,
    pub hit_rate: Option<f64>,
    pub avg_return: Option<f64>,
}
