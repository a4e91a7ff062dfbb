//! External data sources
//!
//! Market data and news are reached through two traits so jobs can be run
//! against mocks. Every call is bounded by the client's timeout and is
//! never retried; a failure means "no data this cycle".

pub mod calendar;
pub mod news;
pub mod yahoo;

pub use calendar::is_trading_day;
pub use news::GoogleNewsClient;
pub use yahoo::YahooClient;

use crate::error::FetchResult;
use crate::types::{Bar, Headline};
use async_trait::async_trait;

/// Lookback requested from the market data source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryRange {
    FiveDays,
    OneMonth,
    ThreeMonths,
    OneYear,
    TwoYears,
}

impl HistoryRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryRange::FiveDays => "5d",
            HistoryRange::OneMonth => "1mo",
            HistoryRange::ThreeMonths => "3mo",
            HistoryRange::OneYear => "1y",
            HistoryRange::TwoYears => "2y",
        }
    }
}

/// Daily price history
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Adjusted daily bars, oldest first. An empty series is `FetchError::Empty`.
    async fn history(&self, symbol: &str, range: HistoryRange) -> FetchResult<Vec<Bar>>;
}

/// Headline search
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Newest headline matching `query`, if any
    async fn latest_headline(&self, query: &str) -> FetchResult<Option<Headline>>;
}
