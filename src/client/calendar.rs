//! Trading-day check
//!
//! A market counts as open when its index printed a bar within one day of
//! `today`. Any fetch failure counts as closed.

use super::{HistoryRange, MarketDataSource};
use chrono::NaiveDate;

pub async fn is_trading_day(source: &dyn MarketDataSource, index_symbol: &str, today: NaiveDate) -> bool {
    match source.history(index_symbol, HistoryRange::FiveDays).await {
        Ok(bars) => match bars.last() {
            Some(last) => (today - last.date).num_days().abs() <= 1,
            None => false,
        },
        Err(e) => {
            tracing::warn!(index = index_symbol, error = %e, "Cannot determine trading day, assuming closed");
            false
        }
    }
}
