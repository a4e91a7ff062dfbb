//! Prediction settlement
//!
//! Prices every due prediction and records the realized return with a
//! guarded update, so two settlers never count a row twice.

use super::{fmt_pct, range_since, JobContext};
use crate::error::Result;
use crate::types::{is_hit, Bar, PredictionRecord};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettlementReport {
    pub due: usize,
    pub settled: usize,
    pub hits: usize,
    /// Could not be priced this run; retried next run
    pub failed: usize,
    /// Already settled by a concurrent run
    pub raced: usize,
    /// One line per settled prediction, for the forecast report
    pub lines: Vec<String>,
}

impl SettlementReport {
    pub fn hit_rate(&self) -> Option<f64> {
        (self.settled > 0).then(|| self.hits as f64 / self.settled as f64)
    }
}

/// Realized return: last close on or before the settlement date, after
/// the entry date, over the entry price
pub fn realized_return(prediction: &PredictionRecord, bars: &[Bar]) -> Option<f64> {
    let settle_date = prediction.settle_date();
    let exit = bars
        .iter()
        .rev()
        .find(|b| b.date > prediction.entry_date && b.date <= settle_date)?;
    let entry = prediction.entry_price.to_f64()?;
    if entry <= 0.0 || !exit.close.is_finite() {
        return None;
    }
    Some(exit.close / entry - 1.0)
}

pub async fn run(ctx: &JobContext, now: DateTime<Utc>) -> Result<SettlementReport> {
    let today = ctx.local_date(now);
    let pending = ctx.db.unsettled_predictions().await?;
    let mut report = SettlementReport::default();

    for prediction in pending.iter().filter(|p| p.is_due(today)) {
        report.due += 1;
        let Some(id) = prediction.id else { continue };

        let bars = match ctx
            .market_data
            .history(&prediction.symbol, range_since(prediction.entry_date, today))
            .await
        {
            Ok(bars) => bars,
            Err(e) => {
                report.failed += 1;
                tracing::warn!(symbol = %prediction.symbol, error = %e, "Settlement price fetch failed");
                continue;
            }
        };

        let Some(realized) = realized_return(prediction, &bars) else {
            report.failed += 1;
            tracing::warn!(
                symbol = %prediction.symbol,
                entry_date = %prediction.entry_date,
                "No close available for settlement"
            );
            continue;
        };
        let hit = is_hit(prediction.predicted_return, realized);

        if ctx.db.settle_prediction(id, realized, hit, now).await? {
            report.settled += 1;
            if hit {
                report.hits += 1;
            }
            report.lines.push(settlement_line(prediction, realized, hit));
        } else {
            report.raced += 1;
            tracing::debug!(id, symbol = %prediction.symbol, "Prediction already settled");
        }
    }

    tracing::info!(
        due = report.due,
        settled = report.settled,
        failed = report.failed,
        raced = report.raced,
        "Settlement finished"
    );
    Ok(report)
}

fn settlement_line(prediction: &PredictionRecord, realized: f64, hit: bool) -> String {
    format!(
        "• `{}` predicted {} | actual `{}` {}",
        prediction.symbol,
        fmt_pct(prediction.predicted_return),
        fmt_pct(realized),
        if hit { "✅" } else { "❌" }
    )
}
