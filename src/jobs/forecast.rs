//! Daily forecast job
//!
//! Gate, trading-day check, settlement, then one model per symbol in the
//! gated universe. The top picks by absolute predicted return are logged
//! and posted.

use super::{announce_halt, explorer, fmt_pct, performance, settlement, JobContext};
use crate::client::{is_trading_day, HistoryRange};
use crate::error::Result;
use crate::gate::{GateDecision, ReducedReason};
use crate::ml::{forecast_symbol, Forecast, GbrtParams, GradientBoostedTrees};
use crate::types::{Market, PredictionRecord};
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastReport {
    pub market: Market,
    pub decision: GateDecision,
    pub trading_day: bool,
    pub horizon_days: u32,
    pub settled: usize,
    pub scanned: usize,
    pub failures: usize,
    pub picks: Vec<Forecast>,
}

impl ForecastReport {
    fn skipped(market: Market, decision: GateDecision) -> Self {
        Self {
            market,
            decision,
            trading_day: false,
            horizon_days: 0,
            settled: 0,
            scanned: 0,
            failures: 0,
            picks: Vec::new(),
        }
    }
}

/// Largest absolute predicted return first
pub fn top_picks(mut forecasts: Vec<Forecast>, count: usize) -> Vec<Forecast> {
    forecasts.sort_by(|a, b| {
        b.predicted_return
            .abs()
            .total_cmp(&a.predicted_return.abs())
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    forecasts.truncate(count);
    forecasts
}

pub async fn run(ctx: &JobContext, market: Market, now: DateTime<Utc>) -> Result<ForecastReport> {
    let market_config = ctx.market_config(market)?;

    let decision = ctx.gate().check("forecast", now).await?;
    if decision.is_halt() {
        announce_halt(ctx, "forecast", &decision).await;
        return Ok(ForecastReport::skipped(market, decision));
    }

    let today = ctx.local_date(now);
    if !is_trading_day(ctx.market_data.as_ref(), &market_config.index_symbol, today).await {
        tracing::info!(%market, %today, "Market closed, forecast skipped");
        return Ok(ForecastReport::skipped(market, decision));
    }

    let settled = settlement::run(ctx, now).await?;
    let pool = explorer::load_pool(&ctx.db, market).await?;
    let horizon = performance::current_horizon(&ctx.db, market, &ctx.config.performance).await?;
    let symbols = decision.symbols(market_config, &pool);
    tracing::info!(%market, symbols = symbols.len(), horizon, "Forecasting");

    let model_config = &ctx.config.model;
    let mut forecasts = Vec::new();
    let mut failures = 0;
    for symbol in &symbols {
        let bars = match ctx.market_data.history(symbol, HistoryRange::TwoYears).await {
            Ok(bars) => bars,
            Err(e) => {
                failures += 1;
                tracing::debug!(symbol = %symbol, error = %e, "History fetch failed");
                continue;
            }
        };
        let mut model = GradientBoostedTrees::new(GbrtParams::from(model_config));
        match forecast_symbol(&mut model, symbol, &bars, horizon as usize, model_config) {
            Ok(forecast) => forecasts.push(forecast),
            Err(e) => {
                failures += 1;
                tracing::debug!(symbol = %symbol, error = %e, "Forecast skipped");
            }
        }
    }

    let picks = top_picks(forecasts, model_config.top_picks);
    for pick in &picks {
        let record = PredictionRecord {
            id: None,
            market,
            entry_date: today,
            symbol: pick.symbol.clone(),
            entry_price: pick.price,
            predicted_return: pick.predicted_return,
            horizon_days: horizon,
            reduced_confidence: decision.reduced_confidence(),
            settled: false,
            realized_return: None,
            hit: None,
        };
        ctx.db.insert_prediction(&record).await?;
    }

    let message = report_message(market, today, &decision, horizon, &settled, &picks);
    ctx.notifiers.report.deliver_text(&message).await;

    tracing::info!(
        %market,
        scanned = symbols.len(),
        failures,
        picks = picks.len(),
        "Forecast finished"
    );
    Ok(ForecastReport {
        market,
        decision,
        trading_day: true,
        horizon_days: horizon,
        settled: settled.settled,
        scanned: symbols.len(),
        failures,
        picks,
    })
}

fn report_message(
    market: Market,
    today: NaiveDate,
    decision: &GateDecision,
    horizon: u32,
    settled: &settlement::SettlementReport,
    picks: &[Forecast],
) -> String {
    let mut msg = format!("📊 **{} AI forecast ({})**\n", market, today);
    match decision {
        GateDecision::Reduced { reason: ReducedReason::Warning } => {
            msg.push_str("⚠️ L3 warning: core watchlist only, reduced confidence\n");
        }
        GateDecision::Reduced { reason: ReducedReason::Observation } => {
            msg.push_str("⚠️ Post-L4 observation: core watchlist only, reduced confidence\n");
        }
        _ => {}
    }

    if settled.lines.is_empty() {
        let _ = writeln!(msg, "\n📊 **{}-day backtest**: nothing to settle", horizon);
    } else {
        let _ = writeln!(msg, "\n🏁 **Settlement**");
        for line in &settled.lines {
            let _ = writeln!(msg, "{}", line);
        }
    }

    for pick in picks {
        let _ = write!(
            msg,
            "\n🎯 `{}`: predicted `{}` | support `{}` resistance `{}`",
            pick.symbol,
            fmt_pct(pick.predicted_return),
            pick.support,
            pick.resistance
        );
    }
    msg.push_str("\n\n💡 Probabilistic model, for research only");
    msg
}
