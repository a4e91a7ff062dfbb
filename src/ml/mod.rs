//! Return forecasting
//!
//! Per-symbol pipeline:
//! - Feature engineering from daily bars (`features`)
//! - Gradient-boosted regression trees (`gbrt`) behind the `Regressor` trait
//! - Pivot support/resistance for the report

pub mod features;
pub mod gbrt;

#[cfg(test)]
mod tests;

pub use features::{compute_features, latest_features, pivot_levels, training_set, FeatureRow, PivotLevels};
pub use gbrt::{GbrtParams, GradientBoostedTrees};

use crate::config::ModelConfig;
use crate::error::{Result, SentinelError};
use crate::types::Bar;
use rust_decimal::prelude::*;

/// A model that can be fit on feature rows and predict one row
pub trait Regressor {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()>;
    fn predict(&self, row: &[f64]) -> f64;
}

/// Forecast for one symbol
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    pub symbol: String,
    /// Last close, rounded to cents
    pub price: Decimal,
    pub predicted_return: f64,
    pub support: Decimal,
    pub resistance: Decimal,
}

/// Fit a fresh model on `bars` and forecast the `horizon`-day return
pub fn forecast_symbol<R: Regressor>(
    model: &mut R,
    symbol: &str,
    bars: &[Bar],
    horizon: usize,
    config: &ModelConfig,
) -> Result<Forecast> {
    if bars.len() < config.min_history {
        return Err(SentinelError::DataUnavailable(format!(
            "{}: {} bars, need {}",
            symbol,
            bars.len(),
            config.min_history
        )));
    }

    let (x, y) = training_set(bars, config.feature_window, horizon);
    if x.is_empty() {
        return Err(SentinelError::DataUnavailable(format!("{}: no training rows", symbol)));
    }
    let latest = latest_features(bars, config.feature_window)
        .ok_or_else(|| SentinelError::DataUnavailable(format!("{}: no features for latest bar", symbol)))?;

    model.fit(&x, &y)?;
    let predicted_return = model.predict(&latest.to_vec());

    let pivots = pivot_levels(bars, config.feature_window)
        .ok_or_else(|| SentinelError::DataUnavailable(format!("{}: no pivot levels", symbol)))?;
    let last_close = bars.last().map(|b| b.close).unwrap_or_default();
    let price = Decimal::from_f64(last_close)
        .ok_or_else(|| SentinelError::DataUnavailable(format!("{}: bad close {}", symbol, last_close)))?
        .round_dp(2);

    Ok(Forecast {
        symbol: symbol.to_string(),
        price,
        predicted_return,
        support: pivots.support,
        resistance: pivots.resistance,
    })
}
