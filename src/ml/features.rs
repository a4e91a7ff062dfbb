//! Feature engineering from daily bars
//!
//! Three rolling features per day:
//! - `mom20`: close over the close `window` bars earlier, minus one
//! - `bias`: distance of the close from its `window`-bar mean
//! - `vol_ratio`: volume over its `window`-bar mean

use crate::types::Bar;
use rust_decimal::prelude::*;

pub const FEATURE_NAMES: [&str; 3] = ["mom20", "bias", "vol_ratio"];

/// Features for one bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureRow {
    pub mom20: f64,
    pub bias: f64,
    pub vol_ratio: f64,
}

impl FeatureRow {
    pub fn to_vec(&self) -> Vec<f64> {
        vec![self.mom20, self.bias, self.vol_ratio]
    }
}

/// Feature row for every bar; `None` until the window is filled or when
/// an input is degenerate.
pub fn compute_features(bars: &[Bar], window: usize) -> Vec<Option<FeatureRow>> {
    let mut rows = Vec::with_capacity(bars.len());
    for t in 0..bars.len() {
        if window == 0 || t < window {
            rows.push(None);
            continue;
        }
        let recent = &bars[t + 1 - window..=t];
        let mean_close = recent.iter().map(|b| b.close).sum::<f64>() / window as f64;
        let mean_volume = recent.iter().map(|b| b.volume).sum::<f64>() / window as f64;
        let past = bars[t - window].close;
        let close = bars[t].close;

        let row = FeatureRow {
            mom20: close / past - 1.0,
            bias: (close - mean_close) / mean_close,
            vol_ratio: bars[t].volume / mean_volume,
        };
        let finite = row.mom20.is_finite() && row.bias.is_finite() && row.vol_ratio.is_finite();
        rows.push(finite.then_some(row));
    }
    rows
}

/// Training rows and `horizon`-bar forward returns. The last `horizon`
/// bars have no target and are excluded.
pub fn training_set(bars: &[Bar], window: usize, horizon: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut x = Vec::new();
    let mut y = Vec::new();
    if horizon == 0 {
        return (x, y);
    }
    let features = compute_features(bars, window);
    for (t, row) in features.iter().enumerate() {
        let Some(row) = row else { continue };
        let Some(future) = bars.get(t + horizon) else { break };
        let target = future.close / bars[t].close - 1.0;
        if target.is_finite() {
            x.push(row.to_vec());
            y.push(target);
        }
    }
    (x, y)
}

/// Features of the most recent bar
pub fn latest_features(bars: &[Bar], window: usize) -> Option<FeatureRow> {
    compute_features(bars, window).last().copied().flatten()
}

/// Classic floor-trader pivot levels over the last `window` bars
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PivotLevels {
    pub support: Decimal,
    pub resistance: Decimal,
}

pub fn pivot_levels(bars: &[Bar], window: usize) -> Option<PivotLevels> {
    if bars.is_empty() || window == 0 {
        return None;
    }
    let recent = &bars[bars.len().saturating_sub(window)..];
    let high = recent.iter().map(|b| b.high).fold(f64::MIN, f64::max);
    let low = recent.iter().map(|b| b.low).fold(f64::MAX, f64::min);
    let close = recent.last()?.close;
    let pivot = (high + low + close) / 3.0;

    Some(PivotLevels {
        support: Decimal::from_f64(2.0 * pivot - high)?.round_dp(2),
        resistance: Decimal::from_f64(2.0 * pivot - low)?.round_dp(2),
    })
}
