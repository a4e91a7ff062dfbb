//! Tests for the forecasting pipeline

use super::*;
use chrono::{Duration, NaiveDate};
use rust_decimal_macros::dec;

fn bars_from(closes: &[f64]) -> Vec<Bar> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, c)| Bar {
            date: start + Duration::days(i as i64),
            open: *c,
            high: c * 1.01,
            low: c * 0.99,
            close: *c,
            volume: 1000.0 + (i % 7) as f64 * 100.0,
        })
        .collect()
}

fn trending(n: usize) -> Vec<Bar> {
    let closes: Vec<f64> = (0..n)
        .map(|i| 100.0 * (1.0 + 0.002 * i as f64) + (i as f64 * 0.7).sin())
        .collect();
    bars_from(&closes)
}

#[test]
fn test_features_need_a_full_window() {
    let bars = trending(30);
    let rows = compute_features(&bars, 20);
    assert!(rows[..20].iter().all(|r| r.is_none()));
    assert!(rows[20..].iter().all(|r| r.is_some()));
}

#[test]
fn test_feature_values() {
    let mut closes = vec![100.0; 20];
    closes.push(110.0);
    let bars = bars_from(&closes);
    let row = latest_features(&bars, 20).unwrap();
    assert!((row.mom20 - 0.10).abs() < 1e-12);
    // Mean over the last 20 closes: 19 x 100 + 110
    let mean = (19.0 * 100.0 + 110.0) / 20.0;
    assert!((row.bias - (110.0 - mean) / mean).abs() < 1e-12);
    assert!(row.vol_ratio > 0.0);
}

#[test]
fn test_training_set_excludes_last_horizon() {
    let bars = trending(60);
    let (x, y) = training_set(&bars, 20, 5);
    // Rows 20..=54 have a target five bars ahead
    assert_eq!(x.len(), 35);
    assert_eq!(y.len(), 35);
    let expected = bars[25].close / bars[20].close - 1.0;
    assert!((y[0] - expected).abs() < 1e-12);

    let (x0, _) = training_set(&bars, 20, 0);
    assert!(x0.is_empty());
}

#[test]
fn test_pivot_levels() {
    let bars = bars_from(&[10.0, 12.0, 11.0]);
    let levels = pivot_levels(&bars, 20).unwrap();
    // high 12.12, low 9.9, close 11 -> pivot 11.006..
    assert_eq!(levels.support, dec!(9.89));
    assert_eq!(levels.resistance, dec!(12.11));
    assert!(pivot_levels(&[], 20).is_none());
}

#[test]
fn test_gbrt_fits_step_function() {
    let x: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64, 0.0]).collect();
    let y: Vec<f64> = (0..40).map(|i| if i < 20 { -1.0 } else { 1.0 }).collect();
    let mut model = GradientBoostedTrees::new(GbrtParams {
        n_estimators: 200,
        max_depth: 2,
        learning_rate: 0.1,
        min_samples_leaf: 1,
    });
    model.fit(&x, &y).unwrap();
    assert_eq!(model.n_trees(), 200);
    assert!(model.predict(&[5.0, 0.0]) < -0.9);
    assert!(model.predict(&[35.0, 0.0]) > 0.9);
}

#[test]
fn test_gbrt_constant_target() {
    let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
    let y = vec![0.25; 10];
    let mut model = GradientBoostedTrees::new(GbrtParams::default());
    model.fit(&x, &y).unwrap();
    assert!((model.predict(&[3.0]) - 0.25).abs() < 1e-12);
}

#[test]
fn test_gbrt_rejects_empty_input() {
    let mut model = GradientBoostedTrees::new(GbrtParams::default());
    assert!(model.fit(&[], &[]).is_err());
    assert!(model.fit(&[vec![1.0]], &[1.0, 2.0]).is_err());
}

#[test]
fn test_forecast_symbol() {
    let config = ModelConfig {
        n_estimators: 20,
        ..ModelConfig::default()
    };
    let bars = trending(200);
    let mut model = GradientBoostedTrees::new(GbrtParams::from(&config));
    let forecast = forecast_symbol(&mut model, "AAPL", &bars, 5, &config).unwrap();
    assert_eq!(forecast.symbol, "AAPL");
    assert!(forecast.predicted_return.is_finite());
    assert!(forecast.support <= forecast.resistance);
    assert_eq!(forecast.price.scale(), 2);
}

#[test]
fn test_forecast_requires_history() {
    let config = ModelConfig::default();
    let bars = trending(149);
    let mut model = GradientBoostedTrees::new(GbrtParams::from(&config));
    let err = forecast_symbol(&mut model, "NEW", &bars, 5, &config).unwrap_err();
    assert!(matches!(err, SentinelError::DataUnavailable(_)));
}
