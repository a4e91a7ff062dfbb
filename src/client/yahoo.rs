//! Yahoo Finance chart API client
//!
//! Fetches daily bars from `/v8/finance/chart/{symbol}`. Prices are
//! adjusted by the `adjclose / close` ratio of each row; rows with missing
//! fields are dropped.

use super::{HistoryRange, MarketDataSource};
use crate::config::MarketDataConfig;
use crate::error::{FetchError, FetchResult, Result};
use crate::types::Bar;
use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

/// Yahoo chart API client
#[derive(Clone)]
pub struct YahooClient {
    http: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Default, Deserialize)]
struct ChartMeta {
    /// Exchange offset from UTC in seconds
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
    #[serde(default)]
    adjclose: Vec<AdjClose>,
}

#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

impl YahooClient {
    pub fn new(config: &MarketDataConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MarketDataSource for YahooClient {
    async fn history(&self, symbol: &str, range: HistoryRange) -> FetchResult<Vec<Bar>> {
        let url = format!(
            "{}/v8/finance/chart/{}",
            self.base_url,
            symbol.replace('^', "%5E")
        );
        let resp = self
            .http
            .get(&url)
            .query(&[("range", range.as_str()), ("interval", "1d")])
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(symbol, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                target: symbol.to_string(),
                status: status.as_u16(),
            });
        }

        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(symbol, e))?;
        let bars = parse_chart(symbol, &body)?;
        debug!(symbol, range = range.as_str(), bars = bars.len(), "Fetched history");
        Ok(bars)
    }
}

/// Decode a chart API response body into adjusted bars
pub fn parse_chart(symbol: &str, body: &str) -> FetchResult<Vec<Bar>> {
    let resp: ChartResponse = serde_json::from_str(body).map_err(|e| FetchError::Malformed {
        target: symbol.to_string(),
        reason: e.to_string(),
    })?;

    if let Some(err) = resp.chart.error {
        if err.code.eq_ignore_ascii_case("Not Found") {
            return Err(FetchError::Empty(symbol.to_string()));
        }
        return Err(FetchError::Malformed {
            target: symbol.to_string(),
            reason: format!("{}: {}", err.code, err.description.unwrap_or_default()),
        });
    }

    let Some(result) = resp.chart.result.and_then(|r| r.into_iter().next()) else {
        return Err(FetchError::Empty(symbol.to_string()));
    };
    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let adjclose = result
        .indicators
        .adjclose
        .into_iter()
        .next()
        .map(|a| a.adjclose)
        .unwrap_or_default();

    let mut bars = Vec::with_capacity(result.timestamp.len());
    for (i, ts) in result.timestamp.iter().enumerate() {
        let field = |v: &Vec<Option<f64>>| v.get(i).copied().flatten();
        let (Some(open), Some(high), Some(low), Some(close)) =
            (field(&quote.open), field(&quote.high), field(&quote.low), field(&quote.close))
        else {
            continue;
        };
        if close <= 0.0 {
            continue;
        }
        let factor = field(&adjclose).map(|adj| adj / close).unwrap_or(1.0);
        let Some(local) = DateTime::from_timestamp(ts + result.meta.gmtoffset, 0) else {
            continue;
        };
        bars.push(Bar {
            date: local.date_naive(),
            open: open * factor,
            high: high * factor,
            low: low * factor,
            close: close * factor,
            volume: field(&quote.volume).unwrap_or(0.0),
        });
    }

    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);

    if bars.is_empty() {
        return Err(FetchError::Empty(symbol.to_string()));
    }
    Ok(bars)
}
