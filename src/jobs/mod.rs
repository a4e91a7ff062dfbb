//! Scheduled jobs
//!
//! Each job is one short-lived invocation over a shared `JobContext`.
//! Per-symbol fetch failures are counted and logged inside the job; only
//! storage and configuration errors end a run early.

pub mod explorer;
pub mod forecast;
pub mod impact;
pub mod l4_review;
pub mod news_radar;
pub mod pause_policy;
pub mod performance;
pub mod settlement;
pub mod sweep;


use crate::classifier::NewsClassifier;
use crate::client::{GoogleNewsClient, HistoryRange, MarketDataSource, NewsSource, YahooClient};
use crate::config::{Config, MarketConfig};
use crate::error::{Result, SentinelError};
use crate::gate::{Gate, GateDecision};
use crate::mode::ModeStore;
use crate::notify::Notifiers;
use crate::recovery::fmt_local;
use crate::storage::Database;
use crate::types::Market;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// Everything a job needs
pub struct JobContext {
    pub config: Config,
    pub db: Database,
    pub store: ModeStore,
    pub market_data: Arc<dyn MarketDataSource>,
    pub news: Arc<dyn NewsSource>,
    pub notifiers: Notifiers,
    pub classifier: NewsClassifier,
}

impl JobContext {
    pub fn new(
        config: Config,
        db: Database,
        market_data: Arc<dyn MarketDataSource>,
        news: Arc<dyn NewsSource>,
        notifiers: Notifiers,
    ) -> Self {
        let store = ModeStore::new(db.clone(), &config);
        Self {
            config,
            db,
            store,
            market_data,
            news,
            notifiers,
            classifier: NewsClassifier::default(),
        }
    }

    /// Production wiring: SQLite file, Yahoo, Google News and Discord
    pub async fn from_config(config: Config) -> Result<Self> {
        let db = Database::connect(&config.storage.path).await?;
        let market_data = Arc::new(YahooClient::new(&config.market_data)?);
        let news = Arc::new(GoogleNewsClient::new(&config.news)?);
        let notifiers = Notifiers::from_config(&config.discord);
        Ok(Self::new(config, db, market_data, news, notifiers))
    }

    pub fn gate(&self) -> Gate<'_> {
        Gate::new(&self.store)
    }

    pub fn offset(&self) -> FixedOffset {
        self.config.display_offset()
    }

    /// Calendar date at the display offset
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset()).date_naive()
    }

    pub fn market_config(&self, market: Market) -> Result<&MarketConfig> {
        self.config
            .market(market)
            .ok_or_else(|| SentinelError::InvalidConfig(format!("market {} is not configured", market)))
    }
}

/// Run `job` inside a `job` span tagged with a fresh run id
pub async fn run_job<T, F>(name: &'static str, job: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let span = tracing::info_span!("job", name, run_id = %Uuid::new_v4());
    async move {
        tracing::info!("Job started");
        let started = Instant::now();
        let result = job.await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => tracing::info!(elapsed_ms, "Job finished"),
            Err(e) => tracing::error!(elapsed_ms, error = %e, "Job failed"),
        }
        result
    }
    .instrument(span)
    .await
}

/// Post the halt notice if this run claimed it
pub(crate) async fn announce_halt(ctx: &JobContext, job: &str, decision: &GateDecision) {
    let GateDecision::Halt { until, notify: Some(episode) } = decision else {
        return;
    };
    let offset = ctx.offset();
    let until = until
        .map(|t| fmt_local(t, offset))
        .unwrap_or_else(|| "further notice".to_string());
    let content = format!(
        "⛔ **L4 active**: {} and all downstream jobs are paused until {}\n🕒 Since {}",
        job,
        until,
        fmt_local(episode.started_at, offset)
    );
    ctx.notifiers.black_swan.deliver_text(&content).await;
}

/// Smallest history range that still reaches back to `from`
pub(crate) fn range_since(from: NaiveDate, today: NaiveDate) -> HistoryRange {
    let days = (today - from).num_days();
    if days <= 25 {
        HistoryRange::OneMonth
    } else if days <= 85 {
        HistoryRange::ThreeMonths
    } else if days <= 360 {
        HistoryRange::OneYear
    } else {
        HistoryRange::TwoYears
    }
}

pub(crate) fn fmt_pct(value: f64) -> String {
    format!("{:+.2}%", value * 100.0)
}
