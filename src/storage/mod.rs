//! SQLite persistence
//!
//! One database file holds the severity event log, the news cache, keyed
//! JSON state records (mode, horizon policy, explorer pools, pause policy),
//! the prediction log, performance snapshots and L4 episodes.
//!
//! Timestamps are stored as unix milliseconds, dates as `YYYY-MM-DD` text
//! and decimals as text.


use crate::classifier::Severity;
use crate::error::{Result, SentinelError};
use crate::types::{AiReview, L4Episode, Market, PerformanceSnapshot, PredictionRecord, SeverityEvent};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::SqliteConnection;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS state_records (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        revision INTEGER NOT NULL DEFAULT 0,
        updated_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS severity_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        occurred_at INTEGER NOT NULL,
        symbol TEXT NOT NULL,
        market TEXT,
        headline TEXT NOT NULL,
        link TEXT NOT NULL,
        level INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_severity_events_level_time
        ON severity_events (level, occurred_at)",
    "CREATE TABLE IF NOT EXISTS news_cache (
        symbol TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS predictions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        market TEXT NOT NULL,
        entry_date TEXT NOT NULL,
        symbol TEXT NOT NULL,
        entry_price TEXT NOT NULL,
        predicted_return REAL NOT NULL,
        horizon_days INTEGER NOT NULL,
        reduced_confidence INTEGER NOT NULL DEFAULT 0,
        settled INTEGER NOT NULL DEFAULT 0,
        realized_return REAL,
        hit INTEGER,
        settled_at INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS idx_predictions_market_date
        ON predictions (market, entry_date)",
    "CREATE TABLE IF NOT EXISTS performance_metrics (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        market TEXT NOT NULL,
        recorded_at INTEGER NOT NULL,
        horizon_days INTEGER NOT NULL,
        hit_rate REAL NOT NULL,
        avg_return REAL NOT NULL,
        cum_return REAL NOT NULL,
        max_drawdown REAL NOT NULL,
        sample_count INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS l4_episodes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        started_at INTEGER NOT NULL,
        pause_until INTEGER NOT NULL,
        ended_at INTEGER,
        halt_notified INTEGER NOT NULL DEFAULT 0,
        postmortem_sent INTEGER NOT NULL DEFAULT 0,
        review_sent INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS l4_ai_reviews (
        episode_id INTEGER NOT NULL,
        market TEXT NOT NULL,
        started_at INTEGER NOT NULL,
        ended_at INTEGER NOT NULL,
        sample_count INTEGER NOT NULL,
        hit_rate REAL,
        avg_return REAL,
        PRIMARY KEY (episode_id, market)
    )",
];

/// Handle to the sentinel database. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the database at `path` and apply the schema
    pub async fn connect(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        tracing::debug!(path, "Database ready");
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ---- keyed state records ----

    /// Decode the record at `key`. A value that does not parse is an error.
    pub async fn get_state<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_state_raw(key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| SentinelError::InvalidState {
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    pub async fn get_state_raw(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.pool.acquire().await?;
        read_state(&mut conn, key).await
    }

    /// Upsert the record at `key`, bumping its revision
    pub async fn put_state<T: Serialize>(&self, key: &str, value: &T, now: DateTime<Utc>) -> Result<()> {
        let json = serde_json::to_string(value)?;
        sqlx::query(
            "INSERT INTO state_records (key, value, revision, updated_at) VALUES (?, ?, 1, ?)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                revision = state_records.revision + 1,
                updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(json)
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- severity events ----

    pub async fn insert_severity_event(&self, event: &SeverityEvent) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        insert_event(&mut conn, event).await
    }

    /// Events with `level >= min_level` in `[start, end]`, oldest first
    pub async fn severity_events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        min_level: Severity,
    ) -> Result<Vec<SeverityEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(
            "SELECT occurred_at, symbol, market, headline, link, level FROM severity_events
             WHERE occurred_at >= ? AND occurred_at <= ? AND level >= ?
             ORDER BY occurred_at ASC, id ASC",
        )
        .bind(start.timestamp_millis())
        .bind(end.timestamp_millis())
        .bind(min_level.level() as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EventRow::into_event).collect()
    }

    /// Whether `symbol` already logged `headline` at or after `since`
    pub async fn event_logged_since(&self, symbol: &str, headline: &str, since: DateTime<Utc>) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM severity_events
             WHERE symbol = ? AND headline = ? AND occurred_at >= ?",
        )
        .bind(symbol)
        .bind(headline)
        .bind(since.timestamp_millis())
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    // ---- news cache ----

    pub async fn cached_title(&self, symbol: &str) -> Result<Option<String>> {
        let title = sqlx::query_scalar::<_, String>("SELECT title FROM news_cache WHERE symbol = ?")
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await?;
        Ok(title)
    }

    pub async fn cache_title(&self, symbol: &str, title: &str, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "INSERT INTO news_cache (symbol, title, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(symbol) DO UPDATE SET title = excluded.title, updated_at = excluded.updated_at",
        )
        .bind(symbol)
        .bind(title)
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- prediction log ----

    pub async fn insert_prediction(&self, prediction: &PredictionRecord) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO predictions
                (market, entry_date, symbol, entry_price, predicted_return, horizon_days, reduced_confidence)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(prediction.market.as_str())
        .bind(prediction.entry_date)
        .bind(&prediction.symbol)
        .bind(prediction.entry_price.to_string())
        .bind(prediction.predicted_return)
        .bind(prediction.horizon_days as i64)
        .bind(prediction.reduced_confidence)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn unsettled_predictions(&self) -> Result<Vec<PredictionRecord>> {
        let rows = sqlx::query_as::<_, PredictionRow>(
            "SELECT * FROM predictions WHERE settled = 0 ORDER BY entry_date ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PredictionRow::into_record).collect()
    }

    /// Record the outcome of one prediction. Returns false if another
    /// settler got there first.
    pub async fn settle_prediction(
        &self,
        id: i64,
        realized_return: f64,
        hit: bool,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE predictions SET settled = 1, realized_return = ?, hit = ?, settled_at = ?
             WHERE id = ? AND settled = 0",
        )
        .bind(realized_return)
        .bind(hit)
        .bind(now.timestamp_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// The newest forecast run for `market`, best predicted return first
    pub async fn latest_picks(&self, market: Market, limit: usize) -> Result<Vec<PredictionRecord>> {
        let rows = sqlx::query_as::<_, PredictionRow>(
            "SELECT * FROM predictions
             WHERE market = ?1
               AND entry_date = (SELECT MAX(entry_date) FROM predictions WHERE market = ?1)
             ORDER BY predicted_return DESC, id ASC
             LIMIT ?2",
        )
        .bind(market.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PredictionRow::into_record).collect()
    }

    /// Every symbol that has ever been predicted
    pub async fn predicted_symbols(&self) -> Result<Vec<String>> {
        let symbols = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT symbol FROM predictions ORDER BY symbol",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(symbols)
    }

    /// Predictions with `start <= entry_date <= end`
    pub async fn predictions_between(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<PredictionRecord>> {
        let rows = sqlx::query_as::<_, PredictionRow>(
            "SELECT * FROM predictions WHERE entry_date >= ? AND entry_date <= ?
             ORDER BY entry_date ASC, id ASC",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PredictionRow::into_record).collect()
    }

    /// Most recent settled predictions for `market`, newest first
    pub async fn recent_settled(&self, market: Market, limit: usize) -> Result<Vec<PredictionRecord>> {
        let rows = sqlx::query_as::<_, PredictionRow>(
            "SELECT * FROM predictions WHERE market = ? AND settled = 1
             ORDER BY entry_date DESC, id DESC
             LIMIT ?",
        )
        .bind(market.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PredictionRow::into_record).collect()
    }

    /// Latest `limit` settled predictions for `market` entered on or before
    /// `until`, newest first
    pub async fn settled_until(&self, market: Market, until: NaiveDate, limit: usize) -> Result<Vec<PredictionRecord>> {
        let rows = sqlx::query_as::<_, PredictionRow>(
            "SELECT * FROM predictions WHERE market = ? AND settled = 1 AND entry_date <= ?
             ORDER BY entry_date DESC, id DESC
             LIMIT ?",
        )
        .bind(market.as_str())
        .bind(until)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PredictionRow::into_record).collect()
    }

    // ---- performance metrics ----

    pub async fn insert_snapshot(&self, snapshot: &PerformanceSnapshot) -> Result<()> {
        sqlx::query(
            "INSERT INTO performance_metrics
                (market, recorded_at, horizon_days, hit_rate, avg_return, cum_return, max_drawdown, sample_count)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(snapshot.market.as_str())
        .bind(snapshot.recorded_at.timestamp_millis())
        .bind(snapshot.horizon_days as i64)
        .bind(snapshot.hit_rate)
        .bind(snapshot.avg_return)
        .bind(snapshot.cum_return)
        .bind(snapshot.max_drawdown)
        .bind(snapshot.sample_count as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Latest `limit` snapshots for `market`, newest first
    pub async fn recent_snapshots(&self, market: Market, limit: usize) -> Result<Vec<PerformanceSnapshot>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            "SELECT market, recorded_at, horizon_days, hit_rate, avg_return, cum_return, max_drawdown, sample_count
             FROM performance_metrics WHERE market = ?
             ORDER BY recorded_at DESC, id DESC
             LIMIT ?",
        )
        .bind(market.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SnapshotRow::into_snapshot).collect()
    }

    // ---- L4 episodes ----

    /// The episode that is still running, if any
    pub async fn open_episode(&self) -> Result<Option<L4Episode>> {
        let mut conn = self.pool.acquire().await?;
        current_episode(&mut conn).await
    }

    pub async fn latest_episode(&self) -> Result<Option<L4Episode>> {
        let row = sqlx::query_as::<_, EpisodeRow>(
            "SELECT * FROM l4_episodes ORDER BY started_at DESC, id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        row.map(EpisodeRow::into_episode).transpose()
    }

    /// Finished episodes, oldest first
    pub async fn closed_episodes(&self) -> Result<Vec<L4Episode>> {
        let rows = sqlx::query_as::<_, EpisodeRow>(
            "SELECT * FROM l4_episodes WHERE ended_at IS NOT NULL ORDER BY started_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(EpisodeRow::into_episode).collect()
    }

    /// Claim the one halt notification of an episode
    pub async fn claim_halt_notification(&self, episode_id: i64) -> Result<bool> {
        self.claim_flag("halt_notified", episode_id).await
    }

    /// Claim the one postmortem of an episode
    pub async fn claim_postmortem(&self, episode_id: i64) -> Result<bool> {
        self.claim_flag("postmortem_sent", episode_id).await
    }

    /// Claim the one AI review of an episode
    pub async fn claim_review(&self, episode_id: i64) -> Result<bool> {
        self.claim_flag("review_sent", episode_id).await
    }

    pub async fn insert_ai_review(&self, review: &AiReview) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO l4_ai_reviews
                (episode_id, market, started_at, ended_at, sample_count, hit_rate, avg_return)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(review.episode_id)
        .bind(review.market.as_str())
        .bind(review.started_at.timestamp_millis())
        .bind(review.ended_at.timestamp_millis())
        .bind(review.sample_count as i64)
        .bind(review.hit_rate)
        .bind(review.avg_return)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Recorded reviews, oldest episode first
    pub async fn ai_reviews(&self) -> Result<Vec<AiReview>> {
        let rows = sqlx::query_as::<_, ReviewRow>(
            "SELECT * FROM l4_ai_reviews ORDER BY episode_id ASC, market ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ReviewRow::into_review).collect()
    }

    async fn claim_flag(&self, column: &'static str, episode_id: i64) -> Result<bool> {
        let sql = format!(
            "UPDATE l4_episodes SET {col} = 1 WHERE id = ? AND {col} = 0",
            col = column
        );
        let result = sqlx::query(&sql).bind(episode_id).execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }
}

// ---- statements shared with the mode store transaction ----

pub(crate) async fn read_state(conn: &mut SqliteConnection, key: &str) -> Result<Option<String>> {
    let value = sqlx::query_scalar::<_, String>("SELECT value FROM state_records WHERE key = ?")
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(value)
}

/// Insert `value` only if `key` is absent. Always takes the write lock.
pub(crate) async fn seed_state(
    conn: &mut SqliteConnection,
    key: &str,
    value: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO state_records (key, value, revision, updated_at) VALUES (?, ?, 0, ?)")
        .bind(key)
        .bind(value)
        .bind(now.timestamp_millis())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub(crate) async fn write_state(
    conn: &mut SqliteConnection,
    key: &str,
    value: &str,
    revision: u64,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("UPDATE state_records SET value = ?, revision = ?, updated_at = ? WHERE key = ?")
        .bind(value)
        .bind(revision as i64)
        .bind(now.timestamp_millis())
        .bind(key)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub(crate) async fn insert_event(conn: &mut SqliteConnection, event: &SeverityEvent) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO severity_events (occurred_at, symbol, market, headline, link, level)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(event.occurred_at.timestamp_millis())
    .bind(&event.symbol)
    .bind(event.market.map(|m| m.as_str()))
    .bind(&event.headline)
    .bind(&event.link)
    .bind(event.level.level() as i64)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Level-3 event times in `[since, until]`, oldest first
pub(crate) async fn severe_times(
    conn: &mut SqliteConnection,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Vec<DateTime<Utc>>> {
    let millis = sqlx::query_scalar::<_, i64>(
        "SELECT occurred_at FROM severity_events
         WHERE level >= ? AND occurred_at >= ? AND occurred_at <= ?
         ORDER BY occurred_at ASC",
    )
    .bind(Severity::Severe.level() as i64)
    .bind(since.timestamp_millis())
    .bind(until.timestamp_millis())
    .fetch_all(&mut *conn)
    .await?;
    millis.into_iter().map(from_millis).collect()
}

pub(crate) async fn current_episode(conn: &mut SqliteConnection) -> Result<Option<L4Episode>> {
    let row = sqlx::query_as::<_, EpisodeRow>(
        "SELECT * FROM l4_episodes WHERE ended_at IS NULL ORDER BY started_at DESC, id DESC LIMIT 1",
    )
    .fetch_optional(&mut *conn)
    .await?;
    row.map(EpisodeRow::into_episode).transpose()
}

pub(crate) async fn start_episode(
    conn: &mut SqliteConnection,
    started_at: DateTime<Utc>,
    pause_until: DateTime<Utc>,
) -> Result<i64> {
    let result = sqlx::query("INSERT INTO l4_episodes (started_at, pause_until) VALUES (?, ?)")
        .bind(started_at.timestamp_millis())
        .bind(pause_until.timestamp_millis())
        .execute(&mut *conn)
        .await?;
    Ok(result.last_insert_rowid())
}

pub(crate) async fn extend_episode(conn: &mut SqliteConnection, pause_until: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE l4_episodes SET pause_until = ? WHERE ended_at IS NULL")
        .bind(pause_until.timestamp_millis())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub(crate) async fn end_episode(conn: &mut SqliteConnection, ended_at: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE l4_episodes SET ended_at = ? WHERE ended_at IS NULL")
        .bind(ended_at.timestamp_millis())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| SentinelError::Internal(format!("timestamp out of range: {}", ms)))
}

fn parse_market(raw: &str) -> Result<Market> {
    Market::from_str(raw).map_err(SentinelError::Internal)
}

#[derive(sqlx::FromRow)]
struct EventRow {
    occurred_at: i64,
    symbol: String,
    market: Option<String>,
    headline: String,
    link: String,
    level: i64,
}

impl EventRow {
    fn into_event(self) -> Result<SeverityEvent> {
        let level = u8::try_from(self.level)
            .ok()
            .and_then(Severity::from_level)
            .ok_or_else(|| SentinelError::Internal(format!("invalid severity level {}", self.level)))?;
        Ok(SeverityEvent {
            occurred_at: from_millis(self.occurred_at)?,
            symbol: self.symbol,
            market: self.market.as_deref().map(parse_market).transpose()?,
            headline: self.headline,
            link: self.link,
            level,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PredictionRow {
    id: i64,
    market: String,
    entry_date: NaiveDate,
    symbol: String,
    entry_price: String,
    predicted_return: f64,
    horizon_days: i64,
    reduced_confidence: bool,
    settled: bool,
    realized_return: Option<f64>,
    hit: Option<bool>,
}

impl PredictionRow {
    fn into_record(self) -> Result<PredictionRecord> {
        let entry_price = Decimal::from_str(&self.entry_price).map_err(|e| {
            SentinelError::Internal(format!("bad entry price '{}': {}", self.entry_price, e))
        })?;
        Ok(PredictionRecord {
            id: Some(self.id),
            market: parse_market(&self.market)?,
            entry_date: self.entry_date,
            symbol: self.symbol,
            entry_price,
            predicted_return: self.predicted_return,
            horizon_days: self.horizon_days.max(0) as u32,
            reduced_confidence: self.reduced_confidence,
            settled: self.settled,
            realized_return: self.realized_return,
            hit: self.hit,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    market: String,
    recorded_at: i64,
    horizon_days: i64,
    hit_rate: f64,
    avg_return: f64,
    cum_return: f64,
    max_drawdown: f64,
    sample_count: i64,
}

impl SnapshotRow {
    fn into_snapshot(self) -> Result<PerformanceSnapshot> {
        Ok(PerformanceSnapshot {
            market: parse_market(&self.market)?,
            recorded_at: from_millis(self.recorded_at)?,
            horizon_days: self.horizon_days.max(0) as u32,
            hit_rate: self.hit_rate,
            avg_return: self.avg_return,
            cum_return: self.cum_return,
            max_drawdown: self.max_drawdown,
            sample_count: self.sample_count.max(0) as usize,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EpisodeRow {
    id: i64,
    started_at: i64,
    pause_until: i64,
    ended_at: Option<i64>,
    halt_notified: bool,
    postmortem_sent: bool,
    review_sent: bool,
}

impl EpisodeRow {
    fn into_episode(self) -> Result<L4Episode> {
        Ok(L4Episode {
            id: self.id,
            started_at: from_millis(self.started_at)?,
            pause_until: from_millis(self.pause_until)?,
            ended_at: self.ended_at.map(from_millis).transpose()?,
            halt_notified: self.halt_notified,
            postmortem_sent: self.postmortem_sent,
            review_sent: self.review_sent,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReviewRow {
    episode_id: i64,
    market: String,
    started_at: i64,
    ended_at: i64,
    sample_count: i64,
    hit_rate: Option<f64>,
    avg_return: Option<f64>,
}

impl ReviewRow {
    fn into_review(self) -> Result<AiReview> {
        Ok(AiReview {
            episode_id: self.episode_id,
            market: parse_market(&self.market)?,
            started_at: from_millis(self.started_at)?,
            ended_at: from_millis(self.ended_at)?,
            sample_count: self.sample_count.max(0) as usize,
            hit_rate: self.hit_rate,
            avg_return: self.avg_return,
        })
    }
}
