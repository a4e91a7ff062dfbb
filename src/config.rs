//! Configuration management
//!
//! Layers an optional TOML file, `SENTINEL__*` environment variables and a
//! `.env` file. Every section has defaults, so an empty file is valid.

use crate::error::{Result, SentinelError};
use crate::types::Market;
use chrono::Duration;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub escalation: EscalationConfig,
    #[serde(default)]
    pub pause: PauseConfig,
    #[serde(default)]
    pub news: NewsConfig,
    #[serde(default)]
    pub market_data: MarketDataConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default = "default_markets")]
    pub markets: Vec<MarketConfig>,
    /// Offset used when rendering timestamps in messages (UTC+8 by default)
    #[serde(default = "default_display_offset")]
    pub display_utc_offset_hours: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            escalation: EscalationConfig::default(),
            pause: PauseConfig::default(),
            news: NewsConfig::default(),
            market_data: MarketDataConfig::default(),
            discord: DiscordConfig::default(),
            model: ModelConfig::default(),
            performance: PerformanceConfig::default(),
            markets: default_markets(),
            display_utc_offset_hours: default_display_offset(),
        }
    }
}

impl Config {
    /// Load configuration from `path` (optional) plus the environment
    pub fn load(path: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("SENTINEL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut cfg: Config = settings.try_deserialize()?;
        cfg.storage.path = shellexpand::tilde(&cfg.storage.path).into_owned();
        cfg.discord.apply_env_fallbacks();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings that would break the state machine invariants
    pub fn validate(&self) -> Result<()> {
        if self.escalation.window_hours <= 0 {
            return Err(SentinelError::InvalidConfig(
                "escalation.window_hours must be positive".to_string(),
            ));
        }
        if self.escalation.trigger_count == 0 {
            return Err(SentinelError::InvalidConfig(
                "escalation.trigger_count must be at least 1".to_string(),
            ));
        }
        let pause = &self.pause;
        for (name, hours) in [
            ("pause.base_pause_hours", pause.base_pause_hours),
            ("pause.severe_pause_hours", pause.severe_pause_hours),
            ("pause.mild_pause_hours", pause.mild_pause_hours),
            ("pause.extension_hours", pause.extension_hours),
            ("pause.recheck_lookback_hours", pause.recheck_lookback_hours),
        ] {
            if hours <= 0 {
                return Err(SentinelError::InvalidConfig(format!("{} must be positive", name)));
            }
        }
        if pause.observation_hours < 0 || pause.l3_cooldown_hours < 0 {
            return Err(SentinelError::InvalidConfig(
                "pause.observation_hours and pause.l3_cooldown_hours must not be negative".to_string(),
            ));
        }
        if self.performance.min_horizon_days == 0 {
            return Err(SentinelError::InvalidConfig(
                "performance.min_horizon_days must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Settings for one market, if configured
    pub fn market(&self, market: Market) -> Option<&MarketConfig> {
        self.markets.iter().find(|m| m.market == market)
    }

    pub fn display_offset(&self) -> chrono::FixedOffset {
        chrono::FixedOffset::east_opt(self.display_utc_offset_hours * 3600)
            .unwrap_or_else(|| chrono::Offset::fix(&chrono::Utc))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

/// Level-3 cluster detection
#[derive(Debug, Clone, Deserialize)]
pub struct EscalationConfig {
    #[serde(default = "default_window_hours")]
    pub window_hours: i64,
    #[serde(default = "default_trigger_count")]
    pub trigger_count: usize,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            trigger_count: default_trigger_count(),
        }
    }
}

impl EscalationConfig {
    pub fn window(&self) -> Duration {
        Duration::hours(self.window_hours)
    }
}

/// L4 pause, re-check and cooldown policy
#[derive(Debug, Clone, Deserialize)]
pub struct PauseConfig {
    #[serde(default = "default_base_pause")]
    pub base_pause_hours: i64,
    #[serde(default = "default_severe_pause")]
    pub severe_pause_hours: i64,
    #[serde(default = "default_mild_pause")]
    pub mild_pause_hours: i64,
    /// Simulated continuation return below which the severe pause applies
    #[serde(default = "default_severe_drawdown")]
    pub severe_drawdown: f64,
    /// Simulated continuation return below which the base pause applies
    #[serde(default = "default_moderate_drawdown")]
    pub moderate_drawdown: f64,
    #[serde(default = "default_recheck_lookback")]
    pub recheck_lookback_hours: i64,
    #[serde(default = "default_recheck_min_events")]
    pub recheck_min_events: usize,
    #[serde(default = "default_extension")]
    pub extension_hours: i64,
    #[serde(default = "default_observation")]
    pub observation_hours: i64,
    #[serde(default = "default_l3_cooldown")]
    pub l3_cooldown_hours: i64,
    /// Days of predictions before an L4 start used for the simulation
    #[serde(default = "default_simulation_lookback")]
    pub simulation_lookback_days: i64,
    #[serde(default = "default_simulation_forward")]
    pub simulation_forward_bars: usize,
    /// Indices quoted in the L4 postmortem
    #[serde(default = "default_postmortem_indices")]
    pub postmortem_indices: Vec<String>,
}

impl Default for PauseConfig {
    fn default() -> Self {
        Self {
            base_pause_hours: default_base_pause(),
            severe_pause_hours: default_severe_pause(),
            mild_pause_hours: default_mild_pause(),
            severe_drawdown: default_severe_drawdown(),
            moderate_drawdown: default_moderate_drawdown(),
            recheck_lookback_hours: default_recheck_lookback(),
            recheck_min_events: default_recheck_min_events(),
            extension_hours: default_extension(),
            observation_hours: default_observation(),
            l3_cooldown_hours: default_l3_cooldown(),
            simulation_lookback_days: default_simulation_lookback(),
            simulation_forward_bars: default_simulation_forward(),
            postmortem_indices: default_postmortem_indices(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewsConfig {
    #[serde(default = "default_feed_url")]
    pub feed_url: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_freshness")]
    pub freshness_hours: i64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Local hour before which the radar watches TW, after which US
    #[serde(default = "default_cutover_hour")]
    pub cutover_hour: u32,
    /// Latest top-N predictions watched while the market is open
    #[serde(default = "default_top_picks")]
    pub top_picks: usize,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            feed_url: default_feed_url(),
            language: default_language(),
            region: default_region(),
            freshness_hours: default_freshness(),
            timeout_secs: default_timeout(),
            cutover_hour: default_cutover_hour(),
            top_picks: default_top_picks(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketDataConfig {
    #[serde(default = "default_market_data_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: default_market_data_url(),
            timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Discord webhook channels
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    /// Forecasts, performance and horizon reports
    pub report_webhook: Option<String>,
    /// Ordinary market news
    pub news_webhook: Option<String>,
    /// L3/L4 alerts, pause summaries and postmortems
    pub black_swan_webhook: Option<String>,
    #[serde(default = "default_max_content")]
    pub max_content_chars: usize,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            report_webhook: None,
            news_webhook: None,
            black_swan_webhook: None,
            max_content_chars: default_max_content(),
            timeout_secs: default_timeout(),
        }
    }
}

impl DiscordConfig {
    /// Fill unset webhooks from the conventional environment variables
    pub fn apply_env_fallbacks(&mut self) {
        fn env_url(name: &str) -> Option<String> {
            std::env::var(name)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        if self.report_webhook.is_none() {
            self.report_webhook = env_url("DISCORD_WEBHOOK_URL");
        }
        if self.news_webhook.is_none() {
            self.news_webhook = env_url("NEWS_WEBHOOK_URL");
        }
        if self.black_swan_webhook.is_none() {
            self.black_swan_webhook = env_url("BLACK_SWAN_WEBHOOK_URL");
        }
    }
}

/// Gradient-boosted regressor and feature settings
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,
    /// Minimum bars of history before a symbol is modeled
    #[serde(default = "default_min_history")]
    pub min_history: usize,
    /// Rolling window for momentum, bias, volume ratio and pivots
    #[serde(default = "default_feature_window")]
    pub feature_window: usize,
    #[serde(default = "default_top_picks")]
    pub top_picks: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            max_depth: default_max_depth(),
            learning_rate: default_learning_rate(),
            min_samples_leaf: default_min_samples_leaf(),
            min_history: default_min_history(),
            feature_window: default_feature_window(),
            top_picks: default_top_picks(),
        }
    }
}

/// Settlement metrics, hit-rate guard and horizon tuning
#[derive(Debug, Clone, Deserialize)]
pub struct PerformanceConfig {
    #[serde(default = "default_snapshot_window")]
    pub snapshot_window: usize,
    /// Consecutive falling hit-rate snapshots that raise L3
    #[serde(default = "default_deteriorating_runs")]
    pub deteriorating_runs: usize,
    #[serde(default = "default_warn_hit_rate")]
    pub warn_hit_rate: f64,
    #[serde(default = "default_critical_hit_rate")]
    pub critical_hit_rate: f64,
    #[serde(default = "default_horizon")]
    pub default_horizon_days: u32,
    #[serde(default = "default_min_horizon")]
    pub min_horizon_days: u32,
    #[serde(default = "default_horizon_cooldown")]
    pub horizon_cooldown_days: i64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            snapshot_window: default_snapshot_window(),
            deteriorating_runs: default_deteriorating_runs(),
            warn_hit_rate: default_warn_hit_rate(),
            critical_hit_rate: default_critical_hit_rate(),
            default_horizon_days: default_horizon(),
            min_horizon_days: default_min_horizon(),
            horizon_cooldown_days: default_horizon_cooldown(),
        }
    }
}

/// Per-market job parameters
#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    pub market: Market,
    /// Index used for the trading-day check and impact reports
    pub index_symbol: String,
    /// Always scanned, also in reduced mode
    pub core_watchlist: Vec<String>,
    /// Scanned only in full mode
    #[serde(default)]
    pub universe: Vec<String>,
    /// Candidates ranked by volume into the explorer pool
    #[serde(default)]
    pub explorer_universe: Vec<String>,
    #[serde(default = "default_pool_size")]
    pub explorer_pool_size: usize,
    #[serde(default = "default_pool_min_symbols")]
    pub explorer_min_symbols: usize,
}

fn default_db_path() -> String { "data/sentinel.db".to_string() }
fn default_window_hours() -> i64 { 6 }
fn default_trigger_count() -> usize { 2 }
fn default_base_pause() -> i64 { 24 }
fn default_severe_pause() -> i64 { 48 }
fn default_mild_pause() -> i64 { 12 }
fn default_severe_drawdown() -> f64 { -0.03 }
fn default_moderate_drawdown() -> f64 { -0.01 }
fn default_recheck_lookback() -> i64 { 6 }
fn default_recheck_min_events() -> usize { 1 }
fn default_extension() -> i64 { 12 }
fn default_observation() -> i64 { 24 }
fn default_l3_cooldown() -> i64 { 24 }
fn default_simulation_lookback() -> i64 { 5 }
fn default_simulation_forward() -> usize { 5 }
fn default_postmortem_indices() -> Vec<String> { vec!["^GSPC".to_string(), "^IXIC".to_string()] }
fn default_feed_url() -> String { "https://news.google.com/rss/search".to_string() }
fn default_language() -> String { "zh-TW".to_string() }
fn default_region() -> String { "TW".to_string() }
fn default_freshness() -> i64 { 12 }
fn default_timeout() -> u64 { 15 }
fn default_cutover_hour() -> u32 { 12 }
fn default_top_picks() -> usize { 5 }
fn default_market_data_url() -> String { "https://query1.finance.yahoo.com".to_string() }
fn default_user_agent() -> String { "Mozilla/5.0".to_string() }
fn default_max_content() -> usize { 1900 }
fn default_n_estimators() -> usize { 120 }
fn default_max_depth() -> usize { 3 }
fn default_learning_rate() -> f64 { 0.05 }
fn default_min_samples_leaf() -> usize { 1 }
fn default_min_history() -> usize { 150 }
fn default_feature_window() -> usize { 20 }
fn default_snapshot_window() -> usize { 20 }
fn default_deteriorating_runs() -> usize { 3 }
fn default_warn_hit_rate() -> f64 { 0.45 }
fn default_critical_hit_rate() -> f64 { 0.40 }
fn default_horizon() -> u32 { 5 }
fn default_min_horizon() -> u32 { 3 }
fn default_horizon_cooldown() -> i64 { 5 }
fn default_pool_size() -> usize { 500 }
fn default_pool_min_symbols() -> usize { 10 }
fn default_display_offset() -> i32 { 8 }

fn symbols(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn default_markets() -> Vec<MarketConfig> {
    vec![
        MarketConfig {
            market: Market::Tw,
            index_symbol: "^TWII".to_string(),
            core_watchlist: symbols(&["2330.TW", "2317.TW", "2454.TW", "0050.TW", "2308.TW", "2382.TW"]),
            universe: Vec::new(),
            explorer_universe: symbols(&[
                "2330.TW", "2317.TW", "2454.TW", "2308.TW", "2881.TW", "2882.TW",
                "1301.TW", "1303.TW", "2002.TW", "1216.TW",
                "2603.TW", "2615.TW", "3037.TW", "3231.TW", "3661.TW",
            ]),
            explorer_pool_size: default_pool_size(),
            explorer_min_symbols: default_pool_min_symbols(),
        },
        MarketConfig {
            market: Market::Us,
            index_symbol: "^GSPC".to_string(),
            core_watchlist: symbols(&["AAPL", "NVDA", "TSLA", "MSFT", "GOOGL", "AMZN", "META"]),
            universe: Vec::new(),
            explorer_universe: symbols(&[
                "AAPL", "NVDA", "TSLA", "MSFT", "GOOGL", "AMZN", "META",
                "AMD", "AVGO", "NFLX", "JPM", "V", "XOM", "COST", "ORCL",
            ]),
            explorer_pool_size: default_pool_size(),
            explorer_min_symbols: default_pool_min_symbols(),
        },
    ]
}
