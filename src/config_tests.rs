//! Tests for configuration

#[cfg(test)]
mod tests {
    use super::super::config::*;
    use crate::types::Market;

    #[test]
    fn test_escalation_config_default() {
        let config = EscalationConfig::default();
        assert_eq!(config.window_hours, 6);
        assert_eq!(config.trigger_count, 2);
        assert_eq!(config.window(), chrono::Duration::hours(6));
    }

    #[test]
    fn test_pause_config_default() {
        let config = PauseConfig::default();
        assert_eq!(config.base_pause_hours, 24);
        assert_eq!(config.severe_pause_hours, 48);
        assert_eq!(config.mild_pause_hours, 12);
        assert_eq!(config.recheck_lookback_hours, 6);
        assert_eq!(config.recheck_min_events, 1);
        assert_eq!(config.extension_hours, 12);
        assert_eq!(config.observation_hours, 24);
        assert_eq!(config.severe_drawdown, -0.03);
        assert_eq!(config.postmortem_indices, vec!["^GSPC", "^IXIC"]);
    }

    #[test]
    fn test_model_config_defaults_from_empty_toml() {
        let config: ModelConfig = toml::from_str("").unwrap();
        assert_eq!(config.n_estimators, 120);
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.learning_rate, 0.05);
        assert_eq!(config.min_history, 150);
        assert_eq!(config.feature_window, 20);
    }

    #[test]
    fn test_performance_config_partial_toml() {
        let toml_str = r#"
snapshot_window = 30
critical_hit_rate = 0.35
"#;
        let config: PerformanceConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.snapshot_window, 30);
        assert_eq!(config.critical_hit_rate, 0.35);
        assert_eq!(config.warn_hit_rate, 0.45);
        assert_eq!(config.min_horizon_days, 3);
        assert_eq!(config.deteriorating_runs, 3);
    }

    #[test]
    fn test_discord_config_defaults() {
        let config: DiscordConfig = toml::from_str(r#"news_webhook = "https://discord.test/news""#).unwrap();
        assert_eq!(config.news_webhook.as_deref(), Some("https://discord.test/news"));
        assert!(config.report_webhook.is_none());
        assert_eq!(config.max_content_chars, 1900);
    }

    #[test]
    fn test_market_config_from_toml() {
        let toml_str = r#"
market = "US"
index_symbol = "^GSPC"
core_watchlist = ["NVDA", "AAPL"]
"#;
        let config: MarketConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.market, Market::Us);
        assert_eq!(config.core_watchlist.len(), 2);
        assert!(config.universe.is_empty());
        assert_eq!(config.explorer_pool_size, 500);
        assert_eq!(config.explorer_min_symbols, 10);
    }

    #[test]
    fn test_full_config_from_toml() {
        let toml_str = r#"
display_utc_offset_hours = 0

[storage]
path = "/tmp/sentinel.db"

[escalation]
window_hours = 4
trigger_count = 3

[[markets]]
market = "TW"
index_symbol = "^TWII"
core_watchlist = ["2330.TW"]
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.storage.path, "/tmp/sentinel.db");
        assert_eq!(config.escalation.window_hours, 4);
        assert_eq!(config.escalation.trigger_count, 3);
        assert_eq!(config.markets.len(), 1);
        assert!(config.market(Market::Us).is_none());
        assert_eq!(config.pause.base_pause_hours, 24);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_markets() {
        let config = Config::default();
        let tw = config.market(Market::Tw).unwrap();
        assert_eq!(tw.index_symbol, "^TWII");
        assert!(tw.core_watchlist.contains(&"2330.TW".to_string()));
        let us = config.market(Market::Us).unwrap();
        assert_eq!(us.index_symbol, "^GSPC");
    }

    #[test]
    fn test_validate_rejects_zero_trigger() {
        let mut config = Config::default();
        config.escalation.trigger_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_positive_pause() {
        let mut config = Config::default();
        config.pause.base_pause_hours = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.escalation.window_hours = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_display_offset() {
        let config = Config::default();
        assert_eq!(config.display_offset().local_minus_utc(), 8 * 3600);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.escalation.trigger_count, 2);
        assert_eq!(config.markets.len(), 2);
    }
}
