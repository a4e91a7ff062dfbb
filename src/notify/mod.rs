//! Discord webhook notifications
//!
//! Delivery is best effort: `deliver` logs failures and carries on. A
//! notifier without a URL logs the message instead of posting it.

use crate::config::DiscordConfig;
use crate::error::{Result, SentinelError};
use reqwest::Client;
use serde::Serialize;

/// Discord accepts at most this many embeds per message
pub const MAX_EMBEDS: usize = 10;

pub const COLOR_L4: u32 = 0x8E0000;
pub const COLOR_L3: u32 = 0xE74C3C;
pub const COLOR_INFO: u32 = 0x3498DB;
pub const COLOR_OK: u32 = 0x2ECC71;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub color: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

impl Embed {
    pub fn new(title: impl Into<String>, color: u32) -> Self {
        Self {
            title: title.into(),
            url: None,
            color,
            fields: Vec::new(),
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        if !url.is_empty() {
            self.url = Some(url);
        }
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

impl Message {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            embeds: Vec::new(),
        }
    }

    pub fn embeds(embeds: Vec<Embed>) -> Self {
        Self {
            content: String::new(),
            embeds,
        }
    }
}

/// One webhook channel
#[derive(Clone)]
pub struct Notifier {
    http: Client,
    url: Option<String>,
    max_content_chars: usize,
}

impl Notifier {
    pub fn new(url: impl Into<String>, config: &DiscordConfig) -> Self {
        Self::build(Some(url.into()), config)
    }

    pub fn disabled() -> Self {
        Self::build(None, &DiscordConfig::default())
    }

    fn build(url: Option<String>, config: &DiscordConfig) -> Self {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            http,
            url,
            max_content_chars: config.max_content_chars,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    /// Post a message. Content is truncated and embeds capped to Discord limits.
    pub async fn send(&self, message: &Message) -> Result<()> {
        let payload = self.prepare(message);
        let Some(url) = &self.url else {
            tracing::info!(content = %payload.content, embeds = payload.embeds.len(), "Notification (no webhook)");
            return Ok(());
        };

        let resp = self.http.post(url).json(&payload).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SentinelError::Notify(format!("webhook returned {}: {}", status, body)));
        }
        Ok(())
    }

    /// Send and swallow any failure
    pub async fn deliver(&self, message: &Message) {
        if let Err(e) = self.send(message).await {
            tracing::warn!("Failed to send notification: {}", e);
        }
    }

    pub async fn deliver_text(&self, content: &str) {
        self.deliver(&Message::text(content)).await;
    }

    fn prepare(&self, message: &Message) -> Message {
        Message {
            content: truncate(&message.content, self.max_content_chars),
            embeds: message.embeds.iter().take(MAX_EMBEDS).cloned().collect(),
        }
    }
}

/// Cut `text` to at most `max_chars` characters
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// The three channels the jobs post to
#[derive(Clone)]
pub struct Notifiers {
    /// Forecasts, performance and horizon reports
    pub report: Notifier,
    /// Ordinary news items
    pub news: Notifier,
    /// L3/L4 alerts, pause summaries and postmortems
    pub black_swan: Notifier,
}

impl Notifiers {
    pub fn from_config(config: &DiscordConfig) -> Self {
        let channel = |url: &Option<String>| match url {
            Some(url) => Notifier::new(url.clone(), config),
            None => Notifier::disabled(),
        };
        Self {
            report: channel(&config.report_webhook),
            news: channel(&config.news_webhook),
            black_swan: channel(&config.black_swan_webhook),
        }
    }

    pub fn disabled() -> Self {
        Self {
            report: Notifier::disabled(),
            news: Notifier::disabled(),
            black_swan: Notifier::disabled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("abc", 10), "abc");
        assert_eq!(truncate("台積電破產", 2), "台積");
    }

    #[test]
    fn test_prepare_caps_embeds_and_content() {
        let notifier = Notifier::disabled();
        let mut message = Message::embeds((0..15).map(|i| Embed::new(format!("item {}", i), COLOR_INFO)).collect());
        message.content = "x".repeat(2500);
        let payload = notifier.prepare(&message);
        assert_eq!(payload.embeds.len(), MAX_EMBEDS);
        assert_eq!(payload.content.chars().count(), 1900);
    }

    #[test]
    fn test_embed_serialization() {
        let embed = Embed::new("[L3] halt", COLOR_L3)
            .url("https://example.com/a")
            .field("Symbol", "NVDA", true);
        let json = serde_json::to_value(Message::embeds(vec![embed])).unwrap();
        assert!(json.get("content").is_none());
        assert_eq!(json["embeds"][0]["color"], 0xE74C3C);
        assert_eq!(json["embeds"][0]["fields"][0]["value"], "NVDA");

        let bare = serde_json::to_value(Embed::new("t", COLOR_INFO).url("")).unwrap();
        assert!(bare.get("url").is_none());
        assert!(bare.get("fields").is_none());
    }

    #[test]
    fn test_disabled_notifier_never_fails() {
        let notifier = Notifier::disabled();
        assert!(!notifier.is_enabled());
        let result = tokio_test::block_on(notifier.send(&Message::text("hello")));
        assert!(result.is_ok());
    }

    #[test]
    fn test_from_config() {
        let config = DiscordConfig {
            black_swan_webhook: Some("https://discord.example/webhook".to_string()),
            ..DiscordConfig::default()
        };
        let notifiers = Notifiers::from_config(&config);
        assert!(notifiers.black_swan.is_enabled());
        assert!(!notifiers.report.is_enabled());
    }
}
