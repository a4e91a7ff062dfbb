//! Google News RSS search client
//!
//! Only the first `<item>` of the feed is read: the radar cares about the
//! newest headline per symbol, nothing else.

use super::NewsSource;
use crate::config::NewsConfig;
use crate::error::{FetchError, FetchResult, Result};
use crate::types::Headline;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;

#[derive(Clone)]
pub struct GoogleNewsClient {
    http: Client,
    feed_url: String,
    language: String,
    region: String,
}

impl GoogleNewsClient {
    pub fn new(config: &NewsConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            feed_url: config.feed_url.clone(),
            language: config.language.clone(),
            region: config.region.clone(),
        })
    }
}

#[async_trait]
impl NewsSource for GoogleNewsClient {
    async fn latest_headline(&self, query: &str) -> FetchResult<Option<Headline>> {
        let ceid = format!("{}:{}", self.region, self.language);
        let resp = self
            .http
            .get(&self.feed_url)
            .query(&[
                ("q", query),
                ("hl", self.language.as_str()),
                ("gl", self.region.as_str()),
                ("ceid", ceid.as_str()),
            ])
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(query, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                target: query.to_string(),
                status: status.as_u16(),
            });
        }

        let body = resp.text().await.map_err(|e| FetchError::from_reqwest(query, e))?;
        parse_first_item(query, &body)
    }
}

/// Extract the first feed item. A feed without items is `Ok(None)`.
pub fn parse_first_item(target: &str, body: &str) -> FetchResult<Option<Headline>> {
    if !body.contains("<rss") && !body.contains("<channel") {
        return Err(FetchError::Malformed {
            target: target.to_string(),
            reason: "not an RSS document".to_string(),
        });
    }

    let Some(item) = element(body, "item") else {
        return Ok(None);
    };

    let malformed = |reason: &str| FetchError::Malformed {
        target: target.to_string(),
        reason: reason.to_string(),
    };

    let raw_title = element(item, "title").ok_or_else(|| malformed("item without title"))?;
    let title = decode_text(raw_title);
    // Google appends " - Publisher" to every title
    let title = title.split(" - ").next().unwrap_or_default().trim().to_string();

    let link = element(item, "link").map(decode_text).unwrap_or_default();

    let pub_date = element(item, "pubDate").ok_or_else(|| malformed("item without pubDate"))?;
    let published_at = DateTime::parse_from_rfc2822(decode_text(pub_date).trim())
        .map_err(|e| malformed(&format!("bad pubDate: {}", e)))?
        .with_timezone(&Utc);

    Ok(Some(Headline {
        title,
        link: link.trim().to_string(),
        published_at,
    }))
}

/// Inner text of the first `<tag>` or `<tag attr..>` element
fn element<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);
    let mut from = 0;
    while let Some(pos) = xml[from..].find(&open) {
        let start = from + pos;
        let after = start + open.len();
        // Skip longer names sharing the prefix, e.g. <items>
        match xml[after..].chars().next() {
            Some('>') | Some(' ') | Some('\t') | Some('\n') | Some('\r') => {}
            _ => {
                from = after;
                continue;
            }
        }
        let body_start = after + xml[after..].find('>')? + 1;
        let body_end = body_start + xml[body_start..].find(&close)?;
        return Some(&xml[body_start..body_end]);
    }
    None
}

/// Strip CDATA and decode XML entities
fn decode_text(raw: &str) -> String {
    let text = raw.trim();
    let text = text
        .strip_prefix("<![CDATA[")
        .and_then(|t| t.strip_suffix("]]>"))
        .unwrap_or(text);

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';').filter(|i| *i <= 10) else {
            out.push('&');
            rest = &tail[1..];
            continue;
        };
        let entity = &tail[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
