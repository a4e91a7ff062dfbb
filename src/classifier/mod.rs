//! Headline severity classification
//!
//! One versioned keyword table maps a headline to a severity level. Levels
//! are checked from most to least severe and the first match wins.


use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a news item
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Severity {
    /// No signal
    None = 0,
    /// Layoffs, production stops, investigations
    Minor = 1,
    /// Legal or regulatory trouble
    Moderate = 2,
    /// Bankruptcy, delisting, trading halt
    Severe = 3,
}

impl Severity {
    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(Severity::None),
            1 => Some(Severity::Minor),
            2 => Some(Severity::Moderate),
            3 => Some(Severity::Severe),
            _ => None,
        }
    }

    pub fn is_severe(self) -> bool {
        self == Severity::Severe
    }
}

impl From<Severity> for u8 {
    fn from(s: Severity) -> u8 {
        s.level()
    }
}

impl TryFrom<u8> for Severity {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Severity::from_level(level).ok_or_else(|| format!("invalid severity level {}", level))
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.level())
    }
}

/// Keyword table, most severe level first
#[derive(Debug, Clone, Copy)]
pub struct KeywordTable {
    pub version: &'static str,
    pub levels: &'static [(Severity, &'static [&'static str])],
}

/// Current table. Bump the version whenever keywords change.
pub const KEYWORDS_V1: KeywordTable = KeywordTable {
    version: "v1",
    levels: &[
        (Severity::Severe, &["破產", "下市", "bankruptcy", "delist", "halt"]),
        (Severity::Moderate, &["制裁", "違約", "lawsuit", "sec", "sanction"]),
        (Severity::Minor, &["裁員", "停產", "調查", "縮減"]),
    ],
};

/// Keyword-based headline classifier
#[derive(Debug, Clone)]
pub struct NewsClassifier {
    table: KeywordTable,
    /// Lower-cased copy of the table, built once
    lowered: Vec<(Severity, Vec<String>)>,
}

impl NewsClassifier {
    pub fn new(table: KeywordTable) -> Self {
        let mut lowered: Vec<(Severity, Vec<String>)> = table
            .levels
            .iter()
            .map(|(level, words)| (*level, words.iter().map(|w| w.to_lowercase()).collect()))
            .collect();
        lowered.sort_by(|a, b| b.0.cmp(&a.0));
        Self { table, lowered }
    }

    pub fn version(&self) -> &'static str {
        self.table.version
    }

    /// Classify a headline. Case-insensitive substring match.
    pub fn classify(&self, headline: &str) -> Severity {
        let text = headline.to_lowercase();
        self.lowered
            .iter()
            .find(|(_, words)| words.iter().any(|w| text.contains(w.as_str())))
            .map(|(level, _)| *level)
            .unwrap_or(Severity::None)
    }
}

impl Default for NewsClassifier {
    fn default() -> Self {
        Self::new(KEYWORDS_V1)
    }
}

/// Where a symbol trades, for message labels
pub fn market_impact(symbol: &str) -> &'static str {
    if symbol.ends_with(".TW") {
        "TW"
    } else if symbol.chars().any(|c| c.is_ascii_alphabetic())
        && !symbol.chars().any(|c| c.is_ascii_lowercase())
    {
        "US"
    } else {
        "GLOBAL"
    }
}
