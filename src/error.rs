//! Error types

use thiserror::Error;

/// Crate-level error
#[derive(Error, Debug)]
pub enum SentinelError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Notification failed: {0}")]
    Notify(String),

    #[error("Invalid state record '{key}': {reason}")]
    InvalidState { key: String, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SentinelError>;

/// Failure of a single fetch from an external data source.
///
/// These are always local to one unit of work (a symbol or a cycle) and
/// are never escalated into the mode store.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("no data returned for {0}")]
    Empty(String),

    #[error("HTTP {status} from {target}")]
    Status { target: String, status: u16 },

    #[error("transport error for {target}: {reason}")]
    Transport { target: String, reason: String },

    #[error("malformed response for {target}: {reason}")]
    Malformed { target: String, reason: String },
}

impl FetchError {
    /// Classify a reqwest failure for `target`
    pub fn from_reqwest(target: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(target.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Status {
                target: target.to_string(),
                status: status.as_u16(),
            }
        } else if err.is_decode() {
            FetchError::Malformed {
                target: target.to_string(),
                reason: err.to_string(),
            }
        } else {
            FetchError::Transport {
                target: target.to_string(),
                reason: err.to_string(),
            }
        }
    }

    /// Whether the next scheduled cycle may reasonably succeed
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout(_) | FetchError::Empty(_) | FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Malformed { .. } => false,
        }
    }
}

impl From<FetchError> for SentinelError {
    fn from(err: FetchError) -> Self {
        SentinelError::DataUnavailable(err.to_string())
    }
}

/// Result of a single external fetch
pub type FetchResult<T> = std::result::Result<T, FetchError>;
