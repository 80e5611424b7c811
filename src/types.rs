use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A configured syndication endpoint, loaded once at startup and shared
/// read-only between the poller and the bundles it produces.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedSource {
    pub id: String,
    pub url: String,
    pub identifier: IdentifierConfig,
}

/// How a thread key is derived from an item's permalink. Closed set of
/// strategies today; adding a variant never touches the aggregator.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "param_type", rename_all = "lowercase")]
pub enum IdentifierConfig {
    /// Read the first value of a query-string parameter on the permalink.
    Parameter { param_name: String },
}

/// One item as reported by the feed for the current cycle. `published` is the
/// feed's pubDate carried verbatim; nothing in the core ever parses it.
#[derive(Debug, Clone)]
pub struct RawItem {
    pub permalink: String,
    pub title: String,
    pub published: String,
}

/// Per-thread aggregate for one cycle. Field names are the wire names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadUpdate {
    pub title: String,
    pub last_updated_at: String,
    pub message_count: u32,
}

/// The per-source, per-cycle result handed to the hub. Immutable once built;
/// emitted at most once per cycle and only when non-empty.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub source: Arc<FeedSource>,
    pub updates: HashMap<String, ThreadUpdate>,
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    /// Used when the feed carries no usable refresh hint.
    pub default_interval_seconds: u64,
    pub retry_delay_seconds: u64,
    /// Consecutive fetch failures before a source is abandoned; 0 retries forever.
    pub max_consecutive_failures: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            user_agent: "threadcast/0.1".to_string(),
            timeout_seconds: 30,
            default_interval_seconds: 300,
            retry_delay_seconds: 5,
            max_consecutive_failures: 5,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ThreadcastError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed parse error: {0}")]
    Feed(#[from] rss::Error),

    #[error("invalid permalink {permalink}: {source}")]
    Permalink {
        permalink: String,
        source: url::ParseError,
    },

    #[error("identifier parameter {param} missing from permalink {permalink}")]
    MissingParameter { param: String, permalink: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("hub is no longer running")]
    HubClosed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ThreadcastError>;
