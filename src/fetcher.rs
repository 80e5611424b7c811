use crate::types::{PollConfig, RawItem, Result};
use reqwest::Client;
use rss::Channel;
use std::time::Duration;
use tracing::{debug, info};

/// One completed fetch-and-parse pass over a feed.
#[derive(Debug)]
pub struct FetchOutcome {
    pub items: Vec<RawItem>,
    /// How long the feed asks us to wait before the next poll.
    pub next_interval: Duration,
}

/// HTTP fetch plus RSS parse for one or more feeds. The client is shared; all
/// per-cycle state lives in the aggregator.
pub struct Fetcher {
    client: Client,
    default_interval_seconds: u64,
}

impl Fetcher {
    pub fn new(config: &PollConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            default_interval_seconds: config.default_interval_seconds,
        })
    }

    pub async fn fetch_cycle(&self, url: &str) -> Result<FetchOutcome> {
        debug!(url, "fetching feed");

        let response = self.client.get(url).send().await?.error_for_status()?;
        let body = response.bytes().await?;
        let channel = Channel::read_from(body.as_ref())?;

        let items = parse_items(&channel);
        let next_interval =
            Duration::from_secs(refresh_interval(&channel, self.default_interval_seconds));

        info!(url, items = items.len(), "fetched feed");
        Ok(FetchOutcome {
            items,
            next_interval,
        })
    }
}

/// Convert channel items to raw items, preserving pubDate verbatim. The
/// permalink is the item guid, falling back to the link; items with neither
/// are dropped.
pub fn parse_items(channel: &Channel) -> Vec<RawItem> {
    channel
        .items()
        .iter()
        .filter_map(|item| {
            let permalink = item
                .guid()
                .map(|guid| guid.value().to_string())
                .or_else(|| item.link().map(String::from))?;

            Some(RawItem {
                permalink,
                title: item.title().unwrap_or("(untitled)").to_string(),
                published: item.pub_date().unwrap_or_default().to_string(),
            })
        })
        .collect()
}

/// Feed-native refresh hint: RSS `<ttl>` is minutes between polls. Falls back
/// to the configured default when absent, unparseable, or zero.
pub fn refresh_interval(channel: &Channel, default_seconds: u64) -> u64 {
    channel
        .ttl()
        .and_then(|ttl| ttl.trim().parse::<u64>().ok())
        .filter(|&minutes| minutes > 0)
        .and_then(|minutes| minutes.checked_mul(60))
        .unwrap_or(default_seconds)
}
