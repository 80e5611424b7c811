use crate::types::{FeedSource, Result, ThreadcastError};
use clap::Parser;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(
    name = "threadcast",
    about = "Polls forum syndication feeds and pushes per-thread activity updates to websocket subscribers"
)]
pub struct Cli {
    /// Path to the feed sources file (JSON array of sources).
    #[arg(short, long, default_value = "sources.json")]
    pub sources: PathBuf,

    /// Address the websocket endpoint binds to.
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    pub bind: String,

    /// Poll interval in seconds when a feed carries no refresh hint.
    #[arg(long, default_value_t = 300)]
    pub default_interval: u64,

    /// Stop polling a source after this many consecutive fetch failures
    /// (0 retries forever).
    #[arg(long, default_value_t = 5)]
    pub max_failures: u32,
}

/// Load the ordered source list. Loaded once at startup; sources are
/// immutable afterwards.
pub fn load_sources(path: &Path) -> Result<Vec<FeedSource>> {
    let raw = std::fs::read_to_string(path)?;
    let sources: Vec<FeedSource> = serde_json::from_str(&raw)?;

    if sources.is_empty() {
        return Err(ThreadcastError::Config(format!(
            "no feed sources configured in {}",
            path.display()
        )));
    }

    Ok(sources)
}
