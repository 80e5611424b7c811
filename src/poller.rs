use crate::aggregator::CycleAggregator;
use crate::fetcher::Fetcher;
use crate::hub::HubHandle;
use crate::types::{FeedSource, PollConfig, Result};
use backoff::backoff::Backoff;
use backoff::exponential::ExponentialBackoff;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Spawn the polling task for one source. Each source gets its own task and
/// its own aggregator; sources never share mutable state.
pub fn spawn(source: Arc<FeedSource>, config: PollConfig, hub: HubHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(err) = poll_source(source.clone(), config, hub).await {
            error!(source = %source.id, error = %err, "poller stopped");
        }
    })
}

async fn poll_source(source: Arc<FeedSource>, config: PollConfig, hub: HubHandle) -> Result<()> {
    let fetcher = Fetcher::new(&config)?;
    let mut aggregator = CycleAggregator::new(source.clone());
    let mut backoff = retry_backoff(&config);
    let mut consecutive_failures = 0u32;

    info!(source = %source.id, url = %source.url, "polling started");

    loop {
        match fetcher.fetch_cycle(&source.url).await {
            Ok(outcome) => {
                consecutive_failures = 0;
                backoff.reset();

                if let Some(bundle) = aggregator.process_cycle(&outcome.items) {
                    // Blocks until the hub accepts the bundle; a slow hub
                    // delays this source's next fetch.
                    if hub.publish(bundle).await.is_err() {
                        info!(source = %source.id, "hub gone, polling stopped");
                        return Ok(());
                    }
                }

                tokio::time::sleep(outcome.next_interval).await;
            }
            Err(err) => {
                consecutive_failures += 1;
                warn!(
                    source = %source.id,
                    error = %err,
                    consecutive_failures,
                    "feed fetch failed"
                );

                if config.max_consecutive_failures > 0
                    && consecutive_failures >= config.max_consecutive_failures
                {
                    error!(
                        source = %source.id,
                        consecutive_failures,
                        "giving up on source"
                    );
                    return Ok(());
                }

                let delay = backoff
                    .next_backoff()
                    .unwrap_or(Duration::from_secs(config.retry_delay_seconds));
                tokio::time::sleep(delay).await;
            }
        }
    }
}

fn retry_backoff(config: &PollConfig) -> ExponentialBackoff<backoff::SystemClock> {
    ExponentialBackoff {
        current_interval: Duration::from_secs(config.retry_delay_seconds),
        initial_interval: Duration::from_secs(config.retry_delay_seconds),
        max_interval: Duration::from_secs(config.retry_delay_seconds * 32),
        multiplier: 2.0,
        // Bounded by the consecutive-failure cap, not elapsed time.
        max_elapsed_time: None,
        ..Default::default()
    }
}
