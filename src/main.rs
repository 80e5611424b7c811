use clap::Parser;
use std::sync::Arc;
use threadcast::config::{self, Cli};
use threadcast::hub::Hub;
use threadcast::types::PollConfig;
use threadcast::{poller, server};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let sources = config::load_sources(&cli.sources)?;
    info!(sources = sources.len(), "loaded feed sources");

    let poll_config = PollConfig {
        default_interval_seconds: cli.default_interval,
        max_consecutive_failures: cli.max_failures,
        ..PollConfig::default()
    };

    let (hub, handle) = Hub::new();
    tokio::spawn(hub.run());

    for source in sources {
        poller::spawn(Arc::new(source), poll_config.clone(), handle.clone());
    }

    let listener = TcpListener::bind(&cli.bind).await?;
    info!(bind = %cli.bind, "websocket endpoint listening");

    server::run(listener, handle).await?;
    Ok(())
}
