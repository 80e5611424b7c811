pub mod aggregator;
pub mod config;
pub mod fetcher;
pub mod hub;
pub mod identifier;
pub mod poller;
pub mod server;
pub mod types;

pub use aggregator::CycleAggregator;
pub use fetcher::Fetcher;
pub use hub::{Hub, HubHandle, Outbound, Subscriber};
pub use identifier::{QueryParamIdentifier, ThreadIdentifier};
pub use types::*;
