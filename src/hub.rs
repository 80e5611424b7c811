use crate::types::{Bundle, Result, ThreadcastError};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Write half of a subscriber connection. The hub only ever writes; a remote
/// close is observed as the next failed delivery.
#[async_trait]
pub trait Outbound: Send {
    async fn deliver(&mut self, payload: &str) -> Result<()>;
    async fn close(&mut self);
}

pub struct Subscriber {
    pub id: Uuid,
    pub conn: Box<dyn Outbound>,
}

/// Cloneable front door to the hub. Every send is a blocking hand-off into
/// the dispatch loop, so a slow hub backpressures its callers.
#[derive(Clone)]
pub struct HubHandle {
    subscribe_tx: mpsc::Sender<Subscriber>,
    unsubscribe_tx: mpsc::Sender<Uuid>,
    bundle_tx: mpsc::Sender<(Bundle, oneshot::Sender<()>)>,
}

impl HubHandle {
    pub async fn subscribe(&self, subscriber: Subscriber) -> Result<()> {
        self.subscribe_tx
            .send(subscriber)
            .await
            .map_err(|_| ThreadcastError::HubClosed)
    }

    pub async fn unsubscribe(&self, id: Uuid) -> Result<()> {
        self.unsubscribe_tx
            .send(id)
            .await
            .map_err(|_| ThreadcastError::HubClosed)
    }

    /// Hand a bundle to the dispatch loop. Returns only once the loop has
    /// taken it, like a send on an unbuffered channel: a publish that
    /// completes happens-before any registry event issued afterwards.
    pub async fn publish(&self, bundle: Bundle) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.bundle_tx
            .send((bundle, ack_tx))
            .await
            .map_err(|_| ThreadcastError::HubClosed)?;
        ack_rx.await.map_err(|_| ThreadcastError::HubClosed)
    }
}

/// Broadcast coordinator. The subscriber registry is touched only inside
/// `run`, so registry mutation and broadcast never interleave and no locking
/// is needed.
pub struct Hub {
    subscribers: HashMap<Uuid, Box<dyn Outbound>>,
    subscribe_rx: mpsc::Receiver<Subscriber>,
    unsubscribe_rx: mpsc::Receiver<Uuid>,
    bundle_rx: mpsc::Receiver<(Bundle, oneshot::Sender<()>)>,
}

impl Hub {
    pub fn new() -> (Self, HubHandle) {
        let (subscribe_tx, subscribe_rx) = mpsc::channel(16);
        let (unsubscribe_tx, unsubscribe_rx) = mpsc::channel(16);
        // Capacity 1 plus the publish-side ack makes the hand-off a
        // rendezvous with the dispatch loop.
        let (bundle_tx, bundle_rx) = mpsc::channel(1);

        let hub = Self {
            subscribers: HashMap::new(),
            subscribe_rx,
            unsubscribe_rx,
            bundle_rx,
        };
        let handle = HubHandle {
            subscribe_tx,
            unsubscribe_tx,
            bundle_tx,
        };
        (hub, handle)
    }

    /// Dispatch loop. Runs until every handle is dropped; there is no
    /// graceful drain.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                // Registry events are drained before bundles: a subscriber
                // registered before a bundle was published receives it.
                biased;

                Some(subscriber) = self.subscribe_rx.recv() => {
                    info!(subscriber = %subscriber.id, "subscriber registered");
                    self.subscribers.insert(subscriber.id, subscriber.conn);
                }
                Some(id) = self.unsubscribe_rx.recv() => {
                    if let Some(conn) = self.subscribers.remove(&id) {
                        info!(subscriber = %id, "subscriber unregistered");
                        close_off_loop(conn);
                    }
                }
                Some((bundle, ack)) = self.bundle_rx.recv() => {
                    // Unblock the publisher as soon as the bundle is accepted;
                    // delivery proceeds against the registry as of this point.
                    let _ = ack.send(());
                    self.broadcast(bundle).await;
                }
                else => break,
            }
        }
        info!("hub dispatch loop stopped");
    }

    async fn broadcast(&mut self, bundle: Bundle) {
        let payload = match serde_json::to_string(&bundle.updates) {
            Ok(payload) => payload,
            Err(err) => {
                error!(source = %bundle.source.id, error = %err, "bundle serialization failed");
                return;
            }
        };

        debug!(
            source = %bundle.source.id,
            threads = bundle.updates.len(),
            subscribers = self.subscribers.len(),
            "broadcasting bundle"
        );

        let mut failed = Vec::new();
        for (id, conn) in self.subscribers.iter_mut() {
            if let Err(err) = conn.deliver(&payload).await {
                warn!(subscriber = %id, error = %err, "delivery failed, dropping subscriber");
                failed.push(*id);
            }
        }

        for id in failed {
            if let Some(conn) = self.subscribers.remove(&id) {
                close_off_loop(conn);
            }
        }
    }
}

/// Closing may block on the peer; keep it off the dispatch loop.
fn close_off_loop(mut conn: Box<dyn Outbound>) {
    tokio::spawn(async move {
        conn.close().await;
    });
}
