use crate::hub::{HubHandle, Outbound, Subscriber};
use crate::types::{Result, ThreadcastError};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use tracing::{info, warn};
use uuid::Uuid;

/// Accept loop for the subscriber endpoint. Each connection is upgraded to a
/// websocket and its write half handed to the hub.
pub async fn run(listener: TcpListener, hub: HubHandle) -> Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        let hub = hub.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, addr, hub).await {
                warn!(peer = %addr, error = %err, "subscriber connection ended");
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr, hub: HubHandle) -> Result<()> {
    let ws = accept_async(stream)
        .await
        .map_err(|err| ThreadcastError::Delivery(err.to_string()))?;
    let (sink, stream) = ws.split();

    let id = Uuid::new_v4();
    info!(subscriber = %id, peer = %addr, "subscriber connected");

    hub.subscribe(Subscriber {
        id,
        conn: Box::new(WsOutbound { sink }),
    })
    .await?;

    // The hub never reads from subscribers; this drain exists only to turn a
    // remote close into an explicit unsubscribe instead of waiting for the
    // next failed write.
    drain_until_closed(stream).await;

    info!(subscriber = %id, peer = %addr, "subscriber disconnected");
    hub.unsubscribe(id).await
}

async fn drain_until_closed(mut stream: SplitStream<WebSocketStream<TcpStream>>) {
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {} // inbound frames are ignored
        }
    }
}

struct WsOutbound {
    sink: SplitSink<WebSocketStream<TcpStream>, Message>,
}

#[async_trait]
impl Outbound for WsOutbound {
    async fn deliver(&mut self, payload: &str) -> Result<()> {
        self.sink
            .send(Message::Text(payload.to_string()))
            .await
            .map_err(|err| ThreadcastError::Delivery(err.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.sink.close().await;
    }
}
