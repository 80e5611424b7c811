use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use threadcast::hub::{Hub, Outbound, Subscriber};
use threadcast::types::{
    Bundle, FeedSource, IdentifierConfig, Result, ThreadUpdate, ThreadcastError,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

/// Channel-backed stand-in for a websocket write half.
struct MockConn {
    tx: mpsc::UnboundedSender<String>,
    fail: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

struct MockEnd {
    rx: mpsc::UnboundedReceiver<String>,
    fail: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

fn mock_conn() -> (MockConn, MockEnd) {
    let (tx, rx) = mpsc::unbounded_channel();
    let fail = Arc::new(AtomicBool::new(false));
    let closed = Arc::new(AtomicBool::new(false));
    (
        MockConn {
            tx,
            fail: fail.clone(),
            closed: closed.clone(),
        },
        MockEnd { rx, fail, closed },
    )
}

#[async_trait]
impl Outbound for MockConn {
    async fn deliver(&mut self, payload: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ThreadcastError::Delivery("mock write failed".to_string()));
        }
        self.tx
            .send(payload.to_string())
            .map_err(|_| ThreadcastError::Delivery("receiver gone".to_string()))
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn bundle(thread: &str, title: &str) -> Bundle {
    let source = Arc::new(FeedSource {
        id: "geras_dviratis".to_string(),
        url: "http://forum.example/syndication.php".to_string(),
        identifier: IdentifierConfig::Parameter {
            param_name: "t".to_string(),
        },
    });
    let mut updates = HashMap::new();
    updates.insert(
        thread.to_string(),
        ThreadUpdate {
            title: title.to_string(),
            last_updated_at: "Mon, 19 Aug 2013 21:05:52 +0300".to_string(),
            message_count: 1,
        },
    );
    Bundle { source, updates }
}

async fn recv_payload(end: &mut MockEnd) -> String {
    timeout(Duration::from_secs(1), end.rx.recv())
        .await
        .expect("delivery within a second")
        .expect("channel open")
}

#[tokio::test]
async fn broadcast_with_no_subscribers_is_safe() {
    let (hub, handle) = Hub::new();
    tokio::spawn(hub.run());

    handle.publish(bundle("1", "First")).await.unwrap();

    // The loop is still alive and serving after the empty broadcast.
    let (conn, mut end) = mock_conn();
    handle
        .subscribe(Subscriber {
            id: Uuid::new_v4(),
            conn: Box::new(conn),
        })
        .await
        .unwrap();
    handle.publish(bundle("2", "Second")).await.unwrap();

    // The bundle published to the empty registry is gone; the subscriber's
    // first payload is the one published after it registered.
    let payload = recv_payload(&mut end).await;
    let decoded: HashMap<String, ThreadUpdate> = serde_json::from_str(&payload).unwrap();
    assert!(decoded.contains_key("2"));
    assert!(!decoded.contains_key("1"));
}

#[tokio::test]
async fn publish_returns_only_after_the_hub_accepts_the_bundle() {
    let (hub, handle) = Hub::new();
    tokio::spawn(hub.run());

    // Each publish completes on its own, with no subscriber and no reader
    // draining the channel: the dispatch loop took every bundle.
    for n in 0..5 {
        timeout(
            Duration::from_secs(1),
            handle.publish(bundle(&n.to_string(), "Thread")),
        )
        .await
        .expect("hand-off accepted within a second")
        .unwrap();
    }

    let (conn, mut end) = mock_conn();
    handle
        .subscribe(Subscriber {
            id: Uuid::new_v4(),
            conn: Box::new(conn),
        })
        .await
        .unwrap();
    handle.publish(bundle("next", "Thread")).await.unwrap();

    let payload = recv_payload(&mut end).await;
    let decoded: HashMap<String, ThreadUpdate> = serde_json::from_str(&payload).unwrap();
    assert!(decoded.contains_key("next"));
}

#[tokio::test]
async fn every_registered_subscriber_receives_the_bundle() {
    let (hub, handle) = Hub::new();
    tokio::spawn(hub.run());

    let (conn_a, mut end_a) = mock_conn();
    let (conn_b, mut end_b) = mock_conn();
    for conn in [conn_a, conn_b] {
        handle
            .subscribe(Subscriber {
                id: Uuid::new_v4(),
                conn: Box::new(conn),
            })
            .await
            .unwrap();
    }

    handle.publish(bundle("47524", "Re: DEMA Quark XC FS remas")).await.unwrap();

    let payload_a = recv_payload(&mut end_a).await;
    let payload_b = recv_payload(&mut end_b).await;
    assert_eq!(payload_a, payload_b);

    let decoded: HashMap<String, ThreadUpdate> = serde_json::from_str(&payload_a).unwrap();
    assert_eq!(decoded["47524"].title, "Re: DEMA Quark XC FS remas");
    assert_eq!(decoded["47524"].message_count, 1);
}

#[tokio::test]
async fn failing_subscriber_is_pruned_and_others_keep_receiving() {
    let (hub, handle) = Hub::new();
    tokio::spawn(hub.run());

    let (healthy, mut healthy_end) = mock_conn();
    let (broken, broken_end) = mock_conn();
    broken_end.fail.store(true, Ordering::SeqCst);

    handle
        .subscribe(Subscriber {
            id: Uuid::new_v4(),
            conn: Box::new(healthy),
        })
        .await
        .unwrap();
    handle
        .subscribe(Subscriber {
            id: Uuid::new_v4(),
            conn: Box::new(broken),
        })
        .await
        .unwrap();

    handle.publish(bundle("1", "First")).await.unwrap();
    let first = recv_payload(&mut healthy_end).await;
    assert!(first.contains("First"));

    handle.publish(bundle("2", "Second")).await.unwrap();
    let second = recv_payload(&mut healthy_end).await;
    assert!(second.contains("Second"));

    // The broken connection was never delivered to and got closed.
    let mut broken_end = broken_end;
    assert!(broken_end.rx.try_recv().is_err());
    timeout(Duration::from_secs(1), async {
        while !broken_end.closed.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("broken connection closed");
}

#[tokio::test]
async fn unsubscribed_connection_receives_nothing_more() {
    let (hub, handle) = Hub::new();
    tokio::spawn(hub.run());

    let (conn, mut end) = mock_conn();
    let id = Uuid::new_v4();
    handle
        .subscribe(Subscriber {
            id,
            conn: Box::new(conn),
        })
        .await
        .unwrap();

    handle.publish(bundle("1", "First")).await.unwrap();
    recv_payload(&mut end).await;

    handle.unsubscribe(id).await.unwrap();

    // The close proves the unsubscribe was dispatched before we publish again.
    timeout(Duration::from_secs(1), async {
        while !end.closed.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("unsubscribed connection closed");

    handle.publish(bundle("2", "Second")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(end.rx.try_recv().is_err());
}
