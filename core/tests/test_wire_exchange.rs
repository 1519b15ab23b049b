//! Wire-level exchange with a running node
//!
//! A bare TCP peer plays neighbor B against node A: it sends snapshots and
//! directives in the on-the-wire format and watches A's state change.
//!
//! Run with: cargo test --test test_wire_exchange

use linkstate_core::{
    NeighborRecord, NeighborTable, NodeContext, NodeEvent, NodeHandle, NodeId, NodeSettings,
    RouterNode, TcpLinkSender, WireMessage,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

fn id(s: &str) -> NodeId {
    s.parse().unwrap()
}

async fn write_raw(addr: std::net::SocketAddr, payload: &[u8]) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(payload).await.unwrap();
    stream.shutdown().await.unwrap();
}

async fn next_event<F>(events: &mut mpsc::Receiver<NodeEvent>, accept: F) -> NodeEvent
where
    F: Fn(&NodeEvent) -> bool,
{
    let wait = async {
        loop {
            match events.recv().await {
                Some(event) if accept(&event) => return event,
                Some(_) => continue,
                None => panic!("Event channel closed"),
            }
        }
    };
    timeout(Duration::from_secs(10), wait)
        .await
        .expect("Expected event did not arrive")
}

/// Node A with a single neighbor B whose "listener" is `peer`
async fn start_node(
    peer: &TcpListener,
    config: Option<&std::path::Path>,
) -> (NodeHandle, mpsc::Receiver<NodeEvent>) {
    let settings = NodeSettings {
        dissemination_interval_ms: 200,
        convergence_quiet_ms: 200,
        convergence_max_wait_ms: 1_000,
        ..NodeSettings::default()
    };
    let neighbors = NeighborTable::new(vec![NeighborRecord::new(
        id("B"),
        4.0,
        peer.local_addr().unwrap(),
    )]);
    let sender = Arc::new(TcpLinkSender::new(
        settings.connect_timeout(),
        settings.io_timeout(),
    ));
    let (tx, events) = mpsc::channel(256);
    let mut ctx = NodeContext::new(id("A"), neighbors, settings, tx);
    if let Some(path) = config {
        ctx = ctx.with_config_path(path);
    }

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let handle = RouterNode::new(Arc::new(ctx)).start(listener, sender).unwrap();
    (handle, events)
}

#[tokio::test]
async fn test_node_floods_its_table_as_json() {
    let peer = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (handle, _events) = start_node(&peer, None).await;

    let (mut stream, _) = timeout(Duration::from_secs(5), peer.accept())
        .await
        .expect("node never disseminated")
        .unwrap();
    let mut payload = Vec::new();
    stream.read_to_end(&mut payload).await.unwrap();

    let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();
    assert_eq!(json["sender"], "A");
    assert_eq!(json["table"]["cost"]["A"]["B"], 4.0);
    assert_eq!(json["table"]["cost"]["A"]["A"], 0.0);
    assert!(json["table"]["time"]["A"].is_f64());
    assert!(json["table"]["time"]["B"].is_null());

    handle.shutdown();
    handle.join().await;
}

#[tokio::test]
async fn test_snapshot_is_merged_and_routed() {
    let peer = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (handle, mut events) = start_node(&peer, None).await;

    let snapshot = r#"{"sender":"B","table":{"cost":{"B":{"A":4,"D":1.5,"E":"inf"}},"time":{"B":1000.0}}}"#;
    write_raw(handle.local_addr(), snapshot.as_bytes()).await;

    let event = next_event(&mut events, |e| matches!(e, NodeEvent::TableUpdated { .. })).await;
    assert!(matches!(event, NodeEvent::TableUpdated { changes: 1, .. }));

    let event = next_event(&mut events, |e| {
        matches!(e, NodeEvent::RoutesComputed(r) if r.distance(&id("D")).is_some())
    })
    .await;
    let NodeEvent::RoutesComputed(result) = event else {
        unreachable!()
    };
    assert_eq!(result.distance(&id("D")), Some(5.5));
    assert_eq!(result.path_to(&id("D")), Some(vec![id("A"), id("B"), id("D")]));
    assert_eq!(result.distance(&id("E")), None);

    handle.shutdown();
    handle.join().await;
}

#[tokio::test]
async fn test_directive_is_applied_and_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("Aconfig.txt");
    let peer = TcpListener::bind("127.0.0.1:0").await.unwrap();
    std::fs::write(
        &config,
        format!("1\nB 4 {}\n", peer.local_addr().unwrap().port()),
    )
    .unwrap();
    let (handle, mut events) = start_node(&peer, Some(&config)).await;

    let directive = WireMessage::LinkChange {
        from: id("B"),
        cost: 0.25,
    };
    write_raw(handle.local_addr(), &directive.to_bytes().unwrap()).await;

    next_event(&mut events, |e| matches!(e, NodeEvent::LinkCostChanged { .. })).await;
    let store = handle.context().store();
    assert_eq!(store.local_cost(&id("B")), 0.25);
    let written = std::fs::read_to_string(&config).unwrap();
    assert!(written.starts_with("1\nB 0.25 "));

    handle.shutdown();
    handle.join().await;
}

#[tokio::test]
async fn test_garbage_does_not_disturb_the_node() {
    let peer = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (handle, _events) = start_node(&peer, None).await;
    let before = handle.context().store().snapshot();

    write_raw(handle.local_addr(), b"hello there").await;
    write_raw(handle.local_addr(), b"{\"sender\": 42}").await;
    write_raw(handle.local_addr(), b"change B").await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(handle.context().store().snapshot(), before);

    // Still serving afterwards
    write_raw(handle.local_addr(), b"change B 2").await;
    timeout(Duration::from_secs(5), async {
        while handle.context().store().local_cost(&id("B")) != 2.0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("directive after garbage was not applied");

    handle.shutdown();
    handle.join().await;
}
