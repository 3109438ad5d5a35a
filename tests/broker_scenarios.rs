//! End-to-end scenarios driven over real TCP loopback connections.

use std::time::Duration;

use dataserv::broker::protocol::role;
use dataserv::socket::framing::{receive, send};
use dataserv::Broker;
use tokio::net::TcpStream;

const DEADLINE: Duration = Duration::from_secs(1);

async fn spawn_broker() -> (std::net::SocketAddr, std::sync::Arc<Broker>) {
    let (addr, broker, _serve_handle) = spawn_broker_with_handle().await;
    (addr, broker)
}

/// Like [`spawn_broker`], but also hands back the `serve()` task's join
/// handle so a test can await it after calling `Broker::stop()`.
async fn spawn_broker_with_handle() -> (
    std::net::SocketAddr,
    std::sync::Arc<Broker>,
    tokio::task::JoinHandle<()>,
) {
    let (broker, listener) = Broker::bind(0).await.expect("bind to an ephemeral port");
    let addr = listener.local_addr().expect("listener has a local address");
    let broker = std::sync::Arc::new(broker);
    let serving = std::sync::Arc::clone(&broker);
    let serve_handle = tokio::spawn(async move {
        serving.serve(listener).await;
    });
    (addr, broker, serve_handle)
}

async fn connect(addr: std::net::SocketAddr) -> TcpStream {
    TcpStream::connect(addr).await.expect("connect to broker")
}

async fn attach_source(addr: std::net::SocketAddr, dataset: &str) -> TcpStream {
    let mut stream = connect(addr).await;
    send(&mut stream, &[role::SOURCE], DEADLINE).await.unwrap();
    send(&mut stream, dataset.as_bytes(), DEADLINE).await.unwrap();
    stream
}

async fn attach_sink(addr: std::net::SocketAddr, dataset: &str) -> TcpStream {
    let mut stream = connect(addr).await;
    send(&mut stream, &[role::SINK], DEADLINE).await.unwrap();
    send(&mut stream, dataset.as_bytes(), DEADLINE).await.unwrap();
    stream
}

/// Read frames from a sink connection until a non-empty one arrives,
/// skipping any keepalives in between.
async fn next_non_empty(stream: &mut TcpStream, deadline: Duration) -> bytes::Bytes {
    loop {
        let frame = receive(stream, deadline, 1024).await.unwrap();
        if !frame.is_empty() {
            return frame;
        }
    }
}

#[tokio::test]
async fn s1_single_source_single_sink_single_payload() {
    let (addr, _broker) = spawn_broker().await;

    let mut source = attach_source(addr, "alpha").await;
    let mut sink = attach_sink(addr, "alpha").await;
    // Give the sink's attachment a moment to register before the source sends.
    tokio::time::sleep(Duration::from_millis(20)).await;

    send(&mut source, b"hello", DEADLINE).await.unwrap();

    let got = next_non_empty(&mut sink, Duration::from_secs(1)).await;
    assert_eq!(&got[..], b"hello");
}

#[tokio::test]
async fn s2_late_sink_is_seeded_from_latest() {
    let (addr, _broker) = spawn_broker().await;

    let mut source = attach_source(addr, "alpha").await;
    send(&mut source, b"hello", DEADLINE).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut sink = attach_sink(addr, "alpha").await;
    let got = next_non_empty(&mut sink, Duration::from_secs(1)).await;
    assert_eq!(&got[..], b"hello");
}

#[tokio::test]
async fn s3_duplicate_source_is_rejected_and_original_keeps_working() {
    let (addr, _broker) = spawn_broker().await;

    let mut source_a = attach_source(addr, "alpha").await;
    let mut duplicate = attach_source(addr, "alpha").await;

    // The duplicate's connection is closed by the broker: any read on it
    // observes EOF.
    let mut buf = [0u8; 1];
    use tokio::io::AsyncReadExt;
    let n = tokio::time::timeout(Duration::from_secs(1), duplicate.read(&mut buf))
        .await
        .expect("duplicate source read should not hang")
        .expect("read should not error");
    assert_eq!(n, 0, "duplicate source connection should be closed");

    // The original source remains attached and functional.
    let mut sink = attach_sink(addr, "alpha").await;
    send(&mut source_a, b"still here", DEADLINE).await.unwrap();
    let got = next_non_empty(&mut sink, Duration::from_secs(1)).await;
    assert_eq!(&got[..], b"still here");
}

#[tokio::test]
async fn s5_idle_sink_receives_periodic_keepalives() {
    let (addr, _broker) = spawn_broker().await;

    let _source = attach_source(addr, "alpha").await;
    let mut sink = attach_sink(addr, "alpha").await;

    let frame = receive(&mut sink, Duration::from_secs(4), 1024)
        .await
        .expect("sink should receive a keepalive before timing out");
    assert!(frame.is_empty(), "idle sink frame should be an empty keepalive");
}

#[tokio::test]
async fn s4_slow_sink_drops_oldest_and_catches_up_to_the_newest() {
    let (addr, _broker) = spawn_broker().await;

    let mut source = attach_source(addr, "alpha").await;
    let mut sink = attach_sink(addr, "alpha").await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Fire more payloads than the queue can hold before the sink ever reads.
    for i in 0..20u8 {
        send(&mut source, &[i], DEADLINE).await.unwrap();
    }

    // The sink only starts draining now; it must still end up with P20 (19,
    // zero-indexed) even though it never had a chance to see every payload.
    let last = loop {
        let frame = receive(&mut sink, Duration::from_secs(1), 1024).await.unwrap();
        if frame.is_empty() {
            continue;
        }
        if frame[0] == 19 {
            break frame;
        }
    };
    assert_eq!(&last[..], &[19]);
}

#[tokio::test]
async fn s6_info_query_lists_registered_datasets() {
    let (addr, _broker) = spawn_broker().await;

    let _alpha = attach_source(addr, "alpha").await;
    let _beta = attach_source(addr, "beta").await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut info = connect(addr).await;
    send(&mut info, &[role::INFO], DEADLINE).await.unwrap();
    let reply = receive(&mut info, DEADLINE, 1024).await.unwrap();
    let names = String::from_utf8(reply.to_vec()).unwrap();
    let mut parts: Vec<&str> = names.split(',').collect();
    parts.sort_unstable();
    assert_eq!(parts, vec!["alpha", "beta"]);
}

#[tokio::test]
async fn stop_cascades_to_every_attachment_and_serve_returns_promptly() {
    let (addr, broker, serve_handle) = spawn_broker_with_handle().await;

    let mut source = attach_source(addr, "alpha").await;
    let mut sink = attach_sink(addr, "alpha").await;
    // Let both attachments land in the registry before shutting down.
    tokio::time::sleep(Duration::from_millis(20)).await;

    broker.stop();

    tokio::time::timeout(Duration::from_secs(1), serve_handle)
        .await
        .expect("serve() should return promptly after stop(), not after NEGOTIATION_TIMEOUT")
        .expect("the serve task should not panic");

    // Both peers' attachments were torn down, so their sockets observe EOF.
    use tokio::io::AsyncReadExt;
    let mut buf = [0u8; 1];

    let n = tokio::time::timeout(Duration::from_secs(1), source.read(&mut buf))
        .await
        .expect("source read should not hang")
        .expect("read should not error");
    assert_eq!(n, 0, "source connection should observe EOF after stop()");

    let n = tokio::time::timeout(Duration::from_secs(1), sink.read(&mut buf))
        .await
        .expect("sink read should not hang")
        .expect("read should not error");
    assert_eq!(n, 0, "sink connection should observe EOF after stop()");
}
