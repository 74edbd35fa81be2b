use std::net::SocketAddr;
use std::time::Duration;

use simfleet::discovery::{discover_at, DiscoveryResponder};
use simfleet::error::FleetError;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_discovers_responder_endpoint() {
    let bind: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let responder = DiscoveryResponder::bind(bind, 50051).await.unwrap();
    let target = responder.local_addr().unwrap();

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(responder.run(shutdown.clone()));

    let endpoint = discover_at(target, Duration::from_millis(500), 3)
        .await
        .unwrap();
    assert_eq!(endpoint, "http://127.0.0.1:50051");

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_responder_ignores_garbage() {
    let bind: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let responder = DiscoveryResponder::bind(bind, 6000).await.unwrap();
    let target = responder.local_addr().unwrap();

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(responder.run(shutdown.clone()));

    let probe = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    probe.send_to(b"hello", target).await.unwrap();

    let mut buf = [0u8; 64];
    let reply = tokio::time::timeout(Duration::from_millis(200), probe.recv_from(&mut buf)).await;
    assert!(reply.is_err(), "garbage should not be answered");

    // Still answers real probes afterwards
    let endpoint = discover_at(target, Duration::from_millis(500), 2)
        .await
        .unwrap();
    assert_eq!(endpoint, "http://127.0.0.1:6000");

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_discovery_fails_without_responder() {
    // Reserve a port, then release it so nothing answers
    let target = {
        let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.local_addr().unwrap()
    };

    let result = discover_at(target, Duration::from_millis(100), 2).await;
    assert!(matches!(
        result,
        Err(FleetError::Discovery(_)) | Err(FleetError::Io(_))
    ));
}
