//! End-to-end exercises of the client and server event loops on loopback.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use sudp_protocol::core::MAX_PAYLOAD_SIZE;
use sudp_protocol::crypto::generate_signing_key;
use sudp_protocol::{connect, ConnError, LocalEndpoint, RemotePeer, Server};

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

#[tokio::test]
async fn client_server_hello_roundtrip() {
    let client_key = generate_signing_key();
    let server_key = generate_signing_key();

    let mut server = Server::listen(
        LocalEndpoint::new(1001, loopback(), server_key.clone()),
        vec![RemotePeer::new(7, None, client_key.verifying_key())],
    )
    .await
    .unwrap();

    let mut conn = connect(
        LocalEndpoint::new(7, loopback(), client_key),
        RemotePeer::new(1001, Some(server.local_addr()), server_key.verifying_key()),
    )
    .await
    .unwrap();

    conn.send(b"hello".to_vec()).await.unwrap();
    let (payload, vaddr) = server.recv_from().await.unwrap();
    assert_eq!(payload, b"hello");
    assert_eq!(vaddr, 7);

    server.send_to(b"hi yourself".to_vec(), 7).await.unwrap();
    assert_eq!(conn.recv().await.unwrap(), b"hi yourself");
}

#[tokio::test]
async fn oversized_payload_is_rejected_locally() {
    let client_key = generate_signing_key();
    let server_key = generate_signing_key();

    let server = Server::listen(
        LocalEndpoint::new(1001, loopback(), server_key.clone()),
        vec![RemotePeer::new(7, None, client_key.verifying_key())],
    )
    .await
    .unwrap();

    let conn = connect(
        LocalEndpoint::new(7, loopback(), client_key),
        RemotePeer::new(1001, Some(server.local_addr()), server_key.verifying_key()),
    )
    .await
    .unwrap();

    let err = conn.send(vec![0u8; MAX_PAYLOAD_SIZE + 1]).await.unwrap_err();
    assert!(matches!(err, ConnError::PayloadTooLarge(_)));
}

#[tokio::test]
async fn connect_requires_a_peer_address() {
    let err = connect(
        LocalEndpoint::new(7, loopback(), generate_signing_key()),
        RemotePeer::new(1001, None, generate_signing_key().verifying_key()),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ConnError::NoPeerAddress));
}

#[tokio::test]
async fn connect_times_out_against_a_silent_peer() {
    // A bound socket that never answers.
    let silent = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let target = silent.local_addr().unwrap();

    let started = Instant::now();
    let err = connect(
        LocalEndpoint::new(7, loopback(), generate_signing_key()),
        RemotePeer::new(1001, Some(target), generate_signing_key().verifying_key()),
    )
    .await
    .unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, ConnError::HandshakeTimeout(_)));
    // Initial send plus retries on the half-second tick: roughly two seconds.
    assert!(
        elapsed >= Duration::from_millis(1800),
        "gave up too fast: {elapsed:?}"
    );
    assert!(elapsed < Duration::from_secs(5), "gave up too slow: {elapsed:?}");
}

#[tokio::test]
async fn impostor_client_never_completes() {
    // The listener expects vaddr 7 under the honest key; the dialer signs
    // with a different one, so every initiation is dropped.
    let honest = generate_signing_key();
    let impostor = generate_signing_key();
    let server_key = generate_signing_key();

    let server = Server::listen(
        LocalEndpoint::new(1001, loopback(), server_key.clone()),
        vec![RemotePeer::new(7, None, honest.verifying_key())],
    )
    .await
    .unwrap();

    let err = connect(
        LocalEndpoint::new(7, loopback(), impostor),
        RemotePeer::new(1001, Some(server.local_addr()), server_key.verifying_key()),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ConnError::HandshakeTimeout(_)));
}

#[tokio::test]
async fn server_send_guards() {
    let server = Server::listen(
        LocalEndpoint::new(1001, loopback(), generate_signing_key()),
        vec![RemotePeer::new(7, None, generate_signing_key().verifying_key())],
    )
    .await
    .unwrap();

    let err = server.send_to(b"x".to_vec(), 99).await.unwrap_err();
    assert!(matches!(err, ConnError::UnknownPeer(99)));

    // Configured but never handshaken: the network is not touched.
    let err = server.send_to(b"x".to_vec(), 7).await.unwrap_err();
    assert!(matches!(err, ConnError::NotReady));
}

#[tokio::test]
async fn server_dispatches_between_peers() {
    let key_a = generate_signing_key();
    let key_b = generate_signing_key();
    let server_key = generate_signing_key();

    let mut server = Server::listen(
        LocalEndpoint::new(1001, loopback(), server_key.clone()),
        vec![
            RemotePeer::new(7, None, key_a.verifying_key()),
            RemotePeer::new(8, None, key_b.verifying_key()),
        ],
    )
    .await
    .unwrap();

    let conn_a = connect(
        LocalEndpoint::new(7, loopback(), key_a),
        RemotePeer::new(1001, Some(server.local_addr()), server_key.verifying_key()),
    )
    .await
    .unwrap();
    let conn_b = connect(
        LocalEndpoint::new(8, loopback(), key_b),
        RemotePeer::new(1001, Some(server.local_addr()), server_key.verifying_key()),
    )
    .await
    .unwrap();

    conn_a.send(b"from a".to_vec()).await.unwrap();
    conn_b.send(b"from b".to_vec()).await.unwrap();

    let mut seen = HashMap::new();
    for _ in 0..2 {
        let (payload, vaddr) = server.recv_from().await.unwrap();
        seen.insert(vaddr, payload);
    }
    assert_eq!(seen[&7], b"from a");
    assert_eq!(seen[&8], b"from b");

    server.send_to(b"for b only".to_vec(), 8).await.unwrap();
    let mut conn_b = conn_b;
    assert_eq!(conn_b.recv().await.unwrap(), b"for b only");
}
