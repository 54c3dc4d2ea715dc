//! Peer loss scenarios over real sockets.

use kairos_network::{spawn_peer, MessageCode, PeerSet};
use kairos_types::{Clock, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Closing the stream mid-session stops the peer,
/// decrements the connected gauge and leaves other peers untouched.
#[tokio::test]
async fn test_stream_loss_releases_peer_and_spares_others() {
    let cancel = CancellationToken::new();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let peers = Arc::new(PeerSet::new());
    let (inbound_tx, mut inbound_rx) = mpsc::channel(64);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Two remote clients.
    let doomed_client = TcpStream::connect(addr).await.unwrap();
    let (doomed_server, doomed_addr) = listener.accept().await.unwrap();
    let healthy_client = TcpStream::connect(addr).await.unwrap();
    let (healthy_server, healthy_addr) = listener.accept().await.unwrap();

    spawn_peer(
        doomed_server,
        doomed_addr,
        Arc::clone(&peers),
        inbound_tx.clone(),
        Arc::clone(&clock),
        cancel.clone(),
        false,
    );
    let healthy = spawn_peer(
        healthy_server,
        healthy_addr,
        Arc::clone(&peers),
        inbound_tx.clone(),
        Arc::clone(&clock),
        cancel.clone(),
        false,
    );

    // Wire the healthy client into its own set so it can echo traffic.
    let client_peers = Arc::new(PeerSet::new());
    let (client_in_tx, mut client_in_rx) = mpsc::channel(64);
    let healthy_client_addr = healthy_client.peer_addr().unwrap();
    spawn_peer(
        healthy_client,
        healthy_client_addr,
        Arc::clone(&client_peers),
        client_in_tx,
        Arc::clone(&clock),
        cancel.clone(),
        false,
    );

    assert_eq!(peers.connected_count(), 2);

    // Kill one stream mid-session.
    drop(doomed_client);

    crate::harness::wait_until(Duration::from_secs(2), || peers.connected_count() == 1)
        .await
        .expect("gauge should drop to one");

    let survivor = peers.get(healthy.id()).expect("healthy peer still present");
    assert!(!survivor.is_stopped());

    // The surviving link still moves traffic in both directions.
    survivor
        .send(MessageCode::Transaction, b"still-alive".to_vec())
        .unwrap();
    let (_, got) = tokio::time::timeout(Duration::from_secs(2), client_in_rx.recv())
        .await
        .expect("survivor should deliver")
        .expect("channel open");
    assert_eq!(got.payload, b"still-alive");

    let client_peer = client_peers.all().into_iter().next().unwrap();
    client_peer
        .send(MessageCode::Transaction, b"echo".to_vec())
        .unwrap();
    let (_, echoed) = tokio::time::timeout(Duration::from_secs(2), inbound_rx.recv())
        .await
        .expect("server should receive")
        .expect("channel open");
    assert_eq!(echoed.payload, b"echo");

    cancel.cancel();
}

/// A stopped peer refuses further sends without disturbing the set.
#[tokio::test]
async fn test_send_after_removal_fails_cleanly() {
    let cancel = CancellationToken::new();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let peers = Arc::new(PeerSet::new());
    let (inbound_tx, _inbound_rx) = mpsc::channel(64);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _client = TcpStream::connect(addr).await.unwrap();
    let (server, server_addr) = listener.accept().await.unwrap();

    let peer = spawn_peer(
        server,
        server_addr,
        Arc::clone(&peers),
        inbound_tx,
        clock,
        cancel.clone(),
        false,
    );

    peers.remove(peer.id());
    assert_eq!(peers.connected_count(), 0);
    assert!(peer.send(MessageCode::Ping, Vec::new()).is_err());

    cancel.cancel();
}
