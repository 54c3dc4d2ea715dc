//! Connected peers and the peer set.

use crate::{
    KnownSet, MessageCode, NetworkError, NetworkResult, WireMessage, PEER_KNOWN_SET_CAP,
};
use dashmap::DashMap;
use rand::seq::SliceRandom;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Unique peer identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(pub Vec<u8>);

impl PeerId {
    /// Create from bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Create from socket address.
    pub fn from_addr(addr: &SocketAddr) -> Self {
        Self(format!("{}", addr).into_bytes())
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

/// Handle to one connected peer.
///
/// The writer task owns the receiving half of the send queue; everything
/// else goes through this handle. Per-peer known-sets implement the relay
/// filter: a block or tx is only pushed to peers that have not seen it.
pub struct Peer {
    id: PeerId,
    addr: SocketAddr,
    send_tx: mpsc::Sender<WireMessage>,
    known_blocks: KnownSet,
    known_txs: KnownSet,
    stopped: AtomicBool,
    height: AtomicI64,
}

impl Peer {
    /// Create a peer handle around a send queue.
    pub fn new(id: PeerId, addr: SocketAddr, send_tx: mpsc::Sender<WireMessage>) -> Self {
        Self {
            id,
            addr,
            send_tx,
            known_blocks: KnownSet::new(PEER_KNOWN_SET_CAP),
            known_txs: KnownSet::new(PEER_KNOWN_SET_CAP),
            stopped: AtomicBool::new(false),
            height: AtomicI64::new(-1),
        }
    }

    /// Peer identifier.
    pub fn id(&self) -> &PeerId {
        &self.id
    }

    /// Remote address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Enqueue a message for the writer task.
    ///
    /// Back-pressure is the queue capacity: a full queue is an error, not a
    /// block, so handlers never stall on one slow peer.
    pub fn send(&self, code: MessageCode, payload: Vec<u8>) -> NetworkResult<()> {
        if self.is_stopped() {
            return Err(NetworkError::PeerClosed);
        }
        self.send_tx
            .try_send(WireMessage::new(code, payload))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    NetworkError::QueueFull(self.id.to_string())
                }
                mpsc::error::TrySendError::Closed(_) => NetworkError::PeerClosed,
            })
    }

    /// Mark a block hash as known to this peer.
    pub fn mark_block(&self, hex_hash: &str) {
        self.known_blocks.insert(hex_hash);
    }

    /// True when this peer already saw the block hash.
    pub fn knows_block(&self, hex_hash: &str) -> bool {
        self.known_blocks.contains(hex_hash)
    }

    /// Mark a transaction hash as known to this peer.
    pub fn mark_transaction(&self, hex_hash: &str) {
        self.known_txs.insert(hex_hash);
    }

    /// True when this peer already saw the transaction hash.
    pub fn knows_transaction(&self, hex_hash: &str) -> bool {
        self.known_txs.contains(hex_hash)
    }

    /// Last height this peer reported via status gossip.
    pub fn height(&self) -> i64 {
        self.height.load(Ordering::Relaxed)
    }

    /// Record a reported height.
    pub fn set_height(&self, height: i64) {
        self.height.store(height, Ordering::Relaxed);
    }

    /// Mark the peer stopped. Idempotent.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// True once the peer has been stopped.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// The set of currently connected peers.
pub struct PeerSet {
    peers: DashMap<PeerId, Arc<Peer>>,
    connected: AtomicUsize,
}

impl PeerSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self {
            peers: DashMap::new(),
            connected: AtomicUsize::new(0),
        }
    }

    /// Register a freshly connected peer.
    pub fn register(&self, peer: Arc<Peer>) {
        let id = peer.id().clone();
        if self.peers.insert(id.clone(), peer).is_none() {
            self.connected.fetch_add(1, Ordering::SeqCst);
        }
        debug!(peer = %id, connected = self.connected_count(), "Peer registered");
    }

    /// Remove a peer, stopping it and decrementing the connected gauge.
    pub fn remove(&self, id: &PeerId) -> Option<Arc<Peer>> {
        let removed = self.peers.remove(id).map(|(_, peer)| peer);
        if let Some(peer) = &removed {
            peer.stop();
            self.connected.fetch_sub(1, Ordering::SeqCst);
            debug!(peer = %id, connected = self.connected_count(), "Peer removed");
        }
        removed
    }

    /// Look up a peer.
    pub fn get(&self, id: &PeerId) -> Option<Arc<Peer>> {
        self.peers.get(id).map(|r| Arc::clone(r.value()))
    }

    /// All connected peers.
    pub fn all(&self) -> Vec<Arc<Peer>> {
        self.peers.iter().map(|r| Arc::clone(r.value())).collect()
    }

    /// A uniformly random subset of at most `count` peers.
    pub fn sample(&self, count: usize) -> Vec<Arc<Peer>> {
        let mut peers = self.all();
        peers.shuffle(&mut rand::thread_rng());
        peers.truncate(count);
        peers
    }

    /// One uniformly random peer, if any is connected.
    pub fn random(&self) -> Option<Arc<Peer>> {
        self.sample(1).into_iter().next()
    }

    /// Connected-peer gauge.
    pub fn connected_count(&self) -> usize {
        self.connected.load(Ordering::SeqCst)
    }

    /// Highest height any connected peer has reported.
    pub fn best_height(&self) -> Option<i64> {
        self.peers.iter().map(|r| r.value().height()).max()
    }

    /// Send `code`/`payload` to every peer whose block known-set lacks
    /// `hex_hash`, marking each receiver.
    pub fn relay_block(&self, hex_hash: &str, code: MessageCode, payload: &[u8]) {
        self.relay(hex_hash, code, payload, true)
    }

    /// Send `code`/`payload` to every peer whose tx known-set lacks
    /// `hex_hash`, marking each receiver.
    pub fn relay_transaction(&self, hex_hash: &str, code: MessageCode, payload: &[u8]) {
        self.relay(hex_hash, code, payload, false)
    }

    fn relay(&self, hex_hash: &str, code: MessageCode, payload: &[u8], block: bool) {
        for entry in self.peers.iter() {
            let peer = entry.value();
            let seen = if block {
                peer.knows_block(hex_hash)
            } else {
                peer.knows_transaction(hex_hash)
            };
            if seen {
                continue;
            }
            match peer.send(code, payload.to_vec()) {
                Ok(()) => {
                    if block {
                        peer.mark_block(hex_hash);
                    } else {
                        peer.mark_transaction(hex_hash);
                    }
                }
                Err(e) => {
                    warn!(peer = %peer.id(), error = %e, "Relay send failed");
                }
            }
        }
    }
}

impl Default for PeerSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    fn test_peer(port: u16) -> (Arc<Peer>, mpsc::Receiver<WireMessage>) {
        let (tx, rx) = mpsc::channel(8);
        let addr = test_addr(port);
        (Arc::new(Peer::new(PeerId::from_addr(&addr), addr, tx)), rx)
    }

    #[test]
    fn test_register_and_remove_track_gauge() {
        let set = PeerSet::new();
        let (peer, _rx) = test_peer(9940);
        let id = peer.id().clone();

        set.register(peer);
        assert_eq!(set.connected_count(), 1);

        let removed = set.remove(&id).unwrap();
        assert!(removed.is_stopped());
        assert_eq!(set.connected_count(), 0);
        assert!(set.get(&id).is_none());
    }

    #[test]
    fn test_send_after_stop_fails() {
        let (peer, _rx) = test_peer(9941);
        peer.stop();
        assert!(matches!(
            peer.send(MessageCode::Ping, Vec::new()),
            Err(NetworkError::PeerClosed)
        ));
    }

    #[test]
    fn test_queue_full_is_error() {
        let (tx, _rx) = mpsc::channel(1);
        let addr = test_addr(9942);
        let peer = Peer::new(PeerId::from_addr(&addr), addr, tx);

        peer.send(MessageCode::Ping, Vec::new()).unwrap();
        assert!(matches!(
            peer.send(MessageCode::Ping, Vec::new()),
            Err(NetworkError::QueueFull(_))
        ));
    }

    #[tokio::test]
    async fn test_relay_skips_knowing_peers() {
        let set = PeerSet::new();
        let (first, mut first_rx) = test_peer(9943);
        let (second, mut second_rx) = test_peer(9944);

        first.mark_block("aabb");
        set.register(first);
        set.register(second.clone());

        set.relay_block("aabb", MessageCode::NewBlock, b"payload");

        // Only the second peer receives; both now know the hash.
        assert!(first_rx.try_recv().is_err());
        let got = second_rx.try_recv().unwrap();
        assert_eq!(got.payload, b"payload");
        assert!(second.knows_block("aabb"));
    }

    #[test]
    fn test_sample_bounds() {
        let set = PeerSet::new();
        let mut receivers = Vec::new();
        for port in 9950..9955 {
            let (peer, rx) = test_peer(port);
            receivers.push(rx);
            set.register(peer);
        }
        assert_eq!(set.sample(3).len(), 3);
        assert_eq!(set.sample(10).len(), 5);
    }

    #[test]
    fn test_best_height() {
        let set = PeerSet::new();
        assert_eq!(set.best_height(), None);

        let (a, _rx_a) = test_peer(9960);
        let (b, _rx_b) = test_peer(9961);
        a.set_height(3);
        b.set_height(7);
        set.register(a);
        set.register(b);

        assert_eq!(set.best_height(), Some(7));
    }
}
