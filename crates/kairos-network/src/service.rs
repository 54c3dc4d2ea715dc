//! Per-peer I/O tasks and the listening service.
//!
//! Each connected peer gets a reader task, a writer task and optionally a
//! ping task. The reader stamps `receive_at`, answers pings inline and
//! forwards everything else to the shared inbound channel; the writer
//! drains the bounded send queue with a flush after every frame. Errors
//! stop the peer and release it from the set; they never cross into other
//! tasks.

use crate::{
    FrameCodec, MessageCode, NetworkError, NetworkResult, Peer, PeerId, PeerSet, WireMessage,
    PING_INTERVAL_SECS, SEND_QUEUE_CAP,
};
use futures::{SinkExt, StreamExt};
use kairos_types::Clock;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Inbound message channel: every decoded non-ping frame lands here.
pub type InboundSender = mpsc::Sender<(PeerId, WireMessage)>;

/// Network service configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Listen address.
    pub listen_addr: SocketAddr,
    /// Whether peers run the keep-alive ping ticker.
    pub ping_enabled: bool,
    /// Dial timeout for outbound connections.
    pub connect_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: format!("0.0.0.0:{}", crate::DEFAULT_PORT).parse().unwrap(),
            ping_enabled: true,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Wire a connected TCP stream into the peer set.
///
/// Registers the peer and spawns its I/O tasks. The returned handle is
/// already live; dropping it does not stop the tasks (the cancel token or
/// an I/O error does).
pub fn spawn_peer(
    stream: TcpStream,
    addr: SocketAddr,
    peers: Arc<PeerSet>,
    inbound: InboundSender,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    ping_enabled: bool,
) -> Arc<Peer> {
    let peer_id = PeerId::from_addr(&addr);
    let (send_tx, mut send_rx) = mpsc::channel::<WireMessage>(SEND_QUEUE_CAP);
    let peer = Arc::new(Peer::new(peer_id.clone(), addr, send_tx));
    peers.register(Arc::clone(&peer));

    let framed = Framed::new(stream, FrameCodec::new());
    let (mut sink, mut frames) = framed.split();

    // Writer task: drain the send queue, flush after every frame.
    {
        let peer = Arc::clone(&peer);
        let peers = Arc::clone(&peers);
        let cancel = cancel.clone();
        let peer_id = peer_id.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(peer = %peer_id, "Writer task cancelled");
                        break;
                    }
                    maybe = send_rx.recv() => {
                        let Some(message) = maybe else { break };
                        // SinkExt::send flushes; short frames must not sit
                        // in the buffer.
                        if let Err(e) = sink.send(message).await {
                            warn!(peer = %peer_id, error = %e, "Send error, stopping peer");
                            peer.stop();
                            peers.remove(&peer_id);
                            break;
                        }
                    }
                }
            }
        });
    }

    // Reader task: stamp, answer ping, forward the rest.
    {
        let peer = Arc::clone(&peer);
        let peers = Arc::clone(&peers);
        let cancel = cancel.clone();
        let peer_id = peer_id.clone();
        tokio::spawn(async move {
            loop {
                if peer.is_stopped() {
                    break;
                }
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(peer = %peer_id, "Reader task cancelled");
                        break;
                    }
                    item = frames.next() => {
                        match item {
                            Some(Ok(mut message)) => {
                                message.receive_at = clock.now_ms();
                                match message.message_code() {
                                    Ok(MessageCode::Ping) => {
                                        let _ = peer.send(MessageCode::Pong, Vec::new());
                                    }
                                    Ok(MessageCode::Pong) => {}
                                    Ok(_) => {
                                        if inbound.send((peer_id.clone(), message)).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(e) => {
                                        debug!(peer = %peer_id, error = %e, "Dropping unknown code");
                                    }
                                }
                            }
                            Some(Err(e)) => {
                                debug!(peer = %peer_id, error = %e, "Read error");
                                break;
                            }
                            None => {
                                debug!(peer = %peer_id, "Connection closed by peer");
                                break;
                            }
                        }
                    }
                }
            }
            peer.stop();
            peers.remove(&peer_id);
        });
    }

    // Optional keep-alive ticker.
    if ping_enabled {
        let peer = Arc::clone(&peer);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(PING_INTERVAL_SECS));
            ticker.tick().await; // first tick fires immediately
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if peer.is_stopped() {
                            break;
                        }
                        let _ = peer.send(MessageCode::Ping, Vec::new());
                    }
                }
            }
        });
    }

    peer
}

/// Dial a remote peer and wire it into the peer set.
pub async fn connect_peer(
    addr: SocketAddr,
    config: &NetworkConfig,
    peers: Arc<PeerSet>,
    inbound: InboundSender,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
) -> NetworkResult<Arc<Peer>> {
    let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| NetworkError::Timeout(format!("connect to {addr}")))?
        .map_err(NetworkError::Io)?;

    debug!(addr = %addr, "Connected to peer");
    Ok(spawn_peer(
        stream,
        addr,
        peers,
        inbound,
        clock,
        cancel,
        config.ping_enabled,
    ))
}

/// Accept loop for inbound connections.
pub struct PeerServer {
    config: NetworkConfig,
    peers: Arc<PeerSet>,
    inbound: InboundSender,
    clock: Arc<dyn Clock>,
}

impl PeerServer {
    /// Create a server around the shared peer set and inbound channel.
    pub fn new(
        config: NetworkConfig,
        peers: Arc<PeerSet>,
        inbound: InboundSender,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            peers,
            inbound,
            clock,
        }
    }

    /// Run the accept loop until cancelled.
    pub async fn run(self, cancel: CancellationToken) -> NetworkResult<()> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        info!(addr = %self.config.listen_addr, "Peer server listening");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Peer server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            info!(addr = %addr, "Incoming connection");
                            spawn_peer(
                                stream,
                                addr,
                                Arc::clone(&self.peers),
                                self.inbound.clone(),
                                Arc::clone(&self.clock),
                                cancel.clone(),
                                self.config.ping_enabled,
                            );
                        }
                        Err(e) => {
                            warn!(error = %e, "Accept error");
                        }
                    }
                }
            }
        }
    }
}
