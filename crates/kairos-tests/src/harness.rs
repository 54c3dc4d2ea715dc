//! Test harness: a fully wired node core over an in-memory store, with
//! observable channels instead of sockets.

use kairos_chain::{run_writer, ChainStore};
use kairos_crypto::{ConsensusVerifier, EcVrf};
use kairos_mempool::TxPool;
use kairos_network::{
    MessageCode, Peer, PeerId, PeerSet, WireMessage, SEND_QUEUE_CAP,
};
use kairos_node::{Handler, TimeSyncer};
use kairos_storage::{Database, KeyValueStore, MemoryStore};
use kairos_sync::{BlockSyncer, SyncCommand, SyncConfig, SyncStatus};
use kairos_types::{Block, Hash, SystemClock, Transaction};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Test database wrapper that cleans up on drop.
pub struct TestDatabase {
    db: Database,
    _temp_dir: TempDir,
}

impl TestDatabase {
    /// Create a new test database in a temporary directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(temp_dir.path()).expect("Failed to open database");
        Self {
            db,
            _temp_dir: temp_dir,
        }
    }

    /// Get the path to the database.
    pub fn path(&self) -> PathBuf {
        self._temp_dir.path().to_path_buf()
    }

    /// Get a clone of the database (shares the underlying connection).
    pub fn db_clone(&self) -> Database {
        self.db.clone()
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

fn fast_sync_config() -> SyncConfig {
    SyncConfig {
        request_timeout: Duration::from_millis(150),
        max_failures: 3,
        retry_pause: Duration::from_millis(150),
        status_interval: Duration::from_millis(50),
        status_fanout: 4,
    }
}

/// A wired node core: chain, pool, peers, syncers and handler, with the
/// writer and syncer tasks running. Broadcast queues stay observable.
pub struct TestNode {
    /// Chain store.
    pub chain: Arc<ChainStore>,
    /// Transaction pool.
    pub pool: Arc<TxPool>,
    /// Peer set.
    pub peers: Arc<PeerSet>,
    /// Block syncer.
    pub syncer: Arc<BlockSyncer>,
    /// Time syncer (also the logical clock).
    pub time_syncer: Arc<TimeSyncer>,
    /// Message handler.
    pub handler: Arc<Handler>,
    /// Commands the syncer wants on the wire.
    pub sync_cmd_rx: mpsc::Receiver<SyncCommand>,
    /// Blocks queued for re-broadcast.
    pub block_broadcast_rx: mpsc::Receiver<Block>,
    /// Transactions queued for re-broadcast.
    pub tx_broadcast_rx: mpsc::Receiver<Transaction>,
    /// Cancels every spawned task on drop.
    pub cancel: CancellationToken,
}

impl TestNode {
    /// Build a node core over a fresh in-memory store.
    ///
    /// `genesis_hash` is the boot-configured trust anchor for gossiped
    /// height-0 blocks.
    pub fn new(genesis_hash: Option<Hash>) -> Self {
        let db: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let time_syncer = Arc::new(TimeSyncer::new(true, 0));
        let chain = Arc::new(
            ChainStore::open(db, Arc::new(SystemClock)).expect("open chain store"),
        );
        let pool = Arc::new(TxPool::with_defaults());
        let peers = Arc::new(PeerSet::new());
        let verifier: Arc<dyn ConsensusVerifier> = Arc::new(EcVrf::new());

        let (sync_cmd_tx, sync_cmd_rx) = mpsc::channel(256);
        let syncer = Arc::new(BlockSyncer::new(
            fast_sync_config(),
            Arc::clone(&chain),
            sync_cmd_tx,
        ));

        let (block_broadcast_tx, block_broadcast_rx) = mpsc::channel(64);
        let (tx_broadcast_tx, tx_broadcast_rx) = mpsc::channel(64);

        let handler = Arc::new(Handler::new(
            Arc::clone(&chain),
            Arc::clone(&pool),
            Arc::clone(&peers),
            Arc::clone(&syncer),
            Arc::clone(&time_syncer),
            verifier,
            block_broadcast_tx,
            tx_broadcast_tx,
            genesis_hash,
        ));

        let cancel = CancellationToken::new();

        let writer_rx = chain.take_writer_rx().expect("writer channel");
        tokio::spawn(run_writer(Arc::clone(&chain), writer_rx, cancel.clone()));
        tokio::spawn(Arc::clone(&syncer).run(cancel.clone()));

        Self {
            chain,
            pool,
            peers,
            syncer,
            time_syncer,
            handler,
            sync_cmd_rx,
            block_broadcast_rx,
            tx_broadcast_rx,
            cancel,
        }
    }

    /// Register a fake peer; returns its id and the observable send queue.
    pub fn add_peer(&self, tag: u8) -> (PeerId, mpsc::Receiver<WireMessage>) {
        let addr: SocketAddr = format!("127.0.0.1:{}", 20000 + tag as u16)
            .parse()
            .expect("addr");
        let (tx, rx) = mpsc::channel(SEND_QUEUE_CAP);
        let peer = Arc::new(Peer::new(PeerId::from_addr(&addr), addr, tx));
        let id = peer.id().clone();
        self.peers.register(peer);
        (id, rx)
    }

    /// Deliver a frame to the handler as if it came off the wire.
    pub async fn deliver(&self, peer: &PeerId, code: MessageCode, payload: Vec<u8>) {
        let mut message = WireMessage::new(code, payload);
        message.receive_at = kairos_types::Clock::now_ms(&*self.time_syncer);
        self.handler.dispatch(peer, message).await;
    }

    /// Drive the syncer to `Synced` by reporting our own tip from a peer.
    pub async fn make_synced(&self, peer: &PeerId) {
        self.deliver(
            peer,
            MessageCode::SyncStatus,
            kairos_network::encode_sync_status(&kairos_network::SyncStatusMsg {
                latest_height: self.chain.latest_height(),
                latest_hash: self
                    .chain
                    .latest_block()
                    .map(|b| b.hash())
                    .unwrap_or(Hash::ZERO),
            })
            .expect("encode status"),
        )
        .await;

        wait_until(Duration::from_secs(2), || {
            self.syncer.get_status() == SyncStatus::Synced
        })
        .await
        .expect("syncer should reach Synced");
    }

    /// Wait for the writer task to bring the tip to `height`.
    pub async fn wait_for_height(&self, height: i64) {
        let chain = Arc::clone(&self.chain);
        wait_until(Duration::from_secs(2), move || {
            chain.latest_height() >= height
        })
        .await
        .expect("tip should reach the expected height");
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, check: F) -> Result<(), ()>
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
