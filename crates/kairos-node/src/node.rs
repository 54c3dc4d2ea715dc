//! Node wiring: construct the subsystems, spawn the task set, unwind on
//! shutdown.

use crate::broadcast::{self, BROADCAST_QUEUE_CAP};
use crate::config::NodeConfig;
use crate::handler::Handler;
use crate::time_sync::TimeSyncer;
use anyhow::{Context, Result};
use kairos_api::AppState;
use kairos_chain::{run_writer, ChainStore};
use kairos_crypto::{ConsensusVerifier, EcVrf};
use kairos_mempool::TxPool;
use kairos_network::{
    connect_peer, encode_height, MessageCode, NetworkConfig, PeerServer, PeerSet,
};
use kairos_storage::{Database, KeyValueStore};
use kairos_sync::{BlockSyncer, SyncCommand, SyncConfig};
use kairos_types::Clock;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Capacity of the shared inbound message channel.
const INBOUND_QUEUE_CAP: usize = 1024;

/// Cadence of own-height status gossip.
const STATUS_ANNOUNCE_INTERVAL: Duration = Duration::from_secs(10);

/// The running node.
pub struct Node {
    config: NodeConfig,
    chain: Arc<ChainStore>,
    pool: Arc<TxPool>,
    peers: Arc<PeerSet>,
    syncer: Arc<BlockSyncer>,
    time_syncer: Arc<TimeSyncer>,
    handler: Arc<Handler>,
    cancel: CancellationToken,
}

impl Node {
    /// Build every subsystem and spawn the task set.
    pub async fn start(config: NodeConfig) -> Result<Arc<Self>> {
        std::fs::create_dir_all(&config.data_dir).context("Create data directory")?;
        let db_path = config.data_dir.join("db");
        let db: Arc<dyn KeyValueStore> =
            Arc::new(Database::open(&db_path).context("Open database")?);

        let time_syncer = Arc::new(TimeSyncer::new(config.genesis, 0));
        let clock: Arc<dyn Clock> = Arc::clone(&time_syncer);

        let chain = Arc::new(ChainStore::open(db, Arc::clone(&clock)).context("Open chain store")?);
        let pool = Arc::new(TxPool::with_defaults());
        let peers = Arc::new(PeerSet::new());
        let verifier: Arc<dyn ConsensusVerifier> = Arc::new(EcVrf::new());

        let (sync_cmd_tx, sync_cmd_rx) = mpsc::channel(64);
        let syncer = Arc::new(BlockSyncer::new(
            SyncConfig::default(),
            Arc::clone(&chain),
            sync_cmd_tx,
        ));

        let (block_broadcast_tx, block_broadcast_rx) = mpsc::channel(BROADCAST_QUEUE_CAP);
        let (tx_broadcast_tx, tx_broadcast_rx) = mpsc::channel(BROADCAST_QUEUE_CAP);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_CAP);

        let handler = Arc::new(Handler::new(
            Arc::clone(&chain),
            Arc::clone(&pool),
            Arc::clone(&peers),
            Arc::clone(&syncer),
            Arc::clone(&time_syncer),
            verifier,
            block_broadcast_tx,
            tx_broadcast_tx,
            config.parsed_genesis_hash()?,
        ));

        let cancel = CancellationToken::new();

        // Chain writer pipeline.
        let writer_rx = chain
            .take_writer_rx()
            .context("Writer channel already taken")?;
        tokio::spawn(run_writer(Arc::clone(&chain), writer_rx, cancel.clone()));

        // Handler dispatch.
        tokio::spawn(Arc::clone(&handler).run(inbound_rx, cancel.clone()));

        // Syncers.
        tokio::spawn(Arc::clone(&syncer).run(cancel.clone()));
        tokio::spawn(Arc::clone(&time_syncer).run(Arc::clone(&peers), cancel.clone()));
        tokio::spawn(run_sync_commands(
            Arc::clone(&peers),
            sync_cmd_rx,
            cancel.clone(),
        ));

        // Broadcast fan-out.
        tokio::spawn(broadcast::run_block_broadcast(
            Arc::clone(&peers),
            block_broadcast_rx,
            cancel.clone(),
        ));
        tokio::spawn(broadcast::run_tx_broadcast(
            Arc::clone(&peers),
            tx_broadcast_rx,
            cancel.clone(),
        ));

        // Own-height gossip.
        tokio::spawn(run_status_announcer(
            Arc::clone(&chain),
            Arc::clone(&peers),
            cancel.clone(),
        ));

        // P2P listener.
        let listen_addr: SocketAddr = config
            .network
            .listen_addr
            .parse()
            .context("Parse listen address")?;
        let net_config = NetworkConfig {
            listen_addr,
            ping_enabled: config.network.ping_enabled,
            ..Default::default()
        };
        let server = PeerServer::new(
            net_config.clone(),
            Arc::clone(&peers),
            inbound_tx.clone(),
            Arc::clone(&clock),
        );
        {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = server.run(cancel).await {
                    warn!(error = %e, "Peer server exited");
                }
            });
        }

        // Bootstrap dials.
        for peer_addr in &config.network.bootstrap_peers {
            let Ok(addr) = peer_addr.parse::<SocketAddr>() else {
                warn!(addr = %peer_addr, "Skipping unparseable bootstrap peer");
                continue;
            };
            match connect_peer(
                addr,
                &net_config,
                Arc::clone(&peers),
                inbound_tx.clone(),
                Arc::clone(&clock),
                cancel.clone(),
            )
            .await
            {
                Ok(_) => info!(addr = %addr, "Bootstrap peer connected"),
                Err(e) => warn!(addr = %addr, error = %e, "Bootstrap dial failed"),
            }
        }

        // HTTP API.
        if config.api.enabled {
            let api_addr: SocketAddr = config
                .api
                .bind_address
                .parse()
                .context("Parse API bind address")?;
            let state = AppState::new(Arc::clone(&chain), Arc::clone(&pool));
            let cancel_api = cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = kairos_api::serve(state, api_addr, cancel_api).await {
                    warn!(error = %e, "API server exited");
                }
            });
        }

        info!(
            name = %config.node_name,
            height = chain.latest_height(),
            genesis = config.genesis,
            "Node started"
        );

        Ok(Arc::new(Self {
            config,
            chain,
            pool,
            peers,
            syncer,
            time_syncer,
            handler,
            cancel,
        }))
    }

    /// Chain store handle.
    pub fn chain(&self) -> &Arc<ChainStore> {
        &self.chain
    }

    /// Transaction pool handle.
    pub fn pool(&self) -> &Arc<TxPool> {
        &self.pool
    }

    /// Peer set handle.
    pub fn peers(&self) -> &Arc<PeerSet> {
        &self.peers
    }

    /// Block syncer handle.
    pub fn syncer(&self) -> &Arc<BlockSyncer> {
        &self.syncer
    }

    /// Time syncer handle.
    pub fn time_syncer(&self) -> &Arc<TimeSyncer> {
        &self.time_syncer
    }

    /// Message handler handle.
    pub fn handler(&self) -> &Arc<Handler> {
        &self.handler
    }

    /// Node configuration.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Signal every task to unwind.
    pub fn shutdown(&self) {
        info!("Node shutting down");
        self.cancel.cancel();
    }

    /// Wait until shutdown is signalled.
    pub async fn wait(&self) {
        self.cancel.cancelled().await;
    }
}

/// Translate syncer commands into peer sends.
async fn run_sync_commands(
    peers: Arc<PeerSet>,
    mut rx: mpsc::Receiver<SyncCommand>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            maybe = rx.recv() => {
                let Some(command) = maybe else { break };
                match command {
                    SyncCommand::RequestStatus { fanout } => {
                        for peer in peers.sample(fanout) {
                            let _ = peer.send(MessageCode::SyncStatusReq, Vec::new());
                        }
                    }
                    SyncCommand::RequestBlock { peer, height } => {
                        if let Some(peer) = peers.get(&peer) {
                            let _ = peer.send(
                                MessageCode::SyncGetBlocks,
                                encode_height(height as i64),
                            );
                        }
                    }
                }
            }
        }
    }
}

/// Gossip our height so peers notice gaps without polling.
async fn run_status_announcer(
    chain: Arc<ChainStore>,
    peers: Arc<PeerSet>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(STATUS_ANNOUNCE_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let height = chain.latest_height();
                if height < 0 {
                    continue;
                }
                for peer in peers.all() {
                    let _ = peer.send(MessageCode::Status, encode_height(height));
                }
            }
        }
    }
}
