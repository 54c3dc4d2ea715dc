//! Inbound message dispatch.
//!
//! One handler task consumes the shared inbound channel and routes each
//! frame to a typed handler. Gossip dedup lives here (node-wide known-sets)
//! and on each peer (relay filter). Handler errors are logged and dropped;
//! nothing propagates back into peer I/O.

use crate::time_sync::TimeSyncer;
use kairos_chain::ChainStore;
use kairos_crypto::{bytes_to_public_key, ConsensusVerifier};
use kairos_mempool::TxPool;
use kairos_network::{
    decode_height, decode_sync_status, encode_sync_status, KnownSet, MessageCode, PeerId, PeerSet,
    SyncStatusMsg, TimeSyncMsg, WireMessage, KNOWN_SET_CAP,
};
use kairos_sync::{BlockSyncer, SyncStatus};
use kairos_types::{Block, Hash, Transaction, VrfParams};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The message handler.
pub struct Handler {
    chain: Arc<ChainStore>,
    pool: Arc<TxPool>,
    peers: Arc<PeerSet>,
    syncer: Arc<BlockSyncer>,
    time_syncer: Arc<TimeSyncer>,
    verifier: Arc<dyn ConsensusVerifier>,

    known_blocks: KnownSet,
    known_txs: KnownSet,

    block_broadcast_tx: mpsc::Sender<Block>,
    tx_broadcast_tx: mpsc::Sender<Transaction>,

    /// Boot-configured genesis hash; a gossiped height-0 block is accepted
    /// only when it matches.
    genesis_hash: Option<Hash>,
}

impl Handler {
    /// Wire up a handler over the node's subsystems.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain: Arc<ChainStore>,
        pool: Arc<TxPool>,
        peers: Arc<PeerSet>,
        syncer: Arc<BlockSyncer>,
        time_syncer: Arc<TimeSyncer>,
        verifier: Arc<dyn ConsensusVerifier>,
        block_broadcast_tx: mpsc::Sender<Block>,
        tx_broadcast_tx: mpsc::Sender<Transaction>,
        genesis_hash: Option<Hash>,
    ) -> Self {
        Self {
            chain,
            pool,
            peers,
            syncer,
            time_syncer,
            verifier,
            known_blocks: KnownSet::new(KNOWN_SET_CAP),
            known_txs: KnownSet::new(KNOWN_SET_CAP),
            block_broadcast_tx,
            tx_broadcast_tx,
            genesis_hash,
        }
    }

    /// Dispatch loop: drain the inbound channel until cancelled.
    pub async fn run(
        self: Arc<Self>,
        mut inbound: mpsc::Receiver<(PeerId, WireMessage)>,
        cancel: CancellationToken,
    ) {
        info!("Message handler started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                maybe = inbound.recv() => {
                    let Some((peer_id, message)) = maybe else { break };
                    self.dispatch(&peer_id, message).await;
                }
            }
        }
        info!("Message handler stopped");
    }

    /// Route one frame. Unknown peers can race disconnection; their frames
    /// are dropped.
    pub async fn dispatch(&self, peer_id: &PeerId, message: WireMessage) {
        let code = match message.message_code() {
            Ok(code) => code,
            Err(e) => {
                debug!(peer = %peer_id, error = %e, "Dropping frame with unknown code");
                return;
            }
        };

        match code {
            MessageCode::Status => self.handle_status(peer_id, &message),
            MessageCode::NewBlock => self.handle_new_block(peer_id, &message).await,
            MessageCode::NewBlockHash => self.handle_new_block_hash(peer_id, &message),
            MessageCode::Block => self.handle_block(peer_id, &message).await,
            MessageCode::Transaction => self.handle_transaction(peer_id, &message).await,
            MessageCode::NewPooledTxHashes => self.handle_new_pooled_tx_hashes(peer_id, &message),
            MessageCode::GetBlockBodies => self.handle_get_block_bodies(peer_id, &message),
            MessageCode::GetPooledTransaction => {
                self.handle_get_pooled_transaction(peer_id, &message)
            }
            MessageCode::SyncStatusReq => self.handle_sync_status_req(peer_id),
            MessageCode::SyncStatus => self.handle_sync_status(peer_id, &message),
            MessageCode::SyncGetBlocks => self.handle_sync_get_blocks(peer_id, &message),
            MessageCode::SyncBlock => self.handle_sync_block(peer_id, &message),
            MessageCode::TimeSyncReq => self.handle_time_sync_req(peer_id, &message),
            MessageCode::TimeSyncRsp => self.handle_time_sync_rsp(&message),
            // Ping/pong are consumed by the peer reader and never get here.
            MessageCode::Ping | MessageCode::Pong => {}
        }
    }

    /// The node's own sync status, for answering `sync_status_req`.
    pub fn status_message(&self) -> SyncStatusMsg {
        SyncStatusMsg {
            latest_height: self.chain.latest_height(),
            latest_hash: self
                .chain
                .latest_block()
                .map(|b| b.hash())
                .unwrap_or(Hash::ZERO),
        }
    }

    fn handle_status(&self, peer_id: &PeerId, message: &WireMessage) {
        let height = match decode_height(&message.payload) {
            Ok(height) => height,
            Err(e) => {
                debug!(peer = %peer_id, error = %e, "Bad status payload");
                return;
            }
        };
        debug!(peer = %peer_id, height, "Remote height");

        if let Some(peer) = self.peers.get(peer_id) {
            peer.set_height(height);
        }
        // Enqueue sync interest only; never fetch inline.
        if height > self.chain.latest_height() {
            self.syncer.note_peer_height(peer_id.clone(), height);
        }
    }

    async fn handle_new_block(&self, peer_id: &PeerId, message: &WireMessage) {
        let status = self.syncer.get_status();
        if status == SyncStatus::Syncing || status == SyncStatus::Paused {
            return;
        }

        let Some(block) = self.decode_block(peer_id, &message.payload) else {
            return;
        };
        let hex_hash = block.hash().to_hex();

        if self.known_blocks.contains(&hex_hash) {
            return;
        }
        self.known_blocks.insert(&hex_hash);
        if let Some(peer) = self.peers.get(peer_id) {
            peer.mark_block(&hex_hash);
        }

        if block.is_genesis() {
            self.accept_genesis(peer_id, &block);
            return;
        }

        if self.verify_block_vrf(&block) {
            let broadcast = block.clone();
            if let Err(e) = self.chain.append_block_task(block).await {
                warn!(error = %e, "Append task failed");
                return;
            }
            let _ = self.block_broadcast_tx.send(broadcast).await;
        } else {
            warn!(peer = %peer_id, hash = %hex_hash, "Block VRF verify failed");
        }
    }

    fn handle_new_block_hash(&self, peer_id: &PeerId, message: &WireMessage) {
        let status = self.syncer.get_status();
        if status == SyncStatus::Syncing || status == SyncStatus::Paused {
            return;
        }

        let Ok(hash) = Hash::from_slice(&message.payload) else {
            debug!(peer = %peer_id, "Bad block hash payload");
            return;
        };
        if self.known_blocks.contains(&hash.to_hex()) {
            return;
        }

        // Unknown hash: fetch the body from the announcing peer.
        if let Some(peer) = self.peers.get(peer_id) {
            let _ = peer.send(MessageCode::GetBlockBodies, hash.as_bytes().to_vec());
        }
    }

    async fn handle_block(&self, peer_id: &PeerId, message: &WireMessage) {
        if self.syncer.get_status() != SyncStatus::Synced {
            return;
        }

        let Some(block) = self.decode_block(peer_id, &message.payload) else {
            return;
        };
        let hex_hash = block.hash().to_hex();
        self.known_blocks.insert(&hex_hash);
        if let Some(peer) = self.peers.get(peer_id) {
            peer.mark_block(&hex_hash);
        }

        if block.is_genesis() {
            self.accept_genesis(peer_id, &block);
            return;
        }

        // Requested bodies are appended but never re-broadcast.
        if self.verify_block_vrf(&block) {
            if let Err(e) = self.chain.append_block_task(block).await {
                warn!(error = %e, "Append task failed");
            }
        } else {
            warn!(peer = %peer_id, hash = %hex_hash, "Block VRF verify failed");
        }
    }

    async fn handle_transaction(&self, peer_id: &PeerId, message: &WireMessage) {
        if self.syncer.get_status() != SyncStatus::Synced {
            return;
        }

        let transaction = match Transaction::from_bytes(&message.payload) {
            Ok(tx) => tx,
            Err(e) => {
                debug!(peer = %peer_id, error = %e, "Deserialize transaction failed");
                return;
            }
        };
        let hex_hash = transaction.hash().to_hex();

        if self.known_txs.contains(&hex_hash) {
            return;
        }
        self.known_txs.insert(&hex_hash);
        if let Some(peer) = self.peers.get(peer_id) {
            peer.mark_transaction(&hex_hash);
        }

        if let Err(e) = self.pool.add(transaction.clone()) {
            debug!(tx = %hex_hash, error = %e, "Pool rejected transaction");
            return;
        }
        let _ = self.tx_broadcast_tx.send(transaction).await;
    }

    fn handle_new_pooled_tx_hashes(&self, peer_id: &PeerId, message: &WireMessage) {
        if self.syncer.get_status() != SyncStatus::Synced {
            return;
        }

        let Ok(hash) = Hash::from_slice(&message.payload) else {
            debug!(peer = %peer_id, "Bad tx hash payload");
            return;
        };
        if self.known_txs.contains(&hash.to_hex()) || self.pool.contains(&hash.to_hex()) {
            return;
        }

        if let Some(peer) = self.peers.get(peer_id) {
            let _ = peer.send(MessageCode::GetPooledTransaction, hash.as_bytes().to_vec());
        }
    }

    fn handle_get_block_bodies(&self, peer_id: &PeerId, message: &WireMessage) {
        if self.syncer.get_status() != SyncStatus::Synced {
            return;
        }

        let Ok(hash) = Hash::from_slice(&message.payload) else {
            debug!(peer = %peer_id, "Bad block body request");
            return;
        };

        // Cache-only on purpose: a remote request must not turn into disk
        // reads.
        let Some(block) = self.chain.get_block_from_buffer(&hash) else {
            debug!(hash = %hash, "Block not buffered");
            return;
        };
        let Ok(bytes) = block.to_bytes() else { return };

        if let Some(peer) = self.peers.get(peer_id) {
            peer.mark_block(&hash.to_hex());
            let _ = peer.send(MessageCode::Block, bytes);
        }
    }

    fn handle_get_pooled_transaction(&self, peer_id: &PeerId, message: &WireMessage) {
        if self.syncer.get_status() != SyncStatus::Synced {
            return;
        }

        let Ok(hash) = Hash::from_slice(&message.payload) else {
            debug!(peer = %peer_id, "Bad pooled tx request");
            return;
        };
        let Some(tx) = self.pool.get(&hash.to_hex()) else {
            debug!(tx = %hash, "Transaction not pooled");
            return;
        };
        let Ok(bytes) = tx.to_bytes() else { return };

        if let Some(peer) = self.peers.get(peer_id) {
            peer.mark_transaction(&hash.to_hex());
            let _ = peer.send(MessageCode::Transaction, bytes);
        }
    }

    fn handle_sync_status_req(&self, peer_id: &PeerId) {
        let Ok(bytes) = encode_sync_status(&self.status_message()) else {
            return;
        };
        if let Some(peer) = self.peers.get(peer_id) {
            let _ = peer.send(MessageCode::SyncStatus, bytes);
        }
    }

    fn handle_sync_status(&self, peer_id: &PeerId, message: &WireMessage) {
        match decode_sync_status(&message.payload) {
            Ok(status) => self.syncer.append_status_msg(peer_id.clone(), status),
            Err(e) => debug!(peer = %peer_id, error = %e, "Bad sync status payload"),
        }
    }

    fn handle_sync_get_blocks(&self, peer_id: &PeerId, message: &WireMessage) {
        if self.syncer.get_status() != SyncStatus::Synced {
            return;
        }

        let height = match decode_height(&message.payload) {
            Ok(height) if height >= 0 => height as u64,
            Ok(_) | Err(_) => {
                debug!(peer = %peer_id, "Bad sync block request");
                return;
            }
        };

        let block = match self.chain.get_block_by_height(height) {
            Ok(block) => block,
            Err(e) => {
                debug!(height, error = %e, "Get block with height failed");
                return;
            }
        };
        let Ok(bytes) = block.to_bytes() else { return };

        if let Some(peer) = self.peers.get(peer_id) {
            let _ = peer.send(MessageCode::SyncBlock, bytes);
        }
    }

    fn handle_sync_block(&self, peer_id: &PeerId, message: &WireMessage) {
        let Some(block) = self.decode_block(peer_id, &message.payload) else {
            return;
        };

        if block.is_genesis() {
            if self.genesis_accepted(&block) {
                self.syncer.append_block(block);
            }
            return;
        }

        if self.verify_block_vrf(&block) {
            self.syncer.append_block(block);
        } else {
            warn!(peer = %peer_id, height = block.height(), "Sync block VRF verify failed");
        }
    }

    fn handle_time_sync_req(&self, peer_id: &PeerId, message: &WireMessage) {
        let mut msg = match TimeSyncMsg::from_bytes(&message.payload) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(peer = %peer_id, error = %e, "Time sync request deserialize failed");
                return;
            }
        };
        // The reader stamped the frame with the logical clock at receipt.
        msg.rec_req_time = message.receive_at;

        let reply = self.time_syncer.process_request(msg);
        if let Some(peer) = self.peers.get(peer_id) {
            let _ = peer.send(MessageCode::TimeSyncRsp, reply.to_bytes());
        }
    }

    fn handle_time_sync_rsp(&self, message: &WireMessage) {
        let mut msg = match TimeSyncMsg::from_bytes(&message.payload) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(error = %e, "Time sync reply deserialize failed");
                return;
            }
        };
        msg.rec_rsp_time = message.receive_at;
        self.time_syncer.process_response(msg);
    }

    fn decode_block(&self, peer_id: &PeerId, payload: &[u8]) -> Option<Block> {
        match Block::from_bytes(payload) {
            Ok(block) => Some(block),
            Err(e) => {
                debug!(peer = %peer_id, error = %e, "Deserialize block failed");
                None
            }
        }
    }

    /// Genesis guard: a gossiped height-0 block is trusted only when its
    /// hash was configured at boot.
    fn genesis_accepted(&self, block: &Block) -> bool {
        match self.genesis_hash {
            Some(expected) if block.hash() == expected => true,
            Some(expected) => {
                warn!(
                    got = %block.hash(),
                    expected = %expected,
                    "Rejecting genesis with unexpected hash"
                );
                false
            }
            None => {
                warn!(hash = %block.hash(), "Rejecting unsolicited genesis; no genesis hash configured");
                false
            }
        }
    }

    fn accept_genesis(&self, peer_id: &PeerId, block: &Block) {
        if !self.genesis_accepted(block) {
            return;
        }
        if let Err(e) = self.chain.insert_block(block) {
            warn!(peer = %peer_id, error = %e, "Genesis insert failed");
        } else {
            info!(hash = %block.hash(), "Genesis block accepted");
        }
    }

    /// Verify a block's VRF election proof. Fails closed on any malformed
    /// input.
    pub fn verify_block_vrf(&self, block: &Block) -> bool {
        let params = match VrfParams::from_bytes(&block.header.params) {
            Ok(params) => params,
            Err(e) => {
                warn!(error = %e, "Deserialize VRF params failed");
                return false;
            }
        };
        let public_key = match bytes_to_public_key(&block.header.public_key) {
            Ok(pk) => pk,
            Err(e) => {
                warn!(error = %e, "Reconstruct proposer key failed");
                return false;
            }
        };

        match self.verifier.check_remote_consensus(
            &public_key,
            &params.result,
            &params.s,
            &params.t,
            &params.random_number,
        ) {
            Ok(verified) => verified,
            Err(e) => {
                debug!(error = %e, "VRF verify errored");
                false
            }
        }
    }
}
