//! Broadcast tasks: fan queued blocks and transactions out to peers.
//!
//! Each item is sent only to peers whose per-peer known-set lacks its hash;
//! sending marks the peer. Known-set eviction can rarely let a duplicate
//! through, which receivers absorb via their own dedup.

use kairos_network::{MessageCode, PeerSet};
use kairos_types::{Block, Transaction};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Capacity of the broadcast queues.
pub const BROADCAST_QUEUE_CAP: usize = 256;

/// Drain the block broadcast queue.
pub async fn run_block_broadcast(
    peers: Arc<PeerSet>,
    mut rx: mpsc::Receiver<Block>,
    cancel: CancellationToken,
) {
    info!("Block broadcast task started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            maybe = rx.recv() => {
                let Some(block) = maybe else { break };
                let hex_hash = block.hash().to_hex();
                match block.to_bytes() {
                    Ok(bytes) => {
                        debug!(height = block.height(), hash = %hex_hash, "Broadcasting block");
                        peers.relay_block(&hex_hash, MessageCode::NewBlock, &bytes);
                    }
                    Err(e) => warn!(hash = %hex_hash, error = %e, "Serialize block failed"),
                }
            }
        }
    }
    info!("Block broadcast task stopped");
}

/// Drain the transaction broadcast queue.
pub async fn run_tx_broadcast(
    peers: Arc<PeerSet>,
    mut rx: mpsc::Receiver<Transaction>,
    cancel: CancellationToken,
) {
    info!("Transaction broadcast task started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            maybe = rx.recv() => {
                let Some(tx) = maybe else { break };
                let hex_hash = tx.hash().to_hex();
                match tx.to_bytes() {
                    Ok(bytes) => {
                        peers.relay_transaction(&hex_hash, MessageCode::Transaction, &bytes);
                    }
                    Err(e) => warn!(tx = %hex_hash, error = %e, "Serialize transaction failed"),
                }
            }
        }
    }
    info!("Transaction broadcast task stopped");
}
