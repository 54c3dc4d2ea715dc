//! Synchronization state machine.

use crate::{
    SyncError, SyncResult, MAX_CONSECUTIVE_FAILURES, REQUEST_TIMEOUT_MS, RETRY_PAUSE_MS,
    STATUS_FANOUT, STATUS_INTERVAL_MS,
};
use kairos_chain::ChainStore;
use kairos_network::{PeerId, SyncStatusMsg};
use kairos_types::Block;
use parking_lot::{Mutex, RwLock};
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Synchronizer status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// No peer status seen yet.
    Initial,
    /// Catching up to the best reported height.
    Syncing,
    /// Backing off after repeated request failures.
    Paused,
    /// Tip matches the best reported height; live gossip flows.
    Synced,
}

/// Requests the syncer asks the node to put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncCommand {
    /// Send a status request to a random subset of peers.
    RequestStatus {
        /// How many peers to probe.
        fanout: usize,
    },
    /// Request the block at `height` from a specific peer.
    RequestBlock {
        /// Target peer.
        peer: PeerId,
        /// Height to fetch.
        height: u64,
    },
}

/// Sync configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Consecutive failures before pausing.
    pub max_failures: u32,
    /// Pause duration before retrying.
    pub retry_pause: Duration,
    /// Cadence of status probes.
    pub status_interval: Duration,
    /// Peers probed per status round.
    pub status_fanout: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(REQUEST_TIMEOUT_MS),
            max_failures: MAX_CONSECUTIVE_FAILURES,
            retry_pause: Duration::from_millis(RETRY_PAUSE_MS),
            status_interval: Duration::from_millis(STATUS_INTERVAL_MS),
            status_fanout: STATUS_FANOUT,
        }
    }
}

/// The block synchronizer.
pub struct BlockSyncer {
    config: SyncConfig,
    chain: Arc<ChainStore>,
    cmd_tx: mpsc::Sender<SyncCommand>,

    status: RwLock<SyncStatus>,
    /// Inbound status replies, drained on each round.
    status_queue: Mutex<VecDeque<(PeerId, SyncStatusMsg)>>,
    /// Best height each peer has reported.
    peer_heights: Mutex<HashMap<PeerId, i64>>,
    /// Out-of-order sync replies held until their height is next.
    pending_blocks: Mutex<BTreeMap<u64, Block>>,
    /// Signaled whenever a sync block arrives.
    block_notify: Notify,
}

impl BlockSyncer {
    /// Create a syncer over the chain store. Commands come out of `cmd_tx`.
    pub fn new(
        config: SyncConfig,
        chain: Arc<ChainStore>,
        cmd_tx: mpsc::Sender<SyncCommand>,
    ) -> Self {
        Self {
            config,
            chain,
            cmd_tx,
            status: RwLock::new(SyncStatus::Initial),
            status_queue: Mutex::new(VecDeque::new()),
            peer_heights: Mutex::new(HashMap::new()),
            pending_blocks: Mutex::new(BTreeMap::new()),
            block_notify: Notify::new(),
        }
    }

    /// Current status. Gossip handlers gate on this.
    pub fn get_status(&self) -> SyncStatus {
        *self.status.read()
    }

    fn set_status(&self, next: SyncStatus) {
        let mut status = self.status.write();
        if *status != next {
            info!(from = ?*status, to = ?next, "Sync status change");
            *status = next;
        }
    }

    /// Queue an inbound status reply.
    pub fn append_status_msg(&self, peer: PeerId, msg: SyncStatusMsg) {
        self.status_queue.lock().push_back((peer, msg));
    }

    /// Deliver a sync block reply. The handler has already VRF-verified it.
    pub fn append_block(&self, block: Block) {
        self.pending_blocks.lock().insert(block.height(), block);
        self.block_notify.notify_waiters();
    }

    /// Record a height learned from live status gossip. Wakes the syncer
    /// out of `Synced` when the peer is ahead.
    pub fn note_peer_height(&self, peer: PeerId, height: i64) {
        self.peer_heights.lock().insert(peer, height);
        if height > self.chain.latest_height() && self.get_status() == SyncStatus::Synced {
            self.set_status(SyncStatus::Syncing);
        }
    }

    /// Forget a disconnected peer.
    pub fn remove_peer(&self, peer: &PeerId) {
        self.peer_heights.lock().remove(peer);
    }

    /// The highest height any peer has reported, -1 when none has.
    pub fn best_known_height(&self) -> i64 {
        self.peer_heights.lock().values().copied().max().unwrap_or(-1)
    }

    /// Run the state machine until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!("Block syncer started");
        let mut status_tick = tokio::time::interval(self.config.status_interval);

        loop {
            if cancel.is_cancelled() {
                break;
            }
            match self.get_status() {
                SyncStatus::Initial | SyncStatus::Synced => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = status_tick.tick() => {
                            if self
                                .cmd_tx
                                .send(SyncCommand::RequestStatus {
                                    fanout: self.config.status_fanout,
                                })
                                .await
                                .is_err()
                            {
                                break;
                            }
                            self.drain_status_queue();
                            self.evaluate_idle_transition();
                        }
                    }
                }
                SyncStatus::Syncing => {
                    if let Err(e) = self.sync_round(&cancel).await {
                        match e {
                            SyncError::ChannelClosed => break,
                            other => {
                                warn!(error = %other, "Sync round failed, pausing");
                                self.set_status(SyncStatus::Paused);
                            }
                        }
                    }
                }
                SyncStatus::Paused => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.config.retry_pause) => {
                            debug!("Retry timer fired, resuming sync");
                            self.set_status(SyncStatus::Syncing);
                        }
                    }
                }
            }
        }
        info!("Block syncer stopped");
    }

    fn drain_status_queue(&self) {
        let mut queue = self.status_queue.lock();
        let mut heights = self.peer_heights.lock();
        while let Some((peer, msg)) = queue.pop_front() {
            debug!(peer = %peer, height = msg.latest_height, "Status reply");
            heights.insert(peer, msg.latest_height);
        }
    }

    /// Transition out of `Initial`/`Synced` once replies warrant it.
    fn evaluate_idle_transition(&self) {
        let best = self.best_known_height();
        let latest = self.chain.latest_height();
        match self.get_status() {
            SyncStatus::Initial => {
                let any_reply = !self.peer_heights.lock().is_empty();
                if any_reply {
                    self.set_status(SyncStatus::Syncing);
                }
            }
            SyncStatus::Synced if best > latest => {
                self.set_status(SyncStatus::Syncing);
            }
            _ => {}
        }
    }

    /// One catch-up pass: request heights sequentially until the tip meets
    /// the target or failures accumulate.
    async fn sync_round(&self, cancel: &CancellationToken) -> SyncResult<()> {
        self.drain_status_queue();

        let mut failures: u32 = 0;
        let mut exclude: Option<PeerId> = None;

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            self.drain_status_queue();

            let latest = self.chain.latest_height();
            let target = self.best_known_height();
            if latest >= target {
                self.set_status(SyncStatus::Synced);
                return Ok(());
            }

            let height = (latest + 1) as u64;
            let Some(peer) = self.pick_peer(height, exclude.as_ref()) else {
                return Err(SyncError::NoPeer { height });
            };

            self.cmd_tx
                .send(SyncCommand::RequestBlock {
                    peer: peer.clone(),
                    height,
                })
                .await
                .map_err(|_| SyncError::ChannelClosed)?;

            match self.wait_for_block(height).await {
                Some(block) => match self.try_apply(block) {
                    Ok(()) => {
                        failures = 0;
                        exclude = None;
                    }
                    Err(e) => {
                        debug!(height, error = %e, "Discarding sync reply");
                        failures += 1;
                        exclude = Some(peer);
                    }
                },
                None => {
                    debug!(height, peer = %peer, "Sync request timed out");
                    failures += 1;
                    exclude = Some(peer);
                }
            }

            if failures >= self.config.max_failures {
                return Err(SyncError::Timeout { height });
            }
        }
    }

    /// Pick a random peer reporting at least `height`, avoiding the peer a
    /// previous attempt just failed against. Falls back to any peer that is
    /// ahead of us.
    fn pick_peer(&self, height: u64, exclude: Option<&PeerId>) -> Option<PeerId> {
        let heights = self.peer_heights.lock();
        let candidates: Vec<&PeerId> = heights
            .iter()
            .filter(|(id, h)| **h >= height as i64 && Some(*id) != exclude)
            .map(|(id, _)| id)
            .collect();

        if let Some(peer) = candidates.choose(&mut rand::thread_rng()) {
            return Some((*peer).clone());
        }

        // Last resort: the excluded peer may be the only one ahead.
        heights
            .iter()
            .find(|(_, h)| **h >= height as i64)
            .map(|(id, _)| id.clone())
    }

    /// Wait until a reply for `height` is buffered, or the request times
    /// out.
    async fn wait_for_block(&self, height: u64) -> Option<Block> {
        let deadline = tokio::time::Instant::now() + self.config.request_timeout;
        loop {
            if let Some(block) = self.pending_blocks.lock().remove(&height) {
                return Some(block);
            }
            let notified = self.block_notify.notified();
            // Re-check after registering to avoid a lost wakeup.
            if let Some(block) = self.pending_blocks.lock().remove(&height) {
                return Some(block);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    /// Apply a reply if it extends the local tip; a parent mismatch is
    /// discarded so the height gets re-requested from another peer.
    fn try_apply(&self, block: Block) -> SyncResult<()> {
        let height = block.height();
        match self.chain.latest_block() {
            Some(tip) => {
                if !block.extends(&tip) {
                    return Err(SyncError::ParentMismatch { height });
                }
            }
            None => {
                if !block.is_genesis() {
                    return Err(SyncError::ParentMismatch { height });
                }
            }
        }
        self.chain.insert_block(&block)?;
        debug!(height, "Applied sync block");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairos_storage::MemoryStore;
    use kairos_types::{
        merkle_root, BlockHeader, CompressedPublicKey, Hash, SystemClock,
    };

    fn fast_config() -> SyncConfig {
        SyncConfig {
            request_timeout: Duration::from_millis(100),
            max_failures: 3,
            retry_pause: Duration::from_millis(100),
            status_interval: Duration::from_millis(50),
            status_fanout: 4,
        }
    }

    fn new_chain() -> Arc<ChainStore> {
        Arc::new(ChainStore::open(Arc::new(MemoryStore::new()), Arc::new(SystemClock)).unwrap())
    }

    fn block(height: u64, prev: Hash) -> Block {
        let mut block = Block {
            header: BlockHeader {
                timestamp: 1_700_000_000_000 + height as i64,
                prev_hash: prev,
                hash: Hash::ZERO,
                merkle_root: merkle_root(&[]),
                height,
                public_key: CompressedPublicKey([0x02; 33]),
                params: Vec::new(),
            },
            transactions: Vec::new(),
        };
        block.header.hash = block.compute_hash();
        block
    }

    fn chain_of(len: u64) -> Vec<Block> {
        let mut blocks = vec![block(0, Hash::ZERO)];
        for height in 1..len {
            let prev = blocks.last().unwrap().hash();
            blocks.push(block(height, prev));
        }
        blocks
    }

    fn peer(tag: u8) -> PeerId {
        PeerId::from_bytes(vec![tag])
    }

    #[tokio::test]
    async fn test_initial_to_syncing_on_status() {
        let chain = new_chain();
        let (cmd_tx, mut cmd_rx) = mpsc::channel(64);
        let syncer = Arc::new(BlockSyncer::new(fast_config(), chain, cmd_tx));
        assert_eq!(syncer.get_status(), SyncStatus::Initial);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&syncer).run(cancel.clone()));

        // First the syncer probes for status.
        let cmd = cmd_rx.recv().await.unwrap();
        assert!(matches!(cmd, SyncCommand::RequestStatus { .. }));

        syncer.append_status_msg(
            peer(1),
            SyncStatusMsg {
                latest_height: 2,
                latest_hash: Hash([1; 32]),
            },
        );

        tokio::time::timeout(Duration::from_secs(2), async {
            while syncer.get_status() == SyncStatus::Initial {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("status reply should leave Initial");

        cancel.cancel();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn test_catches_up_and_settles_synced() {
        let chain = new_chain();
        let blocks = chain_of(4);
        chain.insert_block(&blocks[0]).unwrap();

        let (cmd_tx, mut cmd_rx) = mpsc::channel(64);
        let syncer = Arc::new(BlockSyncer::new(fast_config(), Arc::clone(&chain), cmd_tx));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&syncer).run(cancel.clone()));

        syncer.append_status_msg(
            peer(1),
            SyncStatusMsg {
                latest_height: 3,
                latest_hash: blocks[3].hash(),
            },
        );

        // Serve block requests in order; heights must come as 1, 2, 3.
        let mut served = Vec::new();
        while served.len() < 3 {
            match tokio::time::timeout(Duration::from_secs(2), cmd_rx.recv())
                .await
                .expect("syncer should keep requesting")
                .unwrap()
            {
                SyncCommand::RequestBlock { height, .. } => {
                    served.push(height);
                    syncer.append_block(blocks[height as usize].clone());
                }
                SyncCommand::RequestStatus { .. } => {}
            }
        }
        assert_eq!(served, vec![1, 2, 3]);

        tokio::time::timeout(Duration::from_secs(2), async {
            while syncer.get_status() != SyncStatus::Synced {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("syncer should reach Synced");
        assert_eq!(chain.latest_height(), 3);

        cancel.cancel();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn test_out_of_order_replies_applied_in_order() {
        let chain = new_chain();
        let blocks = chain_of(4);
        chain.insert_block(&blocks[0]).unwrap();

        let (cmd_tx, _cmd_rx) = mpsc::channel(64);
        let syncer = BlockSyncer::new(fast_config(), Arc::clone(&chain), cmd_tx);

        // Replies land out of order before anyone waits.
        syncer.append_block(blocks[3].clone());
        syncer.append_block(blocks[1].clone());
        syncer.append_block(blocks[2].clone());

        for expected in 1..=3u64 {
            let got = syncer.wait_for_block(expected).await.unwrap();
            assert_eq!(got.height(), expected);
            syncer.try_apply(got).unwrap();
        }
        assert_eq!(chain.latest_height(), 3);
    }

    #[tokio::test]
    async fn test_parent_mismatch_discarded() {
        let chain = new_chain();
        let blocks = chain_of(2);
        chain.insert_block(&blocks[0]).unwrap();

        let (cmd_tx, _cmd_rx) = mpsc::channel(64);
        let syncer = BlockSyncer::new(fast_config(), Arc::clone(&chain), cmd_tx);

        let orphan = block(1, Hash([0xee; 32]));
        assert!(matches!(
            syncer.try_apply(orphan),
            Err(SyncError::ParentMismatch { height: 1 })
        ));
        assert_eq!(chain.latest_height(), 0);

        syncer.try_apply(blocks[1].clone()).unwrap();
        assert_eq!(chain.latest_height(), 1);
    }

    #[tokio::test]
    async fn test_timeouts_pause_then_resume() {
        let chain = new_chain();
        let blocks = chain_of(1);
        chain.insert_block(&blocks[0]).unwrap();

        let (cmd_tx, mut cmd_rx) = mpsc::channel(64);
        let syncer = Arc::new(BlockSyncer::new(fast_config(), chain, cmd_tx));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&syncer).run(cancel.clone()));

        // A peer claims height 5 but never serves anything.
        syncer.append_status_msg(
            peer(1),
            SyncStatusMsg {
                latest_height: 5,
                latest_hash: Hash([5; 32]),
            },
        );

        tokio::time::timeout(Duration::from_secs(5), async {
            while syncer.get_status() != SyncStatus::Paused {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("repeated timeouts should pause the syncer");

        // The retry timer fires and syncing resumes.
        tokio::time::timeout(Duration::from_secs(5), async {
            while syncer.get_status() != SyncStatus::Syncing {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("paused syncer should auto-retry");

        // Three requests per round while the peer stays silent.
        let mut request_count = 0;
        while let Ok(Some(cmd)) =
            tokio::time::timeout(Duration::from_millis(500), cmd_rx.recv()).await
        {
            if matches!(cmd, SyncCommand::RequestBlock { .. }) {
                request_count += 1;
            }
            if request_count >= 3 {
                break;
            }
        }
        assert!(request_count >= 3);

        cancel.cancel();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn test_synced_reenters_on_height_gap() {
        let chain = new_chain();
        let blocks = chain_of(1);
        chain.insert_block(&blocks[0]).unwrap();

        let (cmd_tx, _cmd_rx) = mpsc::channel(64);
        let syncer = BlockSyncer::new(fast_config(), chain, cmd_tx);
        syncer.set_status(SyncStatus::Synced);

        syncer.note_peer_height(peer(2), 10);
        assert_eq!(syncer.get_status(), SyncStatus::Syncing);
    }

    #[test]
    fn test_pick_peer_prefers_non_excluded() {
        let chain = new_chain();
        let (cmd_tx, _cmd_rx) = mpsc::channel(64);
        let syncer = BlockSyncer::new(fast_config(), chain, cmd_tx);

        syncer.note_peer_height(peer(1), 10);
        syncer.note_peer_height(peer(2), 10);

        for _ in 0..16 {
            let picked = syncer.pick_peer(5, Some(&peer(1))).unwrap();
            assert_eq!(picked, peer(2));
        }

        // With nobody else ahead, the excluded peer is still usable.
        let only = syncer.pick_peer(5, Some(&peer(2)));
        assert!(only.is_some());
    }
}
