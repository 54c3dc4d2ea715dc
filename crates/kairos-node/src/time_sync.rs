//! Time synchronizer: pairwise clock-offset alignment with the swarm.

use kairos_network::{MessageCode, PeerSet, TimeSyncMsg};
use kairos_types::Clock;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Cadence of outgoing clock probes.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(3);

/// Consecutive in-tolerance confirmations required to declare SYNCED.
pub const CONFIRM_THRESHOLD: u32 = 5;

/// Offset tolerance in milliseconds.
pub const AVAILABLE_THRESHOLD_MS: i64 = 1000;

/// Time sync status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSyncStatus {
    /// No reply processed yet.
    Initial,
    /// Accumulating in-tolerance confirmations.
    Confirming,
    /// Clock aligned with the swarm.
    Synced,
}

struct TimeSyncState {
    status: TimeSyncStatus,
    delta: i64,
    confirm_times: u32,
}

/// The time synchronizer.
///
/// Owns the node's clock offset. `logical_clock` reads go through the
/// [`Clock`] impl so block timestamps, VRF rounds and frame stamps all see
/// the same adjusted time.
pub struct TimeSyncer {
    genesis: bool,
    state: RwLock<TimeSyncState>,
}

impl TimeSyncer {
    /// Create a syncer. Genesis nodes start SYNCED with a zero offset and
    /// never probe.
    pub fn new(genesis: bool, delta: i64) -> Self {
        let status = if genesis {
            TimeSyncStatus::Synced
        } else {
            TimeSyncStatus::Initial
        };
        Self {
            genesis,
            state: RwLock::new(TimeSyncState {
                status,
                delta,
                confirm_times: 0,
            }),
        }
    }

    /// Current status.
    pub fn status(&self) -> TimeSyncStatus {
        self.state.read().status
    }

    /// True once the clock is aligned.
    pub fn synced(&self) -> bool {
        self.status() == TimeSyncStatus::Synced
    }

    /// Current offset in ms.
    pub fn delta(&self) -> i64 {
        self.state.read().delta
    }

    /// Handle a probe from a peer: stamp the reply time.
    ///
    /// The handler has already filled `rec_req_time` from the frame's
    /// receive stamp.
    pub fn process_request(&self, mut msg: TimeSyncMsg) -> TimeSyncMsg {
        msg.rsp_time = self.now_ms();
        msg
    }

    /// Handle a probe reply: estimate the offset and advance the state
    /// machine.
    pub fn process_response(&self, msg: TimeSyncMsg) {
        if msg.code != 0 {
            warn!(code = msg.code, "Peer rejected time sync probe");
            return;
        }

        let delta = ((msg.rsp_time - msg.rec_rsp_time) + (msg.rec_req_time - msg.req_time)) / 2;
        debug!(delta, "Time sync offset estimate");

        let mut state = self.state.write();
        match state.status {
            TimeSyncStatus::Initial => {
                state.status = TimeSyncStatus::Confirming;
                state.delta += delta;
            }
            TimeSyncStatus::Confirming | TimeSyncStatus::Synced => {
                if delta.abs() < AVAILABLE_THRESHOLD_MS {
                    state.delta += delta;
                    if state.status == TimeSyncStatus::Confirming {
                        state.confirm_times += 1;
                        debug!(confirm_times = state.confirm_times, "Offset confirmed");
                    }
                } else {
                    state.confirm_times = 0;
                }

                if state.status == TimeSyncStatus::Confirming
                    && state.confirm_times >= CONFIRM_THRESHOLD
                {
                    state.status = TimeSyncStatus::Synced;
                    info!(delta = state.delta, "Time sync finished");
                }
            }
        }
    }

    /// Probe loop: every interval, ask one random peer for its clock.
    pub async fn run(self: Arc<Self>, peers: Arc<PeerSet>, cancel: CancellationToken) {
        if self.genesis {
            return;
        }
        info!("Time syncer started");
        let mut ticker = tokio::time::interval(SYNC_INTERVAL);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(peer) = peers.random() else { continue };
                    let msg = TimeSyncMsg {
                        code: 0,
                        req_time: self.now_ms(),
                        ..Default::default()
                    };
                    if let Err(e) = peer.send(MessageCode::TimeSyncReq, msg.to_bytes()) {
                        debug!(peer = %peer.id(), error = %e, "Time sync probe failed");
                    }
                }
            }
        }
        info!("Time syncer stopped");
    }

    fn wallclock_ms(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }
}

impl Clock for TimeSyncer {
    fn now_ms(&self) -> i64 {
        // Read lock: readers see either the prior or the new delta, never a
        // partial update.
        let state = self.state.read();
        self.wallclock_ms() + state.delta
    }
}
