//! # kairos-sync
//!
//! Block synchronization: bring the local chain to the highest
//! peer-reported height, then hand live traffic back to the gossip layer.
//!
//! The syncer is a state machine
//! (`Initial → Syncing → Synced`, with `Paused` for backoff) driven by a
//! single task. It never touches sockets: outgoing requests leave as
//! [`SyncCommand`]s on a channel the node wires to the peer set, and
//! replies arrive through [`BlockSyncer::append_status_msg`] and
//! [`BlockSyncer::append_block`].

mod error;
mod syncer;

pub use error::{SyncError, SyncResult};
pub use syncer::{BlockSyncer, SyncCommand, SyncConfig, SyncStatus};

/// Default per-request timeout in milliseconds.
pub const REQUEST_TIMEOUT_MS: u64 = 2000;

/// Consecutive failures before the syncer pauses.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Default pause before a paused syncer retries, in milliseconds.
pub const RETRY_PAUSE_MS: u64 = 5000;

/// Default cadence of status probes, in milliseconds.
pub const STATUS_INTERVAL_MS: u64 = 3000;

/// Default number of peers probed per status round.
pub const STATUS_FANOUT: usize = 8;
