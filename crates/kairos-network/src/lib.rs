//! # kairos-network
//!
//! P2P transport layer for the kairos node:
//! - base64-framed wire messages terminated by a sentinel byte
//! - per-peer reader/writer/ping tasks over TCP
//! - the peer set with per-peer gossip known-sets
//! - bounded LRU known-sets for gossip dedup
//!
//! This layer never interprets payloads beyond ping/pong; everything else
//! flows to the node's message handler through a shared inbound channel.

mod codec;
mod error;
mod known;
mod message;
mod peer;
mod service;

pub use codec::FrameCodec;
pub use error::{NetworkError, NetworkResult};
pub use known::KnownSet;
pub use message::{
    decode_height, decode_sync_status, encode_height, encode_sync_status, MessageCode,
    SyncStatusMsg, TimeSyncMsg, WireMessage, TIME_SYNC_MSG_LEN,
};
pub use peer::{Peer, PeerId, PeerSet};
pub use service::{connect_peer, spawn_peer, NetworkConfig, PeerServer};

/// Default P2P port.
pub const DEFAULT_PORT: u16 = 9940;

/// Frame terminator byte.
pub const FRAME_TERMINATOR: u8 = 0xff;

/// Maximum accepted frame size (base64 bytes, terminator excluded).
pub const MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

/// Per-peer send queue capacity.
pub const SEND_QUEUE_CAP: usize = 5000;

/// Ping cadence for peers with keep-alive enabled.
pub const PING_INTERVAL_SECS: u64 = 15;

/// Capacity of node-wide known-sets.
pub const KNOWN_SET_CAP: usize = 32_768;

/// Capacity of per-peer known-sets.
pub const PEER_KNOWN_SET_CAP: usize = 1024;
