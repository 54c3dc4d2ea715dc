//! # kairos-node
//!
//! The node layer tying the subsystems together:
//! - [`Handler`]: typed dispatch of inbound peer messages with gossip dedup
//! - [`TimeSyncer`]: the Cristian-style clock offset protocol
//! - broadcast tasks feeding the per-peer relay filter
//! - [`Node`]: explicit dependency wiring and task lifecycle
//!
//! There are no process-wide singletons; every subsystem has one owner and
//! tasks receive borrowed views through `Arc` handles.

pub mod broadcast;
pub mod config;
pub mod handler;
pub mod node;
pub mod time_sync;

pub use config::NodeConfig;
pub use handler::Handler;
pub use node::Node;
pub use time_sync::{TimeSyncStatus, TimeSyncer};
