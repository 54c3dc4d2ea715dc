//! # kairos-mempool
//!
//! Content-addressed transaction pool. Transactions wait here between
//! gossip/RPC ingestion and block packaging; lookups are by the hex-encoded
//! body hash, matching the keys used by the gossip known-sets.

mod error;
mod pool;

pub use error::{MempoolError, MempoolResult};
pub use pool::{TxPool, TxPoolConfig};

/// Default maximum number of pooled transactions.
pub const DEFAULT_MAX_TXS: usize = 32_768;
