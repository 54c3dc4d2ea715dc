//! # kairos-chain
//!
//! The chain store: a cached, persistently-backed mapping from block hash
//! and height to block bodies, plus the append pipeline that serializes
//! inserts through a single writer task.
//!
//! Key layout in the flat keyspace (external contract, byte-exact):
//!
//! ```text
//! "block#"  ‖ hash[0..32]          -> serialized block
//! "height#" ‖ big_endian_u64(h)    -> block hash
//! "tx#"     ‖ tx_hash[0..32]       -> serialized transaction
//! "latest"                         -> latest block hash
//! ```

mod error;
mod keys;
mod store;
mod writer;

pub use error::{ChainError, ChainResult};
pub use keys::{block_key, height_key, tx_key, LATEST_KEY};
pub use store::ChainStore;
pub use writer::run_writer;

/// Capacity of the block-by-hash cache.
pub const MAX_BLOCK_CACHE: usize = 1024;

/// Capacity of the hash-by-height cache.
pub const MAX_HEIGHT_CACHE: usize = 1024;

/// Capacity of the transaction cache.
pub const MAX_TX_CACHE: usize = 32_768;

/// Capacity of the writer channel feeding the persistence pipeline.
pub const DB_WRITER_QUEUE_CAP: usize = 64;
