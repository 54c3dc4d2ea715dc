//! # kairos-storage
//!
//! Key-value persistence for the kairos node.
//!
//! The chain store addresses everything through a flat byte keyspace with
//! string prefixes (`block#`, `height#`, `tx#`, `latest`), so this crate
//! exposes a plain get/put/batch interface rather than column families:
//! - [`KeyValueStore`]: the storage seam every consumer programs against
//! - [`Database`]: the RocksDB implementation
//! - [`MemoryStore`]: an in-memory double for tests
//! - [`WriteBatch`]: atomic multi-key writes

mod batch;
mod database;
mod error;
mod memory;

pub use batch::WriteBatch;
pub use database::Database;
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;

/// Storage seam for the flat keyspace.
///
/// Implementations must make `write_batch` atomic: either every operation
/// in the batch lands or none does.
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Put a single key-value pair.
    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Execute a batch of writes atomically.
    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()>;

    /// Check if a key exists.
    fn contains(&self, key: &[u8]) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}
