//! RocksDB database implementation.

use crate::{KeyValueStore, StorageResult, WriteBatch};
use rocksdb::{Options, DB};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// RocksDB wrapper over a single flat keyspace.
pub struct Database {
    db: Arc<DB>,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let path = path.as_ref();
        info!("Opening database at {:?}", path);

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_open_files(256);
        opts.set_keep_log_file_num(1);
        opts.set_write_buffer_size(64 * 1024 * 1024);
        opts.set_max_background_jobs(2);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path)?;
        debug!("Database opened successfully");

        Ok(Self { db: Arc::new(db) })
    }

    /// Open a database in read-only mode, used by the `graph` tool.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let path = path.as_ref();
        info!("Opening database in read-only mode at {:?}", path);

        let opts = Options::default();
        let db = DB::open_for_read_only(&opts, path, false)?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> StorageResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl KeyValueStore for Database {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.db.get(key)?)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.db.put(key, value)?;
        Ok(())
    }

    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut rocks_batch = rocksdb::WriteBatch::default();
        for (key, value) in batch.iter() {
            rocks_batch.put(key, value);
        }

        // WAL gives durability; skipping the per-write fsync keeps the sync
        // pipeline from stalling on disk.
        let mut write_opts = rocksdb::WriteOptions::default();
        write_opts.set_sync(false);

        self.db.write_opt(rocks_batch, &write_opts)?;
        Ok(())
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
        }
    }
}
