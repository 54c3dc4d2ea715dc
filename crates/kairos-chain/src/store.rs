//! Chain store implementation.

use crate::{
    block_key, height_key, tx_key, ChainError, ChainResult, DB_WRITER_QUEUE_CAP, LATEST_KEY,
    MAX_BLOCK_CACHE, MAX_HEIGHT_CACHE, MAX_TX_CACHE,
};
use kairos_storage::{KeyValueStore, WriteBatch};
use kairos_types::{merkle_root, Block, BlockHeader, Clock, CompressedPublicKey, Hash, Transaction};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// The chain store.
///
/// Owns the read-through caches and the writer channel. The tip cursor is
/// guarded by an exclusive lock on write so readers never observe a torn
/// (`latest_block`, `latest_height`) pair.
pub struct ChainStore {
    db: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,

    block_cache: Mutex<LruCache<Hash, Block>>,
    height_cache: Mutex<LruCache<u64, Hash>>,
    tx_cache: Mutex<LruCache<Hash, Transaction>>,

    latest: RwLock<Option<Block>>,

    writer_tx: mpsc::Sender<Block>,
    writer_rx: Mutex<Option<mpsc::Receiver<Block>>>,
}

fn cache<K: std::hash::Hash + Eq, V>(capacity: usize) -> Mutex<LruCache<K, V>> {
    Mutex::new(LruCache::new(
        NonZeroUsize::new(capacity).expect("cache capacity is nonzero"),
    ))
}

impl ChainStore {
    /// Create a store over a backing KV store, recovering the tip from the
    /// `latest` pointer if one was persisted.
    pub fn open(db: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> ChainResult<Self> {
        let (writer_tx, writer_rx) = mpsc::channel(DB_WRITER_QUEUE_CAP);

        let store = Self {
            db,
            clock,
            block_cache: cache(MAX_BLOCK_CACHE),
            height_cache: cache(MAX_HEIGHT_CACHE),
            tx_cache: cache(MAX_TX_CACHE),
            latest: RwLock::new(None),
            writer_tx,
            writer_rx: Mutex::new(Some(writer_rx)),
        };

        if let Some(tip) = store.load_tip()? {
            info!(height = tip.height(), hash = %tip.hash(), "Recovered chain tip");
            *store.latest.write() = Some(tip);
        }

        Ok(store)
    }

    /// Take the writer channel receiver; used once to start the writer task.
    pub fn take_writer_rx(&self) -> Option<mpsc::Receiver<Block>> {
        self.writer_rx.lock().take()
    }

    fn load_tip(&self) -> ChainResult<Option<Block>> {
        let Some(hash_bytes) = self.db.get(LATEST_KEY)? else {
            return Ok(None);
        };
        let hash =
            Hash::from_slice(&hash_bytes).map_err(|e| ChainError::Deserialize(e.to_string()))?;
        match self.get_block_by_hash(&hash) {
            Ok(block) => Ok(Some(block)),
            Err(ChainError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Current tip, if any block has been inserted.
    pub fn latest_block(&self) -> Option<Block> {
        self.latest.read().clone()
    }

    /// Current tip height, -1 before initialization.
    pub fn latest_height(&self) -> i64 {
        self.latest
            .read()
            .as_ref()
            .map(|b| b.height() as i64)
            .unwrap_or(-1)
    }

    /// Fetch a block by hash, reading through the cache.
    pub fn get_block_by_hash(&self, hash: &Hash) -> ChainResult<Block> {
        if let Some(block) = self.block_cache.lock().get(hash) {
            return Ok(block.clone());
        }

        let bytes = self.db.get(&block_key(hash))?.ok_or(ChainError::NotFound)?;
        let block =
            Block::from_bytes(&bytes).map_err(|e| ChainError::Deserialize(e.to_string()))?;
        self.write_cache(&block);
        Ok(block)
    }

    /// Fetch a block by height.
    ///
    /// Heights beyond the tip fail with `OutOfRange`. A height-cache miss
    /// is not an error even for heights the cache once held: the entry may
    /// have been evicted, so the lookup falls back to the height index on
    /// disk.
    pub fn get_block_by_height(&self, height: u64) -> ChainResult<Block> {
        let latest = self.latest_height();
        if height as i64 > latest {
            return Err(ChainError::OutOfRange { height, latest });
        }

        if let Some(hash) = self.height_cache.lock().get(&height).copied() {
            return self.get_block_by_hash(&hash);
        }

        let hash_bytes = self
            .db
            .get(&height_key(height))?
            .ok_or(ChainError::NotFound)?;
        let hash =
            Hash::from_slice(&hash_bytes).map_err(|e| ChainError::Deserialize(e.to_string()))?;
        self.get_block_by_hash(&hash)
    }

    /// Fetch a stored transaction by its body hash.
    pub fn get_transaction(&self, hash: &Hash) -> ChainResult<Transaction> {
        if let Some(tx) = self.tx_cache.lock().get(hash) {
            return Ok(tx.clone());
        }

        let bytes = self.db.get(&tx_key(hash))?.ok_or(ChainError::NotFound)?;
        let tx =
            Transaction::from_bytes(&bytes).map_err(|e| ChainError::Deserialize(e.to_string()))?;
        self.tx_cache.lock().put(*hash, tx.clone());
        Ok(tx)
    }

    /// Cache-only lookup for peer-initiated block fetches.
    ///
    /// Deliberately never touches disk: remote requests must not be able to
    /// amplify local I/O.
    pub fn get_block_from_buffer(&self, hash: &Hash) -> Option<Block> {
        self.block_cache.lock().get(hash).cloned()
    }

    /// Persist a block and its transactions in one atomic batch, then
    /// advance the tip and populate the caches.
    ///
    /// On any failure the tip is left unchanged; the synchronizer will
    /// re-request the same height.
    pub fn insert_block(&self, block: &Block) -> ChainResult<()> {
        let hash = block.hash();
        let block_bytes = block
            .to_bytes()
            .map_err(|e| ChainError::Serialize(e.to_string()))?;

        let mut batch = WriteBatch::with_capacity(block.transactions.len() + 3);
        batch.put(block_key(&hash), block_bytes);
        for tx in &block.transactions {
            let tx_bytes = tx
                .to_bytes()
                .map_err(|e| ChainError::Serialize(e.to_string()))?;
            batch.put(tx_key(&tx.hash()), tx_bytes);
        }
        batch.put(height_key(block.height()), hash.as_bytes().to_vec());
        batch.put(LATEST_KEY.to_vec(), hash.as_bytes().to_vec());

        self.db.write_batch(batch)?;

        // The batch landed; now advance the tip under the exclusive lock.
        {
            let mut latest = self.latest.write();
            let advances = latest
                .as_ref()
                .map(|tip| block.height() > tip.height())
                .unwrap_or(true);
            if advances {
                *latest = Some(block.clone());
            }
        }

        self.write_cache(block);
        for tx in &block.transactions {
            self.tx_cache.lock().put(tx.hash(), tx.clone());
        }

        debug!(height = block.height(), hash = %hash, "Inserted block");
        Ok(())
    }

    /// Enqueue a block on the writer channel.
    ///
    /// Suspends when the queue is full; that is the append pipeline's
    /// back-pressure.
    pub async fn append_block_task(&self, block: Block) -> ChainResult<()> {
        self.writer_tx
            .send(block)
            .await
            .map_err(|_| ChainError::WriterClosed)
    }

    /// Package proposer-provided transactions into an unsigned block.
    ///
    /// Hash fields stay zero and the height stays 0; the proposer layer
    /// fills them in and signs.
    pub fn package_new_block(&self, txs: Vec<Transaction>) -> Block {
        Block {
            header: BlockHeader {
                timestamp: self.clock.now_ms(),
                prev_hash: Hash::ZERO,
                hash: Hash::ZERO,
                merkle_root: merkle_root(&txs),
                height: 0,
                public_key: CompressedPublicKey::ZERO,
                params: Vec::new(),
            },
            transactions: txs,
        }
    }

    fn write_cache(&self, block: &Block) {
        self.height_cache.lock().put(block.height(), block.hash());
        self.block_cache.lock().put(block.hash(), block.clone());
    }
}
