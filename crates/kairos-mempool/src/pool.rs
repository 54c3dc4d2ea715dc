//! Transaction pool implementation.

use crate::{MempoolError, MempoolResult, DEFAULT_MAX_TXS};
use dashmap::DashMap;
use kairos_types::Transaction;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::debug;

/// Pool configuration.
#[derive(Debug, Clone)]
pub struct TxPoolConfig {
    /// Maximum number of pooled transactions.
    pub max_transactions: usize,
}

impl Default for TxPoolConfig {
    fn default() -> Self {
        Self {
            max_transactions: DEFAULT_MAX_TXS,
        }
    }
}

/// Content-addressed transaction pool.
///
/// Keys are hex-encoded body hashes. When full, the oldest arrival is
/// evicted first.
pub struct TxPool {
    config: TxPoolConfig,
    transactions: DashMap<String, Transaction>,
    arrival_order: Mutex<VecDeque<String>>,
}

impl TxPool {
    /// Create a pool with the given configuration.
    pub fn new(config: TxPoolConfig) -> Self {
        Self {
            config,
            transactions: DashMap::new(),
            arrival_order: Mutex::new(VecDeque::new()),
        }
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(TxPoolConfig::default())
    }

    /// Add a transaction.
    ///
    /// Rejects duplicates and bodies whose stored hash does not match the
    /// content. Evicts the oldest entry when full.
    pub fn add(&self, tx: Transaction) -> MempoolResult<()> {
        let key = tx.hash().to_hex();

        if !tx.hash_matches() {
            return Err(MempoolError::HashMismatch(key));
        }
        if self.transactions.contains_key(&key) {
            return Err(MempoolError::AlreadyExists(key));
        }

        if self.transactions.len() >= self.config.max_transactions {
            self.evict_oldest()?;
        }

        self.arrival_order.lock().push_back(key.clone());
        self.transactions.insert(key, tx);
        Ok(())
    }

    /// Get a transaction by its hex-encoded body hash.
    pub fn get(&self, hex_hash: &str) -> Option<Transaction> {
        self.transactions.get(hex_hash).map(|r| r.clone())
    }

    /// True when the pool holds the given hash.
    pub fn contains(&self, hex_hash: &str) -> bool {
        self.transactions.contains_key(hex_hash)
    }

    /// Remove a transaction, e.g. once it appears in an inserted block.
    pub fn remove(&self, hex_hash: &str) -> Option<Transaction> {
        self.transactions.remove(hex_hash).map(|(_, tx)| tx)
    }

    /// Take up to `limit` transactions in arrival order, for packaging.
    /// The taken transactions stay pooled until the block lands.
    pub fn take(&self, limit: usize) -> Vec<Transaction> {
        let order = self.arrival_order.lock();
        order
            .iter()
            .filter_map(|key| self.transactions.get(key).map(|r| r.clone()))
            .take(limit)
            .collect()
    }

    /// Number of pooled transactions.
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// True when the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    fn evict_oldest(&self) -> MempoolResult<()> {
        let mut order = self.arrival_order.lock();
        while let Some(key) = order.pop_front() {
            if self.transactions.remove(&key).is_some() {
                debug!(tx = %key, "Evicted oldest pooled transaction");
                return Ok(());
            }
            // Already removed out of band; keep draining.
        }
        Err(MempoolError::Full {
            count: self.transactions.len(),
            max: self.config.max_transactions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairos_types::{Address, CompressedPublicKey, Hash, TxBody};

    fn tx(tag: u8) -> Transaction {
        let mut body = TxBody {
            hash: Hash::ZERO,
            sender: Address([tag; 20]),
            receiver: Address([0u8; 20]),
            public_key: CompressedPublicKey::ZERO,
            payload: vec![tag],
            timestamp: tag as i64,
        };
        body.hash = body.compute_hash();
        Transaction {
            body,
            signature: Vec::new(),
        }
    }

    #[test]
    fn test_add_get_remove() {
        let pool = TxPool::with_defaults();
        let t = tx(1);
        let key = t.hash().to_hex();

        pool.add(t.clone()).unwrap();
        assert!(pool.contains(&key));
        assert_eq!(pool.get(&key), Some(t));

        pool.remove(&key);
        assert!(!pool.contains(&key));
    }

    #[test]
    fn test_duplicate_rejected() {
        let pool = TxPool::with_defaults();
        pool.add(tx(1)).unwrap();
        assert!(matches!(
            pool.add(tx(1)),
            Err(MempoolError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_hash_mismatch_rejected() {
        let pool = TxPool::with_defaults();
        let mut t = tx(1);
        t.body.payload = vec![99];
        assert!(matches!(pool.add(t), Err(MempoolError::HashMismatch(_))));
    }

    #[test]
    fn test_eviction_drops_oldest() {
        let pool = TxPool::new(TxPoolConfig {
            max_transactions: 2,
        });
        let first = tx(1);
        let first_key = first.hash().to_hex();

        pool.add(first).unwrap();
        pool.add(tx(2)).unwrap();
        pool.add(tx(3)).unwrap();

        assert_eq!(pool.len(), 2);
        assert!(!pool.contains(&first_key));
    }

    #[test]
    fn test_take_preserves_arrival_order() {
        let pool = TxPool::with_defaults();
        let a = tx(1);
        let b = tx(2);
        let c = tx(3);
        pool.add(a.clone()).unwrap();
        pool.add(b.clone()).unwrap();
        pool.add(c).unwrap();

        let taken = pool.take(2);
        assert_eq!(taken, vec![a, b]);
        assert_eq!(pool.len(), 3);
    }
}
