//! Shared API state.

use kairos_chain::ChainStore;
use kairos_mempool::TxPool;
use std::sync::Arc;

/// Handles the API borrows from the node.
#[derive(Clone)]
pub struct AppState {
    /// Chain store.
    pub chain: Arc<ChainStore>,
    /// Transaction pool.
    pub pool: Arc<TxPool>,
}

impl AppState {
    /// Bundle the node's handles for the router.
    pub fn new(chain: Arc<ChainStore>, pool: Arc<TxPool>) -> Self {
        Self { chain, pool }
    }
}
