//! API handler tests, calling the axum handlers directly.

use crate::generators::TestSigner;
use axum::extract::{Path, State};
use axum::Json;
use kairos_api::handlers::{blocks, node, transactions};
use kairos_api::{ApiError, AppState};
use kairos_chain::ChainStore;
use kairos_mempool::TxPool;
use kairos_storage::{KeyValueStore, MemoryStore};
use kairos_types::SystemClock;
use std::sync::Arc;

fn state() -> AppState {
    let db: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let chain = Arc::new(ChainStore::open(db, Arc::new(SystemClock)).unwrap());
    let pool = Arc::new(TxPool::with_defaults());
    AppState::new(chain, pool)
}

#[tokio::test]
async fn test_submit_transaction_lands_in_pool() {
    let state = state();
    let signer = TestSigner::new();
    let tx = signer.transaction(1);

    let Json(response) = transactions::submit_transaction(
        State(state.clone()),
        Json(transactions::SubmitTx {
            signed_transaction: hex::encode(tx.to_bytes().unwrap()),
        }),
    )
    .await
    .unwrap();

    assert_eq!(response.hash, tx.hash().to_hex());
    assert!(state.pool.contains(&tx.hash().to_hex()));
}

#[tokio::test]
async fn test_submit_rejects_bad_hex() {
    let state = state();
    let outcome = transactions::submit_transaction(
        State(state),
        Json(transactions::SubmitTx {
            signed_transaction: "zz-not-hex".to_string(),
        }),
    )
    .await;
    assert!(matches!(outcome, Err(ApiError::DecodeFailed(_))));
}

#[tokio::test]
async fn test_submit_rejects_garbage_bytes() {
    let state = state();
    let outcome = transactions::submit_transaction(
        State(state),
        Json(transactions::SubmitTx {
            signed_transaction: hex::encode([0u8; 7]),
        }),
    )
    .await;
    assert!(matches!(outcome, Err(ApiError::DeserializeFailed(_))));
}

#[tokio::test]
async fn test_submit_rejects_bad_signature() {
    let state = state();
    let signer = TestSigner::new();
    let mut tx = signer.transaction(1);
    tx.signature = vec![0u8; 70];

    let outcome = transactions::submit_transaction(
        State(state.clone()),
        Json(transactions::SubmitTx {
            signed_transaction: hex::encode(tx.to_bytes().unwrap()),
        }),
    )
    .await;
    assert!(matches!(outcome, Err(ApiError::SignatureFailed)));
    assert!(state.pool.is_empty());
}

#[tokio::test]
async fn test_get_block_at_height() {
    let state = state();
    let signer = TestSigner::new();
    let chain_blocks = signer.chain(2, 1);
    for block in &chain_blocks {
        state.chain.insert_block(block).unwrap();
    }

    let Json(response) = blocks::get_block_at_height(State(state.clone()), Path(1))
        .await
        .unwrap();
    assert_eq!(response.height, 1);
    assert_eq!(response.hash, chain_blocks[1].hash().to_hex());
    assert_eq!(response.transaction_count, 1);

    let missing = blocks::get_block_at_height(State(state), Path(5)).await;
    assert!(missing.is_err());
}

#[tokio::test]
async fn test_status_reflects_tip_and_pool() {
    let state = state();
    let signer = TestSigner::new();

    let Json(empty) = node::get_status(State(state.clone())).await.unwrap();
    assert_eq!(empty.latest_height, -1);
    assert!(empty.latest_hash.is_none());

    let genesis = signer.genesis();
    state.chain.insert_block(&genesis).unwrap();
    state.pool.add(signer.transaction(1)).unwrap();

    let Json(status) = node::get_status(State(state)).await.unwrap();
    assert_eq!(status.latest_height, 0);
    assert_eq!(status.latest_hash, Some(genesis.hash().to_hex()));
    assert_eq!(status.pooled_transactions, 1);
}
