//! Transaction handlers.

use crate::{ApiError, ApiResult, AppState};
use axum::{
    extract::{Path, State},
    Json,
};
use kairos_crypto::verify_transaction;
use kairos_types::{Hash, Transaction};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Transaction submission request.
#[derive(Deserialize)]
pub struct SubmitTx {
    /// Hex-encoded serialized signed transaction.
    pub signed_transaction: String,
}

/// Transaction submission response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxResponse {
    pub hash: String,
}

/// Transaction view.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxView {
    pub hash: String,
    pub sender: String,
    pub receiver: String,
    pub timestamp: i64,
    pub payload_size: usize,
    pub pooled: bool,
}

fn view(tx: &Transaction, pooled: bool) -> TxView {
    TxView {
        hash: tx.hash().to_hex(),
        sender: tx.body.sender.to_string(),
        receiver: tx.body.receiver.to_string(),
        timestamp: tx.body.timestamp,
        payload_size: tx.body.payload.len(),
        pooled,
    }
}

/// POST /transaction
///
/// Decode, deserialize and signature-check a submitted transaction, then
/// add it to the pool.
pub async fn submit_transaction(
    State(state): State<AppState>,
    Json(request): Json<SubmitTx>,
) -> ApiResult<Json<TxResponse>> {
    let bytes = hex::decode(&request.signed_transaction)
        .map_err(|e| ApiError::DecodeFailed(e.to_string()))?;

    let tx = Transaction::from_bytes(&bytes)
        .map_err(|e| ApiError::DeserializeFailed(e.to_string()))?;

    let verified = verify_transaction(&tx).unwrap_or(false);
    if !verified {
        debug!(tx = %tx.hash(), "Rejected transaction with bad signature");
        return Err(ApiError::SignatureFailed);
    }

    let hash = tx.hash().to_hex();
    state.pool.add(tx)?;

    Ok(Json(TxResponse { hash }))
}

/// GET /transaction/:hash
///
/// Look the transaction up in the pool first, then in the chain store.
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> ApiResult<Json<TxView>> {
    if let Some(tx) = state.pool.get(&hash) {
        return Ok(Json(view(&tx, true)));
    }

    let raw = hex::decode(&hash).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let hash = Hash::from_slice(&raw).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let tx = state.chain.get_transaction(&hash)?;
    Ok(Json(view(&tx, false)))
}
