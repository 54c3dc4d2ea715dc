//! Block handlers.

use crate::{ApiResult, AppState};
use axum::{
    extract::{Path, State},
    Json,
};
use kairos_types::Block;
use serde::Serialize;

/// Block view.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockView {
    pub hash: String,
    pub prev_hash: String,
    pub merkle_root: String,
    pub height: u64,
    pub timestamp: i64,
    pub proposer: String,
    pub transaction_count: usize,
}

impl From<&Block> for BlockView {
    fn from(block: &Block) -> Self {
        Self {
            hash: block.hash().to_hex(),
            prev_hash: block.header.prev_hash.to_hex(),
            merkle_root: block.header.merkle_root.to_hex(),
            height: block.height(),
            timestamp: block.header.timestamp,
            proposer: block.header.public_key.to_string(),
            transaction_count: block.transactions.len(),
        }
    }
}

/// GET /block/:height
pub async fn get_block_at_height(
    State(state): State<AppState>,
    Path(height): Path<u64>,
) -> ApiResult<Json<BlockView>> {
    let block = state.chain.get_block_by_height(height)?;
    Ok(Json(BlockView::from(&block)))
}
