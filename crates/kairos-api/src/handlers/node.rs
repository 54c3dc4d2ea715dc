//! Node status handlers.

use crate::{ApiResult, AppState};
use axum::{extract::State, Json};
use serde::Serialize;

/// Node status view.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub latest_height: i64,
    pub latest_hash: Option<String>,
    pub pooled_transactions: usize,
}

/// GET /status
pub async fn get_status(State(state): State<AppState>) -> ApiResult<Json<StatusView>> {
    Ok(Json(StatusView {
        latest_height: state.chain.latest_height(),
        latest_hash: state.chain.latest_block().map(|b| b.hash().to_hex()),
        pooled_transactions: state.pool.len(),
    }))
}
