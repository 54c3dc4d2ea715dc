//! API route definitions.

use crate::{handlers, AppState};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/transaction",
            post(handlers::transactions::submit_transaction),
        )
        .route(
            "/transaction/:hash",
            get(handlers::transactions::get_transaction),
        )
        .route("/block/:height", get(handlers::blocks::get_block_at_height))
        .route("/status", get(handlers::node::get_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
