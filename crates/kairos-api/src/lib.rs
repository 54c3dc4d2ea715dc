//! # kairos-api
//!
//! HTTP surface for the kairos node: transaction submission plus chain and
//! node queries. The node runs this next to the P2P stack; submitted
//! transactions only enter the pool (block production is not an API
//! concern).

mod error;
pub mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;

use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Serve the API until cancelled.
pub async fn serve(
    state: AppState,
    addr: SocketAddr,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}
