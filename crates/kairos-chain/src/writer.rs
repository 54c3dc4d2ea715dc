//! The database writer task.

use crate::ChainStore;
use kairos_types::Block;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Drain the writer channel, applying blocks strictly in enqueue order.
///
/// The only consumer of the channel, so inserts are totally ordered. Write
/// failures are logged at error level and the tip stays unchanged; the
/// synchronizer re-requests the height. A block already dequeued when
/// cancellation arrives is flushed before the task exits.
pub async fn run_writer(
    store: Arc<ChainStore>,
    mut rx: mpsc::Receiver<Block>,
    cancel: CancellationToken,
) {
    info!("Chain writer task started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Chain writer task shutting down");
                break;
            }
            maybe = rx.recv() => {
                let Some(block) = maybe else {
                    debug!("Writer channel closed");
                    break;
                };
                let height = block.height();
                let hash = block.hash();
                if let Err(e) = store.insert_block(&block) {
                    error!(height, hash = %hash, error = %e, "Insert block failed");
                } else {
                    debug!(height, hash = %hash, "Block persisted");
                }
            }
        }
    }
}
