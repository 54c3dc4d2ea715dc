//! Chain inspection tool: walk a stored chain and print inter-block
//! timestamp deltas and transaction counts.

use anyhow::{Context, Result};
use clap::Parser;
use kairos_chain::ChainStore;
use kairos_storage::{Database, KeyValueStore};
use kairos_types::SystemClock;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Scan a kairos data directory.
#[derive(Parser, Debug)]
#[command(name = "graph")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Data directory path
    #[arg(short = 'd', long = "datadir", default_value = "./data")]
    datadir: PathBuf,

    /// Scan height (exclusive upper bound)
    #[arg(long, default_value = "0")]
    height: u64,
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::WARN)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let db: Arc<dyn KeyValueStore> = Arc::new(
        Database::open_read_only(args.datadir.join("db"))
            .context("Create or load database failed")?,
    );
    let chain =
        ChainStore::open(db, Arc::new(SystemClock)).context("Open chain store failed")?;

    let mut prev = chain
        .get_block_by_height(0)
        .context("Get genesis block failed")?;

    let mut timestamps = Vec::new();
    let mut tx_counts = Vec::new();
    let mut total = 0usize;

    for height in 1..args.height {
        let block = chain
            .get_block_by_height(height)
            .with_context(|| format!("Get block at height {height} failed"))?;

        timestamps.push(block.header.timestamp - prev.header.timestamp);
        tx_counts.push(block.transactions.len());
        total += block.transactions.len();
        prev = block;
    }

    println!("timestamp: {:?}", timestamps);
    println!("counts: {:?}", tx_counts);
    println!("total: {}", total);
    Ok(())
}
