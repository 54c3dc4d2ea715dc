//! kairos node binary.

use anyhow::Result;
use clap::Parser;
use kairos_node::config::Args;
use kairos_node::{Node, NodeConfig};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting kairos node v{}", env!("CARGO_PKG_VERSION"));

    let config = NodeConfig::load(&args.config, &args)?;
    info!("Data directory: {:?}", config.data_dir);
    info!("P2P: {}", config.network.listen_addr);
    if config.api.enabled {
        info!("API: {}", config.api.bind_address);
    }

    let node = Node::start(config).await?;

    tokio::signal::ctrl_c().await.ok();
    info!("Shutdown signal received");
    node.shutdown();

    // Give tasks a moment to unwind at their next boundary.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    info!("kairos node stopped");
    Ok(())
}
