//! Full-node end-to-end test: two real nodes over TCP.

use crate::generators::TestSigner;
use kairos_node::{Node, NodeConfig};
use kairos_node::config::{ApiSettings, NetworkSettings};
use std::time::Duration;
use tempfile::TempDir;

fn node_config(data_dir: &TempDir, port: u16, bootstrap: Vec<String>, genesis: bool) -> NodeConfig {
    NodeConfig {
        node_name: format!("test-node-{port}"),
        data_dir: data_dir.path().to_path_buf(),
        genesis,
        genesis_hash: None,
        network: NetworkSettings {
            listen_addr: format!("127.0.0.1:{port}"),
            bootstrap_peers: bootstrap,
            ping_enabled: false,
        },
        api: ApiSettings {
            enabled: false,
            bind_address: String::new(),
        },
    }
}

/// A follower bootstrapping against a seeded node pulls the whole chain
/// over the wire and settles synced at the same height.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_follower_syncs_from_seed() {
    let signer = TestSigner::new();
    let blocks = signer.chain(4, 1);

    let seed_dir = TempDir::new().unwrap();
    let follower_dir = TempDir::new().unwrap();

    let mut seed_config = node_config(&seed_dir, 45710, Vec::new(), true);
    seed_config.genesis_hash = Some(blocks[0].hash().to_hex());
    let seed = Node::start(seed_config).await.unwrap();
    for block in &blocks {
        seed.chain().insert_block(block).unwrap();
    }
    assert_eq!(seed.chain().latest_height(), 3);

    let mut follower_config = node_config(
        &follower_dir,
        45711,
        vec!["127.0.0.1:45710".to_string()],
        false,
    );
    follower_config.genesis_hash = Some(blocks[0].hash().to_hex());
    let follower = Node::start(follower_config).await.unwrap();

    // The follower has to learn the seed's height, pull blocks 0..=3 over
    // the wire (possibly pausing while the seed itself settles synced) and
    // finish at the same tip.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(90);
    loop {
        if follower.chain().latest_height() == 3 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "follower should catch up, stuck at height {}",
            follower.chain().latest_height()
        );
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    for block in &blocks {
        assert_eq!(
            follower.chain().get_block_by_height(block.height()).unwrap(),
            *block
        );
    }

    follower.shutdown();
    seed.shutdown();
}
