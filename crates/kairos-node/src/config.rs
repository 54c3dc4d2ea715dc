//! Node configuration.

use anyhow::{Context, Result};
use clap::Parser;
use kairos_types::Hash;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// kairos blockchain node.
#[derive(Parser, Debug)]
#[command(name = "kairos-node")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "kairos.toml")]
    pub config: PathBuf,

    /// Data directory
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    /// P2P listen address
    #[arg(long)]
    pub listen: Option<String>,

    /// Bootstrap peers (host:port), repeatable
    #[arg(long)]
    pub bootstrap: Vec<String>,

    /// Run as a genesis node (clock starts synced, no time sync task)
    #[arg(long)]
    pub genesis: bool,

    /// Expected genesis block hash (hex), required to accept a gossiped
    /// genesis
    #[arg(long)]
    pub genesis_hash: Option<String>,

    /// API bind address
    #[arg(long)]
    pub api_bind: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Complete node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node name.
    pub node_name: String,
    /// Data directory.
    pub data_dir: PathBuf,
    /// Whether this node bootstraps the network.
    #[serde(default)]
    pub genesis: bool,
    /// Expected genesis block hash (hex).
    pub genesis_hash: Option<String>,
    /// Network configuration.
    #[serde(default)]
    pub network: NetworkSettings,
    /// API configuration.
    #[serde(default)]
    pub api: ApiSettings,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// P2P listen address.
    pub listen_addr: String,
    /// Peers dialed at startup.
    pub bootstrap_peers: Vec<String>,
    /// Whether peers run the keep-alive pinger.
    pub ping_enabled: bool,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            listen_addr: format!("0.0.0.0:{}", kairos_network::DEFAULT_PORT),
            bootstrap_peers: Vec::new(),
            ping_enabled: true,
        }
    }
}

/// API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Enable the HTTP API.
    pub enabled: bool,
    /// API bind address.
    pub bind_address: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:9945".to_string(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_name: "kairos-node".to_string(),
            data_dir: PathBuf::from(".kairos"),
            genesis: false,
            genesis_hash: None,
            network: NetworkSettings::default(),
            api: ApiSettings::default(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from file and CLI args.
    pub fn load(config_path: &Path, args: &Args) -> Result<Self> {
        let mut config = if config_path.exists() {
            let content =
                std::fs::read_to_string(config_path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            Self::default()
        };

        // CLI args override file values.
        if let Some(ref data_dir) = args.data_dir {
            config.data_dir = data_dir.clone();
        }
        if let Some(ref listen) = args.listen {
            config.network.listen_addr = listen.clone();
        }
        if !args.bootstrap.is_empty() {
            config.network.bootstrap_peers = args.bootstrap.clone();
        }
        if args.genesis {
            config.genesis = true;
        }
        if let Some(ref hash) = args.genesis_hash {
            config.genesis_hash = Some(hash.clone());
        }
        if let Some(ref api_bind) = args.api_bind {
            config.api.bind_address = api_bind.clone();
        }

        Ok(config)
    }

    /// Parse the configured genesis hash.
    pub fn parsed_genesis_hash(&self) -> Result<Option<Hash>> {
        let Some(ref hex_hash) = self.genesis_hash else {
            return Ok(None);
        };
        let raw = hex::decode(hex_hash).context("Genesis hash is not valid hex")?;
        let hash = Hash::from_slice(&raw)
            .map_err(|e| anyhow::anyhow!("Genesis hash has wrong length: {e}"))?;
        Ok(Some(hash))
    }

    /// Save configuration to file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
