//! Node configuration loading and management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Full configuration for a Meridian node.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MeridianConfig {
    /// P2P network settings.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Routing assembly settings.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Pubsub value store settings.
    #[serde(default)]
    pub pubsub: PubsubConfig,

    /// Relay candidate feeder settings.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Identity settings.
    #[serde(default)]
    pub identity: IdentityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// P2P listen address.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// P2P listen port.
    #[serde(default = "default_p2p_port")]
    pub port: u16,
    /// Bootstrap peer multiaddresses (with `/p2p/<peer>`).
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Run without network routing; records come from the local datastore.
    #[serde(default)]
    pub offline: bool,
    /// Command queue length of the DHT client.
    #[serde(default = "default_dht_command_capacity")]
    pub dht_command_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubsubConfig {
    /// Whether records are also gossiped over pubsub.
    #[serde(default)]
    pub enabled: bool,
    /// Record namespaces served by the pubsub value store.
    #[serde(default = "default_pubsub_namespaces")]
    pub namespaces: Vec<String>,
    /// How often cached records are republished.
    #[serde(default = "default_rebroadcast_interval_secs")]
    pub rebroadcast_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Whether the relay candidate feeder runs.
    #[serde(default = "default_true")]
    pub feeder_enabled: bool,
    /// Capacity of the candidate channel.
    #[serde(default = "default_relay_channel_capacity")]
    pub channel_capacity: usize,
    /// Seconds between feeder rounds.
    #[serde(default = "default_relay_interval_secs")]
    pub interval_secs: u64,
    /// Upper bound on candidates offered per round.
    #[serde(default = "default_max_candidates")]
    pub max_candidates_per_round: usize,
    /// Statically configured relay peers (with `/p2p/<peer>`).
    #[serde(default)]
    pub peering_peers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the data directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IdentityConfig {
    /// Path to the keypair file.
    #[serde(default)]
    pub keypair_path: Option<PathBuf>,
}

// Default value functions
fn default_listen_addr() -> String {
    "0.0.0.0".into()
}
fn default_p2p_port() -> u16 {
    4001
}
fn default_dht_command_capacity() -> usize {
    256
}
fn default_pubsub_namespaces() -> Vec<String> {
    vec!["ipns".into()]
}
fn default_rebroadcast_interval_secs() -> u64 {
    60
}
fn default_true() -> bool {
    true
}
fn default_relay_channel_capacity() -> usize {
    32
}
fn default_relay_interval_secs() -> u64 {
    15
}
fn default_max_candidates() -> usize {
    16
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            port: default_p2p_port(),
            bootstrap_peers: Vec::new(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            offline: false,
            dht_command_capacity: default_dht_command_capacity(),
        }
    }
}

impl Default for PubsubConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            namespaces: default_pubsub_namespaces(),
            rebroadcast_interval_secs: default_rebroadcast_interval_secs(),
        }
    }
}

impl PubsubConfig {
    pub fn rebroadcast_interval(&self) -> Duration {
        Duration::from_secs(self.rebroadcast_interval_secs)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            feeder_enabled: true,
            channel_capacity: default_relay_channel_capacity(),
            interval_secs: default_relay_interval_secs(),
            max_candidates_per_round: default_max_candidates(),
            peering_peers: Vec::new(),
        }
    }
}

impl RelayConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl MeridianConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: MeridianConfig = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save the current config to a TOML file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the full P2P listen multiaddress.
    pub fn p2p_multiaddr(&self) -> String {
        format!("/ip4/{}/tcp/{}", self.network.listen_addr, self.network.port)
    }
}
