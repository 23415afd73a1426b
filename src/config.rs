//! Configuration management for Floodchain

use crate::error::ChainError;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub gossip: GossipConfig,
    #[serde(default)]
    pub miner: MinerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_base_port")]
    pub base_port: u16,
    #[serde(default = "default_first_node_id")]
    pub first_node_id: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            base_port: default_base_port(),
            first_node_id: default_first_node_id(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GossipConfig {
    #[serde(default = "default_max_neighbors")]
    pub max_neighbors: usize,
    /// Artificial latency added before every send.
    #[serde(default)]
    pub send_delay_ms: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl GossipConfig {
    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            max_neighbors: default_max_neighbors(),
            send_delay_ms: 0,
            connect_timeout_ms: default_connect_timeout(),
            read_timeout_ms: default_read_timeout(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinerConfig {
    /// Required number of trailing '0' hex characters.
    #[serde(default = "default_difficulty")]
    pub difficulty: usize,
    /// Pending transactions needed before mining starts.
    #[serde(default = "default_tx_threshold")]
    pub tx_threshold: usize,
    #[serde(default = "default_auto_mine")]
    pub auto_mine: bool,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            tx_threshold: default_tx_threshold(),
            auto_mine: default_auto_mine(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ChainError> {
        if self.network.host.trim().is_empty() {
            return Err(ChainError::ConfigError("network.host must be set".to_string()));
        }
        if self.gossip.max_neighbors == 0 {
            return Err(ChainError::ConfigError(
                "gossip.max_neighbors must be at least 1".to_string(),
            ));
        }
        if self.gossip.max_frame_bytes == 0 {
            return Err(ChainError::ConfigError(
                "gossip.max_frame_bytes must be at least 1".to_string(),
            ));
        }
        if self.miner.difficulty == 0 || self.miner.difficulty > 64 {
            return Err(ChainError::InvalidDifficulty(self.miner.difficulty));
        }
        if self.miner.tx_threshold == 0 {
            return Err(ChainError::ConfigError(
                "miner.tx_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loads `config.toml` from the working directory, or defaults when it is absent.
pub fn load_config() -> Result<Config, ChainError> {
    let path = Path::new(CONFIG_FILE);
    if !path.exists() {
        return Ok(Config::default());
    }
    load_config_from(path)
}

pub fn load_config_from(path: impl AsRef<Path>) -> Result<Config, ChainError> {
    let config_str = fs::read_to_string(path.as_ref())?;
    let config: Config = toml::from_str(&config_str)?;
    config.validate()?;
    Ok(config)
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_base_port() -> u16 {
    6000
}

fn default_first_node_id() -> u64 {
    1
}

fn default_max_neighbors() -> usize {
    5
}

fn default_connect_timeout() -> u64 {
    2_000
}

fn default_read_timeout() -> u64 {
    5_000
}

fn default_max_frame_bytes() -> usize {
    1024 * 1024
}

fn default_difficulty() -> usize {
    4
}

fn default_tx_threshold() -> usize {
    4
}

fn default_auto_mine() -> bool {
    true
}
