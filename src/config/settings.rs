use crate::error::Result;
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::env;
use std::path::Path;

/// Process-wide settings, loaded once on first use
pub static GLOBAL_CONFIG: Lazy<Settings> = Lazy::new(Settings::load);

const CONFIG_PATH_KEY: &str = "EMBERCHAIN_CONFIG";
const NODE_ADDRESS_KEY: &str = "NODE_ADDRESS";
const NODE_ID_KEY: &str = "NODE_ID";
const MINING_ENABLED_KEY: &str = "MINING_ENABLED";

const DEFAULT_NODE_ADDR: &str = "127.0.0.1:2001";
const DEFAULT_GENESIS_MESSAGE: &str = "the beginning of the ember chain";
const DEFAULT_BLOCK_INTERVAL_SECS: u64 = 10;
const DEFAULT_BASE_REWARD: f64 = 100.0;
const DEFAULT_HALVING_INTERVAL: u64 = 100;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub node: NodeSettings,
    #[serde(default)]
    pub genesis: GenesisSettings,
    #[serde(default)]
    pub mining: MiningSettings,
    #[serde(default)]
    pub reward: RewardSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeSettings {
    #[serde(default = "default_node_id")]
    pub id: String,
    #[serde(default = "default_node_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub peers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenesisSettings {
    #[serde(default)]
    pub nonce: i64,
    #[serde(default = "default_genesis_message")]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MiningSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_block_interval")]
    pub expected_block_interval_secs: u64,
    #[serde(default)]
    pub memo: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RewardSettings {
    #[serde(default = "default_base_reward")]
    pub base_reward: f64,
    #[serde(default = "default_halving_interval")]
    pub halving_interval: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_wallet_file")]
    pub wallet_file: String,
}

fn default_node_id() -> String {
    "node-1".to_string()
}

fn default_node_addr() -> String {
    DEFAULT_NODE_ADDR.to_string()
}

fn default_genesis_message() -> String {
    DEFAULT_GENESIS_MESSAGE.to_string()
}

fn default_block_interval() -> u64 {
    DEFAULT_BLOCK_INTERVAL_SECS
}

fn default_base_reward() -> f64 {
    DEFAULT_BASE_REWARD
}

fn default_halving_interval() -> u64 {
    DEFAULT_HALVING_INTERVAL
}

fn default_db_path() -> String {
    "data".to_string()
}

fn default_wallet_file() -> String {
    "keyring.dat".to_string()
}

impl Default for NodeSettings {
    fn default() -> Self {
        NodeSettings {
            id: default_node_id(),
            listen_addr: default_node_addr(),
            peers: vec![],
        }
    }
}

impl Default for GenesisSettings {
    fn default() -> Self {
        GenesisSettings {
            nonce: 0,
            message: default_genesis_message(),
        }
    }
}

impl Default for MiningSettings {
    fn default() -> Self {
        MiningSettings {
            enabled: false,
            expected_block_interval_secs: default_block_interval(),
            memo: String::new(),
        }
    }
}

impl Default for RewardSettings {
    fn default() -> Self {
        RewardSettings {
            base_reward: default_base_reward(),
            halving_interval: default_halving_interval(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            db_path: default_db_path(),
            wallet_file: default_wallet_file(),
        }
    }
}

impl Settings {
    /// Load settings from the TOML file named by `EMBERCHAIN_CONFIG`
    /// (default `emberchain.toml`), then apply environment overrides.
    /// A missing file just yields the defaults.
    fn load() -> Settings {
        let path = env::var(CONFIG_PATH_KEY).unwrap_or_else(|_| "emberchain.toml".to_string());
        let mut settings = match Self::from_file(Path::new(&path)) {
            Ok(Some(settings)) => settings,
            Ok(None) => Settings::default(),
            Err(e) => {
                log::warn!("Could not parse config file {path}: {e}, using defaults");
                Settings::default()
            }
        };
        settings.apply_env_overrides();
        settings
    }

    fn from_file(path: &Path) -> Result<Option<Settings>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(Some(toml::from_str::<Settings>(&raw)?))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = env::var(NODE_ADDRESS_KEY) {
            self.node.listen_addr = addr;
        }
        if let Ok(id) = env::var(NODE_ID_KEY) {
            self.node.id = id;
        }
        if let Ok(enabled) = env::var(MINING_ENABLED_KEY) {
            self.mining.enabled = enabled == "1" || enabled.eq_ignore_ascii_case("true");
        }
    }

    pub fn parse(raw: &str) -> Result<Settings> {
        Ok(toml::from_str::<Settings>(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.node.listen_addr, DEFAULT_NODE_ADDR);
        assert!(settings.node.peers.is_empty());
        assert!(!settings.mining.enabled);
        assert_eq!(settings.reward.base_reward, 100.0);
        assert_eq!(settings.reward.halving_interval, 100);
    }

    #[test]
    fn test_parse_partial_toml_keeps_defaults_elsewhere() {
        let settings = Settings::parse(
            r#"
            [node]
            listen_addr = "0.0.0.0:9000"
            peers = ["127.0.0.1:9001"]

            [mining]
            enabled = true
            "#,
        )
        .unwrap();
        assert_eq!(settings.node.listen_addr, "0.0.0.0:9000");
        assert_eq!(settings.node.peers.len(), 1);
        assert!(settings.mining.enabled);
        // untouched sections fall back to defaults
        assert_eq!(settings.reward.base_reward, 100.0);
        assert_eq!(settings.storage.db_path, "data");
    }

    #[test]
    fn test_parse_rejects_malformed_toml() {
        assert!(Settings::parse("[node\nbroken").is_err());
    }
}
