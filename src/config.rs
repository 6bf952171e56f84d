//! Engine configuration.
//!
//! Configuration is a single JSON file naming the chain providers, the data
//! directory, and the concurrent fetch limit. The path comes from the
//! `WALLET_STATE_SYNC_CONFIG` environment variable; a missing or unreadable
//! file falls back to the built-in test-net defaults so the engine always
//! starts.

use crate::wallet::types::{ChainProvider, WalletError};
use crate::wallet::sync::scheduler::DEFAULT_CONCURRENT_LIMIT;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable naming the config file path.
pub const CONFIG_PATH_ENV: &str = "WALLET_STATE_SYNC_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "wallet-state-sync.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_chain_providers")]
    pub chain_providers: Vec<ChainProvider>,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_concurrent_fetch_limit")]
    pub concurrent_fetch_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chain_providers: default_chain_providers(),
            data_dir: default_data_dir(),
            concurrent_fetch_limit: default_concurrent_fetch_limit(),
        }
    }
}

impl Config {
    /// Load the configuration, falling back to defaults when no file exists.
    pub fn load() -> Self {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        match Self::from_file(Path::new(&path)) {
            Ok(config) => {
                info!("Loaded configuration from {}", path);
                config
            }
            Err(_) => {
                info!("No configuration at {}, using defaults", path);
                Self::default()
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, WalletError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| WalletError::storage(format!("Failed to read {:?}: {}", path, e)))?;
        serde_json::from_str(&content)
            .map_err(|e| WalletError::storage(format!("Failed to parse {:?}: {}", path, e)))
    }
}

fn default_chain_providers() -> Vec<ChainProvider> {
    vec![ChainProvider {
        chain_id: "71ee83bcefc2c33db917721d15b4bcacd35c1f8c0ab44eb0bca6d389a6a5c74d".to_string(),
        name: "Ledger Testnet".to_string(),
        rpc_url: "https://testnet.rpc.ledger.example".to_string(),
        history_url: "https://testnet.history.ledger.example".to_string(),
        profile_contract: "profiles".to_string(),
        system_symbol: "SYS".to_string(),
    }]
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./wallet-data")
}

fn default_concurrent_fetch_limit() -> usize {
    DEFAULT_CONCURRENT_LIMIT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_carry_one_provider() {
        let config = Config::default();
        assert_eq!(config.chain_providers.len(), 1);
        assert!(config.concurrent_fetch_limit >= 1);
    }

    #[test]
    fn partial_files_fill_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"concurrent_fetch_limit": 2}"#).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.concurrent_fetch_limit, 2);
        assert_eq!(config.chain_providers.len(), 1);
    }

    #[test]
    fn unreadable_files_are_storage_errors() {
        let result = Config::from_file(Path::new("/nonexistent/config.json"));
        assert!(matches!(result, Err(WalletError::Storage { .. })));
    }
}
