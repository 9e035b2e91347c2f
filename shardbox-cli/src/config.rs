//! Configuration and wallet storage
//!
//! Config directory: ~/.shardbox/ (cross-platform)
//!
//! Config file format (~/.shardbox/config.toml):
//! ```toml
//! [allocation]
//! id = "my-allocation"
//! data_shards = 2
//! parity_shards = 1
//!
//! [[allocation.blobbers]]
//! id = "blobber-1"
//! url = "http://localhost:5051"
//! ```
//!
//! The wallet lives in ~/.shardbox/wallet.json; the cached directory
//! tree per allocation in ~/.shardbox/tree-<allocation>.json.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shardbox_client::BlobberInfo;
use shardbox_core::wallet::Wallet;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ShardboxConfig {
    #[serde(default)]
    pub allocation: AllocationConfig,

    #[serde(default)]
    pub network: NetworkConfig,
}

/// Chain-facing settings carried in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Oracle URL resolving the current miner/sharder set
    #[serde(default = "default_block_worker")]
    pub block_worker: String,

    #[serde(default)]
    pub preferred_blobbers: Vec<String>,

    /// Percent of miners a transaction must reach
    #[serde(default = "default_min_submit")]
    pub min_submit: u32,

    /// Percent of sharders that must confirm a transaction
    #[serde(default = "default_min_confirmation")]
    pub min_confirmation: u32,

    #[serde(default = "default_confirmation_chain_length")]
    pub confirmation_chain_length: u32,

    #[serde(default = "default_max_txn_query")]
    pub max_txn_query: u32,

    /// Seconds between confirmation polls
    #[serde(default = "default_query_sleep_time")]
    pub query_sleep_time: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            block_worker: default_block_worker(),
            preferred_blobbers: Vec::new(),
            min_submit: default_min_submit(),
            min_confirmation: default_min_confirmation(),
            confirmation_chain_length: default_confirmation_chain_length(),
            max_txn_query: default_max_txn_query(),
            query_sleep_time: default_query_sleep_time(),
        }
    }
}

fn default_block_worker() -> String {
    std::env::var("SHARDBOX_BLOCK_WORKER")
        .unwrap_or_else(|_| "http://localhost:9091/dns".to_string())
}

fn default_min_submit() -> u32 {
    50
}

fn default_min_confirmation() -> u32 {
    50
}

fn default_confirmation_chain_length() -> u32 {
    3
}

fn default_max_txn_query() -> u32 {
    5
}

fn default_query_sleep_time() -> u64 {
    5
}

/// The allocation this CLI operates on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationConfig {
    #[serde(default)]
    pub id: String,

    #[serde(default = "default_data_shards")]
    pub data_shards: usize,

    #[serde(default = "default_parity_shards")]
    pub parity_shards: usize,

    #[serde(default)]
    pub blobbers: Vec<BlobberInfo>,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            data_shards: default_data_shards(),
            parity_shards: default_parity_shards(),
            blobbers: Vec::new(),
        }
    }
}

fn default_data_shards() -> usize {
    2
}

fn default_parity_shards() -> usize {
    1
}

/// Config directory, ~/.shardbox
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".shardbox")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

fn wallet_path() -> PathBuf {
    config_dir().join("wallet.json")
}

fn tree_path(allocation_id: &str) -> PathBuf {
    config_dir().join(format!("tree-{}.json", allocation_id))
}

/// Load ~/.shardbox/config.toml, falling back to defaults
pub fn load_config() -> ShardboxConfig {
    let path = config_path();
    match fs::read_to_string(&path) {
        Ok(raw) => toml::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "invalid config, using defaults");
            ShardboxConfig::default()
        }),
        Err(_) => ShardboxConfig::default(),
    }
}

pub fn save_config(config: &ShardboxConfig) -> Result<()> {
    let dir = config_dir();
    fs::create_dir_all(&dir).context("creating config directory")?;
    let raw = toml::to_string_pretty(config).context("serializing config")?;
    fs::write(config_path(), raw).context("writing config file")?;
    Ok(())
}

/// Load the stored wallet
pub fn load_wallet() -> Result<Wallet> {
    let path = wallet_path();
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("no wallet at {}; run `shardbox wallet create`", path.display()))?;
    Ok(Wallet::from_json(&raw)?)
}

/// Persist the wallet, readable only by the owner on unix
pub fn save_wallet(wallet: &Wallet) -> Result<PathBuf> {
    let dir = config_dir();
    fs::create_dir_all(&dir).context("creating config directory")?;
    let path = wallet_path();
    fs::write(&path, wallet.to_json()?).context("writing wallet file")?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
            .context("restricting wallet permissions")?;
    }
    Ok(path)
}

pub fn wallet_exists() -> bool {
    wallet_path().exists()
}

/// Cached directory tree for an allocation, if any
pub fn load_tree(allocation_id: &str) -> Option<String> {
    fs::read_to_string(tree_path(allocation_id)).ok()
}

pub fn save_tree(allocation_id: &str, tree_json: &str) -> Result<()> {
    fs::create_dir_all(config_dir()).context("creating config directory")?;
    fs::write(tree_path(allocation_id), tree_json).context("writing tree cache")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_parses_with_defaults() {
        let cfg: ShardboxConfig = toml::from_str(
            r#"
            [allocation]
            id = "alloc1"

            [[allocation.blobbers]]
            id = "b0"
            url = "http://localhost:5051"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.allocation.id, "alloc1");
        assert_eq!(cfg.allocation.data_shards, 2);
        assert_eq!(cfg.allocation.parity_shards, 1);
        assert_eq!(cfg.allocation.blobbers.len(), 1);
    }

    #[test]
    fn test_empty_config_is_default() {
        let cfg: ShardboxConfig = toml::from_str("").unwrap();
        assert!(cfg.allocation.id.is_empty());
        assert!(cfg.allocation.blobbers.is_empty());
        assert_eq!(cfg.network.min_submit, 50);
        assert_eq!(cfg.network.confirmation_chain_length, 3);
    }
}
