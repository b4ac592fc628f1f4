use alloy::primitives::{address, b256, Address, B256};
use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

use crate::{
    error::Result,
    events::TrackedPool,
    tracker::{BlockRange, SafetyModuleConfig},
};

/// JSON-RPC node settings.
///
/// The node must serve historical state (`eth_call` at past blocks), so
/// it has to be an archive node for any range older than its pruning window.
#[derive(Debug, Deserialize, Clone)]
pub struct RpcSettings {
    pub url: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// Blocks per `eth_getLogs` request
    #[serde(default = "default_log_chunk_size")]
    pub log_chunk_size: u64,
    /// Concurrent block lookups per timestamp batch
    #[serde(default = "default_timestamp_batch_size")]
    pub timestamp_batch_size: usize,
}

fn default_chain_id() -> u64 {
    1
}

fn default_log_chunk_size() -> u64 {
    50_000
}

fn default_timestamp_batch_size() -> usize {
    100
}

/// Token holder API (Covalent) settings.
#[derive(Debug, Deserialize, Clone)]
pub struct HolderApiSettings {
    pub api_key: String,
    #[serde(default = "default_holders_base_url")]
    pub base_url: String,
    #[serde(default = "default_holders_page_size")]
    pub page_size: u32,
}

fn default_holders_base_url() -> String {
    "https://api.covalenthq.com/v1".to_string()
}

fn default_holders_page_size() -> u32 {
    1_000
}

/// Safety Module contracts.
///
/// Defaults point at the Balancer V2 vault and its 80/20 reserve/WETH pool.
/// The pool token address is not configured: it is the first 20 bytes of
/// the pool id.
#[derive(Debug, Deserialize, Clone)]
pub struct SafetyModuleSettings {
    /// Staking receipt token
    pub receipt_token: Address,
    /// Token whose pool balance backs the stake
    pub reserve_token: Address,
    #[serde(default = "default_vault")]
    pub vault: Address,
    #[serde(default = "default_pool_id")]
    pub pool_id: B256,
    /// Position of the reserve token in the pool's token list
    #[serde(default = "default_reserve_token_index")]
    pub reserve_token_index: usize,
}

fn default_vault() -> Address {
    address!("ba12222222228d8ba445958a75a0704d566bf2c8")
}

fn default_pool_id() -> B256 {
    b256!("cb0e14e96f2cefa8550ad8e4aea344f211e5061d00020000000000000000011a")
}

fn default_reserve_token_index() -> usize {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct RangeSettings {
    pub start_block: u64,
    pub end_block: u64,
}

/// What the binary reports once the tracker is loaded.
#[derive(Debug, Deserialize, Clone)]
pub struct QuerySettings {
    /// Unix seconds; the end block's timestamp when unset
    #[serde(default)]
    pub timestamp: Option<u64>,
    /// Accounts to report; every tracked account when empty
    #[serde(default)]
    pub accounts: Vec<String>,
    /// Decimals used to display token amounts
    #[serde(default = "default_display_decimals")]
    pub display_decimals: u8,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            timestamp: None,
            accounts: Vec::new(),
            display_decimals: default_display_decimals(),
        }
    }
}

fn default_display_decimals() -> u8 {
    18
}

/// Root application configuration.
///
/// Loaded from `config.yaml`, with `STAKES__<SECTION>__<KEY>` environment
/// variables taking precedence.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub rpc: RpcSettings,
    pub holders: HolderApiSettings,
    pub safety_module: SafetyModuleSettings,
    pub range: RangeSettings,
    #[serde(default)]
    pub query: QuerySettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(Config::builder().add_source(File::with_name("config")))
    }

    fn load(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let s = builder
            .add_source(Environment::with_prefix("STAKES").separator("__"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;

        Ok(settings)
    }

    pub fn safety_module_config(&self) -> SafetyModuleConfig {
        let sm = &self.safety_module;
        SafetyModuleConfig {
            chain_id: self.rpc.chain_id,
            receipt_token: sm.receipt_token,
            vault: sm.vault,
            pool: TrackedPool {
                pool_id: sm.pool_id,
                reserve_token: sm.reserve_token,
                reserve_token_index: sm.reserve_token_index,
            },
        }
    }

    pub fn block_range(&self) -> Result<BlockRange> {
        BlockRange::new(self.range.start_block, self.range.end_block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    const MINIMAL: &str = r#"
rpc:
  url: "http://localhost:8545"
holders:
  api_key: "ckey_test"
safety_module:
  receipt_token: "0xC8DC2EC5F5E02BE8B37A8444A1931F02374A17AB"
  reserve_token: "0xcafe001067cdef266afb7eb5a286dcfd277f3de5"
range:
  start_block: 14500000
  end_block: 14600000
"#;

    fn from_yaml(yaml: &str) -> Settings {
        Settings::load(Config::builder().add_source(File::from_str(yaml, FileFormat::Yaml))).unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let settings = from_yaml(MINIMAL);

        assert_eq!(settings.rpc.chain_id, 1);
        assert_eq!(settings.rpc.log_chunk_size, 50_000);
        assert_eq!(settings.holders.base_url, "https://api.covalenthq.com/v1");
        assert_eq!(settings.holders.page_size, 1_000);
        assert_eq!(settings.safety_module.vault, default_vault());
        assert_eq!(settings.query.timestamp, None);
        assert_eq!(settings.query.display_decimals, 18);
    }

    #[test]
    fn test_safety_module_config_derives_pool_token() {
        let settings = from_yaml(MINIMAL);
        let config = settings.safety_module_config();

        assert_eq!(
            config.pool.pool_token(),
            address!("cb0e14e96f2cefa8550ad8e4aea344f211e5061d")
        );
        assert_eq!(config.pool.reserve_token_index, 1);
        assert_eq!(settings.block_range().unwrap().snapshot_block(), 14_499_999);
    }

    #[test]
    fn test_missing_required_section_fails() {
        let yaml = MINIMAL.replace("range:\n  start_block: 14500000\n  end_block: 14600000\n", "");
        assert!(Settings::load(Config::builder().add_source(File::from_str(&yaml, FileFormat::Yaml))).is_err());
    }
}
