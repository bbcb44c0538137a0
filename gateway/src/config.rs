//! TOML configuration, loaded via the `config` crate into typed structs —
//! the teacher's pattern of a typed `AppConfig` fed entirely by `serde`,
//! rather than reading raw `toml::Value`s at call sites.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    Evm,
    Svm,
    Aptos,
    Tendermint,
    Ipfs,
}

fn default_chain_type() -> ChainType {
    ChainType::Evm
}

fn default_max_behind_blocks() -> u64 {
    10
}

fn default_extractor() -> String {
    "jq".to_string()
}

fn default_expression() -> String {
    ".result".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    #[serde(default = "default_chain_type")]
    pub chain_type: ChainType,
    pub cache_ttl_secs: u64,
    #[serde(default)]
    pub cacheable_methods: HashSet<String>,
    #[serde(default)]
    pub http_black_methods: HashSet<String>,
    #[serde(default)]
    pub ws_black_methods: HashSet<String>,
    #[serde(default)]
    pub white_methods_only: HashSet<String>,
    pub http_upstream: Vec<String>,
    #[serde(default)]
    pub ws_upstream: Vec<String>,
    pub erigon_http: Option<String>,
    pub erigon_ws: Option<String>,
    #[serde(default)]
    pub erigon_methods: HashSet<String>,
    #[serde(default = "default_max_behind_blocks")]
    pub max_behind_blocks: u64,
    pub block_number_method: String,
    #[serde(default = "default_extractor")]
    pub block_number_result_extractor: String,
    #[serde(default = "default_expression")]
    pub block_number_result_expression: String,
}

impl ChainConfig {
    /// svm chains default the block-number method to `getBlockHeight`;
    /// aptos chains default the extractor expression to `.ledger_version`.
    pub fn resolved_block_number_method(&self) -> String {
        if self.block_number_method.is_empty() && self.chain_type == ChainType::Svm {
            "getBlockHeight".to_string()
        } else {
            self.block_number_method.clone()
        }
    }

    pub fn resolved_expression(&self) -> String {
        if self.block_number_result_expression == default_expression() && self.chain_type == ChainType::Aptos {
            ".ledger_version".to_string()
        } else {
            self.block_number_result_expression.clone()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcNode {
    pub name: String,
    pub http: Option<String>,
    pub ws: Option<String>,
    #[serde(default)]
    pub extra_write: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcChainConfig {
    #[serde(default = "default_chain_type")]
    pub chain_type: ChainType,
    #[serde(default = "default_max_behind_blocks")]
    pub max_behind_blocks: u64,
    pub block_number_method: String,
    #[serde(default = "default_extractor")]
    pub block_number_result_extractor: String,
    #[serde(default = "default_expression")]
    pub block_number_result_expression: String,
    pub nodes: Vec<RpcNode>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRouterConfig {
    pub apikey: String,
    pub health_pushgateway: Option<String>,
    pub chains: HashMap<String, RpcChainConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IpfsClusterConfig {
    pub schemes: String,
    pub host: String,
    pub port: u16,
}

impl IpfsClusterConfig {
    pub fn endpoint(&self) -> String {
        format!("{}://{}:{}", self.schemes, self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggerConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub listen: String,
    pub chains: HashMap<String, ChainConfig>,
    pub redis_urls: Vec<String>,
    pub database_url: String,
    #[serde(default)]
    pub logger: LoggerConfig,
    pub ipfs_cluster: IpfsClusterConfig,
    pub rpc_router: Option<RpcRouterConfig>,
    #[serde(default)]
    pub whitelist: Vec<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("GATEWAY").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aptos_chain_defaults_its_expression() {
        let chain = ChainConfig {
            chain_id: 1,
            chain_type: ChainType::Aptos,
            cache_ttl_secs: 10,
            cacheable_methods: HashSet::new(),
            http_black_methods: HashSet::new(),
            ws_black_methods: HashSet::new(),
            white_methods_only: HashSet::new(),
            http_upstream: vec![],
            ws_upstream: vec![],
            erigon_http: None,
            erigon_ws: None,
            erigon_methods: HashSet::new(),
            max_behind_blocks: 10,
            block_number_method: String::new(),
            block_number_result_extractor: default_extractor(),
            block_number_result_expression: default_expression(),
        };
        assert_eq!(chain.resolved_expression(), ".ledger_version");
    }
}
