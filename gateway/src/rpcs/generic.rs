//! The second, generic `/rpc/<chain-name>/<api-key>/<path…>` router
//! (spec.md §6, §9 "Configuration shape"). Unlike [`crate::rpcs::ChainHandler`]
//! this variant carries no JSON-RPC method filter, quota, or cache layer of
//! its own: it is a single-api-key, config-file-defined raw reverse proxy,
//! grounded directly on the original `RpcHandler.Http` (health pool +
//! hop-by-hop header stripping, nothing else).

use gateway_health::{ChainKind, DotPath, HealthManager, Node, ProbeSpec};

use crate::config::{ChainType, RpcChainConfig};

pub struct GenericChainHandler {
    pub name: String,
    pub health: HealthManager,
    /// Nodes flagged `extra_write` in the config receive a best-effort
    /// mirrored copy of every request body, in addition to the primary
    /// healthy node that serves the client's response (spec.md §6
    /// `RpcNode.extra_write`; no write traffic ever waits on these).
    pub extra_write_urls: Vec<String>,
}

impl GenericChainHandler {
    pub fn new(name: String, config: RpcChainConfig) -> Self {
        let extra_write_urls = config
            .nodes
            .iter()
            .filter(|n| n.extra_write)
            .filter_map(|n| n.http.clone())
            .collect();

        let nodes: Vec<Node> = config
            .nodes
            .iter()
            .cloned()
            .map(|n| Node::new(n.http, n.ws))
            .collect();

        let kind = match config.chain_type {
            ChainType::Evm => ChainKind::Evm,
            ChainType::Svm => ChainKind::Svm,
            ChainType::Aptos => ChainKind::Aptos,
            ChainType::Tendermint => ChainKind::Evm,
            ChainType::Ipfs => ChainKind::Evm,
        };

        let extractor =
            DotPath::parse(&config.block_number_result_expression).unwrap_or_else(|_| DotPath::parse(".result").unwrap());

        let spec = ProbeSpec {
            kind,
            block_number_method: config.block_number_method.clone(),
            extractor,
        };

        let health = HealthManager::new(nodes, spec, config.max_behind_blocks);

        Self {
            name,
            health,
            extra_write_urls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RpcNode;

    fn node(name: &str, http: &str, extra_write: bool) -> RpcNode {
        RpcNode {
            name: name.to_string(),
            http: Some(http.to_string()),
            ws: None,
            extra_write,
        }
    }

    fn config_with(nodes: Vec<RpcNode>) -> RpcChainConfig {
        RpcChainConfig {
            chain_type: ChainType::Evm,
            max_behind_blocks: 10,
            block_number_method: "eth_blockNumber".to_string(),
            block_number_result_extractor: "jq".to_string(),
            block_number_result_expression: ".result".to_string(),
            nodes,
        }
    }

    #[test]
    fn only_extra_write_nodes_are_mirrored() {
        let config = config_with(vec![
            node("primary", "http://a", false),
            node("mirror", "http://b", true),
        ]);
        let handler = GenericChainHandler::new("custom".to_string(), config);
        assert_eq!(handler.extra_write_urls, vec!["http://b".to_string()]);
    }

    #[test]
    fn no_extra_write_nodes_means_an_empty_mirror_list() {
        let config = config_with(vec![node("primary", "http://a", false)]);
        let handler = GenericChainHandler::new("custom".to_string(), config);
        assert!(handler.extra_write_urls.is_empty());
    }
}
