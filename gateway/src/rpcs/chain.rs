use std::sync::atomic::{AtomicI64, Ordering};

use gateway_health::{ChainKind, HealthManager, Node, ProbeSpec};

use crate::config::{ChainConfig, ChainType};

/// Which black-list a [`ChainHandler::method_denied`] check applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Http,
    Ws,
}

/// Per-chain proxy state: configuration (read-only after init), the health
/// manager, and the monotonic id-remap counter used by C5 step 5.
pub struct ChainHandler {
    pub name: String,
    pub config: ChainConfig,
    pub health: HealthManager,
    next_id: AtomicI64,
}

impl ChainHandler {
    pub fn new(name: String, config: ChainConfig) -> Self {
        let nodes: Vec<Node> = config
            .http_upstream
            .iter()
            .cloned()
            .zip(config.ws_upstream.iter().cloned().map(Some).chain(std::iter::repeat(None)))
            .map(|(http, ws)| Node::new(Some(http), ws))
            .collect();

        let kind = match config.chain_type {
            ChainType::Evm => ChainKind::Evm,
            ChainType::Svm => ChainKind::Svm,
            ChainType::Aptos => ChainKind::Aptos,
            ChainType::Tendermint => ChainKind::Evm,
            ChainType::Ipfs => ChainKind::Evm,
        };

        let extractor = gateway_health::DotPath::parse(&config.resolved_expression())
            .unwrap_or_else(|_| gateway_health::DotPath::parse(".result").unwrap());

        let spec = ProbeSpec {
            kind,
            block_number_method: config.resolved_block_number_method(),
            extractor,
        };

        let max_behind_blocks = config.max_behind_blocks;
        let health = HealthManager::new(nodes, spec, max_behind_blocks);

        Self {
            name,
            config,
            health,
            next_id: AtomicI64::new(1),
        }
    }

    /// Process-unique, monotonically increasing remap id for a single
    /// upstream call (spec.md §4.5 step 5).
    pub fn next_remap_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn is_cacheable(&self, method: &str) -> bool {
        self.config.cacheable_methods.contains(method)
    }

    /// Black-list check, additively widened with the white-list-only set for
    /// tenants that are not whitelisted (spec.md §4.5 step 2). `transport`
    /// picks which black-list applies — a method can be denied over one
    /// transport and allowed over the other (spec.md §9 configuration shape).
    pub fn method_denied(&self, method: &str, transport: Transport, is_whitelisted_tenant: bool) -> bool {
        let black_listed = match transport {
            Transport::Http => self.config.http_black_methods.contains(method),
            Transport::Ws => self.config.ws_black_methods.contains(method),
        };
        if black_listed {
            return true;
        }
        if !is_whitelisted_tenant && self.config.white_methods_only.contains(method) {
            return true;
        }
        false
    }

    pub fn routes_to_erigon(&self, method: &str) -> bool {
        self.config.erigon_http.is_some() && self.config.erigon_methods.contains(method)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::config::ChainConfig;

    fn chain_with(http_black: &[&str], ws_black: &[&str]) -> ChainHandler {
        let config = ChainConfig {
            chain_id: 1,
            chain_type: ChainType::Evm,
            cache_ttl_secs: 10,
            cacheable_methods: HashSet::new(),
            http_black_methods: http_black.iter().map(|s| s.to_string()).collect(),
            ws_black_methods: ws_black.iter().map(|s| s.to_string()).collect(),
            white_methods_only: HashSet::new(),
            http_upstream: vec!["http://localhost:8545".to_string()],
            ws_upstream: vec![],
            erigon_http: None,
            erigon_ws: None,
            erigon_methods: HashSet::new(),
            max_behind_blocks: 10,
            block_number_method: "eth_blockNumber".to_string(),
            block_number_result_extractor: "jq".to_string(),
            block_number_result_expression: ".result".to_string(),
        };
        ChainHandler::new("eth".to_string(), config)
    }

    #[test]
    fn a_method_denied_only_over_ws_is_allowed_over_http() {
        let chain = chain_with(&[], &["eth_subscribe"]);
        assert!(!chain.method_denied("eth_subscribe", Transport::Http, false));
        assert!(chain.method_denied("eth_subscribe", Transport::Ws, false));
    }

    #[test]
    fn a_method_denied_only_over_http_is_allowed_over_ws() {
        let chain = chain_with(&["trace_call"], &[]);
        assert!(chain.method_denied("trace_call", Transport::Http, false));
        assert!(!chain.method_denied("trace_call", Transport::Ws, false));
    }
}
