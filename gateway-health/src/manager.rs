use std::time::Duration;

use derive_more::{Display, Error};
use tracing::{info, warn};

use crate::node::Node;
use crate::probe::ProbeSpec;

const PROBE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Display, Error)]
#[display(fmt = "no healthy node")]
pub struct NoHealthyNode;

/// Owns one chain's node pool and the 60s probe loop that keeps their
/// health flags current (C4). `pick_http`/`pick_ws` are the only calls on
/// the request hot path; they are lock-free reads.
pub struct HealthManager {
    nodes: Vec<Node>,
    spec: ProbeSpec,
    max_behind_blocks: u64,
    client: reqwest::Client,
}

impl HealthManager {
    pub fn new(nodes: Vec<Node>, spec: ProbeSpec, max_behind_blocks: u64) -> Self {
        Self {
            nodes,
            spec,
            max_behind_blocks,
            client: reqwest::Client::new(),
        }
    }

    pub fn pick_http(&self) -> Result<&str, NoHealthyNode> {
        self.nodes
            .iter()
            .find(|n| n.is_http_healthy())
            .and_then(|n| n.http.as_deref())
            .ok_or(NoHealthyNode)
    }

    pub fn pick_ws(&self) -> Result<&str, NoHealthyNode> {
        self.nodes
            .iter()
            .find(|n| n.is_ws_healthy())
            .and_then(|n| n.ws.as_deref())
            .ok_or(NoHealthyNode)
    }

    /// Runs the probe loop forever; spawn this as its own task per chain.
    pub async fn run_probe_loop(&self) {
        loop {
            self.probe_once().await;
            tokio::time::sleep(PROBE_INTERVAL).await;
        }
    }

    /// One probe round, exposed separately from the loop so tests and a
    /// future admin endpoint can trigger it on demand.
    pub async fn probe_once(&self) {
        for node in &self.nodes {
            if let Some(http) = &node.http {
                let height = self.spec.probe_http(&self.client, http).await;
                node.set_http_height(height);
            }
            if let Some(ws) = &node.ws {
                let height = self.spec.probe_ws(ws).await;
                node.set_ws_height(height);
            }
        }

        let max_height = self
            .nodes
            .iter()
            .flat_map(|n| [n.http_height(), n.ws_height()])
            .max()
            .unwrap_or(0);

        for node in &self.nodes {
            let (http_healthy, ws_healthy) = evaluate_health(
                node.http.is_some(),
                node.http_height(),
                node.ws.is_some(),
                node.ws_height(),
                max_height,
                self.max_behind_blocks,
            );
            node.set_http_healthy(http_healthy);
            node.set_ws_healthy(ws_healthy);

            if !http_healthy {
                warn!(http = ?node.http, height = node.http_height(), max_height, "node http unhealthy");
            }
            if !ws_healthy {
                warn!(ws = ?node.ws, height = node.ws_height(), max_height, "node ws unhealthy");
            }
        }

        info!(max_height, nodes = self.nodes.len(), "probe round complete");
    }
}

/// Pure health evaluation, split out from [`HealthManager::probe_once`] so
/// it can be tested without a network round trip.
fn evaluate_health(
    has_http: bool,
    http_height: u64,
    has_ws: bool,
    ws_height: u64,
    max_height: u64,
    max_behind_blocks: u64,
) -> (bool, bool) {
    let floor = max_height.saturating_sub(max_behind_blocks);
    let http_healthy = has_http && http_height >= floor;
    let ws_healthy = has_ws && ws_height >= floor && ws_height >= http_height;
    (http_healthy, ws_healthy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_node_at_tip() {
        let (http, ws) = evaluate_health(true, 100, true, 100, 100, 5);
        assert!(http);
        assert!(ws);
    }

    #[test]
    fn node_within_slack_is_healthy() {
        let (http, _) = evaluate_health(true, 96, false, 0, 100, 5);
        assert!(http);
    }

    #[test]
    fn node_beyond_slack_is_unhealthy() {
        let (http, _) = evaluate_health(true, 90, false, 0, 100, 5);
        assert!(!http);
    }

    #[test]
    fn failed_probe_height_zero_is_unhealthy() {
        let (http, _) = evaluate_health(true, 0, false, 0, 100, 5);
        assert!(!http);
    }

    #[test]
    fn ws_lagging_its_own_http_is_unhealthy_even_within_slack() {
        let (_, ws) = evaluate_health(true, 100, true, 95, 100, 10);
        assert!(!ws);
    }

    #[test]
    fn absent_transport_is_never_healthy() {
        let (http, ws) = evaluate_health(false, 0, false, 0, 100, 5);
        assert!(!http);
        assert!(!ws);
    }
}
