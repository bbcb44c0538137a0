use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::extract::DotPath;
use crate::numeric::to_u64;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub enum ChainKind {
    /// EVM-family: HTTP POST + WS dial, both carrying the same JSON-RPC body.
    Evm,
    /// Solana-family: WS-only, via `slotSubscribe`/`slotUnsubscribe`.
    Svm,
    /// Aptos: HTTP GET `<base>/v1`, `.ledger_version`.
    Aptos,
}

#[derive(Debug, Clone)]
pub struct ProbeSpec {
    pub kind: ChainKind,
    pub block_number_method: String,
    pub extractor: DotPath,
}

impl ProbeSpec {
    fn body(&self) -> String {
        format!(
            r#"{{"jsonrpc":"2.0","method":"{}","params":[],"id":1}}"#,
            self.block_number_method
        )
    }

    /// Returns 0 (never healthy) on any probe failure, matching the
    /// original's "a failed probe yields height 0" behavior.
    pub async fn probe_http(&self, client: &reqwest::Client, url: &str) -> u64 {
        let result = match self.kind {
            ChainKind::Aptos => self.probe_http_aptos(client, url).await,
            ChainKind::Evm | ChainKind::Svm => self.probe_http_jsonrpc(client, url).await,
        };
        result.unwrap_or_else(|err| {
            debug!(%url, ?err, "http probe failed");
            0
        })
    }

    async fn probe_http_jsonrpc(&self, client: &reqwest::Client, url: &str) -> anyhow::Result<u64> {
        let resp = client
            .post(url)
            .header("Content-Type", "application/json")
            .body(self.body())
            .timeout(PROBE_TIMEOUT)
            .send()
            .await?;
        let body: Value = resp.json().await?;
        let height_str = self
            .extractor
            .extract_as_str(&body)
            .ok_or_else(|| anyhow::anyhow!("extractor found nothing in {url}"))?;
        Ok(to_u64(&height_str)?)
    }

    async fn probe_http_aptos(&self, client: &reqwest::Client, base: &str) -> anyhow::Result<u64> {
        let url = format!("{}/v1", base.trim_end_matches('/'));
        let body: Value = client.get(url).timeout(PROBE_TIMEOUT).send().await?.json().await?;
        let height_str = self
            .extractor
            .extract_as_str(&body)
            .ok_or_else(|| anyhow::anyhow!("ledger_version missing"))?;
        Ok(to_u64(&height_str)?)
    }

    /// Returns 0 on any probe failure.
    pub async fn probe_ws(&self, url: &str) -> u64 {
        let result = match self.kind {
            ChainKind::Evm => self.probe_ws_evm(url).await,
            ChainKind::Svm => self.probe_ws_svm(url).await,
            ChainKind::Aptos => Ok(0),
        };
        result.unwrap_or_else(|err| {
            debug!(%url, ?err, "ws probe failed");
            0
        })
    }

    async fn probe_ws_evm(&self, url: &str) -> anyhow::Result<u64> {
        let (mut ws, _) = tokio::time::timeout(PROBE_TIMEOUT, tokio_tungstenite::connect_async(url)).await??;
        ws.send(Message::Text(self.body())).await?;
        loop {
            match tokio::time::timeout(PROBE_TIMEOUT, ws.next()).await?.transpose()? {
                Some(Message::Text(text)) => {
                    let body: Value = serde_json::from_str(&text)?;
                    let height_str = self
                        .extractor
                        .extract_as_str(&body)
                        .ok_or_else(|| anyhow::anyhow!("extractor found nothing"))?;
                    return Ok(to_u64(&height_str)?);
                }
                Some(_) => continue,
                None => anyhow::bail!("ws closed before a text frame arrived"),
            }
        }
    }

    async fn probe_ws_svm(&self, url: &str) -> anyhow::Result<u64> {
        let (mut ws, _) = tokio::time::timeout(PROBE_TIMEOUT, tokio_tungstenite::connect_async(url)).await??;
        ws.send(Message::Text(
            r#"{"jsonrpc":"2.0","id":1,"method":"slotSubscribe"}"#.to_string(),
        ))
        .await?;

        // first reply carries the subscription id, not a notification
        let subscription_id: Value = loop {
            match tokio::time::timeout(PROBE_TIMEOUT, ws.next()).await?.transpose()? {
                Some(Message::Text(text)) => break serde_json::from_str::<Value>(&text)?,
                Some(_) => continue,
                None => anyhow::bail!("ws closed before slotSubscribe ack"),
            }
        };
        let subscription_id = subscription_id
            .get("result")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("slotSubscribe ack missing result"))?;

        let height = loop {
            match tokio::time::timeout(PROBE_TIMEOUT, ws.next()).await?.transpose()? {
                Some(Message::Text(text)) => {
                    let body: Value = serde_json::from_str(&text)?;
                    if let Some(height_str) = self.extractor.extract_as_str(&body) {
                        break to_u64(&height_str)?;
                    }
                }
                Some(_) => continue,
                None => anyhow::bail!("ws closed before a slot notification arrived"),
            }
        };

        let unsubscribe = format!(
            r#"{{"jsonrpc":"2.0","id":2,"method":"slotUnsubscribe","params":[{subscription_id}]}}"#
        );
        let _ = ws.send(Message::Text(unsubscribe)).await;
        let _ = ws.close(None).await;

        Ok(height)
    }
}
