//! C6: the Tendermint path-style proxy. `GET /<chain>/tendermint/v1/<api-key>/<path>`
//! carries its JSON-RPC method in the URL rather than a request body; the
//! cache key is `md5(path + query)` and the cached value is the full
//! (sanitized) upstream reply bytes, grounded on the original
//! `tendermintRpcProxy.go` (`fromTendermintCache`/`TendermintUpstream`).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use redis_rate_limiter::AllowError;
use serde_json::Value;
use tracing::{instrument, warn};

use crate::app::GatewayApp;
use crate::rpcs::Transport;

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(5);

fn internal_server_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

fn json_rpc_error(data: gateway_jsonrpc::JsonRpcErrorData) -> Response {
    axum::Json(serde_json::json!({
        "jsonrpc": "2.0",
        "error": data,
    }))
    .into_response()
}

/// `GET /<chain>/tendermint/v1/<api-key>/<path>`
#[instrument(skip(app))]
pub async fn proxy_tendermint_path(
    State(app): State<Arc<GatewayApp>>,
    Path((chain_name, api_key, path)): Path<(String, String, String)>,
    uri: Uri,
) -> Response {
    let Some(chain) = app.chain(&chain_name) else {
        return internal_server_error();
    };

    // The last path segment is the Tendermint RPC method (e.g. `status`,
    // `abci_query`); `genesis`/`tx_search`/`abci_query` are expected to be
    // denied via the chain's configured black-list (spec.md §4.5.1).
    let method = path.rsplit('/').next().unwrap_or(path.as_str());
    let is_whitelisted = app.rate_limiter.is_whitelisted(&api_key);
    if chain.method_denied(method, Transport::Http, is_whitelisted) {
        return json_rpc_error(gateway_jsonrpc::JsonRpcErrorData::unsupported_method());
    }

    match app.rate_limiter.allow(chain.config.chain_id, &api_key, 1).await {
        Ok(None) => {}
        Ok(Some(AllowError::NoSuchKey)) => return (StatusCode::UNAUTHORIZED, "unauthorized").into_response(),
        Ok(Some(AllowError::QuotaExceeded)) => {
            return (StatusCode::TOO_MANY_REQUESTS, "too many requests").into_response()
        }
        Err(err) => {
            warn!(?err, "rate limiter failure");
            return (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response();
        }
    }

    // spec.md §9 open question (c): preserve the full original query string
    // as-is, rather than the original's lossy `?`-split-and-rejoin.
    let query = uri.query().map(|q| format!("?{q}")).unwrap_or_default();
    let cacheable = chain.is_cacheable(method);
    let cache_key = cacheable.then(|| {
        gateway_cache::tendermint_cache_key(chain.config.chain_id, &path, format!("{path}{query}").as_bytes())
    });

    if let Some(key) = &cache_key {
        match app.cache.lookup(key).await {
            Ok(Some(cached)) => {
                return (StatusCode::OK, [("content-type", "application/json")], cached).into_response();
            }
            Ok(None) => {}
            Err(err) => warn!(?err, "tendermint cache lookup failed, falling through to upstream"),
        }
    }

    let Ok(base) = chain.health.pick_http() else {
        return internal_server_error();
    };
    let url = format!("{}/{}{}", base.trim_end_matches('/'), path, query);

    let upstream_reply = app.http_client.get(url).timeout(UPSTREAM_TIMEOUT).send().await;
    let upstream_reply = match upstream_reply {
        Ok(resp) if resp.status().is_success() => resp,
        Ok(resp) => {
            let status = resp.status();
            return match resp.bytes().await {
                Ok(bytes) => (status, bytes).into_response(),
                Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response(),
            };
        }
        Err(err) => {
            warn!(?err, "tendermint upstream call failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response();
        }
    };

    let bytes = match upstream_reply.bytes().await {
        Ok(b) => b,
        Err(_) => return (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response(),
    };

    let sanitized = sanitize_status_response(method, &bytes);

    if let Some(key) = &cache_key {
        if is_successful_result(&sanitized) {
            let ttl = Duration::from_secs(chain.config.cache_ttl_secs);
            app.cache.store_best_effort(key, &sanitized, ttl).await;
        }
    }

    (StatusCode::OK, [("content-type", "application/json")], sanitized).into_response()
}

fn is_successful_result(body: &[u8]) -> bool {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("result").cloned())
        .map(|r| !r.is_null())
        .unwrap_or(false)
}

/// Strips the internal node's RPC address out of `status` replies before
/// they ever reach a client (spec.md §4.5).
fn sanitize_status_response(method: &str, body: &[u8]) -> Vec<u8> {
    if method != "status" {
        return body.to_vec();
    }
    let Ok(mut value) = serde_json::from_slice::<Value>(body) else {
        return body.to_vec();
    };
    if let Some(rpc_address) = value.pointer_mut("/result/node_info/other/rpc_address") {
        *rpc_address = Value::String(String::new());
    }
    serde_json::to_vec(&value).unwrap_or_else(|_| body.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_status_rpc_address() {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "result": {"node_info": {"other": {"rpc_address": "tcp://10.0.0.5:26657"}}},
        });
        let sanitized = sanitize_status_response("status", body.to_string().as_bytes());
        let parsed: Value = serde_json::from_slice(&sanitized).unwrap();
        assert_eq!(parsed["result"]["node_info"]["other"]["rpc_address"], "");
    }

    #[test]
    fn leaves_non_status_replies_untouched() {
        let body = br#"{"jsonrpc":"2.0","result":{"node_info":{}}}"#;
        let sanitized = sanitize_status_response("block", body);
        assert_eq!(sanitized, body);
    }

    #[test]
    fn method_is_the_final_path_segment() {
        let path = "cosmos/tx_search";
        assert_eq!(path.rsplit('/').next().unwrap(), "tx_search");
    }
}
