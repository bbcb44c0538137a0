//! C5: the HTTP JSON-RPC proxy. `proxy_http` implements spec.md §4.5 step by
//! step; the Tendermint path-style variant (C6) lives in
//! [`crate::frontend::tendermint_proxy`] and shares the cache/allow/forward
//! building blocks below.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use gateway_jsonrpc::{
    request_cost, JsonRpcForwardedResponse, JsonRpcForwardedResponseEnum, JsonRpcRequest,
    JsonRpcRequestEnum, UpstreamJsonRpcResponse,
};
use redis_rate_limiter::AllowError;
use serde_json::value::RawValue;
use tracing::{instrument, warn};

use crate::app::GatewayApp;
use crate::rpcs::{ChainHandler, Transport};

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(5);

fn raw_null() -> Box<RawValue> {
    RawValue::from_string("null".to_string()).expect("\"null\" is valid JSON")
}

fn error_response(id: Option<Box<RawValue>>, data: gateway_jsonrpc::JsonRpcErrorData) -> Response {
    let response = JsonRpcForwardedResponse::from_error(id.unwrap_or_else(raw_null), data);
    Json(response).into_response()
}

/// `POST /<chain>/v1/<api-key>`
#[instrument(skip(app, body))]
pub async fn proxy_http(
    State(app): State<Arc<GatewayApp>>,
    Path((chain_name, api_key)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let Some(chain) = app.chain(&chain_name) else {
        return error_response(None, gateway_jsonrpc::JsonRpcErrorData::internal("unknown chain"));
    };

    let payload: JsonRpcRequestEnum = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(_) => return error_response(None, gateway_jsonrpc::JsonRpcErrorData::parse_error()),
    };

    let is_whitelisted = app.rate_limiter.is_whitelisted(&api_key);

    if let Some(resp) = validate_methods(&payload, chain, is_whitelisted) {
        return resp;
    }

    let cost = request_cost(&payload) as u64;
    match app.rate_limiter.allow(chain.config.chain_id, &api_key, cost).await {
        Ok(None) => {}
        Ok(Some(AllowError::NoSuchKey)) => {
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response()
        }
        Ok(Some(AllowError::QuotaExceeded)) => {
            return (StatusCode::TOO_MANY_REQUESTS, "too many requests").into_response()
        }
        Err(err) => {
            warn!(?err, "rate limiter failure");
            return error_response(None, gateway_jsonrpc::JsonRpcErrorData::internal("internal server error"));
        }
    }

    match payload {
        JsonRpcRequestEnum::Batch(_) => forward_batch(&app, chain, &body).await,
        JsonRpcRequestEnum::Single(request) => forward_single(&app, chain, &request).await,
    }
}

/// Step 2: reject empty method (parse error) or black-listed/white-list-only
/// method (unsupported method). A single invalid call in a batch rejects the
/// whole batch, matching the original's body-level validation pass.
fn validate_methods(
    payload: &JsonRpcRequestEnum,
    chain: &ChainHandler,
    is_whitelisted: bool,
) -> Option<Response> {
    let calls: Vec<&JsonRpcRequest> = match payload {
        JsonRpcRequestEnum::Single(r) => vec![r],
        JsonRpcRequestEnum::Batch(batch) => batch.iter().collect(),
    };

    for call in calls {
        if call.is_empty_method() {
            return Some(error_response(
                call.id.clone(),
                gateway_jsonrpc::JsonRpcErrorData::parse_error(),
            ));
        }
        if chain.method_denied(&call.method, Transport::Http, is_whitelisted) {
            return Some(error_response(
                call.id.clone(),
                gateway_jsonrpc::JsonRpcErrorData::unsupported_method(),
            ));
        }
    }
    None
}

/// Step 4: batches are forwarded verbatim and never cached.
async fn forward_batch(app: &GatewayApp, chain: &ChainHandler, body: &[u8]) -> Response {
    let Ok(url) = chain.health.pick_http() else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
    };

    match app
        .http_client
        .post(url)
        .header("Content-Type", "application/json")
        .body(body.to_vec())
        .timeout(UPSTREAM_TIMEOUT)
        .send()
        .await
    {
        Ok(resp) => {
            let status = resp.status();
            match resp.bytes().await {
                Ok(bytes) => (status, bytes).into_response(),
                Err(_) => error_response(None, gateway_jsonrpc::JsonRpcErrorData::internal("internal server error")),
            }
        }
        Err(err) => {
            warn!(?err, "batch upstream call failed");
            error_response(None, gateway_jsonrpc::JsonRpcErrorData::internal("internal server error"))
        }
    }
}

/// Steps 5-7: remap id, try cache, proxy on miss, cache the result, restore
/// the caller's id.
async fn forward_single(app: &GatewayApp, chain: &ChainHandler, request: &JsonRpcRequest) -> Response {
    let client_id = request.id.clone().unwrap_or_else(raw_null);
    let jsonrpc = request.jsonrpc.clone().unwrap_or_else(|| "2.0".to_string());
    let cacheable = chain.is_cacheable(&request.method);

    let cache_key = cacheable
        .then(|| gateway_cache::rpc_cache_key(chain.config.chain_id, &request.method, request.params_bytes()));

    if let Some(key) = &cache_key {
        match app.cache.lookup(key).await {
            Ok(Some(cached)) => {
                if let Ok(result) = RawValue::from_string(String::from_utf8_lossy(&cached).to_string()) {
                    let response = JsonRpcForwardedResponse::from_cached_result(client_id, jsonrpc, result);
                    return Json(response).into_response();
                }
            }
            Ok(None) => {}
            Err(err) => warn!(?err, "cache lookup failed, falling through to upstream"),
        }
    }

    let remapped_id = chain.next_remap_id();
    let remapped_body = serde_json::json!({
        "id": remapped_id,
        "jsonrpc": jsonrpc,
        "method": request.method,
        "params": request.params,
    });

    let url = if chain.routes_to_erigon(&request.method) {
        chain.config.erigon_http.clone()
    } else {
        chain.health.pick_http().ok().map(str::to_string)
    };

    let Some(url) = url else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
    };

    let upstream_reply = app
        .http_client
        .post(url)
        .json(&remapped_body)
        .timeout(UPSTREAM_TIMEOUT)
        .send()
        .await;

    let upstream_reply = match upstream_reply {
        Ok(resp) if resp.status().is_success() => resp,
        Ok(resp) => {
            let status = resp.status();
            return match resp.bytes().await {
                Ok(bytes) => (status, bytes).into_response(),
                Err(_) => error_response(Some(client_id), gateway_jsonrpc::JsonRpcErrorData::internal("internal server error")),
            };
        }
        Err(err) => {
            warn!(?err, "upstream call failed");
            return error_response(Some(client_id), gateway_jsonrpc::JsonRpcErrorData::internal("internal server error"));
        }
    };

    let parsed: Result<UpstreamJsonRpcResponse, _> = upstream_reply.json().await;
    let parsed = match parsed {
        Ok(p) => p,
        Err(_) => {
            return error_response(Some(client_id), gateway_jsonrpc::JsonRpcErrorData::internal("internal server error"))
        }
    };

    if let (Some(result), Some(key)) = (&parsed.result, &cache_key) {
        let ttl = Duration::from_secs(chain.config.cache_ttl_secs);
        app.cache.store_best_effort(key, result.get().as_bytes(), ttl).await;
    }

    let response = if let Some(result) = parsed.result {
        JsonRpcForwardedResponse::from_result(client_id, jsonrpc, result)
    } else if let Some(error) = parsed.error {
        JsonRpcForwardedResponse::from_error(
            client_id,
            serde_json::from_str(error.get()).unwrap_or_else(|_| gateway_jsonrpc::JsonRpcErrorData::internal("internal server error")),
        )
    } else {
        JsonRpcForwardedResponse::from_result(client_id, jsonrpc, raw_null())
    };

    Json(JsonRpcForwardedResponseEnum::Single(response)).into_response()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::config::{ChainConfig, ChainType};

    fn chain_with(http_black: &[&str], white_only: &[&str]) -> ChainHandler {
        let config = ChainConfig {
            chain_id: 1,
            chain_type: ChainType::Evm,
            cache_ttl_secs: 10,
            cacheable_methods: HashSet::new(),
            http_black_methods: http_black.iter().map(|s| s.to_string()).collect(),
            ws_black_methods: HashSet::new(),
            white_methods_only: white_only.iter().map(|s| s.to_string()).collect(),
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
    fn an_allowed_method_passes_validation() {
        let chain = chain_with(&[], &[]);
        let payload: JsonRpcRequestEnum =
            serde_json::from_str(r#"{"id":1,"jsonrpc":"2.0","method":"eth_blockNumber"}"#).unwrap();
        assert!(validate_methods(&payload, &chain, false).is_none());
    }

    #[test]
    fn a_black_listed_method_is_rejected_in_every_batch_entry() {
        let chain = chain_with(&["trace_call"], &[]);
        let payload: JsonRpcRequestEnum = serde_json::from_str(
            r#"[{"id":1,"jsonrpc":"2.0","method":"eth_blockNumber"},{"id":2,"jsonrpc":"2.0","method":"trace_call"}]"#,
        )
        .unwrap();
        assert!(validate_methods(&payload, &chain, false).is_some());
    }

    #[test]
    fn an_empty_method_rejects_before_the_black_list_check() {
        let chain = chain_with(&[], &[]);
        let payload: JsonRpcRequestEnum = serde_json::from_str(r#"{"id":1,"jsonrpc":"2.0","method":""}"#).unwrap();
        assert!(validate_methods(&payload, &chain, false).is_some());
    }

    #[test]
    fn white_methods_only_rejects_a_non_whitelisted_tenant() {
        let chain = chain_with(&[], &["eth_call"]);
        let payload: JsonRpcRequestEnum =
            serde_json::from_str(r#"{"id":1,"jsonrpc":"2.0","method":"eth_call"}"#).unwrap();
        assert!(validate_methods(&payload, &chain, false).is_some());
        assert!(validate_methods(&payload, &chain, true).is_none());
    }
}
