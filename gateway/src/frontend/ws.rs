//! C7: the WebSocket bridge. One upstream socket per client connection,
//! a single writer task serializing client writes, and a correlation table
//! keyed on the remapped numeric request id (spec.md §4.6). Grounded on the
//! teacher's `flume::Sender<Message>` response-channel pattern
//! (`web3_proxy::app::eth_subscribe`) and the original's `UpstreamWebSocket`
//! (`pkg/proxy/websocket.go`).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message as ClientMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use gateway_jsonrpc::{JsonRpcErrorData, JsonRpcForwardedResponse, JsonRpcRequest, JsonRpcRequestEnum, UpstreamJsonRpcResponse};
use redis_rate_limiter::AllowError;
use serde_json::value::RawValue;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::Request as UpstreamRequest;
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::warn;

use crate::app::GatewayApp;
use crate::frontend::headers::prepare_ws_headers;
use crate::rpcs::{ChainHandler, Transport};

const UPSTREAM_SEND_TIMEOUT: Duration = Duration::from_secs(10);

type UpstreamWs = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

fn raw_null() -> Box<RawValue> {
    RawValue::from_string("null".to_string()).expect("\"null\" is valid JSON")
}

fn internal_server_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

/// `GET /ws/<chain>/v1/<api-key>` and `GET /ws/<chain>/tendermint/v1/<api-key>`.
pub async fn ws_bridge(
    ws: WebSocketUpgrade,
    State(app): State<Arc<GatewayApp>>,
    Path((chain_name, api_key)): Path<(String, String)>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let Some(chain) = app.chain_arc(&chain_name) else {
        return internal_server_error();
    };

    let Ok(ws_url) = chain.health.pick_ws() else {
        return internal_server_error();
    };
    let ws_url = ws_url.to_string();

    let upstream_headers = prepare_ws_headers(headers, remote);
    let request = match build_upstream_request(&ws_url, upstream_headers) {
        Ok(r) => r,
        Err(err) => {
            warn!(?err, "failed to build upstream ws request");
            return internal_server_error();
        }
    };

    let upstream = match tokio_tungstenite::connect_async(request).await {
        Ok((stream, _)) => stream,
        Err(err) => {
            warn!(?err, %ws_url, "failed to dial upstream websocket");
            return internal_server_error();
        }
    };

    ws.on_upgrade(move |socket| bridge(socket, upstream, app, chain, api_key))
}

fn build_upstream_request(url: &str, headers: HeaderMap) -> anyhow::Result<UpstreamRequest<()>> {
    let mut request = url.into_client_request()?;
    for (name, value) in headers.iter() {
        request.headers_mut().insert(name.clone(), value.clone());
    }
    Ok(request)
}

/// One entry per in-flight upstream request: the client's original `id` (to
/// be restored verbatim, spec.md I6), the `jsonrpc` string it sent, and the
/// cache key to store under if the reply is eligible.
struct Correlation {
    client_id: Box<RawValue>,
    jsonrpc: String,
    cache_key: Option<String>,
}

type CorrelationTable = Arc<Mutex<HashMap<i64, Correlation>>>;

async fn bridge(client_socket: WebSocket, upstream: UpstreamWs, app: Arc<GatewayApp>, chain: Arc<ChainHandler>, api_key: String) {
    let (client_sink, mut client_stream) = client_socket.split();
    let (mut upstream_sink, mut upstream_stream) = upstream.split();

    let (client_tx, client_rx) = flume::unbounded::<ClientMessage>();
    let correlation: CorrelationTable = Arc::new(Mutex::new(HashMap::new()));

    // The single writer for the client socket (spec.md P5): drains the
    // channel until it is closed (every sender dropped) or the socket errors.
    let writer_handle = tokio::spawn(async move {
        let mut sink = client_sink;
        while let Ok(msg) = client_rx.recv_async().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let upstream_task = {
        let client_tx = client_tx.clone();
        let correlation = Arc::clone(&correlation);
        let app = Arc::clone(&app);
        let chain = Arc::clone(&chain);
        let api_key = api_key.clone();
        tokio::spawn(async move {
            while let Some(frame) = upstream_stream.next().await {
                match frame {
                    Ok(UpstreamMessage::Text(text)) => {
                        handle_upstream_text(text, &correlation, &client_tx, &app, &chain, &api_key).await;
                    }
                    Ok(UpstreamMessage::Pong(_)) => {
                        let _ = client_tx.send_async(ClientMessage::Pong(Vec::new())).await;
                    }
                    Ok(UpstreamMessage::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }
        })
    };

    // This task is the sole reader of the client socket and the sole writer
    // of the upstream socket (spec.md §4.6 step 3).
    while let Some(frame) = client_stream.next().await {
        match frame {
            Ok(ClientMessage::Text(text)) => {
                let keep_going =
                    handle_client_text(text, &correlation, &client_tx, &mut upstream_sink, &app, &chain, &api_key).await;
                if !keep_going {
                    break;
                }
            }
            Ok(ClientMessage::Ping(payload)) => {
                let sent = timeout(UPSTREAM_SEND_TIMEOUT, upstream_sink.send(UpstreamMessage::Ping(payload))).await;
                if !matches!(sent, Ok(Ok(()))) {
                    break;
                }
            }
            Ok(ClientMessage::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    drop(client_tx);
    let _ = upstream_sink.close().await;
    upstream_task.abort();
    let _ = writer_handle.await;
}

fn send_error(client_tx: &flume::Sender<ClientMessage>, id: Option<Box<RawValue>>, data: JsonRpcErrorData) {
    let response = JsonRpcForwardedResponse::from_error(id.unwrap_or_else(raw_null), data);
    if let Ok(text) = serde_json::to_string(&response) {
        let _ = client_tx.send(ClientMessage::Text(text));
    }
}

type UpstreamSink = futures::stream::SplitSink<UpstreamWs, UpstreamMessage>;

/// Client→upstream path (spec.md §4.6 step 4). Returns `false` only on an
/// unrecoverable upstream-send error, which terminates the bridge;
/// validation and rate-limit failures are reported to the client as
/// non-fatal JSON-RPC error frames.
async fn handle_client_text(
    text: String,
    correlation: &CorrelationTable,
    client_tx: &flume::Sender<ClientMessage>,
    upstream_sink: &mut UpstreamSink,
    app: &Arc<GatewayApp>,
    chain: &Arc<ChainHandler>,
    api_key: &str,
) -> bool {
    let payload: JsonRpcRequestEnum = match serde_json::from_str(&text) {
        Ok(p) => p,
        Err(_) => {
            send_error(client_tx, None, JsonRpcErrorData::parse_error());
            return true;
        }
    };

    let is_whitelisted = app.rate_limiter.is_whitelisted(api_key);
    if let Some((id, data)) = validate_ws_methods(&payload, chain, is_whitelisted) {
        send_error(client_tx, id, data);
        return true;
    }

    let cost = gateway_jsonrpc::request_cost(&payload) as u64;
    match app.rate_limiter.allow(chain.config.chain_id, api_key, cost).await {
        Ok(None) => {}
        Ok(Some(AllowError::NoSuchKey)) => {
            send_error(client_tx, None, JsonRpcErrorData::new(401, "unauthorized"));
            return true;
        }
        Ok(Some(AllowError::QuotaExceeded)) => {
            send_error(client_tx, None, JsonRpcErrorData::new(429, "too many requests"));
            return true;
        }
        Err(err) => {
            warn!(?err, "rate limiter failure");
            send_error(client_tx, None, JsonRpcErrorData::internal("internal server error"));
            return true;
        }
    }

    match payload {
        // Batches bypass both cache and correlation and are forwarded
        // verbatim (spec.md §4.6 step 4).
        JsonRpcRequestEnum::Batch(_) => {
            matches!(
                timeout(UPSTREAM_SEND_TIMEOUT, upstream_sink.send(UpstreamMessage::Text(text))).await,
                Ok(Ok(()))
            )
        }
        JsonRpcRequestEnum::Single(request) => forward_single(request, correlation, client_tx, upstream_sink, app, chain).await,
    }
}

/// Step 4's empty-method/black-list check, pulled out of
/// [`handle_client_text`] so it can be exercised without a live upstream
/// socket. Mirrors `http_proxy::validate_methods`, but over
/// [`Transport::Ws`].
fn validate_ws_methods(
    payload: &JsonRpcRequestEnum,
    chain: &ChainHandler,
    is_whitelisted: bool,
) -> Option<(Option<Box<RawValue>>, JsonRpcErrorData)> {
    let calls: Vec<&JsonRpcRequest> = match payload {
        JsonRpcRequestEnum::Single(r) => vec![r],
        JsonRpcRequestEnum::Batch(batch) => batch.iter().collect(),
    };
    for call in calls {
        if call.is_empty_method() {
            return Some((call.id.clone(), JsonRpcErrorData::parse_error()));
        }
        if chain.method_denied(&call.method, Transport::Ws, is_whitelisted) {
            return Some((call.id.clone(), JsonRpcErrorData::unsupported_method()));
        }
    }
    None
}

async fn forward_single(
    request: JsonRpcRequest,
    correlation: &CorrelationTable,
    client_tx: &flume::Sender<ClientMessage>,
    upstream_sink: &mut UpstreamSink,
    app: &Arc<GatewayApp>,
    chain: &Arc<ChainHandler>,
) -> bool {
    let client_id = request.id.clone().unwrap_or_else(raw_null);
    let jsonrpc = request.jsonrpc.clone().unwrap_or_else(|| "2.0".to_string());
    let cacheable = chain.is_cacheable(&request.method);
    let cache_key =
        cacheable.then(|| gateway_cache::rpc_cache_key(chain.config.chain_id, &request.method, request.params_bytes()));

    if let Some(key) = &cache_key {
        match app.cache.lookup(key).await {
            Ok(Some(cached)) => {
                if let Ok(result) = RawValue::from_string(String::from_utf8_lossy(&cached).to_string()) {
                    let response = JsonRpcForwardedResponse::from_cached_result(client_id, jsonrpc, result);
                    if let Ok(text) = serde_json::to_string(&response) {
                        let _ = client_tx.send_async(ClientMessage::Text(text)).await;
                    }
                    return true;
                }
            }
            Ok(None) => {}
            Err(err) => warn!(?err, "ws cache lookup failed, falling through to upstream"),
        }
    }

    let remapped_id = chain.next_remap_id();
    {
        let mut table = correlation.lock().expect("correlation mutex poisoned");
        table.insert(
            remapped_id,
            Correlation {
                client_id,
                jsonrpc,
                cache_key,
            },
        );
    }

    let remapped_body = serde_json::json!({
        "id": remapped_id,
        "jsonrpc": "2.0",
        "method": request.method,
        "params": request.params,
    });

    let sent = timeout(
        UPSTREAM_SEND_TIMEOUT,
        upstream_sink.send(UpstreamMessage::Text(remapped_body.to_string())),
    )
    .await;
    if matches!(sent, Ok(Ok(()))) {
        true
    } else {
        // the request never reached upstream: its correlation entry would
        // otherwise dangle forever.
        correlation.lock().expect("correlation mutex poisoned").remove(&remapped_id);
        false
    }
}

/// Upstream→client path (spec.md §4.6 step 5).
async fn handle_upstream_text(
    text: String,
    correlation: &CorrelationTable,
    client_tx: &flume::Sender<ClientMessage>,
    app: &Arc<GatewayApp>,
    chain: &Arc<ChainHandler>,
    api_key: &str,
) {
    if text.trim_start().starts_with('[') {
        let _ = client_tx.send_async(ClientMessage::Text(text)).await;
        return;
    }

    let parsed: UpstreamJsonRpcResponse = match serde_json::from_str(&text) {
        Ok(p) => p,
        Err(_) => return,
    };

    if parsed.is_notification() {
        let _ = client_tx.send_async(ClientMessage::Text(text)).await;
        if let Err(err) = app.rate_limiter.allow(chain.config.chain_id, api_key, 1).await {
            warn!(?err, "failed to bill subscription notification, ignoring");
        }
        return;
    }

    let Some(id) = parsed.id.as_ref().and_then(|raw| raw.get().parse::<i64>().ok()) else {
        return; // an id we cannot interpret numerically can't correlate to anything we sent
    };

    let entry = correlation.lock().expect("correlation mutex poisoned").remove(&id);
    let Some(entry) = entry else {
        return; // unexpected reply: drop silently (spec.md §4.6 step 5)
    };

    if let (Some(key), Some(result)) = (&entry.cache_key, &parsed.result) {
        let ttl = Duration::from_secs(chain.config.cache_ttl_secs);
        app.cache.store_best_effort(key, result.get().as_bytes(), ttl).await;
    }

    let response = if let Some(result) = parsed.result {
        JsonRpcForwardedResponse::from_result(entry.client_id, entry.jsonrpc, result)
    } else if let Some(error) = parsed.error {
        let data =
            serde_json::from_str(error.get()).unwrap_or_else(|_| JsonRpcErrorData::internal("internal server error"));
        JsonRpcForwardedResponse::from_error(entry.client_id, data)
    } else {
        return;
    };

    if let Ok(text) = serde_json::to_string(&response) {
        let _ = client_tx.send_async(ClientMessage::Text(text)).await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::config::{ChainConfig, ChainType};

    fn chain_with(ws_black: &[&str], white_only: &[&str]) -> ChainHandler {
        let config = ChainConfig {
            chain_id: 1,
            chain_type: ChainType::Evm,
            cache_ttl_secs: 10,
            cacheable_methods: HashSet::new(),
            http_black_methods: HashSet::new(),
            ws_black_methods: ws_black.iter().map(|s| s.to_string()).collect(),
            white_methods_only: white_only.iter().map(|s| s.to_string()).collect(),
            http_upstream: vec!["http://localhost:8545".to_string()],
            ws_upstream: vec!["ws://localhost:8546".to_string()],
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
        assert!(validate_ws_methods(&payload, &chain, false).is_none());
    }

    #[test]
    fn a_ws_black_listed_method_is_rejected() {
        let chain = chain_with(&["eth_subscribe"], &[]);
        let payload: JsonRpcRequestEnum =
            serde_json::from_str(r#"{"id":1,"jsonrpc":"2.0","method":"eth_subscribe"}"#).unwrap();
        let (id, data) = validate_ws_methods(&payload, &chain, false).expect("should be denied");
        assert_eq!(id.unwrap().get(), "1");
        assert_eq!(data.code, -32601);
    }

    #[test]
    fn an_empty_method_is_a_parse_error_not_unsupported_method() {
        let chain = chain_with(&[], &[]);
        let payload: JsonRpcRequestEnum = serde_json::from_str(r#"{"id":1,"jsonrpc":"2.0","method":""}"#).unwrap();
        let (_, data) = validate_ws_methods(&payload, &chain, false).expect("should be rejected");
        assert_eq!(data.code, -32700);
    }

    #[test]
    fn white_methods_only_rejects_a_non_whitelisted_tenant() {
        let chain = chain_with(&[], &["eth_call"]);
        let payload: JsonRpcRequestEnum =
            serde_json::from_str(r#"{"id":1,"jsonrpc":"2.0","method":"eth_call"}"#).unwrap();
        assert!(validate_ws_methods(&payload, &chain, false).is_some());
        assert!(validate_ws_methods(&payload, &chain, true).is_none());
    }
}
