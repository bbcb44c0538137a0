//! URL routing (spec.md §6). Every entry point is a thin `axum::Router`
//! wiring over the handlers in [`crate::frontend`]; the generic
//! `/rpc/<chain-name>/<api-key>/<path…>` proxy is implemented inline here,
//! since unlike the other five entry points it carries no quota/cache layer
//! of its own (spec.md §9 "Configuration shape").

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::app::GatewayApp;
use crate::frontend::headers::prepare_http_headers;
use crate::frontend::{http_proxy, ipfs, tendermint_proxy, ws};

const GENERIC_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn build(app: Arc<GatewayApp>) -> Router {
    let request_id_header = axum::http::HeaderName::from_static(REQUEST_ID_HEADER);

    Router::new()
        .route("/:chain/v1/:api_key", post(http_proxy::proxy_http))
        .route("/ws/:chain/v1/:api_key", get(ws::ws_bridge))
        .route("/:chain/tendermint/v1/:api_key/*path", get(tendermint_proxy::proxy_tendermint_path))
        .route("/ws/:chain/tendermint/v1/:api_key", get(ws::ws_bridge))
        .route("/ipfs/v0/*rest", any(ipfs::proxy_ipfs))
        .route("/rpc/:chain_name/:api_key/*path", any(proxy_generic))
        .with_state(app)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id_header.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(request_id_header))
                .layer(CorsLayer::permissive()),
        )
}

/// `ANY /rpc/<chain-name>/<api-key>/<path…>` — a config-file-defined, single
/// api-key raw reverse proxy with no method filter, quota, or cache layer
/// (spec.md §6, §9). `extra_write`-flagged nodes receive a best-effort
/// mirrored copy of the request body (spec.md §6 `RpcNode.extra_write`).
async fn proxy_generic(
    State(app): State<Arc<GatewayApp>>,
    Path((chain_name, api_key, path)): Path<(String, String, String)>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(expected_key) = &app.generic_apikey else {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    };
    if &api_key != expected_key {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }

    let Some(chain) = app.generic_chain(&chain_name) else {
        return (StatusCode::NOT_FOUND, "unknown chain").into_response();
    };

    let Ok(base) = chain.health.pick_http() else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
    };

    let query = uri.query().map(|q| format!("?{q}")).unwrap_or_default();
    let upstream_method = match reqwest::Method::from_bytes(method.as_str().as_bytes()) {
        Ok(m) => m,
        Err(_) => return (StatusCode::BAD_REQUEST, "invalid method").into_response(),
    };
    let forward_headers = prepare_http_headers(headers, remote);

    for mirror_url in &chain.extra_write_urls {
        let url = format!("{}/{}{}", mirror_url.trim_end_matches('/'), path, query);
        let client = app.http_client.clone();
        let mirror_method = upstream_method.clone();
        let mirror_headers = forward_headers.clone();
        let mirror_body = body.clone();
        tokio::spawn(async move {
            if let Err(err) = client
                .request(mirror_method, url)
                .headers(mirror_headers)
                .body(mirror_body)
                .timeout(GENERIC_UPSTREAM_TIMEOUT)
                .send()
                .await
            {
                warn!(?err, "extra_write mirror request failed, ignoring");
            }
        });
    }

    let url = format!("{}/{}{}", base.trim_end_matches('/'), path, query);
    let upstream_reply = app
        .http_client
        .request(upstream_method, url)
        .headers(forward_headers)
        .body(body)
        .timeout(GENERIC_UPSTREAM_TIMEOUT)
        .send()
        .await;

    match upstream_reply {
        Ok(resp) => {
            let status = resp.status();
            match resp.bytes().await {
                Ok(bytes) => (status, bytes).into_response(),
                Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response(),
            }
        }
        Err(err) => {
            warn!(?err, %chain_name, "generic router upstream call failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}
