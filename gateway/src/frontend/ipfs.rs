//! C8: the IPFS gateway adapter's HTTP surface.
//! `/ipfs/v0/<api-key>/api/v0/<ipfs-method…>` is proxied to the configured
//! cluster endpoint with bandwidth metering and CID ownership checks layered
//! on top, grounded on the original `IPFSHandler.Proxy` (`pkg/handler/ipfsHandler.go`).

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Json, Response};
use gateway_ipfs::{bandwidth_direction, is_allowed_method, parse_path, AddResult, Direction, PinStatus};
use std::net::SocketAddr;
use tracing::{instrument, warn};

use crate::app::GatewayApp;
use crate::frontend::headers::prepare_http_headers;

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

fn message_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "message": message.into() }))).into_response()
}

fn query_arg(query: Option<&str>, key: &str) -> Option<String> {
    url::form_urlencoded::parse(query.unwrap_or_default().as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

fn query_args(query: Option<&str>, key: &str) -> Vec<String> {
    url::form_urlencoded::parse(query.unwrap_or_default().as_bytes())
        .filter(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
        .collect()
}

/// `ANY /ipfs/v0/<api-key>/api/v0/<ipfs-method…>`
#[instrument(skip(app, headers, body))]
pub async fn proxy_ipfs(
    State(app): State<Arc<GatewayApp>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some((api_key, ipfs_method)) = parse_path(uri.path()) else {
        return message_error(StatusCode::UNAUTHORIZED, "path error");
    };

    if !is_allowed_method(ipfs_method) {
        return message_error(StatusCode::METHOD_NOT_ALLOWED, "not supported method");
    }

    let user_id = app.resolve_user_id(api_key);

    // Ownership checks (spec.md §4.8 step 2): pin/unpin must target a CID the
    // tenant already owns.
    match ipfs_method {
        "pin/add" | "pin/rm" => {
            let Some(cid) = query_arg(uri.query(), "arg") else {
                return message_error(StatusCode::BAD_REQUEST, "read the add param failed");
            };
            match gateway_ipfs::owns_cid(&app.db, user_id, &cid).await {
                Ok(true) => {}
                Ok(false) => return message_error(StatusCode::FORBIDDEN, "can't operation this objects"),
                Err(err) => {
                    warn!(?err, "ownership lookup failed");
                    return message_error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
                }
            }
        }
        "pin/update" => {
            let args = query_args(uri.query(), "arg");
            for cid in &args {
                match gateway_ipfs::owns_cid(&app.db, user_id, cid).await {
                    Ok(true) => {}
                    Ok(false) => return message_error(StatusCode::FORBIDDEN, "can't operation this objects"),
                    Err(err) => {
                        warn!(?err, "ownership lookup failed");
                        return message_error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
                    }
                }
            }
        }
        _ => {}
    }

    let direction = bandwidth_direction(ipfs_method);
    let content_length = body.len() as u64;

    // Uploads are admitted against the plan limit using the request's
    // Content-Length as the upper-bound transfer-up size (spec.md §4.8 step
    // 3); downloads are admitted using the object's real `CumulativeSize`,
    // fetched before any bytes are proxied (spec.md §4.8 step 4). Either
    // way, admission happens before the cluster call, not after.
    if direction == Some(Direction::Upload) {
        if let Err(err) = app
            .ipfs
            .admit_upload(&app.rate_limiter, api_key, content_length, &app.ipfs_usage_source)
            .await
        {
            warn!(?err, "ipfs upload over limit");
            return message_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string());
        }
    } else if direction == Some(Direction::Download) {
        let Some(cid) = query_arg(uri.query(), "arg") else {
            return message_error(StatusCode::BAD_REQUEST, "read the add param failed");
        };
        let object_size = match app.ipfs.object_size(&cid).await {
            Ok(size) => size,
            Err(err) => {
                warn!(?err, %cid, "failed to stat ipfs object size");
                return message_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string());
            }
        };
        if let Err(err) = app
            .ipfs
            .admit_download(&app.rate_limiter, api_key, object_size, &app.ipfs_usage_source)
            .await
        {
            warn!(?err, "ipfs download over limit");
            return message_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string());
        }
    }

    let query_suffix = uri.query().map(|q| format!("?{q}")).unwrap_or_default();
    let url = format!(
        "{}/api/v0/{}{}",
        app.ipfs.cluster_endpoint.trim_end_matches('/'),
        ipfs_method,
        query_suffix
    );

    let mut forward_headers = prepare_http_headers(headers, remote);
    for name in ["user-agent", "referer", "origin"] {
        forward_headers.remove(name);
    }

    let upstream_method = match reqwest::Method::from_bytes(method.as_str().as_bytes()) {
        Ok(m) => m,
        Err(_) => return message_error(StatusCode::BAD_REQUEST, "invalid method"),
    };

    let upstream_reply = app
        .http_client
        .request(upstream_method, url)
        .headers(forward_headers)
        .body(body.clone())
        .timeout(UPSTREAM_TIMEOUT)
        .send()
        .await;

    let upstream_reply = match upstream_reply {
        Ok(resp) => resp,
        Err(err) => {
            warn!(?err, "ipfs upstream call failed");
            return message_error(StatusCode::BAD_REQUEST, err.to_string());
        }
    };

    let status = upstream_reply.status();
    let response_bytes = match upstream_reply.bytes().await {
        Ok(b) => b,
        Err(err) => {
            warn!(?err, "failed to read ipfs upstream body");
            return message_error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error");
        }
    };

    // Admission already happened above, before the cluster call; here we
    // only persist/meter the now-known-successful transfer.
    match ipfs_method {
        "add" => {
            let add_results = parse_add_results(&response_bytes);
            if let Err(err) = app
                .ipfs
                .finish_upload(&app.rate_limiter, user_id, api_key, content_length, &add_results)
                .await
            {
                warn!(?err, "save upload file to database failed");
            }
        }
        "dag/get" | "get" | "cat" | "block/get" => {
            let bw_size = response_bytes.len() as u64;
            app.ipfs.finish_download(&app.rate_limiter, api_key, bw_size).await;
        }
        "dag/put" | "block/put" => {
            if let Err(err) = app
                .rate_limiter
                .bandwidth(gateway_ipfs::IPFS_CHAIN_ID, api_key, content_length, redis_rate_limiter::BandwidthDirection::Up)
                .await
            {
                warn!(?err, "failed to meter ipfs upload bandwidth, ignoring");
            }
        }
        "pin/update" => {
            let args = query_args(uri.query(), "arg");
            if let [old_cid, new_cid] = args.as_slice() {
                if let Err(err) = app.ipfs.pin_update(user_id, old_cid, new_cid).await {
                    warn!(?err, "pin/update failed");
                }
            }
        }
        "pin/add" | "pin/rm" => {
            let status = if ipfs_method == "pin/add" { PinStatus::Pin } else { PinStatus::Unpin };
            if let Some(cid) = query_arg(uri.query(), "arg") {
                if let Err(err) = app.ipfs.pin(user_id, &cid, status).await {
                    warn!(?err, "pin update failed");
                }
            }
        }
        _ => {}
    }

    let status = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::OK);
    (status, response_bytes).into_response()
}

/// The cluster's `/add` reply is a stream of concatenated JSON objects, one
/// per uploaded file, not a JSON array — split on `}` the way the original
/// handler does when the single-object parse fails.
fn parse_add_results(body: &[u8]) -> Vec<AddResult> {
    if let Ok(single) = serde_json::from_slice::<AddResult>(body) {
        return vec![single];
    }

    let text = String::from_utf8_lossy(body);
    text.split('}')
        .filter(|chunk| chunk.len() >= 5)
        .filter_map(|chunk| serde_json::from_str::<AddResult>(&format!("{chunk}}}")).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_add_result() {
        let body = br#"{"Name":"a.txt","Hash":"Qm123","Size":"10"}"#;
        let results = parse_add_results(body);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].hash, "Qm123");
    }

    #[test]
    fn parses_concatenated_add_results() {
        let body = br#"{"Name":"a.txt","Hash":"Qm1","Size":"1"}{"Name":"b.txt","Hash":"Qm2","Size":"2"}"#;
        let results = parse_add_results(body);
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].hash, "Qm2");
    }

    #[test]
    fn query_arg_reads_single_value() {
        assert_eq!(query_arg(Some("arg=Qm123&foo=bar"), "arg"), Some("Qm123".to_string()));
    }

    #[test]
    fn query_args_collects_repeated_keys() {
        assert_eq!(query_args(Some("arg=a&arg=b"), "arg"), vec!["a".to_string(), "b".to_string()]);
    }
}
