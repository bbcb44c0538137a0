//! Hop-by-hop header stripping and `X-Real-IP`/`X-Forwarded-For` attachment,
//! shared by every proxied HTTP request and every WebSocket upstream dial
//! (spec.md §4.7).

use std::net::SocketAddr;

use axum::http::{HeaderMap, HeaderName, HeaderValue};

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const WS_HANDSHAKE: &[&str] = &[
    "sec-websocket-extensions",
    "sec-websocket-key",
    "sec-websocket-version",
    "sec-websocket-protocol",
    "sec-websocket-accept",
];

fn strip(headers: &mut HeaderMap, names: &[&str]) {
    for name in names {
        headers.remove(*name);
    }
}

/// Strips hop-by-hop headers and sets the forwarding headers from the
/// socket's remote address, for a plain HTTP upstream forward.
pub fn prepare_http_headers(mut headers: HeaderMap, remote: SocketAddr) -> HeaderMap {
    strip(&mut headers, HOP_BY_HOP);
    set_forwarded_for(&mut headers, remote);
    headers
}

/// As above, plus the WS-specific handshake headers the upstream dial must
/// not inherit from the client's handshake.
pub fn prepare_ws_headers(mut headers: HeaderMap, remote: SocketAddr) -> HeaderMap {
    strip(&mut headers, HOP_BY_HOP);
    strip(&mut headers, WS_HANDSHAKE);
    set_forwarded_for(&mut headers, remote);
    headers
}

fn set_forwarded_for(headers: &mut HeaderMap, remote: SocketAddr) {
    let ip = remote.ip().to_string();
    if let Ok(value) = HeaderValue::from_str(&ip) {
        headers.insert(HeaderName::from_static("x-real-ip"), value);
    }

    let forwarded = match headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        Some(prior) if !prior.is_empty() => format!("{prior}, {ip}"),
        _ => ip,
    };
    if let Ok(value) = HeaderValue::from_str(&forwarded) {
        headers.insert(HeaderName::from_static("x-forwarded-for"), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_hop_by_hop_and_sets_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive"));
        headers.insert("upgrade", HeaderValue::from_static("websocket"));
        headers.insert("accept", HeaderValue::from_static("*/*"));

        let remote: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let prepared = prepare_http_headers(headers, remote);

        assert!(!prepared.contains_key("connection"));
        assert!(!prepared.contains_key("upgrade"));
        assert!(prepared.contains_key("accept"));
        assert_eq!(prepared.get("x-real-ip").unwrap(), "127.0.0.1");
        assert_eq!(prepared.get("x-forwarded-for").unwrap(), "127.0.0.1");
    }

    #[test]
    fn appends_to_existing_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.1"));
        let remote: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let prepared = prepare_http_headers(headers, remote);
        assert_eq!(prepared.get("x-forwarded-for").unwrap(), "10.0.0.1, 127.0.0.1");
    }

    #[test]
    fn ws_headers_also_strip_handshake_fields() {
        let mut headers = HeaderMap::new();
        headers.insert("sec-websocket-key", HeaderValue::from_static("abc"));
        let remote: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let prepared = prepare_ws_headers(headers, remote);
        assert!(!prepared.contains_key("sec-websocket-key"));
    }
}
