//! Path parsing for `/ipfs/v0/<api-key>/api/v0/<ipfs-method>`.

/// Fixed set of IPFS-daemon methods the adapter forwards. Anything else is
/// `405 method not allowed`.
pub const ALLOWED_METHODS: &[&str] = &[
    "add",
    "block/get",
    "block/put",
    "block/stat",
    "cat",
    "dag/get",
    "dag/put",
    "dag/resolve",
    "get",
    "pin/add",
    "pin/ls",
    "pin/rm",
    "pin/update",
    "version",
];

/// `/ipfs/v0/<api-key>/api/v0/<ipfs-method...>` -> `(api-key, ipfs-method)`.
/// The api-key is the path segment directly after the fixed `/ipfs/v0/`
/// prefix, matching the original handler's fixed-index `pathList[3]` lookup.
pub fn parse_path(path: &str) -> Option<(&str, &str)> {
    let rest = path
        .trim_start_matches('/')
        .strip_prefix("ipfs/v0/")?;
    let (api_key, rest) = rest.split_once('/')?;
    let method = rest.strip_prefix("api/v0/")?;
    if api_key.is_empty() || method.is_empty() {
        return None;
    }
    Some((api_key, method.trim_end_matches('/')))
}

pub fn is_allowed_method(method: &str) -> bool {
    ALLOWED_METHODS.contains(&method)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
}

/// Upload methods transfer bytes up to the cluster; download methods
/// transfer cluster bytes back to the client. Pin/version operations carry
/// no bandwidth charge.
pub fn bandwidth_direction(method: &str) -> Option<Direction> {
    match method {
        "add" | "dag/put" | "block/put" => Some(Direction::Upload),
        "dag/get" | "get" | "cat" | "block/get" => Some(Direction::Download),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_api_key_and_method() {
        let (api_key, method) = parse_path("/ipfs/v0/abc123/api/v0/add").unwrap();
        assert_eq!(api_key, "abc123");
        assert_eq!(method, "add");
    }

    #[test]
    fn parses_multi_segment_method() {
        let (_, method) = parse_path("/ipfs/v0/abc123/api/v0/pin/add").unwrap();
        assert_eq!(method, "pin/add");
    }

    #[test]
    fn rejects_missing_api_prefix() {
        assert!(parse_path("/ipfs/v0/abc123/add").is_none());
    }

    #[test]
    fn allowed_methods_cover_pin_and_block_family() {
        assert!(is_allowed_method("pin/ls"));
        assert!(is_allowed_method("block/stat"));
        assert!(!is_allowed_method("repo/gc"));
    }

    #[test]
    fn direction_classifies_upload_and_download() {
        assert_eq!(bandwidth_direction("add"), Some(Direction::Upload));
        assert_eq!(bandwidth_direction("cat"), Some(Direction::Download));
        assert_eq!(bandwidth_direction("pin/ls"), None);
    }
}
