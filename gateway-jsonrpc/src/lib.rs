//! JSON-RPC 2.0 wire types shared by every proxy entry point.
//!
//! Requests and responses keep their `id` and `params` fields as raw,
//! unparsed JSON (`Box<RawValue>`) so that byte-for-byte round tripping
//! (the client's `id` echoed back unchanged) and byte-stable cache keys
//! (two JSON-equal-but-differently-ordered `params` must hash differently)
//! both fall out of the representation instead of needing special cases.

mod error;
mod request;
mod response;

pub use error::{JsonRpcErr, JsonRpcErrorData};
pub use request::{JsonRpcRequest, JsonRpcRequestEnum};
pub use response::{JsonRpcForwardedResponse, JsonRpcForwardedResponseEnum};

/// A request's cost in quota units: 1 for a single call, `len(batch)` for a
/// batch, with a floor of 1 (an empty batch still costs one unit).
pub fn request_cost(request: &JsonRpcRequestEnum) -> u32 {
    match request {
        JsonRpcRequestEnum::Single(_) => 1,
        JsonRpcRequestEnum::Batch(batch) => (batch.len() as u32).max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::value::RawValue;

    #[test]
    fn empty_batch_costs_one() {
        let req: JsonRpcRequestEnum = serde_json::from_str("[]").unwrap();
        assert!(req.is_batch());
        assert_eq!(request_cost(&req), 1);
    }

    #[test]
    fn batch_of_two_costs_two() {
        let req: JsonRpcRequestEnum = serde_json::from_str(
            r#"[{"id":101,"jsonrpc":"2.0","method":"eth_blockNumber"},{"id":102,"jsonrpc":"2.0","method":"eth_chainId"}]"#,
        )
        .unwrap();
        assert_eq!(request_cost(&req), 2);
    }

    #[test]
    fn single_call_costs_one() {
        let req: JsonRpcRequestEnum =
            serde_json::from_str(r#"{"id":1,"jsonrpc":"2.0","method":"eth_blockNumber"}"#)
                .unwrap();
        assert!(!req.is_batch());
        assert_eq!(request_cost(&req), 1);
    }

    #[test]
    fn empty_method_is_not_unsupported() {
        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"id":1,"jsonrpc":"2.0","method":""}"#).unwrap();
        assert!(req.is_empty_method());
    }

    #[test]
    fn id_round_trips_byte_for_byte() {
        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"id":101,"jsonrpc":"2.0","method":"eth_blockNumber"}"#)
                .unwrap();
        let id = req.id.expect("id present");
        let response =
            JsonRpcForwardedResponse::from_result(id, "2.0".to_string(), RawValue::from_string("\"0x1\"".to_string()).unwrap());
        let out = serde_json::to_string(&response).unwrap();
        assert!(out.contains("\"id\":101"));
    }

    #[test]
    fn distinct_param_byte_orderings_are_distinct_keys() {
        let a: JsonRpcRequest =
            serde_json::from_str(r#"{"id":1,"jsonrpc":"2.0","method":"m","params":{"a":1,"b":2}}"#)
                .unwrap();
        let b: JsonRpcRequest =
            serde_json::from_str(r#"{"id":1,"jsonrpc":"2.0","method":"m","params":{"b":2,"a":1}}"#)
                .unwrap();
        assert_ne!(a.params_bytes(), b.params_bytes());
    }
}
