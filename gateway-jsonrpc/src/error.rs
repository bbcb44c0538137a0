use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// The JSON-RPC 2.0 `error` object: `{code, message, data?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorData {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Box<RawValue>>,
}

impl JsonRpcErrorData {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error() -> Self {
        Self::new(-32700, "Parse error")
    }

    pub fn unsupported_method() -> Self {
        Self::new(-32601, "Unsupported method")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(-32000, message.into())
    }

    pub fn filter_not_found() -> Self {
        Self::new(-32000, "filter not found")
    }

    pub fn subscription_not_found() -> Self {
        Self::new(-32000, "subscription not found")
    }
}

/// A fully formed JSON-RPC error reply, with the `id` it should be sent
/// under already attached. Used on the WS path where we build error frames
/// by hand rather than going through the response-builder helpers.
#[derive(Debug, Clone)]
pub struct JsonRpcErr {
    pub id: Option<Box<RawValue>>,
    pub data: JsonRpcErrorData,
}

impl JsonRpcErr {
    pub fn new(id: Option<Box<RawValue>>, data: JsonRpcErrorData) -> Self {
        Self { id, data }
    }
}
