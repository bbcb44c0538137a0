use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::value::RawValue;

use crate::error::JsonRpcErrorData;

/// `{id, jsonrpc, result}` or `{id, jsonrpc, error}`. Only one of
/// `result`/`error` is ever populated; the manual `Serialize` impl leaves the
/// other one out of the wire body entirely rather than writing it as `null`.
#[derive(Debug, Clone)]
pub struct JsonRpcForwardedResponse {
    pub id: Box<RawValue>,
    pub jsonrpc: String,
    pub result: Option<Box<RawValue>>,
    pub error: Option<JsonRpcErrorData>,
}

impl JsonRpcForwardedResponse {
    pub fn from_result(id: Box<RawValue>, jsonrpc: String, result: Box<RawValue>) -> Self {
        Self {
            id,
            jsonrpc,
            result: Some(result),
            error: None,
        }
    }

    pub fn from_error(id: Box<RawValue>, error: JsonRpcErrorData) -> Self {
        Self {
            id,
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
        }
    }

    /// Re-wrap a cached `result` under the caller's own `id`/`jsonrpc`, so a
    /// cache hit looks exactly like a fresh upstream reply (spec.md §4.1).
    pub fn from_cached_result(
        id: Box<RawValue>,
        jsonrpc: String,
        cached_result: Box<RawValue>,
    ) -> Self {
        Self::from_result(id, jsonrpc, cached_result)
    }
}

impl Serialize for JsonRpcForwardedResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = 3;
        let mut state = serializer.serialize_struct("JsonRpcForwardedResponse", fields)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("jsonrpc", &self.jsonrpc)?;
        if let Some(result) = &self.result {
            state.serialize_field("result", result)?;
        } else if let Some(error) = &self.error {
            state.serialize_field("error", error)?;
        }
        state.end()
    }
}

/// Mirrors [`crate::JsonRpcRequestEnum`] on the way out. A batch reply is
/// never parsed into individual responses: it is forwarded to the client as
/// the raw bytes the upstream returned (spec.md §4.5 step 4).
#[derive(Debug, Clone)]
pub enum JsonRpcForwardedResponseEnum {
    Single(JsonRpcForwardedResponse),
    Batch(Box<RawValue>),
}

impl Serialize for JsonRpcForwardedResponseEnum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Single(response) => response.serialize(serializer),
            Self::Batch(raw) => raw.serialize(serializer),
        }
    }
}

/// Shape of an upstream reply, used only to pull `result`/`error` back out
/// before we re-wrap them for the client.
#[derive(Debug, Deserialize)]
pub struct UpstreamJsonRpcResponse {
    #[serde(default)]
    pub id: Option<Box<RawValue>>,
    #[serde(default, rename = "jsonrpc")]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub result: Option<Box<RawValue>>,
    #[serde(default)]
    pub error: Option<Box<RawValue>>,
}

impl UpstreamJsonRpcResponse {
    /// Subscription notifications carry no `id` at all (or `id: 0` in some
    /// upstream dialects) — treat both as "no id".
    pub fn is_notification(&self) -> bool {
        match &self.id {
            None => true,
            Some(raw) => raw.get() == "0" || raw.get() == "null",
        }
    }
}
