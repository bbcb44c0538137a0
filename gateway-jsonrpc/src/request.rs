use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// A single JSON-RPC 2.0 call.
///
/// `id` and `params` are kept as raw JSON so we never need to guess a
/// canonical re-serialization of something a client sent us.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub id: Option<Box<RawValue>>,
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Box<RawValue>>,
}

impl JsonRpcRequest {
    /// `true` when this call has no method name at all; the parse-error case
    /// (not "unsupported method") per spec.md's boundary tests.
    pub fn is_empty_method(&self) -> bool {
        self.method.is_empty()
    }

    /// The raw bytes of `params`, used both as the cache-key input and as
    /// the upstream request body. An absent `params` hashes as `"null"`.
    pub fn params_bytes(&self) -> &[u8] {
        self.params
            .as_deref()
            .map(RawValue::get)
            .unwrap_or("null")
            .as_bytes()
    }
}

/// A JSON-RPC request body: either one call or a homogeneous batch.
///
/// `serde(untagged)` lets serde try the array branch first (cheap: it only
/// needs to see a leading `[`) and fall back to the object branch, which
/// matches how real clients send either shape interchangeably.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcRequestEnum {
    Batch(Vec<JsonRpcRequest>),
    Single(JsonRpcRequest),
}

impl JsonRpcRequestEnum {
    pub fn is_batch(&self) -> bool {
        matches!(self, Self::Batch(_))
    }
}
