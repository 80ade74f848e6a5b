//! JSON-RPC 2.0 envelope types shared by the HTTPS one-shot path and the
//! persistent WebSocket duplex channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON-RPC request envelope: `{"jsonrpc":"2.0","id":<int>,"method":<str>,"params":<obj>}`.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// A raw JSON-RPC reply, before it's been classified into success/failure.
///
/// Either `result`, `error`, or (for subscription pushes) `method` + `params`
/// is populated; never more than one variant's worth of fields at once in
/// well-formed venue traffic.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcFrame {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorField>,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorField {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl JsonRpcFrame {
    /// True if this frame is a `subscription` push notification carrying a
    /// channel name in `params.channel`.
    pub fn is_subscription_push(&self) -> bool {
        self.method.as_deref() == Some("subscription")
            && self
                .params
                .as_ref()
                .and_then(|p| p.get("channel"))
                .is_some()
    }

    /// The channel name of a subscription push, if this frame is one.
    pub fn push_channel(&self) -> Option<&str> {
        self.params.as_ref()?.get("channel")?.as_str()
    }

    /// The `data` payload of a subscription push, if this frame is one.
    pub fn push_data(&self) -> Option<Value> {
        self.params.as_ref()?.get("data").cloned()
    }
}

/// The outcome of a one-shot HTTPS JSON-RPC call, surfaced as data rather
/// than propagated as a `Result` error — per the spec, venue-level failures
/// are user-visible return values, not exceptions.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub success: bool,
    pub result: Option<Value>,
    pub error_message: Option<String>,
}

impl ApiResponse {
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error_message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error_message: Some(message.into()),
        }
    }
}
