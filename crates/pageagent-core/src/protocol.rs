//! Agent ↔ controller protocol — JSON-RPC style frames
//!
//! Wire format:
//!
//! Request (either side, correlated):
//!   { "id": "7f0c...", "method": "module-init-notify", "params": { "moduleName": "alpha" } }
//!
//! Response:
//!   { "id": "7f0c...", "result": null }
//!   { "id": "7f0c...", "error": { "code": -32601, "message": "Method not found: foo" } }
//!
//! Notification (fire-and-forget, no id):
//!   { "method": "presence-announce", "params": null }

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Method vocabulary
// ---------------------------------------------------------------------------

/// Agent → controller: first contact after attach.
pub const PRESENCE_ANNOUNCE: &str = "presence-announce";
/// Controller → agent: `{ "scriptApiVersion": n }`, unlocks the Ready state.
pub const INIT_DATA_ACK: &str = "init-data-ack";
/// Agent → controller: `{ "moduleName": name }` after a module has joined.
pub const MODULE_INIT_NOTIFY: &str = "module-init-notify";
/// Controller → agent: the page is about to be torn down.
pub const REMOTE_UNLOAD_NOTIFY: &str = "remote-unload-notify";
/// Agent → controller: handshake token received from a parent frame.
pub const FRAME_TOKEN_RELAY: &str = "frame-token-relay";
/// Agent → controller: coverage payload flushed on unload.
pub const COVERAGE_SUBMIT: &str = "coverage-submit";
/// Controller → agent: lifecycle state and registered modules.
pub const STATUS_QUERY: &str = "status-query";

// ---------------------------------------------------------------------------
// Error codes
// ---------------------------------------------------------------------------

pub const CODE_INVALID_PARAMS: i32 = -32602;
pub const CODE_METHOD_NOT_FOUND: i32 = -32601;
pub const CODE_INTERNAL_ERROR: i32 = -32603;

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// Correlated request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Response to a correlated request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Successful response with a result value.
    pub fn ok(id: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Error response.
    pub fn err(id: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    /// Error response carrying `e`'s JSON-RPC code and message.
    pub fn from_error(id: impl Into<String>, e: &crate::Error) -> Self {
        Self::err(id, e.rpc_code(), e.to_string())
    }

    /// Shorthand for a method-not-found error.
    pub fn method_not_found(id: impl Into<String>, method: &str) -> Self {
        Self::from_error(id, &crate::Error::MethodNotFound(method.to_string()))
    }

    /// Convert into the value the caller of `call` receives.
    pub fn into_result(self) -> crate::Result<serde_json::Value> {
        match self.error {
            Some(e) => Err(crate::Error::remote(e.code, e.message)),
            None => Ok(self.result.unwrap_or(serde_json::Value::Null)),
        }
    }
}

/// RPC error detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

/// Fire-and-forget message (no id, no response).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// Any frame on the channel. Serde tries request first, then response, then
/// notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    Request(RpcRequest),
    Response(RpcResponse),
    Notification(Notification),
}

impl Frame {
    /// Method name for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            Frame::Request(r) => Some(&r.method),
            Frame::Notification(n) => Some(&n.method),
            Frame::Response(_) => None,
        }
    }
}
