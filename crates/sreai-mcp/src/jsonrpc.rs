//! JSON-RPC 2.0 types for MCP communication.

use crate::error::McpError;
use serde::{Deserialize, Serialize};

/// Error code returned for server-initiated requests the client does not handle.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: u64, method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 notification (no id, no response expected).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcNotification {
    /// Create a new JSON-RPC notification.
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

/// An error response sent back to the server, echoing its request id.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorResponse {
    pub jsonrpc: &'static str,
    pub id: serde_json::Value,
    pub error: JsonRpcError,
}

impl JsonRpcErrorResponse {
    /// Reply to an unsolicited request the client does not implement.
    pub fn method_not_found(id: serde_json::Value, method: &str) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            error: JsonRpcError {
                code: METHOD_NOT_FOUND,
                message: format!("method {method} not implemented in probe"),
                data: None,
            },
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Any incoming message: response, server request, or notification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// What an [`Envelope`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Has an id and no method.
    Response,
    /// Has an id and a method: the server is asking us something.
    Request,
    /// Has a method and no id.
    Notification,
    /// Neither; ignored.
    Unknown,
}

impl Envelope {
    /// Decode one frame body.
    pub fn decode(body: &[u8]) -> Result<Self, McpError> {
        serde_json::from_slice(body)
            .map_err(|e| McpError::Protocol(format!("decode message: {e}")))
    }

    /// Method name, treating an empty string as absent.
    pub fn method(&self) -> Option<&str> {
        self.method.as_deref().filter(|m| !m.is_empty())
    }

    /// Id value, treating `null` as absent.
    pub fn id(&self) -> Option<&serde_json::Value> {
        self.id.as_ref().filter(|id| !id.is_null())
    }

    pub fn kind(&self) -> MessageKind {
        match (self.id().is_some(), self.method().is_some()) {
            (true, false) => MessageKind::Response,
            (true, true) => MessageKind::Request,
            (false, true) => MessageKind::Notification,
            (false, false) => MessageKind::Unknown,
        }
    }
}

/// Canonical pending-map key for a request id: integers as decimal, strings as-is.
pub fn id_key(id: &serde_json::Value) -> Result<String, McpError> {
    match id {
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Ok(u.to_string())
            } else {
                Err(McpError::Protocol(format!("unsupported id type: {n}")))
            }
        }
        serde_json::Value::String(s) => Ok(s.clone()),
        other => Err(McpError::Protocol(format!("unsupported id type: {other}"))),
    }
}
