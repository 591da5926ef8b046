use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Private marker carried by every message crossing the host/sandbox
/// channel. Traffic without it is unrelated and is never processed.
pub const CHANNEL_MARKER: &str = "scriptcell-rpc-v1";

/// Default deadline for an outbound call awaiting its response.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 15_000;

/// Declared sender of an envelope.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Host,
    Sandbox,
}

/// Every message crossing the boundary, in either direction. Only
/// serializable data is carried; no live handles ever cross.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageBody {
    /// Sandbox → host, exactly once, when the isolated context is live.
    Ready,
    /// Host → sandbox: compile and evaluate a script.
    Execute {
        request_id: u64,
        script_id: String,
        code: String,
    },
    /// Host → sandbox: run a previously registered handler.
    Invoke {
        request_id: u64,
        script_id: String,
        handler: String,
    },
    /// Host → sandbox: drop every loaded script.
    ClearAll { request_id: u64 },
    /// Sandbox → host: settles an Execute/Invoke/ClearAll call.
    Response {
        request_id: u64,
        ok: bool,
        #[serde(default)]
        result: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Sandbox → host: a capability invocation issued by script code.
    Rpc {
        request_id: u64,
        script_id: String,
        method: String,
        #[serde(default)]
        args: Vec<Value>,
    },
    /// Host → sandbox: settles an Rpc call. Capability failures travel
    /// here as `ok:false`, never as a fault.
    RpcResponse {
        request_id: u64,
        ok: bool,
        #[serde(default)]
        result: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl MessageBody {
    pub fn ok_response(request_id: u64, result: Value) -> Self {
        MessageBody::Response { request_id, ok: true, result, error: None }
    }

    pub fn err_response(request_id: u64, error: impl Into<String>) -> Self {
        MessageBody::Response { request_id, ok: false, result: Value::Null, error: Some(error.into()) }
    }

    pub fn ok_rpc_response(request_id: u64, result: Value) -> Self {
        MessageBody::RpcResponse { request_id, ok: true, result, error: None }
    }

    pub fn err_rpc_response(request_id: u64, error: impl Into<String>) -> Self {
        MessageBody::RpcResponse { request_id, ok: false, result: Value::Null, error: Some(error.into()) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub marker: String,
    pub origin: Origin,
    #[serde(flatten)]
    pub body: MessageBody,
}

impl Envelope {
    pub fn from_host(body: MessageBody) -> Self {
        Self { marker: CHANNEL_MARKER.to_string(), origin: Origin::Host, body }
    }

    pub fn from_sandbox(body: MessageBody) -> Self {
        Self { marker: CHANNEL_MARKER.to_string(), origin: Origin::Sandbox, body }
    }

    /// Validate marker and declared origin against the expected counterpart.
    /// Mismatched traffic is dropped silently; the caller gets `None` and
    /// must not process the message further.
    pub fn accept(self, expected_origin: Origin) -> Option<MessageBody> {
        if self.marker != CHANNEL_MARKER {
            debug!("Dropping unmarked message on rpc channel");
            return None;
        }
        if self.origin != expected_origin {
            debug!(?expected_origin, actual = ?self.origin, "Dropping message with mismatched origin");
            return None;
        }
        Some(self.body)
    }
}
