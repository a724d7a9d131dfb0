//! Client error types.
//!
//! The split between [`ClientError::Transport`] and the tool-reported error
//! carried inside a successful [`crate::protocol::CallToolResult`] is part
//! of the public contract: callers (and ultimately sandboxed user code) can
//! dispatch on the origin of a failure.

use thiserror::Error;

/// Errors raised by downstream clients and the client hub.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server config carries neither a command nor a URL.
    #[error("server {0:?}: config has neither 'command' nor 'url'")]
    UnsupportedConfig(String),

    /// The transport could not be opened.
    #[error("connection failed: {0}")]
    Connect(String),

    /// An in-flight request failed at the transport layer.
    #[error("transport error: {0}")]
    Transport(String),

    /// The downstream server answered with a JSON-RPC error.
    #[error("downstream rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// A payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// No such server is registered with the hub.
    #[error("server {name:?} not found, known servers: {known:?}")]
    ServerNotFound { name: String, known: Vec<String> },

    /// The server is registered but its catalog has no such tool.
    #[error("tool {tool:?} not found on server {server:?}, known tools: {known:?}")]
    ToolNotFound {
        server: String,
        tool: String,
        known: Vec<String>,
    },

    /// The request deadline elapsed.
    #[error("request timed out")]
    Timeout,

    /// The inbound operation was cancelled.
    #[error("request cancelled")]
    Cancelled,

    /// The client was closed; subsequent calls fail fast.
    #[error("client is closed")]
    Closed,
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
