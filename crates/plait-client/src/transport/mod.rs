//! Transport abstraction and the three concrete transports.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::error::ClientError;
use crate::protocol::JsonRpcMessage;

mod http;
mod sse;
mod stdio;

pub use http::HttpTransport;
pub use sse::SseTransport;
pub use stdio::StdioTransport;

/// How long a single request may wait for its response.
pub(crate) const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);
/// How long transport establishment may take.
pub(crate) const CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Invoked with the method name of every server notification.
pub type NotificationHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// One live connection to a downstream server.
///
/// Implementations own their framing (stdio lines, HTTP POST bodies, SSE
/// events) and surface notifications through the handler supplied at
/// construction.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and wait for its result value.
    async fn request(&self, method: &str, params: Value) -> Result<Value, ClientError>;

    /// Send a fire-and-forget notification.
    async fn notify(&self, method: &str, params: Value) -> Result<(), ClientError>;

    /// Tear down the connection. Idempotent.
    async fn close(&self) -> Result<(), ClientError>;
}

/// Turn a routed response message into the request's result value.
pub(crate) fn unpack_response(message: JsonRpcMessage) -> Result<Value, ClientError> {
    if let Some(error) = message.error {
        return Err(ClientError::Rpc {
            code: error.code,
            message: error.message,
        });
    }
    Ok(message.result.unwrap_or(Value::Null))
}

/// Incremental splitter turning raw response bytes into lines. Carriage
/// returns are stripped; empty lines are yielded because SSE uses them as
/// event boundaries.
#[derive(Default)]
pub(crate) struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut consumed = 0;

        while let Some(pos) = self.buffer[consumed..].iter().position(|&b| b == b'\n') {
            let newline = consumed + pos;
            let mut end = newline;
            if end > consumed && self.buffer[end - 1] == b'\r' {
                end -= 1;
            }
            if let Ok(text) = std::str::from_utf8(&self.buffer[consumed..end]) {
                lines.push(text.to_string());
            }
            consumed = newline + 1;
        }

        self.buffer.drain(..consumed);
        lines
    }

    /// Flush whatever remains as a final line.
    pub(crate) fn finish(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        if !self.buffer.is_empty() {
            if let Ok(text) = std::str::from_utf8(&self.buffer) {
                if !text.trim().is_empty() {
                    lines.push(text.trim_end_matches('\r').to_string());
                }
            }
            self.buffer.clear();
        }
        lines
    }
}

/// A parsed server-sent event.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SseEvent {
    pub name: String,
    pub data: String,
}

/// Accumulates SSE field lines into events, dispatching on blank lines.
#[derive(Default)]
pub(crate) struct SseEventParser {
    event: Option<String>,
    data: Vec<String>,
}

impl SseEventParser {
    /// Feed one line; returns a complete event when the line closes one.
    pub(crate) fn push_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            if self.event.is_none() && self.data.is_empty() {
                return None;
            }
            let event = SseEvent {
                name: self.event.take().unwrap_or_else(|| "message".to_string()),
                data: std::mem::take(&mut self.data).join("\n"),
            };
            return Some(event);
        }

        if let Some(value) = line.strip_prefix("event:") {
            self.event = Some(value.trim_start().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            self.data.push(value.trim_start().to_string());
        }
        // Comments (":keepalive") and other fields are ignored.
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_buffer_handles_split_chunks() {
        let mut buffer = SseLineBuffer::default();
        assert!(buffer.push(b"data: par").is_empty());
        let lines = buffer.push(b"tial\r\n\n");
        assert_eq!(lines, vec!["data: partial".to_string(), String::new()]);
    }

    #[test]
    fn line_buffer_finish_flushes_tail() {
        let mut buffer = SseLineBuffer::default();
        buffer.push(b"data: head\n");
        buffer.push(b"data: tail");
        assert_eq!(buffer.finish(), vec!["data: tail".to_string()]);
    }

    #[test]
    fn event_parser_collects_named_events() {
        let mut parser = SseEventParser::default();
        assert!(parser.push_line("event: endpoint").is_none());
        assert!(parser.push_line("data: /messages?id=1").is_none());
        let event = parser.push_line("").unwrap();
        assert_eq!(event.name, "endpoint");
        assert_eq!(event.data, "/messages?id=1");
    }

    #[test]
    fn event_parser_defaults_to_message() {
        let mut parser = SseEventParser::default();
        parser.push_line(r#"data: {"jsonrpc":"2.0"}"#);
        let event = parser.push_line("").unwrap();
        assert_eq!(event.name, "message");
    }

    #[test]
    fn event_parser_joins_multi_line_data() {
        let mut parser = SseEventParser::default();
        parser.push_line("data: a");
        parser.push_line("data: b");
        let event = parser.push_line("").unwrap();
        assert_eq!(event.data, "a\nb");
    }

    #[test]
    fn event_parser_ignores_comments() {
        let mut parser = SseEventParser::default();
        assert!(parser.push_line(": keepalive").is_none());
        assert!(parser.push_line("").is_none());
    }
}
