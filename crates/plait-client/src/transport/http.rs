//! Streamable-HTTP transport: one POST per message, responses either as
//! plain JSON or as an SSE body, plus a background GET listener for
//! server-initiated notifications.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::task::JoinHandle;
use tracing::debug;

use plait_core::McpServerConfig;

use super::{
    unpack_response, NotificationHandler, SseEventParser, SseLineBuffer, Transport,
    CONNECT_TIMEOUT, REQUEST_TIMEOUT,
};
use crate::error::ClientError;
use crate::protocol::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest};

const SESSION_HEADER: &str = "mcp-session-id";
const ACCEPT_JSON_AND_SSE: &str = "application/json, text/event-stream";

/// Streamable-HTTP transport.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    session_id: std::sync::Mutex<Option<String>>,
    next_id: AtomicI64,
    on_notification: NotificationHandler,
    listener: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl HttpTransport {
    /// Build the transport. No traffic is sent here; the caller performs
    /// the initialize handshake, which is also where connect failures (and
    /// thus the SSE fallback) surface.
    pub fn connect(
        server_name: &str,
        config: &McpServerConfig,
        on_notification: NotificationHandler,
    ) -> Result<Self, ClientError> {
        let endpoint = config
            .url
            .clone()
            .ok_or_else(|| ClientError::UnsupportedConfig(server_name.to_string()))?;

        let client = reqwest::Client::builder()
            .default_headers(build_headers(&config.headers)?)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Connect(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            session_id: std::sync::Mutex::new(None),
            next_id: AtomicI64::new(1),
            on_notification,
            listener: std::sync::Mutex::new(None),
        })
    }

    /// Start the background GET stream that carries server-initiated
    /// notifications. Best-effort: errors only end the stream.
    pub fn start_listener(&self) {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let session_id = self.current_session_id();
        let on_notification = self.on_notification.clone();

        let handle = tokio::spawn(async move {
            let mut request = client
                .get(&endpoint)
                .header(ACCEPT, "text/event-stream")
                // The notification stream must outlive the client timeout.
                .timeout(std::time::Duration::from_secs(24 * 60 * 60));
            if let Some(session_id) = session_id {
                request = request.header(SESSION_HEADER, session_id);
            }

            let response = match request.send().await {
                Ok(response) if response.status().is_success() => response,
                Ok(response) => {
                    debug!(status = %response.status(), "notification stream rejected");
                    return;
                }
                Err(e) => {
                    debug!("notification stream unavailable: {e}");
                    return;
                }
            };

            let mut stream = response.bytes_stream();
            let mut lines = SseLineBuffer::default();
            let mut events = SseEventParser::default();

            while let Some(chunk) = stream.next().await {
                let Ok(chunk) = chunk else { return };
                for line in lines.push(&chunk) {
                    let Some(event) = events.push_line(&line) else {
                        continue;
                    };
                    let Ok(message) = serde_json::from_str::<JsonRpcMessage>(&event.data) else {
                        continue;
                    };
                    if message.is_notification() {
                        if let Some(method) = &message.method {
                            on_notification(method);
                        }
                    }
                }
            }
        });

        if let Ok(mut slot) = self.listener.lock() {
            *slot = Some(handle);
        }
    }

    fn current_session_id(&self) -> Option<String> {
        self.session_id.lock().ok().and_then(|id| id.clone())
    }

    fn remember_session_id(&self, response: &reqwest::Response) {
        let Some(session_id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
        else {
            return;
        };
        if let Ok(mut slot) = self.session_id.lock() {
            *slot = Some(session_id.to_string());
        }
    }

    async fn post(&self, payload: String) -> Result<reqwest::Response, ClientError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, ACCEPT_JSON_AND_SSE)
            .body(payload);
        if let Some(session_id) = self.current_session_id() {
            request = request.header(SESSION_HEADER, session_id);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                ClientError::Connect(e.to_string())
            } else if e.is_timeout() {
                ClientError::Timeout
            } else {
                ClientError::Transport(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(ClientError::Transport(format!(
                "http error: {}",
                response.status()
            )));
        }

        self.remember_session_id(&response);
        Ok(response)
    }

    /// Extract the response message from a POST reply, which is either a
    /// JSON body or an event stream whose first response-shaped message
    /// answers the request. Notifications interleaved in the stream are
    /// forwarded.
    async fn read_response(
        &self,
        response: reqwest::Response,
    ) -> Result<JsonRpcMessage, ClientError> {
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !content_type.starts_with("text/event-stream") {
            let body = response
                .bytes()
                .await
                .map_err(|e| ClientError::Transport(e.to_string()))?;
            return serde_json::from_slice::<JsonRpcMessage>(&body).map_err(Into::into);
        }

        let mut stream = response.bytes_stream();
        let mut lines = SseLineBuffer::default();
        let mut events = SseEventParser::default();

        let mut handle_event = |data: &str| -> Option<JsonRpcMessage> {
            let message = serde_json::from_str::<JsonRpcMessage>(data).ok()?;
            if message.is_response() {
                return Some(message);
            }
            if message.is_notification() {
                if let Some(method) = &message.method {
                    (self.on_notification)(method);
                }
            }
            None
        };

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ClientError::Transport(e.to_string()))?;
            for line in lines.push(&chunk) {
                if let Some(event) = events.push_line(&line) {
                    if let Some(message) = handle_event(&event.data) {
                        return Ok(message);
                    }
                }
            }
        }
        for line in lines.finish() {
            if let Some(event) = events.push_line(&line) {
                if let Some(message) = handle_event(&event.data) {
                    return Ok(message);
                }
            }
        }
        // A trailing event may never have been terminated by a blank line.
        if let Some(event) = events.push_line("") {
            if let Some(message) = handle_event(&event.data) {
                return Ok(message);
            }
        }

        Err(ClientError::Transport(
            "event stream ended without a response".to_string(),
        ))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let payload = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;
        let response = self.post(payload).await?;
        let message = self.read_response(response).await?;
        unpack_response(message)
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), ClientError> {
        let payload = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        let _ = self.post(payload).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), ClientError> {
        if let Ok(mut slot) = self.listener.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
        Ok(())
    }
}

/// Build the default header map from configured headers.
fn build_headers(configured: &HashMap<String, String>) -> Result<HeaderMap, ClientError> {
    let mut headers = HeaderMap::new();
    for (key, value) in configured {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| ClientError::Connect(format!("invalid header name {key:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ClientError::Connect(format!("invalid header value for {key:?}: {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_header_names() {
        let mut configured = HashMap::new();
        configured.insert("bad header".to_string(), "value".to_string());
        assert!(matches!(
            build_headers(&configured),
            Err(ClientError::Connect(_))
        ));
    }

    #[test]
    fn builds_valid_headers() {
        let mut configured = HashMap::new();
        configured.insert("Authorization".to_string(), "Bearer token".to_string());
        let headers = build_headers(&configured).unwrap();
        assert_eq!(headers.get("authorization").unwrap(), "Bearer token");
    }
}
