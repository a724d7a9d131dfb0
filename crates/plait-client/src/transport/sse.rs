//! HTTP + server-sent-events transport: a long-lived GET stream delivers
//! responses and notifications; requests are POSTed to the endpoint the
//! server announces in its first event.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

use plait_core::McpServerConfig;

use super::{
    unpack_response, NotificationHandler, SseEventParser, SseLineBuffer, Transport,
    CONNECT_TIMEOUT, REQUEST_TIMEOUT,
};
use crate::error::ClientError;
use crate::protocol::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest};

type PendingMap = Arc<Mutex<HashMap<i64, oneshot::Sender<JsonRpcMessage>>>>;

/// SSE transport.
pub struct SseTransport {
    client: reqwest::Client,
    post_url: String,
    pending: PendingMap,
    next_id: AtomicI64,
    reader: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SseTransport {
    /// Open the event stream and wait for the server to announce its POST
    /// endpoint.
    pub async fn connect(
        server_name: &str,
        config: &McpServerConfig,
        on_notification: NotificationHandler,
    ) -> Result<Self, ClientError> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| ClientError::UnsupportedConfig(server_name.to_string()))?;

        // No client-wide timeout: the GET stream must stay open.
        let client = reqwest::Client::builder()
            .default_headers(sse_headers(&config.headers)?)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Connect(format!("failed to build http client: {e}")))?;

        let response = client
            .get(&url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| ClientError::Connect(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ClientError::Connect(format!(
                "sse stream rejected: {}",
                response.status()
            )));
        }

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (endpoint_tx, endpoint_rx) = oneshot::channel::<String>();

        let reader = {
            let pending = pending.clone();
            let base_url = url.clone();
            let server = server_name.to_string();
            tokio::spawn(async move {
                let mut endpoint_tx = Some(endpoint_tx);
                let mut stream = response.bytes_stream();
                let mut lines = SseLineBuffer::default();
                let mut events = SseEventParser::default();

                while let Some(chunk) = stream.next().await {
                    let Ok(chunk) = chunk else { break };
                    for line in lines.push(&chunk) {
                        let Some(event) = events.push_line(&line) else {
                            continue;
                        };

                        if event.name == "endpoint" {
                            if let Some(tx) = endpoint_tx.take() {
                                match resolve_endpoint(&base_url, &event.data) {
                                    Ok(endpoint) => {
                                        let _ = tx.send(endpoint);
                                    }
                                    Err(e) => {
                                        debug!(server = %server, "bad endpoint event: {e}");
                                    }
                                }
                            }
                            continue;
                        }

                        let Ok(message) = serde_json::from_str::<JsonRpcMessage>(&event.data)
                        else {
                            continue;
                        };
                        if message.is_response() {
                            if let Some(id) = message.response_id() {
                                if let Some(tx) = pending.lock().await.remove(&id) {
                                    let _ = tx.send(message);
                                }
                            }
                        } else if message.is_notification() {
                            if let Some(method) = &message.method {
                                on_notification(method);
                            }
                        }
                    }
                }
                pending.lock().await.clear();
            })
        };

        let post_url = match tokio::time::timeout(CONNECT_TIMEOUT, endpoint_rx).await {
            Ok(Ok(endpoint)) => endpoint,
            _ => {
                reader.abort();
                return Err(ClientError::Connect(
                    "server did not announce an SSE endpoint".to_string(),
                ));
            }
        };

        Ok(Self {
            client,
            post_url,
            pending,
            next_id: AtomicI64::new(1),
            reader: std::sync::Mutex::new(Some(reader)),
        })
    }

    async fn post(&self, payload: String) -> Result<(), ClientError> {
        let response = self
            .client
            .post(&self.post_url)
            .header(CONTENT_TYPE, "application/json")
            .timeout(CONNECT_TIMEOUT)
            .body(payload)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ClientError::Transport(format!(
                "http error: {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let payload = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if let Err(e) = self.post(payload).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(message)) => unpack_response(message),
            Ok(Err(_)) => Err(ClientError::Transport(
                "sse stream closed before response".to_string(),
            )),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(ClientError::Timeout)
            }
        }
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), ClientError> {
        let payload = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        self.post(payload).await
    }

    async fn close(&self) -> Result<(), ClientError> {
        if let Ok(mut slot) = self.reader.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
        Ok(())
    }
}

/// Resolve the announced endpoint (absolute or relative) against the stream
/// URL.
fn resolve_endpoint(base_url: &str, endpoint: &str) -> Result<String, ClientError> {
    let base = reqwest::Url::parse(base_url)
        .map_err(|e| ClientError::Connect(format!("invalid base url {base_url:?}: {e}")))?;
    let resolved = base
        .join(endpoint)
        .map_err(|e| ClientError::Connect(format!("invalid endpoint {endpoint:?}: {e}")))?;
    Ok(resolved.to_string())
}

fn sse_headers(configured: &HashMap<String, String>) -> Result<HeaderMap, ClientError> {
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
    fn resolves_relative_endpoints() {
        let endpoint =
            resolve_endpoint("http://localhost:9000/sse", "/messages?session=abc").unwrap();
        assert_eq!(endpoint, "http://localhost:9000/messages?session=abc");
    }

    #[test]
    fn keeps_absolute_endpoints() {
        let endpoint =
            resolve_endpoint("http://localhost:9000/sse", "http://other:1234/rpc").unwrap();
        assert_eq!(endpoint, "http://other:1234/rpc");
    }
}
