//! Stdio transport: a child process speaking newline-delimited JSON-RPC.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use plait_core::McpServerConfig;

use super::{unpack_response, NotificationHandler, Transport, REQUEST_TIMEOUT};
use crate::error::ClientError;
use crate::protocol::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest};

type PendingMap = Arc<Mutex<HashMap<i64, oneshot::Sender<JsonRpcMessage>>>>;

/// Transport over a spawned child process. Requests go out as single lines
/// on stdin; a reader task routes responses by id and forwards
/// notifications. Closing kills the child.
pub struct StdioTransport {
    stdin: Mutex<ChildStdin>,
    pending: PendingMap,
    next_id: AtomicI64,
    child: std::sync::Mutex<Option<Child>>,
}

impl StdioTransport {
    /// Spawn the configured command and wire up the reader tasks.
    pub async fn spawn(
        server_name: &str,
        config: &McpServerConfig,
        on_notification: NotificationHandler,
    ) -> Result<Self, ClientError> {
        let command = config
            .command
            .as_deref()
            .ok_or_else(|| ClientError::UnsupportedConfig(server_name.to_string()))?;

        debug!(server = server_name, command, "spawning stdio MCP server");

        let mut cmd = Command::new(command);
        cmd.args(&config.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &config.cwd {
            cmd.current_dir(cwd);
        }
        cmd.envs(&config.env);

        let mut child = cmd
            .spawn()
            .map_err(|e| ClientError::Connect(format!("failed to spawn {command:?}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ClientError::Connect("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClientError::Connect("child stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ClientError::Connect("child stderr unavailable".to_string()))?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        // Route stdout lines to pending requests and the notification
        // handler.
        {
            let pending = pending.clone();
            let server = server_name.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let Ok(message) = serde_json::from_str::<JsonRpcMessage>(&line) else {
                        debug!(server = %server, "dropping unparseable stdio line");
                        continue;
                    };
                    if message.is_response() {
                        if let Some(id) = message.response_id() {
                            if let Some(tx) = pending.lock().await.remove(&id) {
                                let _ = tx.send(message);
                            }
                        }
                        continue;
                    }
                    if message.is_notification() {
                        if let Some(method) = &message.method {
                            on_notification(method);
                        }
                    }
                }
                // Child is gone; fail whatever is still waiting.
                pending.lock().await.clear();
            });
        }

        // Keep stderr drained so the child cannot block on it.
        {
            let server = server_name.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(server = %server, "stderr: {line}");
                }
            });
        }

        Ok(Self {
            stdin: Mutex::new(stdin),
            pending,
            next_id: AtomicI64::new(1),
            child: std::sync::Mutex::new(Some(child)),
        })
    }

    async fn write_line(&self, payload: &str) -> Result<(), ClientError> {
        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(payload.as_bytes())
            .await
            .map_err(|e| ClientError::Transport(format!("stdin write failed: {e}")))?;
        stdin
            .write_all(b"\n")
            .await
            .map_err(|e| ClientError::Transport(format!("stdin write failed: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| ClientError::Transport(format!("stdin flush failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let payload = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if let Err(e) = self.write_line(&payload).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(message)) => unpack_response(message),
            Ok(Err(_)) => Err(ClientError::Transport(
                "stdio connection closed before response".to_string(),
            )),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(ClientError::Timeout)
            }
        }
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), ClientError> {
        let payload = serde_json::to_string(&JsonRpcNotification::new(method, params))?;
        self.write_line(&payload).await
    }

    async fn close(&self) -> Result<(), ClientError> {
        let child = self.child.lock().map(|mut slot| slot.take());
        if let Ok(Some(mut child)) = child {
            if let Err(e) = child.start_kill() {
                warn!("failed to kill stdio child: {e}");
            }
            // Reap the child off the close path.
            tokio::spawn(async move {
                let _ = child.wait().await;
            });
        }
        Ok(())
    }
}
