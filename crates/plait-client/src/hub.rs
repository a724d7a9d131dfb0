//! The per-session client hub: owns every downstream client, caches the
//! grouped catalog, and fans out catalog-changed notifications.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use plait_core::McpServerConfig;

use crate::client::{CatalogChangedHandler, McpClient};
use crate::error::ClientError;
use crate::protocol::{CallToolResult, Tool};

/// Deadline for a notification-driven catalog refresh.
const NOTIFY_REFRESH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Grouped catalog snapshot: server name to its tool list.
pub type GroupedTools = Arc<HashMap<String, Arc<Vec<Tool>>>>;

/// Aggregates the downstream clients of one session.
///
/// The grouped map is cached lazily with double-checked locking: readers
/// share a snapshot pointer; refreshes invalidate it under the write lock
/// and the next reader rebuilds it. Notification handling never runs on the
/// transport's callback path: each notification dispatches a short-lived
/// worker with a bounded deadline.
pub struct McpClientHub {
    clients: RwLock<HashMap<String, Arc<McpClient>>>,
    grouped: RwLock<Option<GroupedTools>>,
    subscriber: RwLock<Option<CatalogChangedHandler>>,
}

impl McpClientHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            clients: RwLock::new(HashMap::new()),
            grouped: RwLock::new(None),
            subscriber: RwLock::new(None),
        })
    }

    /// Connect to every configured server. All-or-nothing: the first
    /// failure closes the clients that already opened and aborts.
    pub async fn connect_all(
        self: &Arc<Self>,
        servers: &HashMap<String, McpServerConfig>,
    ) -> Result<(), ClientError> {
        for (name, config) in servers {
            let handler = self.catalog_changed_handler();
            match McpClient::open(name.clone(), config, handler).await {
                Ok(client) => {
                    self.clients.write().await.insert(name.clone(), client);
                }
                Err(e) => {
                    warn!(server = %name, "connect failed: {e}");
                    self.close().await.ok();
                    return Err(ClientError::Connect(format!(
                        "failed to connect to server {name:?}: {e}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Register a pre-built client. Intended for embedders and tests that
    /// assemble hubs from custom transports.
    pub async fn register_client(self: &Arc<Self>, client: Arc<McpClient>) {
        self.clients
            .write()
            .await
            .insert(client.name().to_string(), client);
        *self.grouped.write().await = None;
    }

    /// The handler a client's transport should invoke on catalog-changed
    /// notifications. Holds only a weak reference, so hub lifetime stays
    /// strictly inside the session.
    pub fn catalog_changed_handler(self: &Arc<Self>) -> CatalogChangedHandler {
        let hub = Arc::downgrade(self);
        Arc::new(move |server_name: &str| {
            let Some(hub) = hub.upgrade() else { return };
            hub.spawn_refresh_worker(server_name.to_string());
        })
    }

    /// Names of all connected servers.
    pub async fn servers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// The grouped catalog, lazily cached.
    pub async fn tools_grouped(&self) -> GroupedTools {
        if let Some(cached) = self.grouped.read().await.clone() {
            return cached;
        }

        let mut slot = self.grouped.write().await;
        // Double-check: another task may have rebuilt while we waited.
        if let Some(cached) = slot.clone() {
            return cached;
        }

        let clients = self.clients.read().await;
        let grouped: HashMap<String, Arc<Vec<Tool>>> = clients
            .iter()
            .map(|(name, client)| (name.clone(), client.catalog()))
            .collect();
        let grouped = Arc::new(grouped);
        *slot = Some(grouped.clone());
        grouped
    }

    /// Catalog of one server, or `None` when it is not connected.
    pub async fn server_tools(&self, server_name: &str) -> Option<Arc<Vec<Tool>>> {
        let clients = self.clients.read().await;
        clients.get(server_name).map(|client| client.catalog())
    }

    /// Route a tool invocation to the right downstream client.
    pub async fn call(
        &self,
        server_name: &str,
        tool_name: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> Result<CallToolResult, ClientError> {
        let client = {
            let clients = self.clients.read().await;
            match clients.get(server_name) {
                Some(client) => client.clone(),
                None => {
                    let mut known: Vec<String> = clients.keys().cloned().collect();
                    known.sort();
                    return Err(ClientError::ServerNotFound {
                        name: server_name.to_string(),
                        known,
                    });
                }
            }
        };

        let catalog = client.catalog();
        if !catalog.iter().any(|tool| tool.name == tool_name) {
            let mut known: Vec<String> = catalog.iter().map(|tool| tool.name.clone()).collect();
            known.sort();
            return Err(ClientError::ToolNotFound {
                server: server_name.to_string(),
                tool: tool_name.to_string(),
                known,
            });
        }

        client.call(tool_name, arguments, cancel).await
    }

    /// Drop the grouped snapshot; the next reader rebuilds it.
    pub async fn invalidate_cache(&self) {
        *self.grouped.write().await = None;
    }

    /// Re-fetch one server's catalog and invalidate the grouped cache. The
    /// subscriber is told about every completed refresh, explicit or
    /// notification-driven.
    pub async fn refresh_server(&self, server_name: &str) -> Result<(), ClientError> {
        let client = {
            let clients = self.clients.read().await;
            clients.get(server_name).cloned()
        };
        let Some(client) = client else {
            let known = self.servers().await;
            return Err(ClientError::ServerNotFound {
                name: server_name.to_string(),
                known,
            });
        };

        client.refresh().await?;
        self.invalidate_cache().await;
        self.notify_subscriber(server_name).await;
        Ok(())
    }

    /// Refresh every server, collecting failures; the grouped cache is
    /// invalidated regardless.
    pub async fn refresh_all(&self) -> Result<(), ClientError> {
        let clients: Vec<Arc<McpClient>> =
            self.clients.read().await.values().cloned().collect();

        let mut failures = Vec::new();
        let mut refreshed = Vec::new();
        for client in clients {
            match client.refresh().await {
                Ok(_) => refreshed.push(client.name().to_string()),
                Err(e) => failures.push(format!("{}: {e}", client.name())),
            }
        }
        self.invalidate_cache().await;
        for server_name in &refreshed {
            self.notify_subscriber(server_name).await;
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ClientError::Transport(format!(
                "failed to refresh some servers: {}",
                failures.join("; ")
            )))
        }
    }

    async fn notify_subscriber(&self, server_name: &str) {
        let subscriber = self.subscriber.read().await.clone();
        if let Some(subscriber) = subscriber {
            subscriber(server_name);
        }
    }

    /// Register the single subscriber invoked after every completed
    /// refresh, whether notification-driven or explicit.
    pub async fn subscribe_catalog_changed(&self, handler: CatalogChangedHandler) {
        *self.subscriber.write().await = Some(handler);
    }

    /// Close every client. Idempotent per client; errors are collected.
    pub async fn close(&self) -> Result<(), ClientError> {
        let clients: Vec<Arc<McpClient>> = {
            let mut map = self.clients.write().await;
            map.drain().map(|(_, client)| client).collect()
        };
        *self.grouped.write().await = None;

        let mut failures = Vec::new();
        for client in clients {
            if let Err(e) = client.close().await {
                failures.push(format!("{}: {e}", client.name()));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ClientError::Transport(format!(
                "errors closing clients: {}",
                failures.join("; ")
            )))
        }
    }

    /// Notification path: refresh on a fresh worker with a bounded
    /// deadline so the transport callback returns immediately. One attempt
    /// per notification; failures are logged and the next notification
    /// retries.
    fn spawn_refresh_worker(self: Arc<Self>, server_name: String) {
        tokio::spawn(async move {
            info!(server = %server_name, "catalog-changed notification received");

            let refresh = self.refresh_server(&server_name);
            match tokio::time::timeout(NOTIFY_REFRESH_TIMEOUT, refresh).await {
                Ok(Ok(())) => debug!(server = %server_name, "catalog refreshed"),
                Ok(Err(e)) => warn!(server = %server_name, "catalog refresh failed: {e}"),
                Err(_) => warn!(server = %server_name, "catalog refresh timed out"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{mock_client, text_tool, MockTransport};
    use serde_json::json;

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn grouped_cache_returns_same_snapshot_until_invalidated() {
        let hub = McpClientHub::new();
        let (client, _transport) = mock_client("fs", vec![text_tool("read_text_file")]).await;
        hub.register_client(client).await;

        let first = hub.tools_grouped().await;
        let second = hub.tools_grouped().await;
        assert!(Arc::ptr_eq(&first, &second), "cache must return the same pointer");

        hub.invalidate_cache().await;
        let third = hub.tools_grouped().await;
        assert!(!Arc::ptr_eq(&first, &third), "invalidation must drop the pointer");
        assert_eq!(third["fs"].len(), 1);
    }

    #[tokio::test]
    async fn refresh_replaces_catalog_and_invalidates_cache() {
        let hub = McpClientHub::new();
        let (client, transport) = mock_client("fs", vec![text_tool("old")]).await;
        hub.register_client(client).await;

        let before = hub.tools_grouped().await;
        assert_eq!(before["fs"][0].name, "old");

        transport.set_tools(vec![text_tool("new")]);
        hub.refresh_server("fs").await.unwrap();

        let after = hub.tools_grouped().await;
        assert_eq!(after["fs"][0].name, "new");
    }

    #[tokio::test]
    async fn reserved_tools_never_surface_in_grouped_output() {
        let hub = McpClientHub::new();
        let (client, transport) = mock_client("fs", vec![text_tool("read_text_file")]).await;
        hub.register_client(client).await;

        transport.set_tools(vec![text_tool("export"), text_tool("list_dir")]);
        hub.refresh_server("fs").await.unwrap();

        let grouped = hub.tools_grouped().await;
        let names: Vec<_> = grouped["fs"].iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["list_dir"]);
    }

    #[tokio::test]
    async fn call_routes_to_the_right_server() {
        let hub = McpClientHub::new();
        let (client, transport) = mock_client("fs", vec![text_tool("read_text_file")]).await;
        hub.register_client(client).await;

        let result = hub
            .call("fs", "read_text_file", json!({"path": "/tmp/x"}), &token())
            .await
            .unwrap();
        assert_eq!(result.text(), "ok");

        let calls = transport.tool_calls();
        assert_eq!(calls, vec!["read_text_file".to_string()]);
    }

    #[tokio::test]
    async fn unknown_server_lists_alternatives() {
        let hub = McpClientHub::new();
        let (client, _transport) = mock_client("fs", vec![text_tool("read_text_file")]).await;
        hub.register_client(client).await;

        let err = hub
            .call("nope", "read_text_file", json!({}), &token())
            .await
            .unwrap_err();
        match err {
            ClientError::ServerNotFound { name, known } => {
                assert_eq!(name, "nope");
                assert_eq!(known, vec!["fs".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unknown_tool_lists_alternatives() {
        let hub = McpClientHub::new();
        let (client, _transport) = mock_client("fs", vec![text_tool("read_text_file")]).await;
        hub.register_client(client).await;

        let err = hub.call("fs", "nope", json!({}), &token()).await.unwrap_err();
        match err {
            ClientError::ToolNotFound { known, .. } => {
                assert_eq!(known, vec!["read_text_file".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn notification_worker_refreshes_and_notifies_subscriber() {
        let hub = McpClientHub::new();
        let (client, transport) = mock_client("fs", vec![text_tool("old")]).await;
        hub.register_client(client).await;

        let (tx, rx) = tokio::sync::oneshot::channel::<String>();
        let tx = std::sync::Mutex::new(Some(tx));
        hub.subscribe_catalog_changed(Arc::new(move |server: &str| {
            if let Some(tx) = tx.lock().ok().and_then(|mut slot| slot.take()) {
                let _ = tx.send(server.to_string());
            }
        }))
        .await;

        transport.set_tools(vec![text_tool("new")]);
        let handler = hub.catalog_changed_handler();
        handler("fs");

        let notified = tokio::time::timeout(std::time::Duration::from_secs(5), rx)
            .await
            .expect("subscriber must be notified")
            .unwrap();
        assert_eq!(notified, "fs");

        let grouped = hub.tools_grouped().await;
        assert_eq!(grouped["fs"][0].name, "new");
    }

    #[tokio::test]
    async fn close_then_call_fails_fast() {
        let hub = McpClientHub::new();
        let (client, _transport) = mock_client("fs", vec![text_tool("read_text_file")]).await;
        hub.register_client(client.clone()).await;

        hub.close().await.unwrap();
        // Repeated close of the underlying client is a no-op.
        client.close().await.unwrap();
        let err = client
            .call("read_text_file", json!({}), &token())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Closed));
    }

    #[tokio::test]
    async fn refresh_twice_is_stable() {
        let hub = McpClientHub::new();
        let (client, _transport) = mock_client("fs", vec![text_tool("read_text_file")]).await;
        hub.register_client(client).await;

        hub.refresh_server("fs").await.unwrap();
        let first = hub.tools_grouped().await;
        hub.refresh_server("fs").await.unwrap();
        let second = hub.tools_grouped().await;

        assert!(!Arc::ptr_eq(&first, &second), "second refresh rebuilds the cache");
        assert_eq!(first["fs"].len(), second["fs"].len());
    }
}
