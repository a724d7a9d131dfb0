//! One downstream client: transport selection, handshake, catalog and
//! tool-call surface.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use plait_core::{McpServerConfig, TransportKind};

use crate::error::ClientError;
use crate::protocol::{
    CallToolResult, InitializeResult, ListToolsResult, Tool, METHOD_CALL_TOOL,
    METHOD_INITIALIZE, METHOD_INITIALIZED, METHOD_LIST_TOOLS, METHOD_TOOLS_CHANGED,
    PROTOCOL_VERSION,
};
use crate::transport::{
    HttpTransport, NotificationHandler, SseTransport, StdioTransport, Transport,
};

/// ECMAScript reserved words that can never be exported function
/// identifiers. Tools whose camelCased export name lands on this list are
/// filtered out of every catalog; the list is part of the public contract
/// and must stay stable.
pub const RESERVED_WORDS: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for", "function",
    "if", "implements", "import", "in", "instanceof", "interface", "let", "new", "null",
    "package", "private", "protected", "public", "return", "static", "super", "switch", "this",
    "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

/// True when a tool name must be filtered because its export identifier
/// would be illegal in generated code.
pub fn is_reserved_tool_name(tool_name: &str) -> bool {
    let export = plait_codegen::case::to_camel_case(tool_name);
    RESERVED_WORDS.contains(&export.as_str())
}

/// Invoked with the server name whenever its catalog-changed notification
/// arrives.
pub type CatalogChangedHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Maximum `tools/list` pages followed before assuming a cursor loop.
const MAX_LIST_PAGES: usize = 16;

/// One live connection to one downstream server.
pub struct McpClient {
    name: String,
    transport: Arc<dyn Transport>,
    kind: TransportKind,
    tools: std::sync::RwLock<Arc<Vec<Tool>>>,
    closed: AtomicBool,
}

impl McpClient {
    /// Open a connection for `config`, run the handshake, and fetch the
    /// initial catalog.
    ///
    /// Untagged URL configs attempt streamable-http first and fall back to
    /// SSE when the handshake fails.
    pub async fn open(
        name: impl Into<String>,
        config: &McpServerConfig,
        on_catalog_changed: CatalogChangedHandler,
    ) -> Result<Arc<Self>, ClientError> {
        let name = name.into();
        let notifications = notification_adapter(name.clone(), on_catalog_changed);

        let kind = match config.kind {
            Some(kind) => kind,
            None if config.command.is_some() => TransportKind::Stdio,
            None if config.url.is_some() => {
                // Untagged URL: streamable-http with SSE fallback.
                match Self::open_http(&name, config, notifications.clone()).await {
                    Ok(client) => return Ok(client),
                    Err(e) => {
                        debug!(server = %name, "streamable-http failed ({e}), falling back to sse");
                        return Self::open_sse(&name, config, notifications).await;
                    }
                }
            }
            None => return Err(ClientError::UnsupportedConfig(name)),
        };

        match kind {
            TransportKind::Stdio => {
                let transport = StdioTransport::spawn(&name, config, notifications).await?;
                Self::connect_with(name, Arc::new(transport), TransportKind::Stdio).await
            }
            TransportKind::Http => Self::open_http(&name, config, notifications).await,
            TransportKind::Sse => Self::open_sse(&name, config, notifications).await,
        }
    }

    async fn open_http(
        name: &str,
        config: &McpServerConfig,
        notifications: NotificationHandler,
    ) -> Result<Arc<Self>, ClientError> {
        let transport = HttpTransport::connect(name, config, notifications)?;
        let transport = Arc::new(transport);
        let client =
            Self::connect_with(name.to_string(), transport.clone(), TransportKind::Http).await?;
        // The handshake captured the session id; notifications can flow now.
        transport.start_listener();
        Ok(client)
    }

    async fn open_sse(
        name: &str,
        config: &McpServerConfig,
        notifications: NotificationHandler,
    ) -> Result<Arc<Self>, ClientError> {
        let transport = SseTransport::connect(name, config, notifications).await?;
        Self::connect_with(name.to_string(), Arc::new(transport), TransportKind::Sse).await
    }

    /// Finish opening over an already-built transport: handshake, then the
    /// initial catalog fetch. Public so embedders and tests can supply
    /// their own transports.
    pub async fn connect_with(
        name: String,
        transport: Arc<dyn Transport>,
        kind: TransportKind,
    ) -> Result<Arc<Self>, ClientError> {
        let init = handshake(transport.as_ref()).await?;
        info!(
            server = %name,
            transport = %kind,
            protocol = init.protocol_version.as_deref().unwrap_or("unknown"),
            "connected to MCP server"
        );

        let tools = fetch_tools(transport.as_ref()).await?;
        debug!(server = %name, count = tools.len(), "discovered tools");

        Ok(Arc::new(Self {
            name,
            transport,
            kind,
            tools: std::sync::RwLock::new(Arc::new(tools)),
            closed: AtomicBool::new(false),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Which transport won the connection.
    pub fn transport_kind(&self) -> TransportKind {
        self.kind
    }

    /// Snapshot of the current catalog. The client owns the memory; callers
    /// get a shared immutable snapshot.
    pub fn catalog(&self) -> Arc<Vec<Tool>> {
        self.tools
            .read()
            .map(|tools| tools.clone())
            .unwrap_or_default()
    }

    /// Re-fetch the catalog from the server and atomically replace the
    /// internal snapshot.
    pub async fn refresh(&self) -> Result<Arc<Vec<Tool>>, ClientError> {
        self.ensure_open()?;
        let tools = Arc::new(fetch_tools(self.transport.as_ref()).await?);
        if let Ok(mut slot) = self.tools.write() {
            *slot = tools.clone();
        }
        Ok(tools)
    }

    /// Invoke a tool. Transport failures surface as errors; a well-formed
    /// downstream error response comes back as an `Ok` result with
    /// `is_error` set, so callers can tell the two apart.
    pub async fn call(
        &self,
        tool_name: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> Result<CallToolResult, ClientError> {
        self.ensure_open()?;
        let params = json!({ "name": tool_name, "arguments": arguments });

        let request = self.transport.request(METHOD_CALL_TOOL, params);
        let result = tokio::select! {
            result = request => result?,
            () = cancel.cancelled() => return Err(ClientError::Cancelled),
        };

        serde_json::from_value(result).map_err(Into::into)
    }

    /// Close the connection. Idempotent; calls after the first close fail
    /// fast with [`ClientError::Closed`].
    pub async fn close(&self) -> Result<(), ClientError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.transport.close().await
    }

    fn ensure_open(&self) -> Result<(), ClientError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::Closed);
        }
        Ok(())
    }
}

/// Adapt raw transport notifications into the catalog-changed callback.
fn notification_adapter(
    server_name: String,
    on_catalog_changed: CatalogChangedHandler,
) -> NotificationHandler {
    Arc::new(move |method: &str| {
        if method == METHOD_TOOLS_CHANGED {
            on_catalog_changed(&server_name);
        } else {
            debug!(server = %server_name, method, "ignoring notification");
        }
    })
}

/// Run the MCP initialize handshake.
async fn handshake(transport: &dyn Transport) -> Result<InitializeResult, ClientError> {
    let params = json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": "plait",
            "version": env!("CARGO_PKG_VERSION"),
        },
    });
    let result = transport.request(METHOD_INITIALIZE, params).await?;
    let init: InitializeResult = serde_json::from_value(result)?;
    transport
        .notify(METHOD_INITIALIZED, Value::Null)
        .await?;
    Ok(init)
}

/// Fetch the full catalog, following pagination, with reserved-name
/// filtering applied before the result is visible anywhere.
async fn fetch_tools(transport: &dyn Transport) -> Result<Vec<Tool>, ClientError> {
    let mut tools = Vec::new();
    let mut cursor: Option<String> = None;

    for _ in 0..MAX_LIST_PAGES {
        let params = match &cursor {
            Some(cursor) => json!({ "cursor": cursor }),
            None => Value::Null,
        };
        let result = transport.request(METHOD_LIST_TOOLS, params).await?;
        let page: ListToolsResult = serde_json::from_value(result)?;
        tools.extend(page.tools);
        cursor = page.next_cursor;
        if cursor.is_none() {
            break;
        }
    }

    tools.retain(|tool| !is_reserved_tool_name(&tool.name));
    Ok(tools)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_names_are_detected() {
        assert!(is_reserved_tool_name("export"));
        assert!(is_reserved_tool_name("delete"));
        // "Export" camelCases to "export".
        assert!(is_reserved_tool_name("Export"));
    }

    #[test]
    fn ordinary_names_pass() {
        assert!(!is_reserved_tool_name("read_text_file"));
        // Separators produce an uppercase letter, never a reserved word.
        assert!(!is_reserved_tool_name("export_data"));
    }

    #[test]
    fn reserved_list_is_sorted_for_stability() {
        let mut sorted = RESERVED_WORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, RESERVED_WORDS);
    }
}
