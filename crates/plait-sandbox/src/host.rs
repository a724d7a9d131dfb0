//! Host callbacks: the single privileged escape from the sandbox.
//!
//! Each callback is a pure bytes-in/bytes-out function closing over the
//! session-scoped client hub and sandbox filesystem. The executor binds
//! this table before running user code; nothing else crosses the boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use plait_client::McpClientHub;

use crate::fs::SandboxFs;

/// Name of the tool-invocation callback.
pub const CALL_TOOL: &str = "callTool";
/// Names of the workspace filesystem callbacks.
pub const WORKSPACE_READ_FILE: &str = "workspace_readFile";
pub const WORKSPACE_WRITE_FILE: &str = "workspace_writeFile";
pub const WORKSPACE_LIST_FILES: &str = "workspace_listFiles";
pub const WORKSPACE_DELETE_FILE: &str = "workspace_deleteFile";

/// All registered host callback names, in registration order.
pub const HOST_FUNCTION_NAMES: &[&str] = &[
    CALL_TOOL,
    WORKSPACE_READ_FILE,
    WORKSPACE_WRITE_FILE,
    WORKSPACE_LIST_FILES,
    WORKSPACE_DELETE_FILE,
];

type HostFn = Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;

/// A `callTool` request from sandboxed code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    #[serde(rename = "serverName")]
    pub server_name: String,
    #[serde(rename = "toolName")]
    pub tool_name: String,
    #[serde(default)]
    pub args: Value,
}

/// A `callTool` response: exactly one of `result` / `error` is non-empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCallResponse {
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub error: String,
}

impl ToolCallResponse {
    fn ok(result: String) -> Self {
        Self {
            result,
            error: String::new(),
        }
    }

    fn err(error: impl std::fmt::Display) -> Self {
        Self {
            result: String::new(),
            error: error.to_string(),
        }
    }
}

/// The callback vtable handed to a sandbox engine.
#[derive(Clone, Default)]
pub struct HostCallbacks {
    funcs: HashMap<&'static str, HostFn>,
}

impl HostCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn register(
        mut self,
        name: &'static str,
        func: impl Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    ) -> Self {
        self.funcs.insert(name, Arc::new(func));
        self
    }

    /// Invoke a callback by name. Unknown names come back as an error
    /// payload so the sandbox side always receives valid JSON.
    pub fn dispatch(&self, name: &str, input: &[u8]) -> Vec<u8> {
        match self.funcs.get(name) {
            Some(func) => func(input),
            None => serde_json::to_vec(&ToolCallResponse::err(format!(
                "unknown host function: {name}"
            )))
            .unwrap_or_default(),
        }
    }
}

/// Build the callback table for one execution, closing over the session's
/// hub and sandbox filesystem.
///
/// The callbacks run synchronously on the engine's blocking thread; tool
/// calls re-enter the async hub through the provided runtime handle.
pub fn session_callbacks(
    hub: Arc<McpClientHub>,
    fs: Arc<SandboxFs>,
    runtime: tokio::runtime::Handle,
    cancel: CancellationToken,
) -> HostCallbacks {
    let call_tool = {
        let hub = hub.clone();
        move |input: &[u8]| -> Vec<u8> {
            let response = match serde_json::from_slice::<ToolCallRequest>(input) {
                Ok(request) => {
                    debug!(
                        server = %request.server_name,
                        tool = %request.tool_name,
                        "sandbox tool call"
                    );
                    let result = runtime.block_on(hub.call(
                        &request.server_name,
                        &request.tool_name,
                        request.args,
                        &cancel,
                    ));
                    match result {
                        // A well-formed downstream error response keeps its
                        // tool origin tag; transport failures carry theirs
                        // through the ClientError display.
                        Ok(outcome) if outcome.is_error => {
                            ToolCallResponse::err(format!("tool error: {}", outcome.text()))
                        }
                        Ok(outcome) => ToolCallResponse::ok(outcome.result_payload()),
                        Err(e) => ToolCallResponse::err(e),
                    }
                }
                Err(_) => ToolCallResponse::err("invalid tool call format"),
            };
            serde_json::to_vec(&response).unwrap_or_default()
        }
    };

    let read_fs = fs.clone();
    let write_fs = fs.clone();
    let list_fs = fs.clone();
    let delete_fs = fs;

    HostCallbacks::new()
        .register(CALL_TOOL, call_tool)
        .register(WORKSPACE_READ_FILE, move |input| {
            read_fs.handle_read_file(input)
        })
        .register(WORKSPACE_WRITE_FILE, move |input| {
            write_fs.handle_write_file(input)
        })
        .register(WORKSPACE_LIST_FILES, move |input| {
            list_fs.handle_list_files(input)
        })
        .register(WORKSPACE_DELETE_FILE, move |input| {
            delete_fs.handle_delete_file(input)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{DirectoryQuota, FileResponse, SandboxFs};
    use plait_client::testing::{mock_client, text_tool};
    use plait_client::{CallToolResult, ClientError, ContentItem, McpClientHub};
    use serde_json::json;

    fn workspace_fs(dir: &tempfile::TempDir) -> Arc<SandboxFs> {
        Arc::new(
            SandboxFs::new(vec![DirectoryQuota {
                name: "workspace".to_string(),
                root: dir.path().join("data/workspace"),
                read_only: false,
                max_file_size: 1024,
                max_files: 2,
                max_total_bytes: 4096,
            }])
            .unwrap(),
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn call_tool_bridges_into_the_hub() {
        let hub = McpClientHub::new();
        let (client, transport) = mock_client("fs", vec![text_tool("read_text_file")]).await;
        transport.set_call_responder(|_, _| {
            Ok(CallToolResult {
                content: vec![ContentItem::Text {
                    text: "\"hello\"".to_string(),
                }],
                ..CallToolResult::default()
            })
        });
        hub.register_client(client).await;

        let dir = tempfile::tempdir().unwrap();
        let callbacks = session_callbacks(
            hub,
            workspace_fs(&dir),
            tokio::runtime::Handle::current(),
            CancellationToken::new(),
        );

        let request = serde_json::to_vec(&json!({
            "serverName": "fs",
            "toolName": "read_text_file",
            "args": { "path": "/tmp/x" }
        }))
        .unwrap();

        let response = tokio::task::spawn_blocking(move || callbacks.dispatch(CALL_TOOL, &request))
            .await
            .unwrap();
        let response: ToolCallResponse = serde_json::from_slice(&response).unwrap();
        assert_eq!(response.result, "\"hello\"");
        assert!(response.error.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn tool_reported_errors_keep_their_origin_tag() {
        let hub = McpClientHub::new();
        let (client, transport) = mock_client("fs", vec![text_tool("read_text_file")]).await;
        transport.set_call_responder(|_, _| {
            Ok(CallToolResult {
                content: vec![ContentItem::Text {
                    text: "no such file".to_string(),
                }],
                is_error: true,
                ..CallToolResult::default()
            })
        });
        hub.register_client(client).await;

        let dir = tempfile::tempdir().unwrap();
        let callbacks = session_callbacks(
            hub,
            workspace_fs(&dir),
            tokio::runtime::Handle::current(),
            CancellationToken::new(),
        );

        let request = serde_json::to_vec(&json!({
            "serverName": "fs",
            "toolName": "read_text_file",
            "args": {}
        }))
        .unwrap();
        let response = tokio::task::spawn_blocking(move || callbacks.dispatch(CALL_TOOL, &request))
            .await
            .unwrap();
        let response: ToolCallResponse = serde_json::from_slice(&response).unwrap();
        assert!(response.result.is_empty());
        assert_eq!(response.error, "tool error: no such file");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn transport_errors_are_distinguishable() {
        let hub = McpClientHub::new();
        let (client, transport) = mock_client("fs", vec![text_tool("read_text_file")]).await;
        transport
            .set_call_responder(|_, _| Err(ClientError::Transport("pipe broke".to_string())));
        hub.register_client(client).await;

        let dir = tempfile::tempdir().unwrap();
        let callbacks = session_callbacks(
            hub,
            workspace_fs(&dir),
            tokio::runtime::Handle::current(),
            CancellationToken::new(),
        );

        let request = serde_json::to_vec(&json!({
            "serverName": "fs",
            "toolName": "read_text_file",
            "args": {}
        }))
        .unwrap();
        let response = tokio::task::spawn_blocking(move || callbacks.dispatch(CALL_TOOL, &request))
            .await
            .unwrap();
        let response: ToolCallResponse = serde_json::from_slice(&response).unwrap();
        assert!(response.error.starts_with("transport error:"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn workspace_callbacks_enforce_quotas_inside_the_sandbox() {
        let hub = McpClientHub::new();
        let (client, _transport) = mock_client("fs", vec![text_tool("read_text_file")]).await;
        hub.register_client(client).await;

        let dir = tempfile::tempdir().unwrap();
        let callbacks = session_callbacks(
            hub,
            workspace_fs(&dir),
            tokio::runtime::Handle::current(),
            CancellationToken::new(),
        );

        let write = |path: &str| {
            let request = serde_json::to_vec(&json!({ "path": path, "content": "x" })).unwrap();
            let response = callbacks.dispatch(WORKSPACE_WRITE_FILE, &request);
            serde_json::from_slice::<FileResponse>(&response).unwrap()
        };

        assert!(write("./workspace/a.txt").success);
        assert!(write("./workspace/b.txt").success);
        let third = write("./workspace/c.txt");
        assert!(!third.success);
        assert!(third.error.unwrap().contains("quota exceeded"));

        let request = serde_json::to_vec(&json!({ "path": "./workspace" })).unwrap();
        let response: FileResponse =
            serde_json::from_slice(&callbacks.dispatch(WORKSPACE_LIST_FILES, &request)).unwrap();
        assert_eq!(
            response.files.unwrap(),
            vec!["a.txt".to_string(), "b.txt".to_string()]
        );
    }

    #[test]
    fn unknown_callback_names_yield_an_error_payload() {
        let callbacks = HostCallbacks::new();
        let response: ToolCallResponse =
            serde_json::from_slice(&callbacks.dispatch("nope", b"{}")).unwrap();
        assert!(response.error.contains("unknown host function"));
    }
}
