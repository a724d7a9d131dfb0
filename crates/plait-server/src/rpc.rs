//! Minimal stdio JSON-RPC surface exposing the three operations as MCP
//! tools. One stdio connection is one session.

use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use plait_client::protocol::{JsonRpcMessage, RpcError, JSONRPC_VERSION, PROTOCOL_VERSION};

use crate::ops::{
    ExecuteCodeParams, Gateway, GatewayError, ListDirectoryParams, ReadFileParams,
};

const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

#[derive(Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

impl RpcResponse {
    fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// Serve the gateway over stdin/stdout until EOF. Requests are handled
/// concurrently; the session lives for the whole connection and is
/// destroyed on disconnect.
pub async fn serve_stdio(gateway: Arc<Gateway>) -> std::io::Result<()> {
    let session_id = uuid::Uuid::new_v4().to_string();
    info!(session = %session_id, "serving on stdio");

    let stdout = Arc::new(Mutex::new(tokio::io::stdout()));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let Ok(message) = serde_json::from_str::<JsonRpcMessage>(&line) else {
            debug!("dropping unparseable request line");
            continue;
        };

        let gateway = gateway.clone();
        let session_id = session_id.clone();
        let stdout = stdout.clone();
        tokio::spawn(async move {
            if let Some(response) = handle_message(&gateway, &session_id, message).await {
                let Ok(mut payload) = serde_json::to_vec(&response) else {
                    return;
                };
                payload.push(b'\n');
                let mut stdout = stdout.lock().await;
                let _ = stdout.write_all(&payload).await;
                let _ = stdout.flush().await;
            }
        });
    }

    info!(session = %session_id, "stdio connection closed");
    gateway.sessions().remove(&session_id).await;
    Ok(())
}

/// Handle one inbound message; `None` means nothing is written back
/// (notifications).
pub(crate) async fn handle_message(
    gateway: &Arc<Gateway>,
    session_id: &str,
    message: JsonRpcMessage,
) -> Option<RpcResponse> {
    let method = message.method.clone()?;
    let Some(id) = message.id.clone() else {
        // Notifications (initialized, cancelled, ...) need no reply.
        debug!(method, "notification received");
        return None;
    };
    let params = message.params.unwrap_or(Value::Null);

    let response = match method.as_str() {
        "initialize" => RpcResponse::result(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": "plait",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        ),
        "ping" => RpcResponse::result(id, json!({})),
        "tools/list" => RpcResponse::result(id, json!({ "tools": tool_descriptors() })),
        "tools/call" => handle_tool_call(gateway, session_id, id, params).await,
        _ => RpcResponse::error(id, METHOD_NOT_FOUND, format!("unknown method: {method}")),
    };
    Some(response)
}

async fn handle_tool_call(
    gateway: &Arc<Gateway>,
    session_id: &str,
    id: Value,
    params: Value,
) -> RpcResponse {
    let Some(name) = params.get("name").and_then(Value::as_str) else {
        return RpcResponse::error(id, INVALID_PARAMS, "missing tool name");
    };
    let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

    let outcome: Result<String, GatewayError> = match name {
        "list_directory" => match serde_json::from_value::<ListDirectoryParams>(arguments) {
            Ok(params) => gateway.list_directory(session_id, params).await,
            Err(e) => return RpcResponse::error(id, INVALID_PARAMS, e.to_string()),
        },
        "read_file" => match serde_json::from_value::<ReadFileParams>(arguments) {
            Ok(params) => gateway.read_file(session_id, params).await,
            Err(e) => return RpcResponse::error(id, INVALID_PARAMS, e.to_string()),
        },
        "execute_code" => match serde_json::from_value::<ExecuteCodeParams>(arguments) {
            Ok(params) => {
                // The per-request token is the seam for protocol-level
                // cancellation.
                let cancel = CancellationToken::new();
                gateway.execute_code(session_id, params, &cancel).await
            }
            Err(e) => return RpcResponse::error(id, INVALID_PARAMS, e.to_string()),
        },
        other => {
            return RpcResponse::error(id, INVALID_PARAMS, format!("unknown tool: {other}"))
        }
    };

    let result = match outcome {
        Ok(text) => json!({
            "content": [{ "type": "text", "text": text }],
            "isError": false,
        }),
        Err(e) => json!({
            "content": [{ "type": "text", "text": format_error(&e) }],
            "isError": true,
        }),
    };
    RpcResponse::result(id, result)
}

fn format_error(error: &GatewayError) -> String {
    use plait_sandbox::SandboxError;

    // Thrown user code carries its mapped stack below the message.
    if let GatewayError::Sandbox(SandboxError::Execution {
        message,
        stack: Some(stack),
    }) = error
    {
        return format!("{message}\n{stack}");
    }
    error.to_string()
}

fn tool_descriptors() -> Vec<Value> {
    vec![
        json!({
            "name": "list_directory",
            "description": "List a directory of the virtual filesystem. Generated tool \
                modules live under /servers/<server>/; sandbox storage under /workspace/.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Directory path, e.g. /servers" },
                    "withDescriptions": { "type": "boolean", "description": "Include tool descriptions" }
                },
                "required": ["path"]
            },
        }),
        json!({
            "name": "read_file",
            "description": "Read a file from the virtual filesystem, e.g. a generated \
                tool module under /servers/<server>/<tool>.ts.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "File path" }
                },
                "required": ["path"]
            },
        }),
        json!({
            "name": "execute_code",
            "description": "Execute TypeScript in the sandbox. The code must define an \
                exec() function; import generated modules from ./servers/<server> and the \
                workspace API from ./builtin/@plait/fs.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "code": { "type": "string", "description": "TypeScript source defining exec()" }
                },
                "required": ["code"]
            },
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use plait_sandbox::testing::{ScriptedBundler, ScriptedEngine};
    use plait_session::SessionManager;

    fn bare_gateway() -> Arc<Gateway> {
        let sessions = SessionManager::new(plait_core::Config::default());
        Arc::new(Gateway::new(
            sessions,
            Arc::new(ScriptedBundler::passthrough()),
            Arc::new(ScriptedEngine::new(|_, _, _| Ok(String::new()))),
        ))
    }

    fn request(method: &str, id: i64) -> JsonRpcMessage {
        serde_json::from_value(json!({ "jsonrpc": "2.0", "id": id, "method": method }))
            .expect("valid request")
    }

    #[tokio::test]
    async fn initialize_reports_the_server_identity() {
        let response = handle_message(&bare_gateway(), "s", request("initialize", 1))
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], "plait");
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn tools_list_exposes_the_three_operations() {
        let response = handle_message(&bare_gateway(), "s", request("tools/list", 2))
            .await
            .unwrap();
        let tools = response.result.unwrap()["tools"].clone();
        let names: Vec<&str> = tools
            .as_array()
            .unwrap()
            .iter()
            .map(|tool| tool["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["list_directory", "read_file", "execute_code"]);
    }

    #[tokio::test]
    async fn unknown_methods_error() {
        let response = handle_message(&bare_gateway(), "s", request("resources/list", 3))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn notifications_get_no_reply() {
        let notification: JsonRpcMessage = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        }))
        .unwrap();
        assert!(handle_message(&bare_gateway(), "s", notification)
            .await
            .is_none());
    }
}
