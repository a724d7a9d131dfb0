//! Mock transport used by hub tests and by downstream crates' tests
//! (enable the `test-util` feature).

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use plait_core::TransportKind;

use crate::client::McpClient;
use crate::error::ClientError;
use crate::protocol::{
    CallToolResult, ContentItem, Tool, METHOD_CALL_TOOL, METHOD_INITIALIZE, METHOD_LIST_TOOLS,
};
use crate::transport::Transport;

type CallResponder =
    Box<dyn Fn(&str, &Value) -> Result<CallToolResult, ClientError> + Send + Sync>;

/// A scripted in-memory transport: answers the handshake, serves a mutable
/// tool list, and routes tool calls to an optional responder.
#[derive(Default)]
pub struct MockTransport {
    tools: Mutex<Vec<Tool>>,
    calls: Mutex<Vec<String>>,
    responder: Mutex<Option<CallResponder>>,
}

impl MockTransport {
    pub fn new(tools: Vec<Tool>) -> Arc<Self> {
        Arc::new(Self {
            tools: Mutex::new(tools),
            calls: Mutex::new(Vec::new()),
            responder: Mutex::new(None),
        })
    }

    /// Replace the advertised tool list; visible after the next refresh.
    pub fn set_tools(&self, tools: Vec<Tool>) {
        if let Ok(mut slot) = self.tools.lock() {
            *slot = tools;
        }
    }

    /// Script the `tools/call` behavior.
    pub fn set_call_responder(
        &self,
        responder: impl Fn(&str, &Value) -> Result<CallToolResult, ClientError>
            + Send
            + Sync
            + 'static,
    ) {
        if let Ok(mut slot) = self.responder.lock() {
            *slot = Some(Box::new(responder));
        }
    }

    /// Names of the tools called so far, in order.
    pub fn tool_calls(&self) -> Vec<String> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        match method {
            METHOD_INITIALIZE => Ok(json!({
                "protocolVersion": crate::protocol::PROTOCOL_VERSION,
                "capabilities": {},
                "serverInfo": { "name": "mock", "version": "0.0.0" },
            })),
            METHOD_LIST_TOOLS => {
                let tools = self.tools.lock().map(|t| t.clone()).unwrap_or_default();
                Ok(json!({ "tools": tools }))
            }
            METHOD_CALL_TOOL => {
                let name = params
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
                if let Ok(mut calls) = self.calls.lock() {
                    calls.push(name.clone());
                }

                let result = match self.responder.lock().ok().as_ref().and_then(|r| r.as_ref())
                {
                    Some(responder) => responder(&name, &arguments)?,
                    None => CallToolResult {
                        content: vec![ContentItem::Text {
                            text: "ok".to_string(),
                        }],
                        ..CallToolResult::default()
                    },
                };
                serde_json::to_value(result).map_err(Into::into)
            }
            other => Err(ClientError::Transport(format!(
                "mock transport has no handler for {other:?}"
            ))),
        }
    }

    async fn notify(&self, _method: &str, _params: Value) -> Result<(), ClientError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), ClientError> {
        Ok(())
    }
}

/// A tool named `name` with a minimal object input schema and no output
/// schema.
pub fn text_tool(name: &str) -> Tool {
    Tool {
        name: name.to_string(),
        description: None,
        input_schema: Some(json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": ["path"],
        })),
        output_schema: None,
    }
}

/// Build a connected client over a [`MockTransport`] seeded with `tools`.
pub async fn mock_client(name: &str, tools: Vec<Tool>) -> (Arc<McpClient>, Arc<MockTransport>) {
    let transport = MockTransport::new(tools);
    let client = McpClient::connect_with(
        name.to_string(),
        transport.clone() as Arc<dyn Transport>,
        TransportKind::Http,
    )
    .await
    .expect("mock handshake cannot fail");
    (client, transport)
}
