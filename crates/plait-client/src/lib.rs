//! # plait-client
//!
//! Downstream MCP clients and the per-session client hub.
//!
//! A [`McpClient`] owns one live connection (stdio subprocess, streamable
//! HTTP, or SSE) and surfaces that server's tool catalog; the
//! [`McpClientHub`] aggregates all of a session's clients behind a lazily
//! cached grouped catalog and fans catalog-changed notifications out to the
//! session layer.
//!
//! # Caching
//!
//! Tools are fetched from each server once at connect time and cached on
//! the client. The hub's grouped map is built lazily on first use and
//! invalidated whenever any server refreshes, using a double-checked
//! snapshot pointer so readers never observe a partially built map.

mod client;
mod error;
mod hub;
pub mod protocol;
mod transport;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use client::{is_reserved_tool_name, CatalogChangedHandler, McpClient, RESERVED_WORDS};
pub use error::ClientError;
pub use hub::{GroupedTools, McpClientHub};
pub use protocol::{CallToolResult, ContentItem, Tool};
pub use transport::{HttpTransport, NotificationHandler, SseTransport, StdioTransport, Transport};
