//! # plait-server
//!
//! The external surface of the gateway: the three public operations
//! (`list_directory`, `read_file`, `execute_code`) and a thin stdio
//! JSON-RPC loop that exposes them as MCP tools.

mod ops;
mod rpc;

pub use ops::{
    ExecuteCodeParams, Gateway, GatewayError, ListDirectoryParams, ReadFileParams,
};
pub use rpc::serve_stdio;
