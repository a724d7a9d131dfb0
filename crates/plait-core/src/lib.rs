//! # plait-core
//!
//! Configuration model shared by every plait crate: the `mcpServers` map,
//! server settings, sandbox settings, loading with search paths, `${VAR}`
//! expansion and `PLAIT_SERVER_*` environment overrides.

mod config;
mod error;

pub use config::{
    Config, LoadOptions, McpServerConfig, SandboxDirSettings, SandboxSettings, ServerSettings,
    TransportKind,
};
pub use error::ConfigError;
