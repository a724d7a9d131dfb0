//! Configuration error types.

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No configuration file could be located.
    #[error("no config file found. Searched: {0}")]
    NotFound(String),

    /// The file exists but could not be read.
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON for the expected shape.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A server entry is structurally invalid.
    #[error("server {name:?}: {reason}")]
    InvalidServer { name: String, reason: String },

    /// The `mcpServers` map is empty.
    #[error("no MCP servers configured")]
    NoServers,
}
