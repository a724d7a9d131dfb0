//! Gateway configuration: the `mcpServers` map plus server and sandbox
//! settings, with `${VAR}` expansion and environment overrides applied at
//! load time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Transport tag for a downstream server connection.
///
/// The tag may be omitted in config; `command` implies [`TransportKind::Stdio`],
/// while a bare `url` is left untagged so the client can attempt
/// streamable-http first and fall back to SSE on connect failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Child process speaking newline-delimited JSON-RPC on stdio.
    Stdio,
    /// Streamable HTTP endpoint.
    Http,
    /// HTTP + server-sent-events endpoint.
    Sse,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
            Self::Sse => write!(f, "sse"),
        }
    }
}

/// Configuration for a single downstream MCP server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Optional transport tag; inferred when omitted.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<TransportKind>,

    /// Command to run (stdio transport).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Arguments for the command.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Working directory for the command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    /// Environment overlay for the command.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// Endpoint URL (http/sse transports).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// HTTP headers, typically for authentication.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

impl McpServerConfig {
    /// Build a stdio server config.
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            kind: Some(TransportKind::Stdio),
            command: Some(command.into()),
            args,
            ..Self::default()
        }
    }

    /// Build an untagged URL server config (http with SSE fallback).
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Add an HTTP header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// HTTP server settings used by the outer transport and for the
/// execute-code deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Execute-code deadline in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_port() -> u16 {
    3000
}

fn default_timeout() -> u64 {
    30
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            timeout: default_timeout(),
        }
    }
}

/// Sandbox engine and storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxSettings {
    /// Path to the WASM sandbox plugin.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wasm_path: Option<String>,

    /// Sandbox storage directories. Empty means the default read-write
    /// `workspace` directory.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub directories: Vec<SandboxDirSettings>,
}

/// Quotas for one sandbox storage directory. The physical root is assigned
/// per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxDirSettings {
    pub name: String,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default = "default_max_total_bytes")]
    pub max_total_bytes: u64,
}

fn default_max_file_size() -> u64 {
    1024 * 1024
}

fn default_max_files() -> usize {
    256
}

fn default_max_total_bytes() -> u64 {
    32 * 1024 * 1024
}

/// Root configuration handed to the session manager.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<SandboxSettings>,

    #[serde(rename = "mcpServers")]
    pub mcp_servers: HashMap<String, McpServerConfig>,
}

/// Controls how [`Config::load_with_options`] locates and processes the file.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit path to the config file; search paths are ignored when set.
    pub config_path: Option<PathBuf>,
    /// Locations to probe when no explicit path is given.
    pub search_paths: Vec<PathBuf>,
    /// Apply `PLAIT_SERVER_*` environment overrides.
    pub allow_env_overrides: bool,
}

impl Config {
    /// Common config file locations, most specific first.
    pub fn default_search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("plait.json")];
        if let Some(home) = std::env::var_os("HOME") {
            let home = PathBuf::from(home);
            paths.push(home.join(".config/plait/config.json"));
            paths.push(home.join(".plait/config.json"));
        }
        paths.push(PathBuf::from("/etc/plait/config.json"));
        paths
    }

    /// Load configuration from an explicit path or the default search paths,
    /// with environment overrides enabled.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_with_options(LoadOptions {
            config_path,
            search_paths: Self::default_search_paths(),
            allow_env_overrides: true,
        })
    }

    /// Load configuration with full control over resolution and overrides.
    pub fn load_with_options(opts: LoadOptions) -> Result<Self, ConfigError> {
        let path = resolve_config_path(&opts)?;
        let data = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&data, opts.allow_env_overrides)
    }

    /// Parse configuration from a JSON string and run the full load
    /// pipeline: `${VAR}` expansion, optional env overrides, transport
    /// inference and validation.
    pub fn from_json(json: &str, allow_env_overrides: bool) -> Result<Self, ConfigError> {
        let mut config: Config = serde_json::from_str(json)?;
        config.expand_env_vars();
        if allow_env_overrides {
            config.apply_env_overrides();
        }
        config.infer_transport_kinds();
        config.validate()?;
        Ok(config)
    }

    /// Configured server port, falling back to the default.
    pub fn server_port(&self) -> u16 {
        self.server.as_ref().map_or_else(default_port, |s| s.port)
    }

    /// Execute-code deadline, falling back to the default.
    pub fn server_timeout(&self) -> std::time::Duration {
        let secs = self
            .server
            .as_ref()
            .map_or_else(default_timeout, |s| s.timeout);
        std::time::Duration::from_secs(secs)
    }

    /// Configured WASM plugin path, if any.
    pub fn wasm_path(&self) -> Option<&str> {
        self.sandbox.as_ref().and_then(|s| s.wasm_path.as_deref())
    }

    /// Expand `${VAR}` references in all string fields from the process
    /// environment. Unknown variables expand to the empty string.
    fn expand_env_vars(&mut self) {
        for server in self.mcp_servers.values_mut() {
            if let Some(command) = &server.command {
                server.command = Some(expand_env(command));
            }
            if let Some(url) = &server.url {
                server.url = Some(expand_env(url));
            }
            if let Some(cwd) = &server.cwd {
                server.cwd = Some(expand_env(cwd));
            }
            for arg in &mut server.args {
                *arg = expand_env(arg);
            }
            for value in server.env.values_mut() {
                *value = expand_env(value);
            }
            for value in server.headers.values_mut() {
                *value = expand_env(value);
            }
        }
    }

    /// Apply `PLAIT_SERVER_<NAME>_<PROPERTY>` environment overrides.
    ///
    /// Recognized properties: `TYPE`, `COMMAND`, `ARGS` (comma-separated),
    /// `CWD`, `URL`, `HEADER_<KEY>`, `ENV_<KEY>`. The server name segment is
    /// lowercased; unknown servers are created on demand.
    fn apply_env_overrides(&mut self) {
        const PREFIX: &str = "PLAIT_SERVER_";

        for (key, value) in std::env::vars() {
            let Some(remainder) = key.strip_prefix(PREFIX) else {
                continue;
            };
            let Some((name, property)) = remainder.split_once('_') else {
                continue;
            };
            if name.is_empty() || property.is_empty() {
                continue;
            }

            let server = self
                .mcp_servers
                .entry(name.to_lowercase())
                .or_default();
            apply_server_override(server, property, &value);
        }
    }

    /// Infer missing transport tags from the fields that are present.
    fn infer_transport_kinds(&mut self) {
        for server in self.mcp_servers.values_mut() {
            if server.kind.is_some() {
                continue;
            }
            match (&server.command, &server.url) {
                // Ambiguous; validation reports it.
                (Some(_), Some(_)) => {}
                (Some(_), None) => server.kind = Some(TransportKind::Stdio),
                // Left untagged: the client tries http, then sse.
                (None, Some(_)) => {}
                (None, None) => {}
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.mcp_servers.is_empty() {
            return Err(ConfigError::NoServers);
        }

        for (name, server) in &self.mcp_servers {
            let has_command = server.command.is_some();
            let has_url = server.url.is_some();

            if has_command && has_url {
                return Err(ConfigError::InvalidServer {
                    name: name.clone(),
                    reason: "cannot specify both 'command' and 'url' (ambiguous transport)"
                        .to_string(),
                });
            }
            if !has_command && !has_url {
                return Err(ConfigError::InvalidServer {
                    name: name.clone(),
                    reason: "must specify either 'command' (stdio) or 'url' (http/sse)"
                        .to_string(),
                });
            }

            match server.kind {
                Some(TransportKind::Stdio) if !has_command => {
                    return Err(ConfigError::InvalidServer {
                        name: name.clone(),
                        reason: "'command' is required for stdio transport".to_string(),
                    });
                }
                Some(kind @ (TransportKind::Http | TransportKind::Sse)) if !has_url => {
                    return Err(ConfigError::InvalidServer {
                        name: name.clone(),
                        reason: format!("'url' is required for {kind} transport"),
                    });
                }
                _ => {}
            }
        }

        Ok(())
    }
}

fn resolve_config_path(opts: &LoadOptions) -> Result<PathBuf, ConfigError> {
    if let Some(path) = &opts.config_path {
        if !Path::new(path).exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        return Ok(path.clone());
    }

    for path in &opts.search_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let searched = opts
        .search_paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Err(ConfigError::NotFound(searched))
}

/// Expand `${VAR}` references from the process environment. Unterminated
/// references are passed through verbatim.
fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                if let Ok(value) = std::env::var(var) {
                    out.push_str(&value);
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

fn apply_server_override(server: &mut McpServerConfig, property: &str, value: &str) {
    match property {
        "TYPE" => {
            server.kind = match value {
                "stdio" => Some(TransportKind::Stdio),
                "http" => Some(TransportKind::Http),
                "sse" => Some(TransportKind::Sse),
                _ => server.kind,
            };
        }
        "COMMAND" => server.command = Some(value.to_string()),
        "ARGS" => {
            server.args = value.split(',').map(|a| a.trim().to_string()).collect();
        }
        "CWD" => server.cwd = Some(value.to_string()),
        "URL" => server.url = Some(value.to_string()),
        _ => {
            if let Some(header) = property.strip_prefix("HEADER_") {
                server
                    .headers
                    .insert(header.to_string(), value.to_string());
            } else if let Some(env) = property.strip_prefix("ENV_") {
                server.env.insert(env.to_string(), value.to_string());
            }
        }
    }
}
