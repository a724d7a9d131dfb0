//! Sandbox error types.

use thiserror::Error;

/// Errors raised by the sandbox filesystem, bundler and executor.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// First path segment names no configured directory.
    #[error("unknown directory {name:?}, available: {available:?}")]
    UnknownDirectory { name: String, available: Vec<String> },

    /// Traversal attempt or otherwise malformed path.
    #[error("invalid path: {0}")]
    PathInvalid(String),

    /// Mutation attempted on a read-only directory.
    #[error("directory {0:?} is read-only")]
    ReadOnly(String),

    /// No such file or directory inside a sandbox directory.
    #[error("file not found: {0}")]
    NotFound(String),

    /// A write would breach one of the directory's quotas.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Underlying filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The bundler produced no artifact; carries its diagnostics verbatim.
    #[error("bundling failed: {0}")]
    Bundling(String),

    /// The sandbox engine itself failed (load, trap, malformed outcome).
    #[error("sandbox engine error: {0}")]
    Engine(String),

    /// The wall-clock deadline elapsed.
    #[error("execution timed out")]
    Timeout,

    /// The inbound operation was cancelled.
    #[error("execution cancelled")]
    Cancelled,

    /// User code threw; the stack is already mapped to original positions
    /// when a source map was available.
    #[error("execution error: {message}")]
    Execution {
        message: String,
        stack: Option<String>,
    },

    /// A payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SandboxError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
