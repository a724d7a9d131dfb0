//! Session error types.

use thiserror::Error;

/// Errors raised by session creation, regeneration and the virtual
/// filesystem.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Connecting or talking to downstream servers failed.
    #[error(transparent)]
    Client(#[from] plait_client::ClientError),

    /// Module generation failed.
    #[error(transparent)]
    Codegen(#[from] plait_codegen::CodegenError),

    /// Sandbox filesystem failure surfaced through the virtual filesystem.
    #[error(transparent)]
    Sandbox(#[from] plait_sandbox::SandboxError),

    /// Workspace or generated-tree I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A virtual-filesystem path matched nothing; carries the alternatives
    /// that do exist at that level.
    #[error("path {path:?} not found{}", format_available(available))]
    NotFound {
        path: String,
        available: Vec<String>,
    },
}

fn format_available(available: &[String]) -> String {
    if available.is_empty() {
        String::new()
    } else {
        format!(", available: {available:?}")
    }
}
