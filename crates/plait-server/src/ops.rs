//! The three public operations: `list_directory`, `read_file` and
//! `execute_code`.

use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use plait_sandbox::{
    host::session_callbacks, sourcemap::map_stack_trace, Bundler, Executor, SandboxEngine,
    SandboxError,
};
use plait_session::{vfs, SessionError, SessionManager};

/// Errors surfaced by the public operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

/// `list_directory` parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ListDirectoryParams {
    pub path: String,
    #[serde(rename = "withDescriptions", default)]
    pub with_descriptions: bool,
}

/// `read_file` parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ReadFileParams {
    pub path: String,
}

/// `execute_code` parameters. The code must define an `exec()` function.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteCodeParams {
    pub code: String,
}

/// The public-operations layer: resolves sessions and drives the bundle →
/// sandbox pipeline.
pub struct Gateway {
    sessions: Arc<SessionManager>,
    bundler: Arc<dyn Bundler>,
    engine: Arc<dyn SandboxEngine>,
    timeout: std::time::Duration,
}

impl Gateway {
    pub fn new(
        sessions: Arc<SessionManager>,
        bundler: Arc<dyn Bundler>,
        engine: Arc<dyn SandboxEngine>,
    ) -> Self {
        let timeout = sessions.config().server_timeout();
        Self {
            sessions,
            bundler,
            engine,
            timeout,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// List a virtual directory for the agent.
    pub async fn list_directory(
        &self,
        session_id: &str,
        params: ListDirectoryParams,
    ) -> Result<String, GatewayError> {
        let session = self.sessions.get_or_create(session_id).await?;
        Ok(vfs::list_directory(&session, &params.path, params.with_descriptions).await?)
    }

    /// Read a virtual file for the agent.
    pub async fn read_file(
        &self,
        session_id: &str,
        params: ReadFileParams,
    ) -> Result<String, GatewayError> {
        let session = self.sessions.get_or_create(session_id).await?;
        Ok(vfs::read_file(&session, &params.path).await?)
    }

    /// Bundle the submitted code against the session's generated tree and
    /// run it in the sandbox. Success returns the user's stringified
    /// return value; a throw comes back with its stack mapped to the
    /// user's source.
    pub async fn execute_code(
        &self,
        session_id: &str,
        params: ExecuteCodeParams,
        cancel: &CancellationToken,
    ) -> Result<String, GatewayError> {
        let session = self.sessions.get_or_create(session_id).await?;

        let bundle = self
            .bundler
            .bundle(session.workspace_root(), &params.code)
            .await?;
        debug!(
            session = %session_id,
            bundle_bytes = bundle.js.len(),
            "bundled user code"
        );

        let callbacks = session_callbacks(
            session.hub().clone(),
            session.sandbox_fs().clone(),
            tokio::runtime::Handle::current(),
            cancel.clone(),
        );

        let executor = Executor::new(self.engine.clone(), self.timeout);
        let outcome = executor.run(bundle.js, callbacks, cancel).await?;

        if let Some(message) = outcome.error_message() {
            let stack = outcome.stack.as_deref().and_then(|stack| {
                match map_stack_trace(&bundle.source_map, stack) {
                    Ok(mapped) => Some(mapped),
                    Err(e) => {
                        warn!(session = %session_id, "failed to map stack trace: {e}");
                        Some(stack.to_string())
                    }
                }
            });
            return Err(SandboxError::Execution {
                message: message.to_string(),
                stack,
            }
            .into());
        }

        Ok(outcome.result.unwrap_or_default())
    }
}
