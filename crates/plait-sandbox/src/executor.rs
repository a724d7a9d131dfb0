//! Sandbox execution: the engine seam plus the async wrapper that enforces
//! the wall-clock deadline and inbound cancellation.

use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::SandboxError;
use crate::host::HostCallbacks;

/// Name of the entry function the bundle's runtime exports.
pub const ENTRY_FUNCTION: &str = "executeCode";

/// The outcome envelope the sandbox returns: the user's stringified return
/// value, or an error message plus raw stack.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExecutionOutcome {
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub stack: Option<String>,
}

impl ExecutionOutcome {
    /// The error message, when user code threw.
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref().filter(|message| !message.is_empty())
    }
}

/// An isolated evaluator: loads a bundle, exposes the registered host
/// callbacks as its only escape, runs the entry function to completion.
///
/// Implementations are synchronous; [`Executor`] always drives them on a
/// blocking thread. Cancellation arrives through the token and must
/// terminate the run promptly.
pub trait SandboxEngine: Send + Sync {
    fn execute(
        &self,
        bundle_js: &str,
        callbacks: HostCallbacks,
        cancel: &CancellationToken,
    ) -> Result<String, SandboxError>;
}

/// Runs bundles against an engine with a wall-clock deadline.
pub struct Executor {
    engine: Arc<dyn SandboxEngine>,
    timeout: std::time::Duration,
}

impl Executor {
    pub fn new(engine: Arc<dyn SandboxEngine>, timeout: std::time::Duration) -> Self {
        Self { engine, timeout }
    }

    /// Execute the bundle. The deadline and the caller's cancellation token
    /// are enforced here, uniformly for every engine.
    pub async fn run(
        &self,
        bundle_js: String,
        callbacks: HostCallbacks,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, SandboxError> {
        let engine = self.engine.clone();
        let engine_token = cancel.child_token();
        let guard = engine_token.clone();

        let mut task = tokio::task::spawn_blocking(move || {
            engine.execute(&bundle_js, callbacks, &guard)
        });

        tokio::select! {
            result = &mut task => {
                let raw = result
                    .map_err(|e| SandboxError::Engine(format!("sandbox task failed: {e}")))??;
                let outcome: ExecutionOutcome = serde_json::from_str(&raw)
                    .map_err(|e| SandboxError::Engine(format!("malformed sandbox outcome: {e}")))?;
                Ok(outcome)
            }
            () = tokio::time::sleep(self.timeout) => {
                engine_token.cancel();
                Err(SandboxError::Timeout)
            }
            () = cancel.cancelled() => {
                // The child token is cancelled transitively; the engine
                // terminates on its own time.
                Err(SandboxError::Cancelled)
            }
        }
    }
}
