//! Scripted engine and bundler used by executor tests and by downstream
//! crates' tests (enable the `test-util` feature).

use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::bundler::{BundleOutput, Bundler};
use crate::error::SandboxError;
use crate::executor::SandboxEngine;
use crate::host::HostCallbacks;

type EngineScript = Box<
    dyn Fn(&str, &HostCallbacks, &CancellationToken) -> Result<String, SandboxError>
        + Send
        + Sync,
>;

/// A [`SandboxEngine`] whose behavior is a closure over the bundle, the
/// callback table and the cancellation token.
pub struct ScriptedEngine {
    script: EngineScript,
}

impl ScriptedEngine {
    pub fn new(
        script: impl Fn(&str, &HostCallbacks, &CancellationToken) -> Result<String, SandboxError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
        }
    }
}

impl SandboxEngine for ScriptedEngine {
    fn execute(
        &self,
        bundle_js: &str,
        callbacks: HostCallbacks,
        cancel: &CancellationToken,
    ) -> Result<String, SandboxError> {
        (self.script)(bundle_js, &callbacks, cancel)
    }
}

type BundleScript =
    Box<dyn Fn(&Path, &str) -> Result<BundleOutput, SandboxError> + Send + Sync>;

/// A [`Bundler`] whose behavior is a closure; the default passes the user
/// code through as the "bundle" with an empty source map.
pub struct ScriptedBundler {
    script: BundleScript,
}

impl ScriptedBundler {
    pub fn new(
        script: impl Fn(&Path, &str) -> Result<BundleOutput, SandboxError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
        }
    }

    /// Pass the user code through unchanged.
    pub fn passthrough() -> Self {
        Self::new(|_, code| {
            Ok(BundleOutput {
                js: code.to_string(),
                source_map: r#"{"version":3,"sources":[],"names":[],"mappings":""}"#.to_string(),
            })
        })
    }
}

#[async_trait]
impl Bundler for ScriptedBundler {
    async fn bundle(
        &self,
        session_dir: &Path,
        user_code: &str,
    ) -> Result<BundleOutput, SandboxError> {
        (self.script)(session_dir, user_code)
    }
}
