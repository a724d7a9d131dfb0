//! Bundler adapter: workspace + user entry file in, single JS artifact and
//! source map out.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::SandboxError;

/// The embedded bundler configuration written into every session
/// workspace.
pub const RSPACK_CONFIG: &str = include_str!("rspack.config.ts");

/// File name of the bundler configuration inside a session workspace.
pub const RSPACK_CONFIG_FILE: &str = "rspack.config.ts";

/// A produced bundle.
#[derive(Debug, Clone)]
pub struct BundleOutput {
    pub js: String,
    pub source_map: String,
}

/// Produces an executable artifact from the session workspace and a block
/// of user code.
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Bundle `user_code` against the generated trees under `session_dir`.
    /// The adapter appends the `exec()` entry invocation.
    async fn bundle(
        &self,
        session_dir: &Path,
        user_code: &str,
    ) -> Result<BundleOutput, SandboxError>;
}

/// Shells out to rspack, either directly or through `npx -y @rspack/cli`.
pub struct RspackBundler {
    program: PathBuf,
    via_npx: bool,
}

impl RspackBundler {
    /// Locate the bundler once at startup: `rspack` on PATH, falling back
    /// to `npx`.
    pub fn locate() -> Result<Self, SandboxError> {
        if let Some(program) = find_in_path("rspack") {
            return Ok(Self {
                program,
                via_npx: false,
            });
        }
        if let Some(program) = find_in_path("npx") {
            return Ok(Self {
                program,
                via_npx: true,
            });
        }
        Err(SandboxError::Bundling(
            "rspack executable not found; install with: npm install -g @rspack/cli @rspack/core"
                .to_string(),
        ))
    }
}

#[async_trait]
impl Bundler for RspackBundler {
    async fn bundle(
        &self,
        session_dir: &Path,
        user_code: &str,
    ) -> Result<BundleOutput, SandboxError> {
        let work_id = uuid::Uuid::new_v4().simple().to_string();
        let work_dir = session_dir.join("work").join(work_id);
        std::fs::create_dir_all(&work_dir)?;

        let result = self.bundle_in(session_dir, &work_dir, user_code).await;
        if let Err(e) = std::fs::remove_dir_all(&work_dir) {
            debug!("failed to remove bundle work dir: {e}");
        }
        result
    }
}

impl RspackBundler {
    async fn bundle_in(
        &self,
        session_dir: &Path,
        work_dir: &Path,
        user_code: &str,
    ) -> Result<BundleOutput, SandboxError> {
        // The generated trees are shared session-wide; each request links
        // them into its own work directory.
        link_dir(&session_dir.join("servers"), &work_dir.join("servers"))?;
        link_dir(&session_dir.join("builtin"), &work_dir.join("builtin"))?;

        let entry_path = work_dir.join("index.ts");
        std::fs::write(&entry_path, entry_file(user_code))?;

        let config_path = session_dir.join(RSPACK_CONFIG_FILE);
        let output_dir = work_dir.join("dist");

        let mut command = tokio::process::Command::new(&self.program);
        if self.via_npx {
            command.arg("-y").arg("@rspack/cli");
        }
        command
            .arg("--entry")
            .arg(&entry_path)
            .arg("--config")
            .arg(&config_path)
            .arg("--output-path")
            .arg(&output_dir)
            .current_dir(work_dir);

        let output = command.output().await?;
        if !output.status.success() {
            // Bundler diagnostics go back verbatim; they are the user's
            // compile errors.
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SandboxError::Bundling(format!("{stdout}{stderr}")));
        }

        let js = std::fs::read_to_string(output_dir.join("main.js"))
            .map_err(|e| SandboxError::Bundling(format!("failed to read bundled JS: {e}")))?;
        let source_map = std::fs::read_to_string(output_dir.join("main.js.map"))
            .map_err(|e| SandboxError::Bundling(format!("failed to read source map: {e}")))?;

        Ok(BundleOutput { js, source_map })
    }
}

/// The per-request entry file: the user's code followed by the required
/// entry invocation.
pub fn entry_file(user_code: &str) -> String {
    format!("{user_code}\nexec();\n")
}

/// Link a shared tree into the work directory; copies when symlinks are
/// unavailable.
fn link_dir(src: &Path, dst: &Path) -> Result<(), SandboxError> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(src, dst)?;
        Ok(())
    }
    #[cfg(not(unix))]
    {
        copy_dir(src, dst)
    }
}

#[cfg(not(unix))]
fn copy_dir(src: &Path, dst: &Path) -> Result<(), SandboxError> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

fn find_in_path(binary: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        let candidate = dir.join(binary);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_file_appends_exec_call() {
        let entry = entry_file("async function exec() { return 1; }");
        assert!(entry.ends_with("\nexec();\n"));
        assert!(entry.starts_with("async function exec()"));
    }

    #[test]
    fn embedded_config_requests_source_maps() {
        assert!(RSPACK_CONFIG.contains("devtool: \"source-map\""));
    }

    #[test]
    fn find_in_path_misses_nonexistent_binaries() {
        assert!(find_in_path("definitely-not-a-real-binary-xyz").is_none());
    }
}
