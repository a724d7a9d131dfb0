//! One session: its hub, sandbox filesystem, workspace and regeneration
//! lock.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tempfile::TempDir;
use tracing::{info, warn};

use plait_client::{ClientError, McpClientHub};
use plait_core::SandboxSettings;
use plait_sandbox::{DirectoryQuota, SandboxFs};

use crate::error::SessionError;
use crate::materialize::{materialize_tree, write_server_dir};

/// A per-client logical scope owning its client hub, generated tree and
/// sandbox filesystem. The workspace directory lives exactly as long as
/// the context.
pub struct SessionContext {
    id: String,
    created_at: DateTime<Utc>,
    last_accessed: std::sync::RwLock<DateTime<Utc>>,
    hub: Arc<McpClientHub>,
    sandbox_fs: Arc<SandboxFs>,
    workspace: TempDir,
    regen: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    /// Build a session over an already-connected hub: create the scratch
    /// workspace, the sandbox directories and the generated tree, then
    /// subscribe for catalog changes.
    ///
    /// On failure nothing survives: the hub is closed and the workspace
    /// removed.
    pub async fn bootstrap(
        id: String,
        hub: Arc<McpClientHub>,
        sandbox: &SandboxSettings,
    ) -> Result<Arc<Self>, SessionError> {
        let result = Self::try_bootstrap(id, hub.clone(), sandbox).await;
        if result.is_err() {
            hub.close().await.ok();
        }
        result
    }

    async fn try_bootstrap(
        id: String,
        hub: Arc<McpClientHub>,
        sandbox: &SandboxSettings,
    ) -> Result<Arc<Self>, SessionError> {
        let workspace = tempfile::Builder::new()
            .prefix(&format!("plait-{id}-"))
            .tempdir()?;

        let sandbox_fs = Arc::new(SandboxFs::new(directory_quotas(
            sandbox,
            &workspace.path().join("data"),
        ))?);

        materialize_tree(workspace.path(), &hub).await?;

        let now = Utc::now();
        let session = Arc::new(Self {
            id,
            created_at: now,
            last_accessed: std::sync::RwLock::new(now),
            hub: hub.clone(),
            sandbox_fs,
            workspace,
            regen: tokio::sync::Mutex::new(()),
        });

        // The hub holds only a function value over a weak reference, so
        // the hub's lifetime stays strictly inside the session.
        let weak: Weak<SessionContext> = Arc::downgrade(&session);
        hub.subscribe_catalog_changed(Arc::new(move |server_name: &str| {
            let Some(session) = weak.upgrade() else { return };
            let server_name = server_name.to_string();
            tokio::spawn(async move {
                match session.regenerate_server(&server_name).await {
                    Ok(()) => {
                        info!(session = %session.id, server = %server_name, "regenerated modules");
                    }
                    Err(e) => {
                        warn!(
                            session = %session.id,
                            server = %server_name,
                            "module regeneration failed: {e}"
                        );
                    }
                }
            });
        }))
        .await;

        Ok(session)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_accessed(&self) -> DateTime<Utc> {
        self.last_accessed
            .read()
            .map(|at| *at)
            .unwrap_or(self.created_at)
    }

    /// Record an access from an inbound operation.
    pub fn touch(&self) {
        if let Ok(mut at) = self.last_accessed.write() {
            *at = Utc::now();
        }
    }

    pub fn hub(&self) -> &Arc<McpClientHub> {
        &self.hub
    }

    pub fn sandbox_fs(&self) -> &Arc<SandboxFs> {
        &self.sandbox_fs
    }

    /// The session's scratch root on the host.
    pub fn workspace_root(&self) -> &Path {
        self.workspace.path()
    }

    /// The materialized generated tree.
    pub fn servers_dir(&self) -> PathBuf {
        self.workspace.path().join("servers")
    }

    /// Rewrite one server's subtree from its already-refreshed catalog:
    /// remove, then regenerate, under the per-session lock, so the subtree
    /// is never partially valid.
    pub async fn regenerate_server(&self, server_name: &str) -> Result<(), SessionError> {
        let _guard = self.regen.lock().await;

        let tools = match self.hub.server_tools(server_name).await {
            Some(tools) => tools,
            None => {
                return Err(ClientError::ServerNotFound {
                    name: server_name.to_string(),
                    known: self.hub.servers().await,
                }
                .into())
            }
        };

        let server_dir = self.servers_dir().join(server_name);
        if server_dir.exists() {
            std::fs::remove_dir_all(&server_dir)?;
        }
        write_server_dir(&self.servers_dir(), server_name, &tools)
    }

    /// Close the hub. The workspace is removed when the context drops.
    pub async fn shutdown(&self) {
        if let Err(e) = self.hub.close().await {
            warn!(session = %self.id, "error closing client hub: {e}");
        }
    }
}

/// Build the session's sandbox directory quotas: the configured set rooted
/// under `data_root`, or the default `workspace` directory when none are
/// configured.
fn directory_quotas(sandbox: &SandboxSettings, data_root: &Path) -> Vec<DirectoryQuota> {
    if sandbox.directories.is_empty() {
        return vec![DirectoryQuota::workspace(data_root.join("workspace"))];
    }
    sandbox
        .directories
        .iter()
        .map(|dir| DirectoryQuota {
            name: dir.name.clone(),
            root: data_root.join(&dir.name),
            read_only: dir.read_only,
            max_file_size: dir.max_file_size,
            max_files: dir.max_files,
            max_total_bytes: dir.max_total_bytes,
        })
        .collect()
}
