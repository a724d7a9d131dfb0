//! The session registry: double-checked get-or-create, idempotent removal.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use plait_client::McpClientHub;
use plait_core::Config;

use crate::context::SessionContext;
use crate::error::SessionError;

/// Creates, caches and destroys sessions.
pub struct SessionManager {
    config: Config,
    sessions: RwLock<HashMap<String, Arc<SessionContext>>>,
}

impl SessionManager {
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fetch an existing session or create one for an unknown id. Creation
    /// connects to every configured downstream server and fetches catalogs
    /// fresh; any connect failure aborts with no partial session state.
    pub async fn get_or_create(&self, session_id: &str) -> Result<Arc<SessionContext>, SessionError> {
        if let Some(session) = self.sessions.read().await.get(session_id) {
            session.touch();
            return Ok(session.clone());
        }

        let mut sessions = self.sessions.write().await;
        // Double-check: a concurrent first reference may have won.
        if let Some(session) = sessions.get(session_id) {
            session.touch();
            return Ok(session.clone());
        }

        info!(session = %session_id, "creating session");
        let hub = McpClientHub::new();
        hub.connect_all(&self.config.mcp_servers).await?;

        let sandbox = self.config.sandbox.clone().unwrap_or_default();
        let session =
            SessionContext::bootstrap(session_id.to_string(), hub, &sandbox).await?;
        sessions.insert(session_id.to_string(), session.clone());
        Ok(session)
    }

    /// Register an externally bootstrapped session under its id. Intended
    /// for embedders and tests that assemble sessions from custom hubs.
    pub async fn adopt(&self, session: Arc<SessionContext>) {
        self.sessions
            .write()
            .await
            .insert(session.id().to_string(), session);
    }

    /// Fetch an existing session without creating one.
    pub async fn get(&self, session_id: &str) -> Option<Arc<SessionContext>> {
        let session = self.sessions.read().await.get(session_id).cloned();
        if let Some(session) = &session {
            session.touch();
        }
        session
    }

    /// Destroy a session: close its clients and drop its workspace.
    /// Removing an unknown id is a no-op.
    pub async fn remove(&self, session_id: &str) {
        let session = self.sessions.write().await.remove(session_id);
        match session {
            Some(session) => {
                info!(session = %session_id, "destroying session");
                session.shutdown().await;
            }
            None => debug!(session = %session_id, "remove for unknown session ignored"),
        }
    }

    /// Destroy every session.
    pub async fn close_all(&self) {
        let sessions: Vec<Arc<SessionContext>> = {
            let mut map = self.sessions.write().await;
            map.drain().map(|(_, session)| session).collect()
        };
        for session in sessions {
            session.shutdown().await;
        }
    }
}
