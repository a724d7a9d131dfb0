//! # plait-session
//!
//! Session lifecycle for the gateway: each session owns a connected client
//! hub, a scratch workspace holding the generated module tree, and a
//! sandbox filesystem. The virtual-filesystem views in [`vfs`] back the
//! public `list_directory` and `read_file` operations, and catalog-changed
//! notifications rewrite the affected server's subtree in place.

mod context;
mod error;
mod fsstub;
mod materialize;
mod manager;
pub mod vfs;

pub use context::SessionContext;
pub use error::SessionError;
pub use manager::SessionManager;

#[cfg(test)]
mod tests {
    use super::*;
    use plait_client::testing::{mock_client, text_tool, MockTransport};
    use plait_client::{McpClientHub, Tool};
    use serde_json::json;
    use std::sync::Arc;

    fn read_text_file_tool() -> Tool {
        Tool {
            name: "read_text_file".to_string(),
            description: Some("Read a file from disk".to_string()),
            input_schema: Some(json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "head": { "type": "number" },
                    "tail": { "type": "number" }
                },
                "required": ["path"]
            })),
            output_schema: None,
        }
    }

    async fn session_with_fs_server() -> (Arc<SessionContext>, Arc<MockTransport>) {
        let hub = McpClientHub::new();
        let (client, transport) = mock_client("fs", vec![read_text_file_tool()]).await;
        hub.register_client(client).await;
        let session = SessionContext::bootstrap(
            "test-session".to_string(),
            hub,
            &plait_core::SandboxSettings::default(),
        )
        .await
        .unwrap();
        (session, transport)
    }

    #[tokio::test]
    async fn root_listing_shows_servers_and_sandbox_dirs() {
        let (session, _transport) = session_with_fs_server().await;
        let listing = vfs::list_directory(&session, "", false).await.unwrap();
        assert!(listing.contains("servers/"));
        assert!(listing.contains("workspace/"));
    }

    #[tokio::test]
    async fn servers_listing_shows_function_counts() {
        let (session, _transport) = session_with_fs_server().await;
        let listing = vfs::list_directory(&session, "/servers", false)
            .await
            .unwrap();
        assert!(listing.contains("fs/ (1 function)"));
        assert!(listing.contains("index.ts"));
    }

    #[tokio::test]
    async fn server_listing_shows_camel_cased_modules() {
        let (session, _transport) = session_with_fs_server().await;
        let listing = vfs::list_directory(&session, "/servers/fs", false)
            .await
            .unwrap();
        let entries: Vec<&str> = listing.lines().collect();
        assert_eq!(entries, vec!["readTextFile.ts", "index.ts"]);
    }

    #[tokio::test]
    async fn server_listing_can_include_descriptions() {
        let (session, _transport) = session_with_fs_server().await;
        let listing = vfs::list_directory(&session, "/servers/fs", true)
            .await
            .unwrap();
        assert!(listing.contains("readTextFile.ts  # Read a file from disk"));
    }

    #[tokio::test]
    async fn generated_module_matches_catalog_schema() {
        let (session, _transport) = session_with_fs_server().await;
        let module = vfs::read_file(&session, "/servers/fs/readTextFile")
            .await
            .unwrap();

        assert!(module.contains("export interface ReadTextFileArgs {"));
        assert!(module.contains("  path: string;"));
        assert!(module.contains("  head?: number;"));
        assert!(module.contains("  tail?: number;"));
        assert!(module.contains("export type ReadTextFileResult = any;"));
        assert!(module.contains(r#"return callTool("fs", "read_text_file", args);"#));
    }

    #[tokio::test]
    async fn read_file_accepts_explicit_extension() {
        let (session, _transport) = session_with_fs_server().await;
        let module = vfs::read_file(&session, "servers/fs/readTextFile.ts")
            .await
            .unwrap();
        assert!(module.contains("readTextFile"));
    }

    #[tokio::test]
    async fn unknown_paths_list_alternatives() {
        let (session, _transport) = session_with_fs_server().await;
        let err = vfs::list_directory(&session, "/nowhere", false)
            .await
            .unwrap_err();
        match err {
            SessionError::NotFound { available, .. } => {
                assert!(available.contains(&"servers".to_string()));
                assert!(available.contains(&"workspace".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn sandbox_paths_delegate_to_the_sandbox_fs() {
        let (session, _transport) = session_with_fs_server().await;
        session
            .sandbox_fs()
            .write_file("./workspace/notes.txt", "remember")
            .unwrap();

        let listing = vfs::list_directory(&session, "/workspace", false)
            .await
            .unwrap();
        assert_eq!(listing, "notes.txt");

        let content = vfs::read_file(&session, "workspace/notes.txt").await.unwrap();
        assert_eq!(content, "remember");
    }

    #[tokio::test]
    async fn regeneration_replaces_the_server_subtree() {
        let (session, transport) = session_with_fs_server().await;

        transport.set_tools(vec![text_tool("new_tool")]);
        session.hub().refresh_server("fs").await.unwrap();
        session.regenerate_server("fs").await.unwrap();

        let server_dir = session.servers_dir().join("fs");
        assert!(server_dir.join("newTool.ts").exists());
        assert!(
            !server_dir.join("readTextFile.ts").exists(),
            "stale modules must be removed"
        );
        assert!(server_dir.join("index.ts").exists());

        let listing = vfs::list_directory(&session, "/servers/fs", false)
            .await
            .unwrap();
        assert!(listing.contains("newTool.ts"));
        assert!(!listing.contains("readTextFile.ts"));
    }

    #[tokio::test]
    async fn notification_path_rewrites_the_tree() {
        let (session, transport) = session_with_fs_server().await;

        transport.set_tools(vec![text_tool("fresh")]);
        let handler = session.hub().catalog_changed_handler();
        handler("fs");

        let server_dir = session.servers_dir().join("fs");
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while !server_dir.join("fresh.ts").exists() {
            assert!(
                std::time::Instant::now() < deadline,
                "regeneration did not happen in time"
            );
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(!server_dir.join("readTextFile.ts").exists());
    }

    #[tokio::test]
    async fn workspace_is_removed_with_the_session() {
        let (session, _transport) = session_with_fs_server().await;
        let root = session.workspace_root().to_path_buf();
        assert!(root.exists());

        session.shutdown().await;
        drop(session);
        assert!(!root.exists(), "workspace must be cleaned up on drop");
    }
}
