//! Writes tool catalogs to disk as the generated module tree.

use std::path::Path;
use tracing::debug;

use plait_client::{McpClientHub, Tool};
use plait_codegen::{case::to_camel_case, ToolDefinition, TypeScriptGenerator};
use plait_sandbox::{RSPACK_CONFIG, RSPACK_CONFIG_FILE};

use crate::error::SessionError;
use crate::fsstub::write_fs_stub;

/// Convert a catalog tool into the schema-shaped view codegen consumes.
pub(crate) fn tool_definition(tool: &Tool) -> ToolDefinition {
    ToolDefinition {
        name: tool.name.clone(),
        description: tool.description.clone(),
        input_schema: tool
            .input_schema
            .as_ref()
            .and_then(|schema| schema.as_object().cloned()),
        output_schema: tool
            .output_schema
            .as_ref()
            .and_then(|schema| schema.as_object().cloned()),
    }
}

/// Materialize the full generated tree for a fresh session: per-server
/// module directories, the root index, the builtin workspace stub and the
/// bundler config.
pub(crate) async fn materialize_tree(
    workspace_root: &Path,
    hub: &McpClientHub,
) -> Result<(), SessionError> {
    let servers_dir = workspace_root.join("servers");
    std::fs::create_dir_all(&servers_dir)?;

    let grouped = hub.tools_grouped().await;
    let mut server_names: Vec<String> = grouped.keys().cloned().collect();
    server_names.sort();

    for server_name in &server_names {
        write_server_dir(&servers_dir, server_name, &grouped[server_name])?;
    }

    let generator = TypeScriptGenerator::new();
    std::fs::write(
        servers_dir.join("index.ts"),
        generator.generate_root_index(&server_names),
    )?;

    write_fs_stub(workspace_root)?;
    std::fs::write(workspace_root.join(RSPACK_CONFIG_FILE), RSPACK_CONFIG)?;

    debug!(
        servers = server_names.len(),
        root = %workspace_root.display(),
        "materialized generated tree"
    );
    Ok(())
}

/// Write one server's module directory from its current catalog. The
/// caller removes any stale directory first, so a regenerated subtree is
/// never partially valid.
pub(crate) fn write_server_dir(
    servers_dir: &Path,
    server_name: &str,
    tools: &[Tool],
) -> Result<(), SessionError> {
    let server_dir = servers_dir.join(server_name);
    std::fs::create_dir_all(&server_dir)?;

    let generator = TypeScriptGenerator::new();
    let definitions: Vec<ToolDefinition> = tools.iter().map(tool_definition).collect();

    for definition in &definitions {
        let module = generator.generate_function_file(server_name, definition)?;
        let file_name = format!("{}.ts", to_camel_case(&definition.name));
        std::fs::write(server_dir.join(file_name), module)?;
    }

    std::fs::write(
        server_dir.join("index.ts"),
        generator.generate_server_index(server_name, &definitions),
    )?;
    Ok(())
}
