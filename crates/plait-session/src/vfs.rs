//! The read-only virtual filesystem backing `list_directory` and
//! `read_file`: the generated tree under `servers/` plus the sandbox
//! directories.

use plait_codegen::case::to_camel_case;

use crate::context::SessionContext;
use crate::error::SessionError;

/// List the children of a virtual path as a text listing, one entry per
/// line, directories suffixed with `/`.
pub async fn list_directory(
    session: &SessionContext,
    path: &str,
    with_descriptions: bool,
) -> Result<String, SessionError> {
    let path = normalize(path);
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let first = segments.next().unwrap_or("");

    if first.is_empty() {
        let mut entries = vec!["servers/".to_string()];
        for name in session.sandbox_fs().directory_names() {
            entries.push(format!("{name}/"));
        }
        return Ok(entries.join("\n"));
    }

    if first == "servers" {
        let server = segments.next();
        if segments.next().is_some() {
            return Err(not_found(session, &path));
        }
        return list_servers(session, server, with_descriptions).await;
    }

    if session.sandbox_fs().directory_names().contains(&first.to_string()) {
        let files = session.sandbox_fs().list_files(&path)?;
        return Ok(files.join("\n"));
    }

    Err(not_found(session, &path))
}

/// Read one virtual file as text.
pub async fn read_file(session: &SessionContext, path: &str) -> Result<String, SessionError> {
    let path = normalize(path);
    let first = path.split('/').next().unwrap_or("");

    if first == "servers" {
        return read_generated(session, &path);
    }

    if session.sandbox_fs().directory_names().contains(&first.to_string()) {
        return Ok(session.sandbox_fs().read_file(&path)?);
    }

    Err(not_found(session, &path))
}

async fn list_servers(
    session: &SessionContext,
    server: Option<&str>,
    with_descriptions: bool,
) -> Result<String, SessionError> {
    let grouped = session.hub().tools_grouped().await;

    let Some(server) = server else {
        // The servers/ root: one directory per connected server with its
        // function count, plus the root index.
        let mut names: Vec<&String> = grouped.keys().collect();
        names.sort();

        let mut entries = Vec::with_capacity(names.len() + 1);
        for name in names {
            let count = grouped[name].len();
            let noun = if count == 1 { "function" } else { "functions" };
            entries.push(format!("{name}/ ({count} {noun})"));
        }
        entries.push("index.ts".to_string());
        return Ok(entries.join("\n"));
    };

    let Some(tools) = grouped.get(server) else {
        let mut available: Vec<String> = grouped.keys().cloned().collect();
        available.sort();
        return Err(SessionError::NotFound {
            path: format!("servers/{server}"),
            available,
        });
    };

    let mut entries = Vec::with_capacity(tools.len() + 1);
    for tool in tools.iter() {
        let file = format!("{}.ts", to_camel_case(&tool.name));
        if with_descriptions {
            let description = tool.description.as_deref().unwrap_or("");
            entries.push(format!("{file}  # {description}"));
        } else {
            entries.push(file);
        }
    }
    entries.sort();
    entries.push("index.ts".to_string());
    Ok(entries.join("\n"))
}

/// Read from the materialized generated tree. Extensionless paths resolve
/// to their `.ts` module.
fn read_generated(session: &SessionContext, path: &str) -> Result<String, SessionError> {
    // The virtual path is re-rooted below the workspace; traversal would
    // escape it.
    if path.contains("..") {
        return Err(not_found(session, path));
    }

    let full = session.workspace_root().join(path);
    let candidate = if full.exists() {
        full
    } else {
        full.with_extension("ts")
    };

    match std::fs::read_to_string(&candidate) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(SessionError::NotFound {
            path: path.to_string(),
            available: Vec::new(),
        }),
        Err(e) => Err(e.into()),
    }
}

fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}

fn not_found(session: &SessionContext, path: &str) -> SessionError {
    let mut available = vec!["servers".to_string()];
    available.extend(session.sandbox_fs().directory_names());
    SessionError::NotFound {
        path: path.to_string(),
        available,
    }
}
