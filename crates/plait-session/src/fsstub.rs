//! The builtin `@plait/fs` module exposed to sandboxed code.

use std::path::Path;

use crate::error::SessionError;

const FS_STUB: &str = r#"/**
 * Plait sandbox filesystem API.
 *
 * Paths carry a directory prefix, e.g. './workspace/data.json'. Available
 * directories and their quotas are configured on the host; writes to
 * read-only directories and quota breaches throw catchable errors.
 *
 * @example
 * ```typescript
 * import * as fs from '../../builtin/@plait/fs';
 *
 * const data = await fs.readFile('./workspace/config.json');
 * await fs.writeFile('./workspace/result.json', JSON.stringify(result));
 * ```
 */

// @ts-ignore - injected by the sandbox runtime
const ws = globalThis.__plait_workspace;

/**
 * Read a file as a string.
 * @param path - Path with directory prefix (e.g. './workspace/data.txt')
 * @throws Error if the file is missing or the path is invalid
 */
export async function readFile(path: string): Promise<string> {
    return ws.readFile(path);
}

/**
 * Write content to a file in a writable directory.
 * @throws Error if the directory is read-only or a quota is exceeded
 */
export async function writeFile(path: string, content: string): Promise<void> {
    return ws.writeFile(path, content);
}

/**
 * List files and directories; directory names end with '/'.
 */
export async function listFiles(path: string): Promise<string[]> {
    return ws.listFiles(path);
}

/**
 * Delete a file from a writable directory.
 * @throws Error if the directory is read-only or the file is missing
 */
export async function deleteFile(path: string): Promise<void> {
    return ws.deleteFile(path);
}

/** Check whether a file exists. */
export async function exists(path: string): Promise<boolean> {
    try {
        await readFile(path);
        return true;
    } catch {
        return false;
    }
}

/** Read and parse a JSON file. */
export async function readJSON<T = any>(path: string): Promise<T> {
    const content = await readFile(path);
    return JSON.parse(content);
}

/** Write an object as JSON. */
export async function writeJSON(path: string, data: any, pretty: boolean = true): Promise<void> {
    const content = pretty ? JSON.stringify(data, null, 2) : JSON.stringify(data);
    return writeFile(path, content);
}
"#;

/// Write the builtin module under `<root>/builtin/@plait/fs/index.ts`.
pub(crate) fn write_fs_stub(workspace_root: &Path) -> Result<(), SessionError> {
    let stub_dir = workspace_root.join("builtin").join("@plait").join("fs");
    std::fs::create_dir_all(&stub_dir)?;
    std::fs::write(stub_dir.join("index.ts"), FS_STUB)?;
    Ok(())
}
