//! Host-side sandbox storage: multiple named directories with per-directory
//! quotas, exposed to sandboxed code through four JSON operations.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::error::SandboxError;

/// Quotas and flags for one directory.
#[derive(Debug, Clone)]
pub struct DirectoryQuota {
    /// Logical name, the first path segment sandboxed code uses.
    pub name: String,
    /// Physical root on the host.
    pub root: PathBuf,
    pub read_only: bool,
    pub max_file_size: u64,
    pub max_files: usize,
    pub max_total_bytes: u64,
}

impl DirectoryQuota {
    /// The default read-write `workspace` directory rooted at `root`.
    pub fn workspace(root: impl Into<PathBuf>) -> Self {
        Self {
            name: "workspace".to_string(),
            root: root.into(),
            read_only: false,
            max_file_size: 1024 * 1024,
            max_files: 256,
            max_total_bytes: 32 * 1024 * 1024,
        }
    }
}

/// Running usage statistics for one directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirStats {
    pub total_bytes: u64,
    pub file_count: usize,
    pub largest_file: u64,
}

struct Directory {
    quota: DirectoryQuota,
    stats: RwLock<DirStats>,
}

/// Request payload for the four workspace host callbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRequest {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Response payload for the four workspace host callbacks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileResponse {
    fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    fn err(message: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            error: Some(message.to_string()),
            ..Self::default()
        }
    }
}

/// All sandbox directories of one session.
pub struct SandboxFs {
    directories: RwLock<HashMap<String, Arc<Directory>>>,
}

impl SandboxFs {
    /// Create the directories on disk and initialize their stats by
    /// walking whatever already exists.
    pub fn new(quotas: Vec<DirectoryQuota>) -> Result<Self, SandboxError> {
        let mut directories = HashMap::new();
        for quota in quotas {
            std::fs::create_dir_all(&quota.root)?;
            let directory = Directory {
                stats: RwLock::new(recalculate_stats(&quota.root)?),
                quota,
            };
            directories.insert(directory.quota.name.clone(), Arc::new(directory));
        }
        Ok(Self {
            directories: RwLock::new(directories),
        })
    }

    /// Names of the configured directories, sorted.
    pub fn directory_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .directories
            .read()
            .map(|dirs| dirs.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Current stats per directory.
    pub fn stats(&self) -> HashMap<String, DirStats> {
        let directories = match self.directories.read() {
            Ok(directories) => directories,
            Err(_) => return HashMap::new(),
        };
        directories
            .iter()
            .map(|(name, dir)| {
                let stats = dir.stats.read().map(|s| *s).unwrap_or_default();
                (name.clone(), stats)
            })
            .collect()
    }

    pub fn read_file(&self, user_path: &str) -> Result<String, SandboxError> {
        let (directory, rel_path) = self.resolve(user_path)?;
        directory.read_file(&rel_path)
    }

    pub fn write_file(&self, user_path: &str, content: &str) -> Result<(), SandboxError> {
        let (directory, rel_path) = self.resolve(user_path)?;
        if directory.quota.read_only {
            return Err(SandboxError::ReadOnly(directory.quota.name.clone()));
        }
        directory.write_file(&rel_path, content)
    }

    pub fn list_files(&self, user_path: &str) -> Result<Vec<String>, SandboxError> {
        let (directory, rel_path) = self.resolve(user_path)?;
        directory.list_files(&rel_path)
    }

    pub fn delete_file(&self, user_path: &str) -> Result<(), SandboxError> {
        let (directory, rel_path) = self.resolve(user_path)?;
        if directory.quota.read_only {
            return Err(SandboxError::ReadOnly(directory.quota.name.clone()));
        }
        directory.delete_file(&rel_path)
    }

    /// Parse `<name>/rel`, `./<name>/rel` or `/<name>/rel` into a directory
    /// and its relative path.
    fn resolve(&self, user_path: &str) -> Result<(Arc<Directory>, String), SandboxError> {
        let trimmed = user_path
            .trim_start_matches("./")
            .trim_start_matches('/');
        let (dir_name, rel_path) = match trimmed.split_once('/') {
            Some((dir_name, rel_path)) => (dir_name, rel_path),
            None => (trimmed, ""),
        };
        if dir_name.is_empty() {
            return Err(SandboxError::PathInvalid("empty path".to_string()));
        }

        let directories = self
            .directories
            .read()
            .map_err(|_| SandboxError::Engine("sandbox fs lock poisoned".to_string()))?;
        match directories.get(dir_name) {
            Some(directory) => Ok((directory.clone(), rel_path.to_string())),
            None => {
                let mut available: Vec<String> = directories.keys().cloned().collect();
                available.sort();
                Err(SandboxError::UnknownDirectory {
                    name: dir_name.to_string(),
                    available,
                })
            }
        }
    }

    // JSON entry points used by the host callbacks.

    pub fn handle_read_file(&self, request: &[u8]) -> Vec<u8> {
        let Ok(request) = serde_json::from_slice::<FileRequest>(request) else {
            return encode(&FileResponse::err("invalid request"));
        };
        match self.read_file(&request.path) {
            Ok(data) => encode(&FileResponse {
                data: Some(data),
                ..FileResponse::ok()
            }),
            Err(e) => encode(&FileResponse::err(e)),
        }
    }

    pub fn handle_write_file(&self, request: &[u8]) -> Vec<u8> {
        let Ok(request) = serde_json::from_slice::<FileRequest>(request) else {
            return encode(&FileResponse::err("invalid request"));
        };
        let content = request.content.unwrap_or_default();
        match self.write_file(&request.path, &content) {
            Ok(()) => encode(&FileResponse::ok()),
            Err(e) => encode(&FileResponse::err(e)),
        }
    }

    pub fn handle_list_files(&self, request: &[u8]) -> Vec<u8> {
        let Ok(request) = serde_json::from_slice::<FileRequest>(request) else {
            return encode(&FileResponse::err("invalid request"));
        };
        match self.list_files(&request.path) {
            Ok(files) => encode(&FileResponse {
                files: Some(files),
                ..FileResponse::ok()
            }),
            Err(e) => encode(&FileResponse::err(e)),
        }
    }

    pub fn handle_delete_file(&self, request: &[u8]) -> Vec<u8> {
        let Ok(request) = serde_json::from_slice::<FileRequest>(request) else {
            return encode(&FileResponse::err("invalid request"));
        };
        match self.delete_file(&request.path) {
            Ok(()) => encode(&FileResponse::ok()),
            Err(e) => encode(&FileResponse::err(e)),
        }
    }
}

impl Directory {
    /// Validate and resolve a relative path inside this directory.
    ///
    /// `..` is rejected before any filesystem access; the cleaned result
    /// must still live under the root. Both checks are required.
    fn validate_path(&self, rel_path: &str) -> Result<PathBuf, SandboxError> {
        if rel_path.contains("..") {
            return Err(SandboxError::PathInvalid(
                "path traversal not allowed".to_string(),
            ));
        }
        if rel_path.is_empty() || rel_path == "." {
            return Ok(self.quota.root.clone());
        }

        let mut cleaned = PathBuf::new();
        for component in Path::new(rel_path).components() {
            match component {
                Component::Normal(part) => cleaned.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(SandboxError::PathInvalid(format!(
                        "unsupported path component in {rel_path:?}"
                    )))
                }
            }
        }

        let full = self.quota.root.join(cleaned);
        if !full.starts_with(&self.quota.root) {
            return Err(SandboxError::PathInvalid(rel_path.to_string()));
        }
        Ok(full)
    }

    fn read_file(&self, rel_path: &str) -> Result<String, SandboxError> {
        let _stats = self.read_lock()?;
        let full = self.validate_path(rel_path)?;
        match std::fs::read_to_string(&full) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SandboxError::NotFound(rel_path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Quota checks, then the write, then the stats update, all under the
    /// directory's write lock so stats stay consistent with the disk.
    fn write_file(&self, rel_path: &str, content: &str) -> Result<(), SandboxError> {
        let mut stats = self.write_lock()?;
        let full = self.validate_path(rel_path)?;
        let new_size = content.len() as u64;

        if new_size > self.quota.max_file_size {
            return Err(SandboxError::QuotaExceeded(format!(
                "file size {new_size} exceeds limit {}",
                self.quota.max_file_size
            )));
        }

        let existing_size = std::fs::metadata(&full).map(|m| m.len()).unwrap_or(0);
        let is_new = std::fs::metadata(&full).is_err();

        if is_new && stats.file_count >= self.quota.max_files {
            return Err(SandboxError::QuotaExceeded(format!(
                "file count limit reached: {}",
                self.quota.max_files
            )));
        }

        let new_total = (stats.total_bytes + new_size).saturating_sub(existing_size);
        if new_total > self.quota.max_total_bytes {
            return Err(SandboxError::QuotaExceeded(format!(
                "total size limit would be exceeded: {new_total} > {}",
                self.quota.max_total_bytes
            )));
        }

        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&full, content)?;

        if is_new {
            stats.file_count += 1;
        }
        stats.total_bytes = (stats.total_bytes + new_size).saturating_sub(existing_size);
        stats.largest_file = stats.largest_file.max(new_size);
        Ok(())
    }

    fn list_files(&self, rel_path: &str) -> Result<Vec<String>, SandboxError> {
        let _stats = self.read_lock()?;
        let full = self.validate_path(rel_path)?;
        let entries = match std::fs::read_dir(&full) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SandboxError::NotFound(rel_path.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type()?.is_dir() {
                name.push('/');
            }
            files.push(name);
        }
        files.sort();
        Ok(files)
    }

    fn delete_file(&self, rel_path: &str) -> Result<(), SandboxError> {
        let mut stats = self.write_lock()?;
        let full = self.validate_path(rel_path)?;

        let size = match std::fs::metadata(&full) {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SandboxError::NotFound(rel_path.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        std::fs::remove_file(&full)?;
        stats.file_count = stats.file_count.saturating_sub(1);
        stats.total_bytes = stats.total_bytes.saturating_sub(size);
        Ok(())
    }

    fn read_lock(&self) -> Result<std::sync::RwLockReadGuard<'_, DirStats>, SandboxError> {
        self.stats
            .read()
            .map_err(|_| SandboxError::Engine("directory lock poisoned".to_string()))
    }

    fn write_lock(&self) -> Result<std::sync::RwLockWriteGuard<'_, DirStats>, SandboxError> {
        self.stats
            .write()
            .map_err(|_| SandboxError::Engine("directory lock poisoned".to_string()))
    }
}

/// Walk a directory root and compute its usage statistics.
fn recalculate_stats(root: &Path) -> Result<DirStats, SandboxError> {
    let mut stats = DirStats::default();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else {
                let size = entry.metadata()?.len();
                stats.file_count += 1;
                stats.total_bytes += size;
                stats.largest_file = stats.largest_file.max(size);
            }
        }
    }

    Ok(stats)
}

fn encode(response: &FileResponse) -> Vec<u8> {
    serde_json::to_vec(response).unwrap_or_else(|_| br#"{"success":false}"#.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn small_fs(dir: &tempfile::TempDir) -> SandboxFs {
        SandboxFs::new(vec![DirectoryQuota {
            name: "workspace".to_string(),
            root: dir.path().join("workspace"),
            read_only: false,
            max_file_size: 64,
            max_files: 2,
            max_total_bytes: 100,
        }])
        .unwrap()
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let fs = small_fs(&dir);

        fs.write_file("./workspace/a.txt", "hello").unwrap();
        assert_eq!(fs.read_file("workspace/a.txt").unwrap(), "hello");
        assert_eq!(fs.read_file("/workspace/a.txt").unwrap(), "hello");
    }

    #[test]
    fn traversal_is_rejected_before_any_access() {
        let dir = tempfile::tempdir().unwrap();
        let fs = small_fs(&dir);

        let err = fs.read_file("workspace/../secrets").unwrap_err();
        assert!(matches!(err, SandboxError::PathInvalid(_)));
        let err = fs.write_file("workspace/a/../../b", "x").unwrap_err();
        assert!(matches!(err, SandboxError::PathInvalid(_)));
    }

    #[test]
    fn unknown_directory_lists_alternatives() {
        let dir = tempfile::tempdir().unwrap();
        let fs = small_fs(&dir);

        let err = fs.read_file("cache/a.txt").unwrap_err();
        match err {
            SandboxError::UnknownDirectory { name, available } => {
                assert_eq!(name, "cache");
                assert_eq!(available, vec!["workspace".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn per_file_quota_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let fs = small_fs(&dir);

        let err = fs
            .write_file("workspace/big.txt", &"x".repeat(65))
            .unwrap_err();
        assert!(matches!(err, SandboxError::QuotaExceeded(_)));
    }

    #[test]
    fn file_count_quota_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let fs = small_fs(&dir);

        fs.write_file("workspace/one.txt", "1").unwrap();
        fs.write_file("workspace/two.txt", "2").unwrap();
        let err = fs.write_file("workspace/three.txt", "3").unwrap_err();
        assert!(matches!(err, SandboxError::QuotaExceeded(_)));

        // Overwriting an existing file is still allowed.
        fs.write_file("workspace/one.txt", "updated").unwrap();

        let files = fs.list_files("./workspace").unwrap();
        assert_eq!(files, vec!["one.txt".to_string(), "two.txt".to_string()]);
    }

    #[test]
    fn aggregate_quota_accounts_for_replaced_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let fs = small_fs(&dir);

        fs.write_file("workspace/a.txt", &"a".repeat(60)).unwrap();
        // 60 + 50 > 100 would fail as a new file, but replacing the same
        // file only counts the delta.
        fs.write_file("workspace/a.txt", &"b".repeat(50)).unwrap();

        let stats = fs.stats()["workspace"];
        assert_eq!(stats.total_bytes, 50);
        assert_eq!(stats.file_count, 1);
    }

    #[test]
    fn delete_updates_stats() {
        let dir = tempfile::tempdir().unwrap();
        let fs = small_fs(&dir);

        fs.write_file("workspace/a.txt", "12345").unwrap();
        fs.delete_file("workspace/a.txt").unwrap();

        let stats = fs.stats()["workspace"];
        assert_eq!(stats.file_count, 0);
        assert_eq!(stats.total_bytes, 0);
        assert!(matches!(
            fs.delete_file("workspace/a.txt").unwrap_err(),
            SandboxError::NotFound(_)
        ));
    }

    #[test]
    fn read_only_directories_reject_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let fs = SandboxFs::new(vec![DirectoryQuota {
            name: "config".to_string(),
            root: dir.path().join("config"),
            read_only: true,
            max_file_size: 64,
            max_files: 4,
            max_total_bytes: 256,
        }])
        .unwrap();

        assert!(matches!(
            fs.write_file("config/a.txt", "x").unwrap_err(),
            SandboxError::ReadOnly(_)
        ));
        assert!(matches!(
            fs.delete_file("config/a.txt").unwrap_err(),
            SandboxError::ReadOnly(_)
        ));
    }

    #[test]
    fn directories_in_listings_get_a_slash_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let fs = small_fs(&dir);

        fs.write_file("workspace/sub/inner.txt", "x").unwrap();
        let files = fs.list_files("workspace").unwrap();
        assert_eq!(files, vec!["sub/".to_string()]);
    }

    #[test]
    fn stats_are_recalculated_on_construction() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("workspace");
        std::fs::create_dir_all(root.join("nested")).unwrap();
        std::fs::write(root.join("a.txt"), "1234").unwrap();
        std::fs::write(root.join("nested/b.txt"), "12").unwrap();

        let fs = SandboxFs::new(vec![DirectoryQuota::workspace(&root)]).unwrap();
        let stats = fs.stats()["workspace"];
        assert_eq!(stats.file_count, 2);
        assert_eq!(stats.total_bytes, 6);
        assert_eq!(stats.largest_file, 4);
    }

    #[test]
    fn quota_failure_flows_through_json_handlers() {
        let dir = tempfile::tempdir().unwrap();
        let fs = small_fs(&dir);

        for name in ["one", "two"] {
            let request = serde_json::to_vec(&json!({
                "path": format!("./workspace/{name}.txt"),
                "content": "data"
            }))
            .unwrap();
            let response: FileResponse =
                serde_json::from_slice(&fs.handle_write_file(&request)).unwrap();
            assert!(response.success);
        }

        let request =
            serde_json::to_vec(&json!({ "path": "./workspace/three.txt", "content": "data" }))
                .unwrap();
        let response: FileResponse =
            serde_json::from_slice(&fs.handle_write_file(&request)).unwrap();
        assert!(!response.success);
        assert!(response.error.unwrap().contains("quota exceeded"));

        let request = serde_json::to_vec(&json!({ "path": "./workspace" })).unwrap();
        let response: FileResponse =
            serde_json::from_slice(&fs.handle_list_files(&request)).unwrap();
        assert_eq!(
            response.files.unwrap(),
            vec!["one.txt".to_string(), "two.txt".to_string()]
        );
    }

    #[test]
    fn malformed_request_json_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let fs = small_fs(&dir);
        let response: FileResponse =
            serde_json::from_slice(&fs.handle_read_file(b"not json")).unwrap();
        assert!(!response.success);
    }
}
