//! Workspace file tools — read, write and list files under the workspace root
//!
//! Every path is resolved lexically against the root first. Absolute paths
//! are accepted only when they land inside it; `..` components that climb
//! above the root are refused before any filesystem access happens. The
//! surviving path is then canonicalized so symlinks inside the root cannot
//! point the tools somewhere else.

use crate::registry::{truncate, Tool, ToolResult};
use globset::GlobBuilder;
use serde_json::{json, Value};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

const MAX_READ: usize = 100_000;
const MAX_LISTED: usize = 1000;

/// Resolve `path` against `root` without touching the filesystem.
pub fn resolve_in_root(root: &Path, path: &str) -> Result<PathBuf, String> {
    let requested = Path::new(path);
    let joined = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        root.join(requested)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(format!("Path escapes the workspace: {}", path));
                }
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }

    if normalized.starts_with(root) {
        Ok(normalized)
    } else {
        Err(format!("Path escapes the workspace: {}", path))
    }
}

/// Resolve `path` and confirm that, once symlinks are followed, it still
/// lands under the canonical root. Components that do not exist yet are
/// appended to the deepest existing ancestor.
pub async fn confine_to_root(root: &Path, path: &str) -> Result<PathBuf, String> {
    let escape = || format!("Path escapes the workspace: {}", path);
    let lexical = resolve_in_root(root, path)?;
    let canonical_root = fs::canonicalize(root)
        .await
        .map_err(|e| format!("Workspace root unavailable: {}", e))?;

    let mut pending = Vec::new();
    let mut existing = lexical.as_path();
    let anchor = loop {
        match fs::canonicalize(existing).await {
            Ok(p) => break p,
            Err(_) => {
                // A dangling symlink would be followed on write.
                if fs::symlink_metadata(existing).await.is_ok() {
                    return Err(escape());
                }
                let name = existing.file_name().ok_or_else(escape)?;
                pending.push(name.to_os_string());
                existing = existing.parent().ok_or_else(escape)?;
            }
        }
    };

    if !anchor.starts_with(&canonical_root) {
        return Err(escape());
    }
    let mut resolved = anchor;
    for name in pending.iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

fn path_arg(args: &Value) -> Option<&str> {
    args.get("path")
        .or(args.get("file_path"))
        .and_then(|v| v.as_str())
        .filter(|p| !p.is_empty())
}

pub struct ReadFileTool {
    workspace_root: PathBuf,
}

impl ReadFileTool {
    pub fn new(workspace_root: impl AsRef<Path>) -> Self {
        Self {
            workspace_root: workspace_root.as_ref().to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file from the workspace. Paths are relative to the workspace root."
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Workspace-relative file path" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let Some(path) = path_arg(&args) else {
            return ToolResult::error("Missing required parameter: path");
        };
        let resolved = match confine_to_root(&self.workspace_root, path).await {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };

        match fs::read_to_string(&resolved).await {
            Ok(content) => {
                debug!("read_file: {} ({} bytes)", path, content.len());
                ToolResult::text(truncate(&content, MAX_READ))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                ToolResult::text(format!("File not found: {}", path))
            }
            Err(e) => ToolResult::error(format!("Failed to read {}: {}", path, e)),
        }
    }
}

pub struct WriteFileTool {
    workspace_root: PathBuf,
}

impl WriteFileTool {
    pub fn new(workspace_root: impl AsRef<Path>) -> Self {
        Self {
            workspace_root: workspace_root.as_ref().to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file in the workspace, creating parent directories \
         as needed. Overwrites existing files."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Workspace-relative file path" },
                "content": { "type": "string", "description": "Full file content" }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let Some(path) = path_arg(&args) else {
            return ToolResult::error("Missing required parameter: path");
        };
        let Some(content) = args.get("content").and_then(|v| v.as_str()) else {
            return ToolResult::error("Missing required parameter: content");
        };
        let resolved = match confine_to_root(&self.workspace_root, path).await {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };

        if let Some(parent) = resolved.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                return ToolResult::error(format!("Failed to create directories: {}", e));
            }
        }

        match fs::write(&resolved, content).await {
            Ok(()) => {
                debug!("write_file: {} ({} bytes)", path, content.len());
                ToolResult::text(format!("Wrote {} bytes to {}", content.len(), path))
            }
            Err(e) => ToolResult::error(format!("Failed to write {}: {}", path, e)),
        }
    }
}

pub struct ListFilesTool {
    workspace_root: PathBuf,
}

impl ListFilesTool {
    pub fn new(workspace_root: impl AsRef<Path>) -> Self {
        Self {
            workspace_root: workspace_root.as_ref().to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files in the workspace, optionally filtered by a glob pattern \
         such as 'src/**/*.rs'. Hidden entries and build output are skipped."
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string", "description": "Optional glob pattern" }
            }
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let matcher = match args.get("pattern").and_then(|v| v.as_str()) {
            Some(pattern) if !pattern.is_empty() => {
                match GlobBuilder::new(pattern).literal_separator(false).build() {
                    Ok(g) => Some(g.compile_matcher()),
                    Err(e) => return ToolResult::error(format!("Invalid glob pattern: {}", e)),
                }
            }
            _ => None,
        };

        let root = self.workspace_root.clone();
        let walk = tokio::task::spawn_blocking(move || {
            let mut files: Vec<String> = WalkDir::new(&root)
                .into_iter()
                .filter_entry(|e| {
                    let name = e.file_name().to_string_lossy();
                    e.depth() == 0
                        || (!name.starts_with('.') && name != "target" && name != "node_modules")
                })
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter_map(|e| {
                    let rel = e.path().strip_prefix(&root).ok()?.to_path_buf();
                    match &matcher {
                        Some(m) if !m.is_match(&rel) => None,
                        _ => Some(rel.to_string_lossy().replace('\\', "/")),
                    }
                })
                .collect();
            files.sort();
            files
        })
        .await;

        let files = match walk {
            Ok(files) => files,
            Err(e) => return ToolResult::error(format!("File listing failed: {}", e)),
        };

        debug!("list_files: {} matches", files.len());
        if files.is_empty() {
            return ToolResult::text("No files found");
        }
        let total = files.len();
        let mut listing = files.into_iter().take(MAX_LISTED).collect::<Vec<_>>().join("\n");
        if total > MAX_LISTED {
            listing.push_str(&format!("\n... [{} more]", total - MAX_LISTED));
        }
        ToolResult::text(listing)
    }
}
