//! Directory tools: list a sandbox directory and search it by filename.

use crate::sandbox::Sandbox;
use async_trait::async_trait;
use sidekick_core::error::ToolError;
use sidekick_core::tool::{Tool, ToolResult};
use std::path::PathBuf;
use std::sync::Arc;

/// Upper bound on matches returned by `file_search`.
const MAX_SEARCH_RESULTS: usize = 200;

pub struct ListDirectoryTool {
    sandbox: Arc<Sandbox>,
}

impl ListDirectoryTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List files and directories in a sandbox directory. Directories are shown with a trailing slash."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "dir_path": {
                    "type": "string",
                    "description": "Directory relative to the sandbox (default: the sandbox root)",
                    "default": "."
                }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let dir_path = arguments["dir_path"].as_str().unwrap_or(".");
        let dir = self.sandbox.resolve(dir_path)?;

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                return Ok(ToolResult::failed(format!(
                    "Error: cannot list directory {dir_path}: {e}"
                )));
            }
        };

        let mut names = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let mut name = entry.file_name().to_string_lossy().to_string();
            if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                name.push('/');
            }
            names.push(name);
        }
        names.sort();

        if names.is_empty() {
            return Ok(ToolResult::ok(format!("No files found in directory {dir_path}")));
        }

        Ok(ToolResult::ok(names.join("\n")).with_data(serde_json::json!(names)))
    }
}

pub struct FileSearchTool {
    sandbox: Arc<Sandbox>,
}

impl FileSearchTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for FileSearchTool {
    fn name(&self) -> &str {
        "file_search"
    }

    fn description(&self) -> &str {
        "Recursively search for files whose name matches a pattern. Supports * and ? wildcards; a pattern without wildcards matches any name containing it."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Filename pattern, e.g. *.txt"
                },
                "dir_path": {
                    "type": "string",
                    "description": "Directory to search, relative to the sandbox (default: the sandbox root)",
                    "default": "."
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let pattern = arguments["pattern"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'pattern' argument".into()))?;
        let dir_path = arguments["dir_path"].as_str().unwrap_or(".");
        let start = self.sandbox.resolve(dir_path)?;

        let mut matches = Vec::new();
        let mut pending: Vec<PathBuf> = vec![start];

        while let Some(dir) = pending.pop() {
            let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
                continue;
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                let Ok(file_type) = entry.file_type().await else {
                    continue;
                };
                // Symlinks are not followed
                if file_type.is_dir() {
                    pending.push(path.clone());
                }
                let name = entry.file_name().to_string_lossy().to_string();
                if matches_pattern(pattern, &name) {
                    matches.push(self.sandbox.display(&path));
                }
            }
            if matches.len() >= MAX_SEARCH_RESULTS {
                break;
            }
        }

        matches.sort();
        matches.truncate(MAX_SEARCH_RESULTS);

        if matches.is_empty() {
            return Ok(ToolResult::ok(format!(
                "No files found for pattern {pattern} in directory {dir_path}"
            )));
        }

        Ok(ToolResult::ok(matches.join("\n")).with_data(serde_json::json!(matches)))
    }
}

/// Case-insensitive filename match with `*` and `?` wildcards.
fn matches_pattern(pattern: &str, name: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let name = name.to_lowercase();
    if !pattern.contains(['*', '?']) {
        return name.contains(&pattern);
    }
    wildcard_match(
        &pattern.chars().collect::<Vec<_>>(),
        &name.chars().collect::<Vec<_>>(),
    )
}

fn wildcard_match(pattern: &[char], text: &[char]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}
