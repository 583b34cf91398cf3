//! File management tools: copy, move and delete inside the sandbox.

use crate::sandbox::Sandbox;
use async_trait::async_trait;
use sidekick_core::error::ToolError;
use sidekick_core::tool::{Tool, ToolResult};
use std::path::PathBuf;
use std::sync::Arc;

fn str_arg<'a>(arguments: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    arguments[key]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

fn transfer_schema(verb: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "source_path": {
                "type": "string",
                "description": format!("File to {verb}, relative to the sandbox")
            },
            "destination_path": {
                "type": "string",
                "description": "Destination, relative to the sandbox"
            }
        },
        "required": ["source_path", "destination_path"]
    })
}

/// Resolve both ends of a copy/move and create the destination's parent.
async fn resolve_transfer(
    sandbox: &Sandbox,
    arguments: &serde_json::Value,
) -> Result<(PathBuf, PathBuf), ToolError> {
    let source = sandbox.resolve(str_arg(arguments, "source_path")?)?;
    let destination = sandbox.resolve(str_arg(arguments, "destination_path")?)?;
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "file transfer".into(),
                reason: format!("cannot create destination directory: {e}"),
            })?;
    }
    Ok((source, destination))
}

pub struct CopyFileTool {
    sandbox: Arc<Sandbox>,
}

impl CopyFileTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for CopyFileTool {
    fn name(&self) -> &str {
        "copy_file"
    }

    fn description(&self) -> &str {
        "Copy a file within the sandbox directory."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        transfer_schema("copy")
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let (source, destination) = resolve_transfer(&self.sandbox, &arguments).await?;
        let (from, to) = (self.sandbox.display(&source), self.sandbox.display(&destination));

        match tokio::fs::copy(&source, &destination).await {
            Ok(_) => Ok(ToolResult::ok(format!(
                "File copied successfully from {from} to {to}."
            ))),
            Err(e) => Ok(ToolResult::failed(format!("Error: {e}"))),
        }
    }
}

pub struct MoveFileTool {
    sandbox: Arc<Sandbox>,
}

impl MoveFileTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for MoveFileTool {
    fn name(&self) -> &str {
        "move_file"
    }

    fn description(&self) -> &str {
        "Move or rename a file within the sandbox directory."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        transfer_schema("move")
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let (source, destination) = resolve_transfer(&self.sandbox, &arguments).await?;
        let (from, to) = (self.sandbox.display(&source), self.sandbox.display(&destination));

        if !source.exists() {
            return Ok(ToolResult::failed(format!(
                "Error: no such file or directory {from}."
            )));
        }

        match tokio::fs::rename(&source, &destination).await {
            Ok(()) => Ok(ToolResult::ok(format!(
                "File moved successfully from {from} to {to}."
            ))),
            Err(e) => Ok(ToolResult::failed(format!("Error: {e}"))),
        }
    }
}

pub struct DeleteFileTool {
    sandbox: Arc<Sandbox>,
}

impl DeleteFileTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &str {
        "file_delete"
    }

    fn description(&self) -> &str {
        "Delete a file from the sandbox directory."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path of the file, relative to the sandbox"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let file_path = str_arg(&arguments, "file_path")?;
        let path = self.sandbox.resolve(file_path)?;

        if path == self.sandbox.root() {
            return Err(ToolError::SandboxViolation(
                "refusing to delete the sandbox root".into(),
            ));
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(ToolResult::ok(format!(
                "File deleted successfully: {file_path}."
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ToolResult::failed(format!(
                "Error: no such file or directory: {file_path}"
            ))),
            Err(e) => Ok(ToolResult::failed(format!("Error: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, Arc<Sandbox>) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("draft.txt"), "draft").unwrap();
        let sandbox = Arc::new(Sandbox::new(dir.path()).unwrap());
        (dir, sandbox)
    }

    #[tokio::test]
    async fn copy_into_new_directory() {
        let (dir, sandbox) = setup();
        let result = CopyFileTool::new(sandbox)
            .execute(serde_json::json!({
                "source_path": "draft.txt",
                "destination_path": "backup/draft.txt"
            }))
            .await
            .unwrap();

        assert!(result.success, "{}", result.output);
        assert!(dir.path().join("draft.txt").exists());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("backup/draft.txt")).unwrap(),
            "draft"
        );
    }

    #[tokio::test]
    async fn move_renames() {
        let (dir, sandbox) = setup();
        let result = MoveFileTool::new(sandbox)
            .execute(serde_json::json!({
                "source_path": "draft.txt",
                "destination_path": "final.txt"
            }))
            .await
            .unwrap();

        assert!(result.success);
        assert!(!dir.path().join("draft.txt").exists());
        assert!(dir.path().join("final.txt").exists());
    }

    #[tokio::test]
    async fn move_missing_source_fails() {
        let (_dir, sandbox) = setup();
        let result = MoveFileTool::new(sandbox)
            .execute(serde_json::json!({
                "source_path": "ghost.txt",
                "destination_path": "final.txt"
            }))
            .await
            .unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn delete_file() {
        let (dir, sandbox) = setup();
        let tool = DeleteFileTool::new(sandbox);
        let result = tool
            .execute(serde_json::json!({ "file_path": "draft.txt" }))
            .await
            .unwrap();
        assert!(result.success);
        assert!(!dir.path().join("draft.txt").exists());

        let again = tool
            .execute(serde_json::json!({ "file_path": "draft.txt" }))
            .await
            .unwrap();
        assert!(!again.success);
    }

    #[tokio::test]
    async fn delete_root_refused() {
        let (_dir, sandbox) = setup();
        let result = DeleteFileTool::new(sandbox)
            .execute(serde_json::json!({ "file_path": "." }))
            .await;
        assert!(matches!(result, Err(ToolError::SandboxViolation(_))));
    }

    #[tokio::test]
    async fn copy_out_of_sandbox_blocked() {
        let (_dir, sandbox) = setup();
        let result = CopyFileTool::new(sandbox)
            .execute(serde_json::json!({
                "source_path": "draft.txt",
                "destination_path": "../draft.txt"
            }))
            .await;
        assert!(matches!(result, Err(ToolError::SandboxViolation(_))));
    }
}
