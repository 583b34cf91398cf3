//! File write tool: write or append to a file inside the sandbox.

use crate::sandbox::Sandbox;
use async_trait::async_trait;
use sidekick_core::error::ToolError;
use sidekick_core::tool::{Tool, ToolResult};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

pub struct WriteFileTool {
    sandbox: Arc<Sandbox>,
}

impl WriteFileTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write text to a file in the sandbox directory. Creates parent directories as needed. Set append to true to add to the end instead of overwriting."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path of the file, relative to the sandbox"
                },
                "text": {
                    "type": "string",
                    "description": "Text to write"
                },
                "append": {
                    "type": "boolean",
                    "description": "Append instead of overwriting (default false)",
                    "default": false
                }
            },
            "required": ["file_path", "text"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let file_path = arguments["file_path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'file_path' argument".into()))?;
        let text = arguments["text"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'text' argument".into()))?;
        let append = arguments["append"].as_bool().unwrap_or(false);

        let path = self.sandbox.resolve(file_path)?;

        if let Some(parent) = path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Ok(ToolResult::failed(format!(
                "Failed to create directories: {e}"
            )));
        }

        let written = if append {
            match tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
            {
                Ok(mut file) => file.write_all(text.as_bytes()).await,
                Err(e) => Err(e),
            }
        } else {
            tokio::fs::write(&path, text).await
        };

        match written {
            Ok(()) => Ok(ToolResult::ok(format!(
                "File written successfully to {file_path}."
            ))),
            Err(e) => Ok(ToolResult::failed(format!("Failed to write file: {e}"))),
        }
    }
}
