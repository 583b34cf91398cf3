//! Python tool: run a snippet in a fresh interpreter subprocess.
//!
//! Each call is a separate process started in the sandbox directory, so no
//! state carries over between calls. Output is whatever the code prints.

use async_trait::async_trait;
use sidekick_core::error::ToolError;
use sidekick_core::tool::{Tool, ToolResult};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

pub struct PythonReplTool {
    command: String,
    working_dir: PathBuf,
    timeout: Duration,
}

impl PythonReplTool {
    pub fn new(command: impl Into<String>, working_dir: PathBuf, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            working_dir,
            timeout,
        }
    }
}

#[async_trait]
impl Tool for PythonReplTool {
    fn name(&self) -> &str {
        "python_repl"
    }

    fn description(&self) -> &str {
        "A Python shell. Use this to execute Python code. Input should be valid Python. If you want to see the output of a value, print it with print(...)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "Python source to execute"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let code = arguments["code"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'code' argument".into()))?;

        debug!(bytes = code.len(), "Running python snippet");

        let mut child = Command::new(&self.command)
            .arg("-")
            .current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "python_repl".into(),
                reason: format!("cannot start '{}': {e}", self.command),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(code.as_bytes())
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    tool_name: "python_repl".into(),
                    reason: e.to_string(),
                })?;
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: "python_repl".into(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Python snippet timed out");
                return Err(ToolError::Timeout {
                    tool_name: "python_repl".into(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            let text = if stderr.trim().is_empty() {
                stdout
            } else {
                format!("{stdout}\n[stderr]: {stderr}")
            };
            Ok(ToolResult::ok(text.trim().to_string()))
        } else {
            let code = output.status.code().unwrap_or(-1);
            Ok(ToolResult::failed(
                format!("[exit code: {code}]\n{stdout}\n{stderr}")
                    .trim()
                    .to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    fn tool(dir: &std::path::Path, timeout: Duration) -> PythonReplTool {
        PythonReplTool::new("python3", dir.to_path_buf(), timeout)
    }

    #[tokio::test]
    async fn runs_code_and_captures_stdout() {
        if !python_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let result = tool(dir.path(), Duration::from_secs(10))
            .execute(serde_json::json!({ "code": "print(6 * 7)" }))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "42");
    }

    #[tokio::test]
    async fn exceptions_are_failed_results() {
        if !python_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let result = tool(dir.path(), Duration::from_secs(10))
            .execute(serde_json::json!({ "code": "raise ValueError('boom')" }))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.contains("ValueError"));
    }

    #[tokio::test]
    async fn runs_in_working_dir() {
        if !python_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        tool(dir.path(), Duration::from_secs(10))
            .execute(serde_json::json!({ "code": "open('out.txt', 'w').write('hi')" }))
            .await
            .unwrap();
        assert!(dir.path().join("out.txt").exists());
    }

    #[tokio::test]
    async fn slow_code_times_out() {
        if !python_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let result = tool(dir.path(), Duration::from_millis(300))
            .execute(serde_json::json!({ "code": "import time; time.sleep(5)" }))
            .await;
        assert!(matches!(result, Err(ToolError::Timeout { .. })));
    }

    #[tokio::test]
    async fn missing_interpreter_is_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = PythonReplTool::new(
            "definitely-not-a-python-binary",
            dir.path().to_path_buf(),
            Duration::from_secs(1),
        )
        .execute(serde_json::json!({ "code": "print(1)" }))
        .await;
        assert!(matches!(result, Err(ToolError::ExecutionFailed { .. })));
    }
}
