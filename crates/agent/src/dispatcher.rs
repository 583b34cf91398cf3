//! Tool dispatcher: runs the worker's tool calls.
//!
//! Every call yields exactly one result, in request order. Unknown tools,
//! bad arguments, tool errors, timeouts and panics all become failure
//! results that the worker can read and react to.

use futures::FutureExt;
use futures::future::join_all;
use sidekick_core::error::ToolError;
use sidekick_core::message::{Message, MessageToolCall};
use sidekick_core::tool::{ToolCall, ToolRegistry};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// The outcome of one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedCall {
    pub call_id: String,
    pub name: String,
    pub success: bool,
    pub output: String,
    pub duration_ms: u64,
}

impl DispatchedCall {
    pub fn to_message(&self) -> Message {
        Message::tool_result(&self.call_id, &self.name, self.success, &self.output)
    }
}

pub struct ToolDispatcher {
    tools: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            tools,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Execute a batch concurrently; results come back in request order.
    pub async fn dispatch(&self, calls: &[MessageToolCall]) -> Vec<DispatchedCall> {
        debug!(count = calls.len(), "Dispatching tool calls");
        join_all(calls.iter().map(|call| self.dispatch_one(call))).await
    }

    async fn dispatch_one(&self, call: &MessageToolCall) -> DispatchedCall {
        let start = Instant::now();
        let outcome = match parse_arguments(&call.arguments) {
            Ok(arguments) => {
                let tool_call = ToolCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments,
                };
                self.execute_guarded(&tool_call).await
            }
            Err(e) => Err(e),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let (success, output) = match outcome {
            Ok(result) => (result.success, result.output),
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool call failed");
                (false, format!("Error: {e}"))
            }
        };

        DispatchedCall {
            call_id: call.id.clone(),
            name: call.name.clone(),
            success,
            output,
            duration_ms,
        }
    }

    async fn execute_guarded(
        &self,
        call: &ToolCall,
    ) -> Result<sidekick_core::tool::ToolResult, ToolError> {
        let guarded = AssertUnwindSafe(self.tools.execute(call)).catch_unwind();
        match tokio::time::timeout(self.timeout, guarded).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(ToolError::ExecutionFailed {
                tool_name: call.name.clone(),
                reason: format!("tool panicked: {}", panic_message(panic.as_ref())),
            }),
            Err(_) => Err(ToolError::Timeout {
                tool_name: call.name.clone(),
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }
}

/// Models send arguments as a JSON string; an empty string means `{}`.
fn parse_arguments(raw: &str) -> Result<serde_json::Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(raw).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}
