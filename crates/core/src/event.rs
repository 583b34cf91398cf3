//! Run events: a per-run feed of what the loop is doing.
//!
//! The orchestrator emits one event per stage outcome. The gateway forwards
//! them to the browser over SSE; the CLI ignores them.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::state::Verdict;

/// Events emitted during a single run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// The worker replied; `tool_calls` lists requested tool names.
    WorkerReply {
        iteration: u32,
        content: String,
        tool_calls: Vec<String>,
    },

    /// One tool call finished.
    ToolResult {
        call_id: String,
        name: String,
        success: bool,
        output: String,
        duration_ms: u64,
    },

    /// The evaluator judged the last reply.
    Evaluation { verdict: Verdict, feedback: String },

    /// The run is over.
    Halted {
        reason: String,
        reply: String,
        feedback: String,
        needs_user_input: bool,
        iterations: u32,
    },

    /// The run failed and could not continue.
    Error { message: String },
}

impl RunEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::WorkerReply { .. } => "worker_reply",
            Self::ToolResult { .. } => "tool_result",
            Self::Evaluation { .. } => "evaluation",
            Self::Halted { .. } => "halted",
            Self::Error { .. } => "error",
        }
    }
}

/// Optional destination for run events.
///
/// Sending never blocks the loop on a slow consumer beyond channel capacity,
/// and a dropped receiver is ignored.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<mpsc::Sender<RunEvent>>,
}

impl EventSink {
    /// A sink that discards everything.
    pub fn none() -> Self {
        Self { sender: None }
    }

    /// Create a sink together with its receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RunEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { sender: Some(tx) }, rx)
    }

    pub async fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.sender {
            // Receiver gone = nobody is watching
            let _ = tx.send(event).await;
        }
    }

    /// Resolves once the receiving end has been dropped. Never resolves for
    /// a sink created with [`EventSink::none`].
    pub async fn closed(&self) {
        match &self.sender {
            Some(tx) => tx.closed().await,
            None => std::future::pending().await,
        }
    }
}
