//! Message domain types.
//!
//! These are the value objects that flow through the whole loop:
//! user request → worker reply (possibly with tool calls) → tool results →
//! evaluator feedback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata key marking where a message came from.
pub const SOURCE_KEY: &str = "source";
/// Metadata value for messages produced by the evaluator.
pub const EVALUATOR_SOURCE: &str = "evaluator";

/// Text that precedes the evaluator's feedback in the conversation.
pub const EVALUATOR_FEEDBACK_PREFIX: &str = "Evaluator Feedback on this answer: ";

/// Unique identifier for a session (one user's conversation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The assistant (worker output and evaluator feedback)
    Assistant,
    /// System instructions
    System,
    /// Tool execution result
    Tool,
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Optional metadata (tool name, success flag, message source)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    fn with_role(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content.into())
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content.into())
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content.into())
    }

    /// Create a tool result message.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        success: bool,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::with_role(Role::Tool, content.into());
        msg.tool_call_id = Some(tool_call_id.into());
        msg.metadata
            .insert("tool".into(), serde_json::Value::String(tool_name.into()));
        msg.metadata
            .insert("success".into(), serde_json::Value::Bool(success));
        msg
    }

    /// Create an evaluator feedback message.
    ///
    /// Stored with the assistant role so the worker model sees it as part of
    /// the dialogue, and tagged so it can be told apart from worker output.
    pub fn evaluator_feedback(feedback: &str) -> Self {
        let mut msg = Self::assistant(format!("{EVALUATOR_FEEDBACK_PREFIX}{feedback}"));
        msg.metadata.insert(
            SOURCE_KEY.into(),
            serde_json::Value::String(EVALUATOR_SOURCE.into()),
        );
        msg
    }

    /// Whether this message was produced by the evaluator.
    pub fn is_evaluator_feedback(&self) -> bool {
        self.metadata
            .get(SOURCE_KEY)
            .and_then(|v| v.as_str())
            .is_some_and(|s| s == EVALUATOR_SOURCE)
    }

    /// Whether this is an assistant message with pending tool calls.
    pub fn has_tool_calls(&self) -> bool {
        self.role == Role::Assistant && !self.tool_calls.is_empty()
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Unique ID for this tool call
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as JSON string
    pub arguments: String,
}
