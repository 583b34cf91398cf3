//! # Sidekick Core
//!
//! Domain types, traits, and error definitions for the Sidekick assistant
//! runtime. Apart from serde and tokio channels it has no dependencies; it defines the
//! domain model that the provider, tool, agent, and gateway crates
//! implement against.
//!
//! ## Design Philosophy
//!
//! Every external capability (model inference, tools) is a trait here.
//! Implementations live in their respective crates, which keeps the
//! worker/evaluator loop testable with scripted stubs.

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod state;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{EventSink, RunEvent};
pub use message::{Message, MessageToolCall, Role, SessionId};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ResponseFormat, ToolDefinition};
pub use state::{ConversationState, EvaluatorVerdict, SuccessCriteria, Verdict};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
