//! Conversation state carried through one run of the worker/evaluator loop.

use crate::message::{Message, Role, SessionId};
use serde::{Deserialize, Serialize};

/// Criteria used when the user leaves the field blank.
pub const DEFAULT_SUCCESS_CRITERIA: &str = "The answer should be clear and accurate";

/// What the user considers a finished task. Fixed for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessCriteria(String);

impl SuccessCriteria {
    /// Blank input falls back to [`DEFAULT_SUCCESS_CRITERIA`].
    pub fn new(criteria: impl Into<String>) -> Self {
        let criteria = criteria.into();
        let trimmed = criteria.trim();
        if trimmed.is_empty() {
            Self(DEFAULT_SUCCESS_CRITERIA.to_string())
        } else {
            Self(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SuccessCriteria {
    fn default() -> Self {
        Self(DEFAULT_SUCCESS_CRITERIA.to_string())
    }
}

impl std::fmt::Display for SuccessCriteria {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The evaluator's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Criteria unmet; send the worker back with feedback.
    Continue,
    /// The assistant is blocked on the user.
    NeedsUserInput,
    /// The last answer satisfies the criteria.
    Done,
}

impl Verdict {
    /// Whether this verdict ends the run.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Continue)
    }
}

/// A verdict plus the human-readable reasoning behind it.
///
/// `user_input_needed` is kept next to the verdict: an evaluator may accept
/// the answer and still ask for the user (for example when the answer ends
/// in a question). `Done` decides how the run halts; the flag is reported
/// to the caller either way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorVerdict {
    pub verdict: Verdict,
    pub feedback: String,
    #[serde(default)]
    pub user_input_needed: bool,
}

impl EvaluatorVerdict {
    pub fn new(verdict: Verdict, feedback: impl Into<String>) -> Self {
        Self {
            verdict,
            feedback: feedback.into(),
            user_input_needed: verdict == Verdict::NeedsUserInput,
        }
    }

    /// Raise the user-input flag without changing the verdict.
    pub fn with_user_input_needed(mut self, needed: bool) -> Self {
        self.user_input_needed |= needed;
        self
    }
}

/// Everything the loop knows about one session.
///
/// Messages are append-only within a run; only [`ConversationState::reset`]
/// discards them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub session_id: SessionId,

    /// Ordered conversation history (no system prompt; that is rebuilt per call)
    pub messages: Vec<Message>,

    pub success_criteria: SuccessCriteria,

    /// Feedback from the most recent evaluation in this run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,

    pub needs_user_input: bool,

    /// Final worker answers produced during the current run, oldest first
    #[serde(default)]
    pub attempts: Vec<String>,
}

impl ConversationState {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            messages: Vec::new(),
            success_criteria: SuccessCriteria::default(),
            feedback: None,
            needs_user_input: false,
            attempts: Vec::new(),
        }
    }

    /// Start a new run: fix the criteria, clear per-run evaluation state and
    /// append the user's request. Earlier history is kept.
    pub fn begin_run(&mut self, user_message: impl Into<String>, criteria: SuccessCriteria) {
        self.success_criteria = criteria;
        self.feedback = None;
        self.needs_user_input = false;
        self.attempts.clear();
        self.messages.push(Message::user(user_message));
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The most recent assistant message written by the worker.
    pub fn last_worker_reply(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant && !m.is_evaluator_feedback())
    }

    /// Record the evaluator's verdict: feedback message, feedback string and
    /// the needs-user-input flag.
    pub fn fold_verdict(&mut self, verdict: &EvaluatorVerdict) {
        self.messages
            .push(Message::evaluator_feedback(&verdict.feedback));
        self.feedback = Some(verdict.feedback.clone());
        self.needs_user_input = verdict.user_input_needed;
    }

    /// Discard all history, keeping the session id.
    pub fn reset(&mut self) {
        *self = Self::new(self.session_id.clone());
    }
}

impl Default for ConversationState {
    /// A fresh conversation under a new session id.
    fn default() -> Self {
        Self::new(SessionId::new())
    }
}
