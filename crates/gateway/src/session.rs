//! In-memory chat sessions.
//!
//! Each browser tab gets a session holding the loop's conversation state
//! and the transcript shown in the chat window. A run works on a copy of
//! the state; the result is committed only if the session was not reset
//! or committed by someone else in the meantime. Resetting, deleting or
//! evicting a session also cancels the runs still working on it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sidekick_agent::{HaltReason, RunOutcome};
use sidekick_core::message::SessionId;
use sidekick_core::state::ConversationState;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Who a transcript line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
    Evaluator,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptEntry {
    pub role: Speaker,
    pub content: String,
}

impl TranscriptEntry {
    fn new(role: Speaker, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub state: ConversationState,
    pub transcript: Vec<TranscriptEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every commit or reset
    revision: u64,
    /// Parent of the tokens handed to runs on this session
    runs: CancellationToken,
}

impl Session {
    fn new(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            state: ConversationState::new(id),
            transcript: Vec::new(),
            created_at: now,
            updated_at: now,
            revision: 0,
            runs: CancellationToken::new(),
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// A token for a new run; it fires when the session is reset or dropped.
    pub fn run_token(&self) -> CancellationToken {
        self.runs.child_token()
    }

    /// Cancel every run currently working on this session.
    pub fn cancel_runs(&mut self) {
        self.runs.cancel();
        self.runs = CancellationToken::new();
    }

    /// Clear both the loop state and the visible transcript, cancelling any
    /// run in progress.
    pub fn reset(&mut self) {
        self.cancel_runs();
        self.state.reset();
        self.transcript.clear();
        self.revision += 1;
        self.updated_at = Utc::now();
    }
}

/// A finished run that could not be folded into its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommitError {
    #[error("session no longer exists")]
    NotFound,
    #[error("session was reset or updated while the run was in progress")]
    Stale,
    #[error("run was cancelled before it finished")]
    Cancelled,
}

/// Bounded map of sessions. The least recently updated session is evicted
/// when a new one would exceed the limit.
#[derive(Debug)]
pub struct SessionStore {
    sessions: HashMap<String, Session>,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            max_sessions: max_sessions.max(1),
        }
    }

    /// Create a session and return its id.
    pub fn create(&mut self) -> String {
        if self.sessions.len() >= self.max_sessions {
            if let Some(oldest) = self
                .sessions
                .iter()
                .min_by_key(|(_, s)| s.updated_at)
                .map(|(k, _)| k.clone())
            {
                info!(session = %oldest, "Evicting least recently used session");
                self.remove(&oldest);
            }
        }

        let id = SessionId::new();
        let key = id.to_string();
        self.sessions.insert(key.clone(), Session::new(id));
        debug!(session = %key, total = self.sessions.len(), "Session created");
        key
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    /// Drop a session and cancel its runs.
    pub fn remove(&mut self, id: &str) -> Option<Session> {
        let mut session = self.sessions.remove(id)?;
        session.cancel_runs();
        Some(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Fold a finished run into the session: new state plus the
    /// user / reply / feedback lines of the transcript.
    pub fn commit(
        &mut self,
        id: &str,
        revision: u64,
        user_message: &str,
        outcome: &RunOutcome,
    ) -> Result<&Session, CommitError> {
        let session = self.sessions.get_mut(id).ok_or(CommitError::NotFound)?;
        if session.revision != revision {
            return Err(CommitError::Stale);
        }
        if outcome.halt_reason == HaltReason::Cancelled {
            return Err(CommitError::Cancelled);
        }

        session.state = outcome.state.clone();
        session.transcript.extend([
            TranscriptEntry::new(Speaker::User, user_message),
            TranscriptEntry::new(Speaker::Assistant, outcome.reply.as_str()),
            TranscriptEntry::new(
                Speaker::Evaluator,
                format!(
                    "{}{}",
                    sidekick_core::message::EVALUATOR_FEEDBACK_PREFIX,
                    outcome.feedback
                ),
            ),
        ]);
        session.revision += 1;
        session.updated_at = Utc::now();
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(state: ConversationState, reply: &str) -> RunOutcome {
        RunOutcome {
            reply: reply.into(),
            feedback: "Looks good".into(),
            needs_user_input: false,
            halt_reason: HaltReason::SuccessCriteriaMet,
            iterations: 1,
            state,
        }
    }

    #[test]
    fn create_get_remove() {
        let mut store = SessionStore::new(4);
        let id = store.create();
        assert!(store.get(&id).is_some());
        assert_eq!(store.get(&id).unwrap().state.session_id.to_string(), id);
        assert!(store.remove(&id).is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn evicts_least_recently_updated() {
        let mut store = SessionStore::new(2);
        let first = store.create();
        let second = store.create();
        store.get_mut(&first).unwrap().reset();
        let third = store.create();

        assert_eq!(store.len(), 2);
        assert!(store.get(&first).is_some());
        assert!(store.get(&second).is_none());
        assert!(store.get(&third).is_some());
    }

    #[test]
    fn commit_appends_three_transcript_lines() {
        let mut store = SessionStore::new(4);
        let id = store.create();
        let mut state = store.get(&id).unwrap().state.clone();
        state.begin_run("hi", Default::default());

        let session = store.commit(&id, 0, "hi", &outcome(state, "hello")).unwrap();
        let roles: Vec<Speaker> = session.transcript.iter().map(|e| e.role).collect();
        assert_eq!(roles, [Speaker::User, Speaker::Assistant, Speaker::Evaluator]);
        assert_eq!(session.transcript[1].content, "hello");
        assert!(session.transcript[2].content.ends_with("Looks good"));
        assert_eq!(session.state.messages.len(), 1);
        assert_eq!(session.revision(), 1);
    }

    #[test]
    fn commit_after_reset_is_stale() {
        let mut store = SessionStore::new(4);
        let id = store.create();
        let state = store.get(&id).unwrap().state.clone();
        store.get_mut(&id).unwrap().reset();

        let err = store
            .commit(&id, 0, "hi", &outcome(state, "hello"))
            .unwrap_err();
        assert_eq!(err, CommitError::Stale);
        assert!(store.get(&id).unwrap().transcript.is_empty());
    }

    #[test]
    fn commit_to_missing_session() {
        let mut store = SessionStore::new(4);
        let err = store
            .commit("nope", 0, "hi", &outcome(ConversationState::default(), "x"))
            .unwrap_err();
        assert_eq!(err, CommitError::NotFound);
    }

    #[test]
    fn reset_and_remove_cancel_running_work() {
        let mut store = SessionStore::new(4);
        let id = store.create();
        let first = store.get(&id).unwrap().run_token();

        store.get_mut(&id).unwrap().reset();
        assert!(first.is_cancelled());

        // Runs started after a reset get a live token
        let second = store.get(&id).unwrap().run_token();
        assert!(!second.is_cancelled());

        store.remove(&id);
        assert!(second.is_cancelled());
    }

    #[test]
    fn eviction_cancels_running_work() {
        let mut store = SessionStore::new(1);
        let id = store.create();
        let token = store.get(&id).unwrap().run_token();
        store.create();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancelled_run_is_not_committed() {
        let mut store = SessionStore::new(4);
        let id = store.create();
        let state = store.get(&id).unwrap().state.clone();
        let mut cancelled = outcome(state, "partial");
        cancelled.halt_reason = HaltReason::Cancelled;

        let err = store.commit(&id, 0, "hi", &cancelled).unwrap_err();
        assert_eq!(err, CommitError::Cancelled);
        assert!(store.get(&id).unwrap().transcript.is_empty());
    }
}
