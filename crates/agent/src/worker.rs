//! Worker: asks the model for the next step: an answer or tool calls.

use crate::prompts;
use crate::retry::RetryPolicy;
use chrono::Local;
use sidekick_core::error::ProviderError;
use sidekick_core::message::{Message, Role};
use sidekick_core::provider::{Provider, ProviderRequest, ToolDefinition};
use sidekick_core::state::ConversationState;
use std::sync::Arc;
use tracing::debug;

pub struct Worker {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    retry: RetryPolicy,
}

impl Worker {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build the request for one worker call. The system prompt is
    /// prepended here and never stored in the conversation.
    pub fn build_request(
        &self,
        state: &ConversationState,
        tools: &[ToolDefinition],
    ) -> ProviderRequest {
        let system = prompts::worker_system_prompt(
            state.success_criteria.as_str(),
            state.feedback.as_deref(),
            Local::now(),
        );

        let mut messages = Vec::with_capacity(state.messages.len() + 1);
        messages.push(Message::system(system));
        messages.extend(
            state
                .messages
                .iter()
                .filter(|m| m.role != Role::System)
                .cloned(),
        );

        ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: tools.to_vec(),
            response_format: None,
        }
    }

    /// Produce the next assistant message. The caller appends it.
    pub async fn step(
        &self,
        state: &ConversationState,
        tools: &[ToolDefinition],
    ) -> Result<Message, ProviderError> {
        let request = self.build_request(state, tools);
        debug!(
            session = %state.session_id,
            model = %self.model,
            messages = request.messages.len(),
            "Worker calling model"
        );

        let response = self
            .retry
            .run("worker", || self.provider.complete(request.clone()))
            .await?;

        let mut message = response.message;
        message.role = Role::Assistant;
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{SequentialMockProvider, make_text_response};
    use sidekick_core::message::SessionId;
    use sidekick_core::state::{EvaluatorVerdict, SuccessCriteria, Verdict};

    fn state_with_request(text: &str) -> ConversationState {
        let mut state = ConversationState::new(SessionId::new());
        state.begin_run(text, SuccessCriteria::new("Be brief"));
        state
    }

    #[test]
    fn request_prepends_fresh_system_prompt() {
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let worker = Worker::new(provider, "gpt-4o-mini");
        let state = state_with_request("Hi");

        let request = worker.build_request(&state, &[]);
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, Role::System);
        assert!(request.messages[0].content.contains("Be brief"));
        assert_eq!(request.messages[1].content, "Hi");
        assert!(request.response_format.is_none());
        // State is untouched
        assert_eq!(state.messages.len(), 1);
    }

    #[test]
    fn feedback_reaches_the_prompt() {
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let worker = Worker::new(provider, "m");
        let mut state = state_with_request("Hi");
        state.push(Message::assistant("Hello"));
        state.fold_verdict(&EvaluatorVerdict::new(Verdict::Continue, "Say more"));

        let request = worker.build_request(&state, &[]);
        assert!(request.messages[0].content.contains("Say more"));
        assert!(request.messages.last().unwrap().is_evaluator_feedback());
    }

    #[tokio::test]
    async fn step_returns_model_message() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_text_response("Hello!")]));
        let worker = Worker::new(provider.clone(), "m").with_retry(RetryPolicy::none());

        let reply = worker.step(&state_with_request("Hi"), &[]).await.unwrap();
        assert_eq!(reply.content, "Hello!");
        assert_eq!(provider.call_count(), 1);
    }
}
