//! Evaluator: judges the worker's latest answer against the criteria.

use crate::prompts;
use crate::retry::RetryPolicy;
use crate::stuck::StuckDetector;
use serde::Deserialize;
use sidekick_core::error::ProviderError;
use sidekick_core::message::Message;
use sidekick_core::provider::{Provider, ProviderRequest, ResponseFormat};
use sidekick_core::state::{ConversationState, EvaluatorVerdict, Verdict};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Feedback used when the model's verdict cannot be parsed.
pub const UNREADABLE_VERDICT_FEEDBACK: &str =
    "The evaluation could not be read. Review the success criteria and try again.";

/// Feedback used when the worker keeps giving the same answer.
pub const STUCK_FEEDBACK: &str = "The assistant has given essentially the same answer several times without meeting the success criteria. More input from the user is needed to make progress.";

/// The JSON object the evaluator model is asked to produce.
#[derive(Debug, Deserialize)]
struct EvaluatorOutput {
    feedback: String,
    success_criteria_met: bool,
    user_input_needed: bool,
}

/// `success_criteria_met` wins over `user_input_needed` for the verdict; the
/// user-input flag is carried along regardless.
impl From<EvaluatorOutput> for EvaluatorVerdict {
    fn from(output: EvaluatorOutput) -> Self {
        let verdict = if output.success_criteria_met {
            Verdict::Done
        } else if output.user_input_needed {
            Verdict::NeedsUserInput
        } else {
            Verdict::Continue
        };
        EvaluatorVerdict::new(verdict, output.feedback)
            .with_user_input_needed(output.user_input_needed)
    }
}

fn verdict_schema() -> ResponseFormat {
    ResponseFormat::JsonSchema {
        name: "evaluator_output".into(),
        schema: serde_json::json!({
            "type": "object",
            "properties": {
                "feedback": {
                    "type": "string",
                    "description": "Feedback on the assistant's response"
                },
                "success_criteria_met": {
                    "type": "boolean",
                    "description": "Whether the success criteria have been met"
                },
                "user_input_needed": {
                    "type": "boolean",
                    "description": "True if more input is needed from the user, or clarifications, or the assistant is stuck"
                }
            },
            "required": ["feedback", "success_criteria_met", "user_input_needed"],
            "additionalProperties": false
        }),
    }
}

/// Parse the model's reply. Tolerates a Markdown code fence around the JSON.
pub fn parse_verdict(content: &str) -> Option<EvaluatorVerdict> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();
    serde_json::from_str::<EvaluatorOutput>(body)
        .ok()
        .map(EvaluatorVerdict::from)
}

pub struct Evaluator {
    provider: Arc<dyn Provider>,
    model: String,
    retry: RetryPolicy,
    stuck: StuckDetector,
}

impl Evaluator {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            retry: RetryPolicy::default(),
            stuck: StuckDetector::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_stuck_detector(mut self, stuck: StuckDetector) -> Self {
        self.stuck = stuck;
        self
    }

    pub fn build_request(&self, state: &ConversationState) -> ProviderRequest {
        let messages = vec![
            Message::system(prompts::EVALUATOR_SYSTEM_PROMPT),
            Message::user(prompts::evaluator_user_prompt(state)),
        ];
        let mut request = ProviderRequest::new(&self.model, messages);
        request.temperature = 0.0;
        request.response_format = Some(verdict_schema());
        request
    }

    /// Judge the latest worker answer.
    ///
    /// Repeated answers short-circuit to `NeedsUserInput` without a model
    /// call. Unreadable model output becomes `Continue`.
    pub async fn evaluate(
        &self,
        state: &ConversationState,
    ) -> Result<EvaluatorVerdict, ProviderError> {
        if self.stuck.is_stuck(&state.attempts) {
            info!(
                session = %state.session_id,
                attempts = state.attempts.len(),
                "Worker is repeating itself, asking for user input"
            );
            return Ok(EvaluatorVerdict::new(Verdict::NeedsUserInput, STUCK_FEEDBACK));
        }

        let request = self.build_request(state);
        debug!(session = %state.session_id, model = %self.model, "Evaluator calling model");

        let response = self
            .retry
            .run("evaluator", || self.provider.complete(request.clone()))
            .await?;

        match parse_verdict(&response.message.content) {
            Some(verdict) => Ok(verdict),
            None => {
                warn!(
                    session = %state.session_id,
                    content = %response.message.content,
                    "Unreadable evaluator output, continuing"
                );
                Ok(EvaluatorVerdict::new(
                    Verdict::Continue,
                    UNREADABLE_VERDICT_FEEDBACK,
                ))
            }
        }
    }
}
