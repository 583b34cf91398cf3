//! The orchestrator: drives worker, tools and evaluator to a halt.
//!
//! A run is an explicit state machine:
//!
//! ```text
//! AwaitingWorker     --(no tool calls)-------------> AwaitingEvaluation
//! AwaitingWorker     --(tool calls)----------------> AwaitingTools
//! AwaitingTools      --(results appended)----------> AwaitingWorker
//! AwaitingTools      --(same calls again)----------> Halted
//! AwaitingEvaluation --(continue)------------------> AwaitingWorker
//! AwaitingEvaluation --(done | needs user input)---> Halted
//! ```
//!
//! Any move back to `AwaitingWorker` once the worker has been invoked
//! `max_iterations` times halts the run instead. A run can also be
//! cancelled through a [`CancellationToken`]; the token is checked before
//! every stage and raced against model calls.

use crate::dispatcher::ToolDispatcher;
use crate::evaluator::Evaluator;
use crate::retry::RetryPolicy;
use crate::router::{self, Route};
use crate::evaluator::STUCK_FEEDBACK;
use crate::stuck::{self, StuckDetector};
use crate::worker::Worker;
use serde::{Deserialize, Serialize};
use sidekick_config::AppConfig;
use sidekick_core::error::Error;
use sidekick_core::event::{EventSink, RunEvent};
use sidekick_core::message::Message;
use sidekick_core::provider::Provider;
use sidekick_core::state::{ConversationState, EvaluatorVerdict, SuccessCriteria, Verdict};
use sidekick_core::tool::ToolRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Output given to tool calls that never ran because the run was cancelled.
pub const CANCELLED_TOOL_OUTPUT: &str = "Error: the run was cancelled before this tool ran";

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    SuccessCriteriaMet,
    UserInputNeeded,
    MaxIterationsExceeded,
    /// The caller abandoned the run.
    Cancelled,
}

impl HaltReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SuccessCriteriaMet => "success_criteria_met",
            Self::UserInputNeeded => "user_input_needed",
            Self::MaxIterationsExceeded => "max_iterations_exceeded",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingWorker,
    AwaitingTools,
    AwaitingEvaluation,
    Halted(HaltReason),
}

/// What a stage reported when it finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    WorkerReplied(Route),
    /// `looping` is set when the worker keeps requesting the same calls.
    ToolsFinished { looping: bool },
    Evaluated(Verdict),
}

/// The transition function. `iterations` is the number of worker calls
/// made so far in this run.
pub fn transition(
    phase: Phase,
    outcome: StageOutcome,
    iterations: u32,
    max_iterations: u32,
) -> Phase {
    let next = match (phase, outcome) {
        (Phase::AwaitingWorker, StageOutcome::WorkerReplied(Route::Tools)) => Phase::AwaitingTools,
        (Phase::AwaitingWorker, StageOutcome::WorkerReplied(Route::Evaluator)) => {
            Phase::AwaitingEvaluation
        }
        (Phase::AwaitingTools, StageOutcome::ToolsFinished { looping: false }) => {
            Phase::AwaitingWorker
        }
        (Phase::AwaitingTools, StageOutcome::ToolsFinished { looping: true }) => {
            Phase::Halted(HaltReason::UserInputNeeded)
        }
        (Phase::AwaitingEvaluation, StageOutcome::Evaluated(Verdict::Continue)) => {
            Phase::AwaitingWorker
        }
        (Phase::AwaitingEvaluation, StageOutcome::Evaluated(Verdict::Done)) => {
            Phase::Halted(HaltReason::SuccessCriteriaMet)
        }
        (Phase::AwaitingEvaluation, StageOutcome::Evaluated(Verdict::NeedsUserInput)) => {
            Phase::Halted(HaltReason::UserInputNeeded)
        }
        (phase, outcome) => {
            warn!(?phase, ?outcome, "Ignoring outcome that does not match the phase");
            phase
        }
    };

    if next == Phase::AwaitingWorker && iterations >= max_iterations {
        Phase::Halted(HaltReason::MaxIterationsExceeded)
    } else {
        next
    }
}

/// A completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The worker's last answer
    pub reply: String,
    /// The evaluator's last feedback (or the iteration-cap notice)
    pub feedback: String,
    pub needs_user_input: bool,
    pub halt_reason: HaltReason,
    /// Worker invocations in this run
    pub iterations: u32,
    pub state: ConversationState,
}

/// A run that could not finish. The partial state is kept so the caller
/// can retry or continue.
#[derive(Debug, thiserror::Error)]
#[error("run failed after {iterations} worker call(s): {source}")]
pub struct RunFailure {
    #[source]
    pub source: Error,
    pub iterations: u32,
    pub state: ConversationState,
}

pub struct Orchestrator {
    worker: Worker,
    dispatcher: ToolDispatcher,
    evaluator: Evaluator,
    /// Watches tool-call turns; final answers are judged by the evaluator
    stuck: StuckDetector,
    max_iterations: u32,
}

impl Orchestrator {
    pub fn new(worker: Worker, dispatcher: ToolDispatcher, evaluator: Evaluator) -> Self {
        Self {
            worker,
            dispatcher,
            evaluator,
            stuck: StuckDetector::default(),
            max_iterations: 25,
        }
    }

    /// Wire every stage from configuration, sharing one provider.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        let retry = RetryPolicy::from(&config.run_loop.retry);
        let worker = Worker::new(provider.clone(), &config.worker_model)
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens)
            .with_retry(retry.clone());
        let dispatcher = ToolDispatcher::new(tools)
            .with_timeout(Duration::from_secs(config.run_loop.tool_timeout_secs));
        let stuck = StuckDetector::new(
            config.run_loop.stuck_threshold,
            config.run_loop.similarity_threshold,
        );
        let evaluator = Evaluator::new(provider, &config.evaluator_model)
            .with_retry(retry)
            .with_stuck_detector(stuck.clone());

        Self::new(worker, dispatcher, evaluator)
            .with_stuck_detector(stuck)
            .with_max_iterations(config.run_loop.max_iterations)
    }

    /// Detector for repeated tool-call turns.
    pub fn with_stuck_detector(mut self, stuck: StuckDetector) -> Self {
        self.stuck = stuck;
        self
    }

    /// Set the maximum number of worker invocations per run.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        self.dispatcher.tools()
    }

    /// Discard a conversation, keeping only its session id.
    pub fn reset(&self, state: &mut ConversationState) {
        info!(session = %state.session_id, "Resetting conversation");
        state.reset();
    }

    /// Run one user turn to completion.
    pub async fn run(
        &self,
        user_message: &str,
        criteria: SuccessCriteria,
        prior: Option<ConversationState>,
    ) -> Result<RunOutcome, RunFailure> {
        self.run_with_events(user_message, criteria, prior, &EventSink::none())
            .await
    }

    /// Run one user turn, reporting progress to `events`.
    pub async fn run_with_events(
        &self,
        user_message: &str,
        criteria: SuccessCriteria,
        prior: Option<ConversationState>,
        events: &EventSink,
    ) -> Result<RunOutcome, RunFailure> {
        self.run_cancellable(user_message, criteria, prior, events, &CancellationToken::new())
            .await
    }

    /// Run one user turn until it halts or `cancel` fires.
    ///
    /// Cancellation is observed before each stage and while waiting on the
    /// model. A tool batch that already started runs to completion; tool
    /// calls that never ran are answered with [`CANCELLED_TOOL_OUTPUT`] so
    /// the returned state stays well formed.
    pub async fn run_cancellable(
        &self,
        user_message: &str,
        criteria: SuccessCriteria,
        prior: Option<ConversationState>,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunFailure> {
        let mut state = prior.unwrap_or_default();
        state.begin_run(user_message, criteria);

        info!(
            session = %state.session_id,
            history = state.messages.len(),
            criteria = %state.success_criteria,
            "Run started"
        );

        let definitions = self.dispatcher.tools().definitions();
        let mut phase = Phase::AwaitingWorker;
        let mut iterations: u32 = 0;
        // Fingerprints of every worker output in this run
        let mut turns: Vec<String> = Vec::new();
        let mut looping = false;

        let reason = loop {
            if let Phase::Halted(reason) = phase {
                break reason;
            }
            if cancel.is_cancelled() {
                break HaltReason::Cancelled;
            }

            let outcome = match phase {
                Phase::Halted(reason) => break reason,

                Phase::AwaitingWorker => {
                    iterations += 1;
                    let step = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        reply = self.worker.step(&state, &definitions) => Some(reply),
                    };
                    let reply = match step {
                        Some(Ok(reply)) => reply,
                        Some(Err(e)) => {
                            return Err(self.fail(e.into(), iterations, state, events).await);
                        }
                        None => break HaltReason::Cancelled,
                    };

                    let route = router::route(Some(&reply));
                    events
                        .emit(RunEvent::WorkerReply {
                            iteration: iterations,
                            content: reply.content.clone(),
                            tool_calls: reply.tool_calls.iter().map(|c| c.name.clone()).collect(),
                        })
                        .await;
                    turns.push(stuck::fingerprint(&reply));
                    match route {
                        Route::Evaluator => state.attempts.push(reply.content.clone()),
                        Route::Tools => {
                            looping = self.stuck.is_stuck(&turns);
                            if looping {
                                info!(
                                    session = %state.session_id,
                                    iteration = iterations,
                                    "Worker keeps requesting the same tool calls"
                                );
                            }
                        }
                    }
                    state.push(reply);
                    StageOutcome::WorkerReplied(route)
                }

                Phase::AwaitingTools => {
                    let calls = state
                        .last_message()
                        .map(|m| m.tool_calls.clone())
                        .unwrap_or_default();
                    for result in self.dispatcher.dispatch(&calls).await {
                        events
                            .emit(RunEvent::ToolResult {
                                call_id: result.call_id.clone(),
                                name: result.name.clone(),
                                success: result.success,
                                output: result.output.clone(),
                                duration_ms: result.duration_ms,
                            })
                            .await;
                        state.push(result.to_message());
                    }
                    StageOutcome::ToolsFinished { looping }
                }

                Phase::AwaitingEvaluation => {
                    let evaluation = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        verdict = self.evaluator.evaluate(&state) => Some(verdict),
                    };
                    let verdict = match evaluation {
                        Some(Ok(verdict)) => verdict,
                        Some(Err(e)) => {
                            return Err(self.fail(e.into(), iterations, state, events).await);
                        }
                        None => break HaltReason::Cancelled,
                    };
                    events
                        .emit(RunEvent::Evaluation {
                            verdict: verdict.verdict,
                            feedback: verdict.feedback.clone(),
                        })
                        .await;
                    state.fold_verdict(&verdict);
                    StageOutcome::Evaluated(verdict.verdict)
                }
            };

            let next = transition(phase, outcome, iterations, self.max_iterations);
            debug!(
                session = %state.session_id,
                from = ?phase,
                to = ?next,
                iteration = iterations,
                "Transition"
            );
            phase = next;
        };

        match reason {
            HaltReason::MaxIterationsExceeded => {
                let notice = format!(
                    "Max iterations exceeded ({}) before the success criteria were met.",
                    self.max_iterations
                );
                warn!(session = %state.session_id, iterations, "Iteration cap reached");
                state.fold_verdict(&EvaluatorVerdict::new(Verdict::Continue, notice));
            }
            HaltReason::UserInputNeeded if looping => {
                state.fold_verdict(&EvaluatorVerdict::new(
                    Verdict::NeedsUserInput,
                    STUCK_FEEDBACK,
                ));
            }
            HaltReason::Cancelled => {
                if phase == Phase::AwaitingTools {
                    answer_cancelled_calls(&mut state);
                }
                info!(session = %state.session_id, iterations, ?phase, "Run cancelled");
            }
            _ => {}
        }

        let reply = state
            .last_worker_reply()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let feedback = state.feedback.clone().unwrap_or_default();
        let needs_user_input = state.needs_user_input;

        info!(
            session = %state.session_id,
            reason = %reason,
            iterations,
            needs_user_input,
            "Run halted"
        );
        events
            .emit(RunEvent::Halted {
                reason: reason.to_string(),
                reply: reply.clone(),
                feedback: feedback.clone(),
                needs_user_input,
                iterations,
            })
            .await;

        Ok(RunOutcome {
            reply,
            feedback,
            needs_user_input,
            halt_reason: reason,
            iterations,
            state,
        })
    }

    async fn fail(
        &self,
        source: Error,
        iterations: u32,
        state: ConversationState,
        events: &EventSink,
    ) -> RunFailure {
        warn!(session = %state.session_id, iterations, error = %source, "Run failed");
        events
            .emit(RunEvent::Error {
                message: source.to_string(),
            })
            .await;
        RunFailure {
            source,
            iterations,
            state,
        }
    }
}

/// Give every unanswered call of the last worker message a failure result.
fn answer_cancelled_calls(state: &mut ConversationState) {
    let pending = state
        .last_message()
        .map(|m| m.tool_calls.clone())
        .unwrap_or_default();
    for call in pending {
        state.push(Message::tool_result(
            &call.id,
            &call.name,
            false,
            CANCELLED_TOOL_OUTPUT,
        ));
    }
}
