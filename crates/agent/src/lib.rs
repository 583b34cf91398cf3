//! The Sidekick loop.
//!
//! One user turn runs through a small state machine:
//!
//! 1. **Worker** asks the model for the next step, given the success
//!    criteria and any evaluator feedback
//! 2. **Router** sends a reply with tool calls to the dispatcher and a plain
//!    answer to the evaluator
//! 3. **Dispatcher** runs the requested tools and hands results back to the worker
//! 4. **Evaluator** judges the answer: done, needs the user, or try again
//!
//! The [`Orchestrator`] owns the transitions and stops the run at a fixed
//! number of worker calls. Callers may also cancel a run through a token.

pub mod dispatcher;
pub mod evaluator;
pub mod orchestrator;
pub mod prompts;
pub mod retry;
pub mod router;
pub mod stuck;
pub mod worker;

#[cfg(test)]
mod test_helpers;

pub use dispatcher::{DispatchedCall, ToolDispatcher};
pub use evaluator::{Evaluator, parse_verdict};
pub use orchestrator::{
    HaltReason, Orchestrator, Phase, RunFailure, RunOutcome, StageOutcome, transition,
};
pub use retry::RetryPolicy;
pub use router::{Route, route};
pub use stuck::StuckDetector;
pub use worker::Worker;
