//! `sidekick run`: Run one request to completion.
//!
//! Progress goes to stderr, the final answer to stdout.

use sidekick_agent::{HaltReason, Orchestrator};
use sidekick_core::error::ProviderError;
use sidekick_core::event::{EventSink, RunEvent};
use sidekick_core::state::SuccessCriteria;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub async fn run(
    message: String,
    criteria: Option<String>,
    max_iterations: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;

    let provider = match sidekick_providers::build_from_config(&config) {
        Ok(provider) => provider,
        Err(e @ ProviderError::NotConfigured(_)) => {
            super::print_api_key_help();
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };
    let tools = Arc::new(sidekick_tools::default_registry(&config.tools)?);

    let mut orchestrator = Orchestrator::from_config(&config, provider, tools);
    if let Some(max) = max_iterations {
        orchestrator = orchestrator.with_max_iterations(max);
    }

    let (sink, mut rx) = EventSink::channel(64);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Some(line) = progress_line(&event) {
                eprintln!("{line}");
            }
        }
    });

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("  Interrupted, stopping after the current step...");
                cancel.cancel();
            }
        })
    };

    let result = orchestrator
        .run_cancellable(
            &message,
            SuccessCriteria::new(criteria.unwrap_or_default()),
            None,
            &sink,
            &cancel,
        )
        .await;
    interrupt.abort();
    drop(sink);
    wait_for_printer(printer).await;

    let outcome = result?;
    println!("{}", outcome.reply);
    eprintln!();
    eprintln!("  Evaluator: {}", outcome.feedback);
    match outcome.halt_reason {
        HaltReason::SuccessCriteriaMet | HaltReason::UserInputNeeded => {}
        HaltReason::MaxIterationsExceeded => eprintln!(
            "  Stopped after {} worker calls without meeting the criteria.",
            outcome.iterations
        ),
        HaltReason::Cancelled => eprintln!("  Run cancelled."),
    }
    if outcome.needs_user_input {
        eprintln!("  Sidekick needs more input from you. Re-run with more detail.");
    }

    Ok(())
}

/// Wait for the progress printer; a failed printer only loses output.
async fn wait_for_printer(printer: JoinHandle<()>) {
    if let Err(e) = printer.await {
        warn!(error = %e, "Progress printer stopped abnormally");
    }
}

fn progress_line(event: &RunEvent) -> Option<String> {
    match event {
        RunEvent::WorkerReply { iteration, tool_calls, .. } if !tool_calls.is_empty() => {
            Some(format!("  [{iteration}] calling {}", tool_calls.join(", ")))
        }
        RunEvent::WorkerReply { iteration, .. } => Some(format!("  [{iteration}] answered")),
        RunEvent::ToolResult {
            name,
            success,
            duration_ms,
            ..
        } => {
            let mark = if *success { "✓" } else { "✗" };
            Some(format!("      {mark} {name} ({duration_ms} ms)"))
        }
        RunEvent::Evaluation { verdict, feedback } => {
            Some(format!("      evaluator: {verdict:?}: {feedback}"))
        }
        RunEvent::Error { message } => Some(format!("  [error] {message}")),
        RunEvent::Halted { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidekick_core::state::Verdict;

    #[tokio::test]
    async fn panicking_printer_does_not_abort_the_command() {
        let printer = tokio::spawn(async { panic!("stdout closed") });
        wait_for_printer(printer).await;
    }

    #[test]
    fn progress_lines() {
        let calls = RunEvent::WorkerReply {
            iteration: 2,
            content: String::new(),
            tool_calls: vec!["read_file".into(), "search".into()],
        };
        assert_eq!(
            progress_line(&calls).as_deref(),
            Some("  [2] calling read_file, search")
        );

        let verdict = RunEvent::Evaluation {
            verdict: Verdict::Continue,
            feedback: "Add sources".into(),
        };
        assert!(progress_line(&verdict).unwrap().contains("Add sources"));
        assert!(
            progress_line(&RunEvent::Halted {
                reason: "cancelled".into(),
                reply: String::new(),
                feedback: String::new(),
                needs_user_input: false,
                iterations: 0,
            })
            .is_none()
        );
    }
}
