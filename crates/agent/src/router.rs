//! Router: decides where the worker's output goes next.

use serde::{Deserialize, Serialize};
use sidekick_core::message::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Tools,
    Evaluator,
}

/// Route on the last message: pending tool calls go to the tools,
/// everything else (including an empty history) goes to the evaluator.
pub fn route(last: Option<&Message>) -> Route {
    match last {
        Some(message) if message.has_tool_calls() => Route::Tools,
        _ => Route::Evaluator,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sidekick_core::message::MessageToolCall;

    fn with_calls(n: usize) -> Message {
        let mut msg = Message::assistant("");
        msg.tool_calls = (0..n)
            .map(|i| MessageToolCall {
                id: format!("call_{i}"),
                name: "list_directory".into(),
                arguments: "{}".into(),
            })
            .collect();
        msg
    }

    #[test]
    fn tool_calls_route_to_tools() {
        assert_eq!(route(Some(&with_calls(1))), Route::Tools);
        assert_eq!(route(Some(&with_calls(3))), Route::Tools);
    }

    #[test]
    fn everything_else_routes_to_evaluator() {
        assert_eq!(route(Some(&Message::assistant("done"))), Route::Evaluator);
        assert_eq!(route(Some(&with_calls(0))), Route::Evaluator);
        assert_eq!(route(Some(&Message::user("hi"))), Route::Evaluator);
        assert_eq!(route(None), Route::Evaluator);
    }

    #[test]
    fn tool_calls_on_non_assistant_ignored() {
        let mut msg = Message::user("hi");
        msg.tool_calls = with_calls(1).tool_calls;
        assert_eq!(route(Some(&msg)), Route::Evaluator);
    }

    #[test]
    fn routing_is_idempotent() {
        let msg = with_calls(2);
        let first = route(Some(&msg));
        for _ in 0..5 {
            assert_eq!(route(Some(&msg)), first);
        }
        assert_eq!(msg.tool_calls.len(), 2);
    }
}
