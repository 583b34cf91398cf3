//! Prompt construction for the worker and the evaluator.

use chrono::{DateTime, Local};
use sidekick_core::message::{EVALUATOR_FEEDBACK_PREFIX, Message, Role};
use sidekick_core::state::ConversationState;

/// The worker's system prompt, rebuilt for every call.
pub fn worker_system_prompt(
    criteria: &str,
    feedback: Option<&str>,
    now: DateTime<Local>,
) -> String {
    let mut prompt = format!(
        "You are a helpful assistant that can use tools to complete tasks.
You keep working on a task until either you have a question or clarification for the user, or the success criteria is met.
You have tools to manage files in your sandbox directory, search the web and Wikipedia, open web pages and run Python code.
When running Python, include a print() statement for any output you want to see.
The current date and time is {}

This is the success criteria:
{criteria}

You should reply either with a question for the user about this assignment, or with your final response.
If you have a question for the user, state it clearly, for example:

Question: please clarify whether you want a summary or a detailed answer

If you've finished, reply with the final answer without asking a question.",
        now.format("%Y-%m-%d %H:%M:%S")
    );

    if let Some(feedback) = feedback {
        prompt.push_str(&format!(
            "

Previously you thought you completed the assignment, but your reply was rejected because the success criteria was not met.
Here is the feedback on why it was rejected:
{feedback}
With this feedback, continue the assignment, making sure you meet the success criteria or have a question for the user."
        ));
    }

    prompt
}

pub const EVALUATOR_SYSTEM_PROMPT: &str = "You are an evaluator that determines if a task has been completed successfully by an Assistant.
Assess the Assistant's last response based on the given criteria. Respond with your feedback, your decision on whether the success criteria has been met, and whether more input is needed from the user.";

/// Render the dialogue for the evaluator. Tool results are omitted; a
/// tool-calling turn without text shows as `[Tools use]`.
pub fn format_conversation(messages: &[Message]) -> String {
    let mut out = String::from("Conversation history:\n\n");
    for message in messages {
        match message.role {
            Role::User => out.push_str(&format!("User: {}\n", message.content)),
            Role::Assistant if message.is_evaluator_feedback() => {
                let feedback = message
                    .content
                    .strip_prefix(EVALUATOR_FEEDBACK_PREFIX)
                    .unwrap_or(&message.content);
                out.push_str(&format!("Evaluator: {feedback}\n"));
            }
            Role::Assistant => {
                let text = if message.content.trim().is_empty() {
                    "[Tools use]"
                } else {
                    message.content.as_str()
                };
                out.push_str(&format!("Assistant: {text}\n"));
            }
            Role::System | Role::Tool => {}
        }
    }
    out
}

/// The evaluator's user message for judging the latest worker reply.
pub fn evaluator_user_prompt(state: &ConversationState) -> String {
    let last_response = state
        .last_worker_reply()
        .map(|m| m.content.as_str())
        .unwrap_or_default();

    let mut prompt = format!(
        "You are evaluating a conversation between the User and Assistant. You decide what action to take based on the last response from the Assistant.

The entire conversation with the assistant, with the user's original request and all replies, is:
{}
The success criteria for this assignment is:
{}

And the final response from the Assistant that you are evaluating is:
{last_response}

Respond with your feedback, and decide if the success criteria is met by this response.
Also decide if more user input is required, either because the assistant has a question, needs clarification, or seems to be stuck and unable to answer without help.

The Assistant has access to a tool to write files. If the Assistant says they have written a file, you can assume they have done so.
Overall give the Assistant the benefit of the doubt if they say they've done something, but reject if you feel more work should go into this.
",
        format_conversation(&state.messages),
        state.success_criteria,
    );

    if let Some(feedback) = &state.feedback {
        prompt.push_str(&format!(
            "\nIn a prior attempt from the Assistant, you provided this feedback: {feedback}
If the Assistant is repeating the same mistakes, consider responding that user input is required."
        ));
    }

    prompt
}
