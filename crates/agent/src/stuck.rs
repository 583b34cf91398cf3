//! Stuck detection: notices when the worker keeps giving the same answer
//! or keeps requesting the same tool calls.
//!
//! Answers are normalised (lower-cased, whitespace collapsed) and compared
//! pairwise: two answers are similar when equal or when the Jaccard index
//! of their word sets reaches the similarity threshold. Tool-call turns are
//! compared through [`fingerprint`].

use sidekick_core::message::Message;
use std::collections::HashSet;

/// A comparable rendering of one worker output: its text followed by every
/// requested tool call as `name(arguments)`. Call ids are left out since
/// they differ on every turn.
pub fn fingerprint(message: &Message) -> String {
    let mut out = message.content.trim().to_string();
    for call in &message.tool_calls {
        let arguments = serde_json::from_str::<serde_json::Value>(&call.arguments)
            .map(|v| v.to_string())
            .unwrap_or_else(|_| call.arguments.trim().to_string());
        out.push_str(&format!(" {}({})", call.name, arguments));
    }
    out
}

#[derive(Debug, Clone)]
pub struct StuckDetector {
    /// Consecutive similar answers that count as stuck
    threshold: usize,
    similarity: f64,
}

impl StuckDetector {
    pub fn new(threshold: usize, similarity: f64) -> Self {
        Self {
            threshold: threshold.max(2),
            similarity: similarity.clamp(f64::MIN_POSITIVE, 1.0),
        }
    }

    /// Whether the last `threshold` attempts are consecutively similar.
    pub fn is_stuck(&self, attempts: &[String]) -> bool {
        if attempts.len() < self.threshold {
            return false;
        }
        let recent: Vec<String> = attempts[attempts.len() - self.threshold..]
            .iter()
            .map(|a| normalize(a))
            .collect();
        recent
            .windows(2)
            .all(|pair| self.similar(&pair[0], &pair[1]))
    }

    fn similar(&self, a: &str, b: &str) -> bool {
        a == b || jaccard(a, b) >= self.similarity
    }
}

impl Default for StuckDetector {
    fn default() -> Self {
        Self::new(3, 0.9)
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn jaccard(a: &str, b: &str) -> f64 {
    let left: HashSet<&str> = a.split(' ').filter(|w| !w.is_empty()).collect();
    let right: HashSet<&str> = b.split(' ').filter(|w| !w.is_empty()).collect();
    let union = left.union(&right).count();
    if union == 0 {
        return 1.0;
    }
    left.intersection(&right).count() as f64 / union as f64
}
