//! The composite result returned for one end-to-end request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::verdict::Verdict;

/// Terminal outcome of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// The pre-filter rejected the raw input; generation never ran.
    Blocked,

    /// Generation ran but the post-filter rejected its output.
    Redacted,

    /// Both verdicts passed; the generated text is returned unchanged.
    Completed,
}

impl std::fmt::Display for PipelineOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineOutcome::Blocked => write!(f, "blocked"),
            PipelineOutcome::Redacted => write!(f, "redacted"),
            PipelineOutcome::Completed => write!(f, "completed"),
        }
    }
}

/// Composite result for one end-to-end request. Never mutated after return.
///
/// A blocked or redacted outcome is a success, not an error: the output field
/// is empty and the verdicts explain why the content was withheld.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    /// The caller's original message.
    pub user_message: String,

    /// Verdict on the raw input.
    pub pre_verdict: Verdict,

    /// Verdict on the generated text; absent when the run was blocked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_verdict: Option<Verdict>,

    /// Generated text; empty when blocked or redacted.
    #[serde(default)]
    pub generated_output: String,

    /// Terminal outcome of the run.
    pub outcome: PipelineOutcome,

    /// Total time spent in filter calls.
    #[serde(default)]
    pub filter_ms: u64,

    /// Time spent in the generation call; zero when blocked.
    #[serde(default)]
    pub generation_ms: u64,

    /// When the result was assembled.
    pub completed_at: DateTime<Utc>,
}

impl PipelineResult {
    /// Whether the caller received generated content.
    pub fn has_output(&self) -> bool {
        self.outcome == PipelineOutcome::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_result_omits_post_verdict() {
        let result = PipelineResult {
            user_message: "hi".to_string(),
            pre_verdict: Verdict::unsafe_fallback("blocked"),
            post_verdict: None,
            generated_output: String::new(),
            outcome: PipelineOutcome::Blocked,
            filter_ms: 3,
            generation_ms: 0,
            completed_at: Utc::now(),
        };
        let json = serde_json::to_string(&result).expect("encode");
        assert!(!json.contains("post_verdict"));
        assert!(!result.has_output());
    }

    #[test]
    fn outcome_labels_are_stable() {
        assert_eq!(PipelineOutcome::Blocked.to_string(), "blocked");
        assert_eq!(PipelineOutcome::Redacted.to_string(), "redacted");
        assert_eq!(PipelineOutcome::Completed.to_string(), "completed");
    }
}
