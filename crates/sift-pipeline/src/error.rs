//! Pipeline error taxonomy.
//!
//! Everything a caller can see is either a terminal [`sift_types::PipelineResult`]
//! or one of these errors: validation, broker fault, filter timeout,
//! malformed verdict, or generation failure. Blocked and redacted outcomes
//! are results, not errors.

use sift_rpc::CallError;
use thiserror::Error;

use crate::generator::GeneratorError;

/// Errors surfaced by [`crate::ModerationPipeline::submit`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The user message was empty or whitespace-only.
    #[error("user message is empty")]
    Validation,

    /// The broker rejected a filter call.
    #[error("filter call failed: {0}")]
    Broker(CallError),

    /// A filter call produced no reply within its deadline. Distinct from
    /// broker faults so callers can tell "no answer" from "rejected".
    #[error("filter verdict timed out: {0}")]
    Timeout(CallError),

    /// A filter reply arrived but was not a verdict document.
    #[error("filter verdict malformed: {0}")]
    Verdict(#[from] serde_json::Error),

    /// The generation call failed (transport error or non-success status).
    #[error("generation failed: {0}")]
    Generation(#[from] GeneratorError),
}

impl PipelineError {
    /// Map an RPC failure into the pipeline taxonomy.
    pub(crate) fn from_call(err: CallError) -> Self {
        if err.is_timeout() {
            PipelineError::Timeout(err)
        } else {
            PipelineError::Broker(err)
        }
    }
}
