//! Shared types for the sift moderation gateway.
//!
//! This crate is a leaf: wire envelopes, the verdict document exchanged with
//! the filter worker, the pipeline result returned to callers, and the static
//! topology descriptor. No broker or pipeline logic lives here.

#![deny(unsafe_code)]

mod envelope;
mod ids;
mod pipeline;
mod topology;
mod verdict;

pub use envelope::{CallEnvelope, EnvelopeError, ReplyEnvelope};
pub use ids::CallId;
pub use pipeline::{PipelineOutcome, PipelineResult};
pub use topology::TopologyDescriptor;
pub use verdict::{Verdict, VerdictSignals};
