//! Error types for the RPC engine.
//!
//! Per-call failures are scoped to their call and never affect other
//! in-flight calls. Timeout is distinct from broker errors so callers can
//! tell "no answer" apart from "broker rejected".

use sift_broker::TransportError;
use sift_types::{CallId, EnvelopeError};
use thiserror::Error;

/// Errors surfaced by [`crate::RpcClient::call`].
#[derive(Debug, Error)]
pub enum CallError {
    /// The generated call id collided with a pending call.
    #[error("call id collision for {0}")]
    DuplicateCallId(CallId),

    /// The request envelope could not be encoded.
    #[error("failed to encode request envelope: {0}")]
    Encode(#[from] EnvelopeError),

    /// The broker rejected the request publish.
    #[error("request publish failed: {0}")]
    Publish(#[from] TransportError),

    /// No matching reply arrived within the deadline.
    #[error("no reply within {timeout_ms}ms for {call_id}")]
    Timeout {
        call_id: CallId,
        timeout_ms: u64,
    },

    /// The pending call's result slot was dropped without a reply.
    #[error("reply slot dropped for {0}")]
    ReplySlotDropped(CallId),
}

impl CallError {
    /// Whether this failure was a deadline expiry rather than a broker
    /// fault.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CallError::Timeout { .. })
    }
}

/// Result type for RPC calls.
pub type CallResult<T> = Result<T, CallError>;
