//! Request and reply wire envelopes.
//!
//! Both envelopes are flat JSON structures: a payload, a call id, and (for
//! requests) the reply destination. They are immutable once published; a
//! reply correlates back to exactly one request by call id.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::ids::CallId;

/// Errors produced when decoding a wire envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Body was not valid JSON or did not match the envelope shape.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Envelope decoded but a required field was empty.
    #[error("envelope field {0} is empty")]
    EmptyField(&'static str),
}

/// One request published toward the worker role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEnvelope {
    /// Opaque request payload.
    pub payload: Value,

    /// Correlation token, unique for the life of the pending call.
    pub call_id: CallId,

    /// Destination routing key for the reply.
    pub reply_to: String,
}

impl CallEnvelope {
    pub fn new(payload: Value, call_id: CallId, reply_to: impl Into<String>) -> Self {
        Self {
            payload,
            call_id,
            reply_to: reply_to.into(),
        }
    }

    /// Serialize to the compact wire encoding.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from the wire, rejecting envelopes without a reply destination.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let envelope: Self = serde_json::from_slice(bytes)?;
        if envelope.reply_to.trim().is_empty() {
            return Err(EnvelopeError::EmptyField("reply_to"));
        }
        Ok(envelope)
    }
}

/// One reply published back to the caller's reply queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    /// Correlation token copied from the originating request.
    pub call_id: CallId,

    /// Opaque result payload.
    pub result: Value,
}

impl ReplyEnvelope {
    pub fn new(call_id: CallId, result: Value) -> Self {
        Self { call_id, result }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
