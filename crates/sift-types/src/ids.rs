//! Strongly-typed call identifier.
//!
//! Call ids correlate a request envelope with its eventual reply. They are
//! UUID-based and wrapped in a newtype for type safety.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier correlating one request with exactly one reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(Uuid);

impl CallId {
    /// Generate a fresh random call id. Never blocks.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// The nil id, used when a malformed request carried no recoverable id.
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Whether this is the nil placeholder id.
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = CallId::generate();
        let b = CallId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn nil_id_is_flagged() {
        assert!(CallId::nil().is_nil());
        assert!(!CallId::generate().is_nil());
    }

    #[test]
    fn serializes_as_bare_uuid() {
        let id = CallId::generate();
        let json = serde_json::to_string(&id).expect("serialize");
        let back: CallId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(id, back);
        assert!(json.starts_with('"'));
    }
}
