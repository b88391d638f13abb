//! The safety verdict document produced by the filter worker.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Auxiliary text signals reported alongside the model scores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerdictSignals {
    /// A single token dominates the message beyond the repetition threshold.
    #[serde(default)]
    pub repetitive: bool,

    /// Character-level anomaly score in `0.0..=1.0`.
    #[serde(default)]
    pub anomaly_score: f64,

    /// Share of tokens mixing scripts (e.g. Latin + Cyrillic) in `0.0..=1.0`.
    #[serde(default)]
    pub mixed_script_ratio: f64,
}

/// Structured safety judgment for one piece of text.
///
/// Produced by the classifier collaborator, consumed read-only by the
/// pipeline orchestrator. A verdict is always well-formed: classifier
/// failures degrade to [`Verdict::unsafe_fallback`] rather than an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Overall judgment; `false` blocks or redacts the gated content.
    pub safe: bool,

    /// Per-label probabilities from the classification model.
    #[serde(default)]
    pub classification: BTreeMap<String, f64>,

    /// Mean similarity against the known-unsafe reference set.
    #[serde(default)]
    pub semantic_score: f64,

    /// Auxiliary text signals.
    #[serde(default)]
    pub signals: VerdictSignals,

    /// Present when this verdict was synthesized from a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Verdict {
    /// A passing verdict with no scores, useful as a neutral default.
    pub fn safe_default() -> Self {
        Self {
            safe: true,
            classification: BTreeMap::new(),
            semantic_score: 0.0,
            signals: VerdictSignals::default(),
            error: None,
        }
    }

    /// The degraded default-unsafe verdict used for malformed requests and
    /// classifier failures. Fails closed: the content is never passed.
    pub fn unsafe_fallback(reason: impl Into<String>) -> Self {
        Self {
            safe: false,
            classification: BTreeMap::new(),
            semantic_score: 0.0,
            signals: VerdictSignals::default(),
            error: Some(reason.into()),
        }
    }

    /// Whether this verdict was synthesized from a failure.
    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_is_unsafe_and_degraded() {
        let verdict = Verdict::unsafe_fallback("classifier unavailable");
        assert!(!verdict.safe);
        assert!(verdict.is_degraded());
        assert_eq!(verdict.error.as_deref(), Some("classifier unavailable"));
    }

    #[test]
    fn omitted_fields_deserialize_to_defaults() {
        let verdict: Verdict = serde_json::from_str(r#"{"safe": true}"#).expect("decode");
        assert!(verdict.safe);
        assert!(verdict.classification.is_empty());
        assert_eq!(verdict.semantic_score, 0.0);
        assert!(!verdict.is_degraded());
    }

    #[test]
    fn error_field_is_omitted_when_absent() {
        let json = serde_json::to_string(&Verdict::safe_default()).expect("encode");
        assert!(!json.contains("error"));
    }
}
