//! Classifier collaborator seam and the signal classifier.
//!
//! The ML scoring itself (sequence classification, semantic similarity
//! against a reference set) lives behind [`ScoreProvider`] and is opaque to
//! the rest of the system. [`SignalClassifier`] combines those scores with
//! the local text signals and applies the decision thresholds.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sift_types::Verdict;
use thiserror::Error;
use tracing::debug;

use crate::config::SignalThresholds;
use crate::signals;

/// Errors from classifier collaborators.
#[derive(Debug, Error)]
pub enum ClassifierError {
    /// The score provider failed.
    #[error("score provider failed: {0}")]
    Provider(String),

    /// Internal classifier error.
    #[error("internal classifier error: {0}")]
    Internal(String),
}

/// Result type for classifier operations.
pub type ClassifierResult<T> = Result<T, ClassifierError>;

/// Produces a safety verdict for one piece of text.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> ClassifierResult<Verdict>;
}

/// Scores produced by the ML models for one piece of text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelScores {
    /// Per-label probabilities in `0.0..=1.0`.
    pub labels: BTreeMap<String, f64>,

    /// Mean similarity against the known-unsafe reference set.
    pub semantic: f64,
}

/// The seam where model scores enter. Real deployments plug in an inference
/// runtime here; tests use [`FixedScoreProvider`].
#[async_trait]
pub trait ScoreProvider: Send + Sync {
    async fn scores(&self, text: &str) -> ClassifierResult<ModelScores>;
}

/// Deterministic provider returning the same scores for every input. Used
/// for tests and local development.
#[derive(Debug, Clone, Default)]
pub struct FixedScoreProvider {
    scores: ModelScores,
}

impl FixedScoreProvider {
    pub fn new(scores: ModelScores) -> Self {
        Self { scores }
    }

    /// A provider whose scores never cross any threshold.
    pub fn harmless() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScoreProvider for FixedScoreProvider {
    async fn scores(&self, _text: &str) -> ClassifierResult<ModelScores> {
        Ok(self.scores.clone())
    }
}

/// Combines provider scores with text signals under the decision
/// thresholds: unsafe when any label probability, the semantic score,
/// repetition, anomaly, or mixed-script crosses its threshold.
pub struct SignalClassifier<P> {
    provider: P,
    thresholds: SignalThresholds,
}

impl<P> SignalClassifier<P> {
    pub fn new(provider: P) -> Self {
        Self::with_thresholds(provider, SignalThresholds::default())
    }

    pub fn with_thresholds(provider: P, thresholds: SignalThresholds) -> Self {
        Self {
            provider,
            thresholds,
        }
    }
}

#[async_trait]
impl<P: ScoreProvider> Classifier for SignalClassifier<P> {
    async fn classify(&self, text: &str) -> ClassifierResult<Verdict> {
        let scores = self.provider.scores(text).await?;
        let signals = signals::evaluate(text, &self.thresholds);

        let label_flag = scores
            .labels
            .values()
            .any(|probability| *probability > self.thresholds.label_probability);
        let safe = !(label_flag
            || scores.semantic >= self.thresholds.semantic
            || signals.repetitive
            || signals.anomaly_score > self.thresholds.anomaly
            || signals.mixed_script_ratio > self.thresholds.mixed_script);

        debug!(
            safe,
            semantic = scores.semantic,
            anomaly = signals.anomaly_score,
            "classification complete"
        );
        Ok(Verdict {
            safe,
            classification: scores.labels,
            semantic_score: scores.semantic,
            signals,
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(pairs: &[(&str, f64)], semantic: f64) -> ModelScores {
        ModelScores {
            labels: pairs
                .iter()
                .map(|(label, probability)| (label.to_string(), *probability))
                .collect(),
            semantic,
        }
    }

    #[tokio::test]
    async fn benign_text_with_low_scores_passes() {
        let classifier = SignalClassifier::new(FixedScoreProvider::new(scores(
            &[("toxic", 0.05), ("insult", 0.02)],
            0.1,
        )));
        let verdict = classifier.classify("hello there").await.expect("classify");
        assert!(verdict.safe);
        assert_eq!(verdict.classification.len(), 2);
    }

    #[tokio::test]
    async fn high_label_probability_blocks() {
        let classifier =
            SignalClassifier::new(FixedScoreProvider::new(scores(&[("toxic", 0.92)], 0.0)));
        let verdict = classifier.classify("some text").await.expect("classify");
        assert!(!verdict.safe);
    }

    #[tokio::test]
    async fn semantic_score_at_threshold_blocks() {
        let classifier = SignalClassifier::new(FixedScoreProvider::new(scores(&[], 0.45)));
        let verdict = classifier.classify("some text").await.expect("classify");
        assert!(!verdict.safe);
        assert_eq!(verdict.semantic_score, 0.45);
    }

    #[tokio::test]
    async fn repetitive_text_blocks_despite_harmless_scores() {
        let classifier = SignalClassifier::new(FixedScoreProvider::harmless());
        let verdict = classifier
            .classify("buy buy buy buy buy now")
            .await
            .expect("classify");
        assert!(!verdict.safe);
        assert!(verdict.signals.repetitive);
    }

    #[tokio::test]
    async fn mixed_script_text_blocks() {
        let classifier = SignalClassifier::new(FixedScoreProvider::harmless());
        let verdict = classifier.classify("сlick here").await.expect("classify");
        assert!(!verdict.safe);
        assert!(verdict.signals.mixed_script_ratio > 0.35);
    }
}
