//! Fail-safe classifier wrapper.
//!
//! The worker boundary requires that classification always yields a verdict:
//! any error, and any run past the per-call budget, degrades to the
//! default-unsafe fallback instead of escaping.

use std::time::Duration;

use async_trait::async_trait;
use sift_types::Verdict;
use tracing::warn;

use crate::classifier::{Classifier, ClassifierResult};

/// Wraps a classifier so it can neither fail nor block indefinitely.
pub struct FailSafe<C> {
    inner: C,
    budget: Option<Duration>,
}

impl<C> FailSafe<C> {
    /// Degrade errors only; no time budget.
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            budget: None,
        }
    }

    /// Degrade errors and enforce a per-call time budget.
    pub fn with_budget(inner: C, budget: Duration) -> Self {
        Self {
            inner,
            budget: Some(budget),
        }
    }
}

#[async_trait]
impl<C: Classifier> Classifier for FailSafe<C> {
    async fn classify(&self, text: &str) -> ClassifierResult<Verdict> {
        let outcome = match self.budget {
            Some(budget) => match tokio::time::timeout(budget, self.inner.classify(text)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    let budget_ms = budget.as_millis();
                    warn!(budget_ms, "classifier exceeded its budget; degrading to unsafe");
                    return Ok(Verdict::unsafe_fallback(format!(
                        "classification exceeded {budget_ms}ms budget"
                    )));
                }
            },
            None => self.inner.classify(text).await,
        };
        match outcome {
            Ok(verdict) => Ok(verdict),
            Err(err) => {
                warn!(error = %err, "classifier failed; degrading to unsafe");
                Ok(Verdict::unsafe_fallback(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassifierError;

    /// Classifier that always fails.
    struct Broken;

    #[async_trait]
    impl Classifier for Broken {
        async fn classify(&self, _text: &str) -> ClassifierResult<Verdict> {
            Err(ClassifierError::Provider("model not loaded".to_string()))
        }
    }

    /// Classifier that never answers.
    struct Stuck;

    #[async_trait]
    impl Classifier for Stuck {
        async fn classify(&self, _text: &str) -> ClassifierResult<Verdict> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn errors_degrade_to_unsafe_verdict() {
        let classifier = FailSafe::new(Broken);
        let verdict = classifier.classify("anything").await.expect("always Ok");
        assert!(!verdict.safe);
        assert!(verdict.is_degraded());
        assert!(verdict.error.as_deref().unwrap_or_default().contains("model not loaded"));
    }

    #[tokio::test(start_paused = true)]
    async fn budget_overrun_degrades_to_unsafe_verdict() {
        let classifier = FailSafe::with_budget(Stuck, Duration::from_millis(100));
        let verdict = classifier.classify("anything").await.expect("always Ok");
        assert!(!verdict.safe);
        assert!(verdict.is_degraded());
    }
}
