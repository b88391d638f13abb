//! Moderation pipeline orchestrator.
//!
//! One end-to-end request walks a fixed sequence: pre-filter the raw input,
//! generate, post-filter the generated text. An unsafe pre-verdict
//! short-circuits generation entirely; an unsafe post-verdict redacts the
//! output field while keeping both verdicts visible, so callers can always
//! see why content was withheld.

use std::time::Instant;

use chrono::Utc;
use sift_types::{PipelineOutcome, PipelineResult};
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::filter::Filter;
use crate::generator::Generator;

/// Sequences two filter calls around one generation call.
pub struct ModerationPipeline<F, G> {
    filter: F,
    generator: G,
}

impl<F: Filter, G: Generator> ModerationPipeline<F, G> {
    pub fn new(filter: F, generator: G) -> Self {
        Self { filter, generator }
    }

    /// Run one message through the pipeline.
    ///
    /// Always terminates in a [`PipelineResult`] or a typed
    /// [`PipelineError`]; a blocked or redacted outcome is a success whose
    /// output field is empty.
    pub async fn submit(&self, user_message: &str) -> Result<PipelineResult, PipelineError> {
        if user_message.trim().is_empty() {
            return Err(PipelineError::Validation);
        }

        let filter_started = Instant::now();
        let pre_verdict = self.filter.check(user_message).await?;
        let mut filter_ms = elapsed_ms(filter_started);
        debug!(safe = pre_verdict.safe, "pre-filter verdict received");

        if !pre_verdict.safe {
            warn!(outcome = %PipelineOutcome::Blocked, "message blocked by pre-filter");
            return Ok(PipelineResult {
                user_message: user_message.to_string(),
                pre_verdict,
                post_verdict: None,
                generated_output: String::new(),
                outcome: PipelineOutcome::Blocked,
                filter_ms,
                generation_ms: 0,
                completed_at: Utc::now(),
            });
        }

        let generation_started = Instant::now();
        let generated = self.generator.generate(user_message).await?;
        let generation_ms = elapsed_ms(generation_started);
        debug!(generation_ms, "generation complete");

        let post_started = Instant::now();
        let post_verdict = self.filter.check(&generated).await?;
        filter_ms += elapsed_ms(post_started);

        let (outcome, generated_output) = if post_verdict.safe {
            (PipelineOutcome::Completed, generated)
        } else {
            warn!(outcome = %PipelineOutcome::Redacted, "generated output withheld by post-filter");
            (PipelineOutcome::Redacted, String::new())
        };
        info!(outcome = %outcome, filter_ms, generation_ms, "pipeline run finished");

        Ok(PipelineResult {
            user_message: user_message.to_string(),
            pre_verdict,
            post_verdict: Some(post_verdict),
            generated_output,
            outcome,
            filter_ms,
            generation_ms,
            completed_at: Utc::now(),
        })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{GeneratorError, GeneratorResult};
    use async_trait::async_trait;
    use sift_types::Verdict;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Filter returning scripted verdicts in order.
    struct ScriptedFilter {
        verdicts: Mutex<VecDeque<Verdict>>,
    }

    impl ScriptedFilter {
        fn new(verdicts: Vec<Verdict>) -> Self {
            Self {
                verdicts: Mutex::new(verdicts.into()),
            }
        }
    }

    #[async_trait]
    impl Filter for ScriptedFilter {
        async fn check(&self, _text: &str) -> Result<Verdict, PipelineError> {
            Ok(self
                .verdicts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Verdict::unsafe_fallback("script exhausted")))
        }
    }

    /// Generator returning a fixed string and counting invocations.
    struct CountingGenerator {
        output: &'static str,
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingGenerator {
        fn new(output: &'static str) -> Self {
            Self {
                output,
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                output: "",
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Generator for &CountingGenerator {
        async fn generate(&self, _prompt: &str) -> GeneratorResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(GeneratorError::Status {
                    status: 503,
                    body: "overloaded".to_string(),
                });
            }
            Ok(self.output.to_string())
        }
    }

    fn unsafe_verdict(semantic: f64) -> Verdict {
        Verdict {
            safe: false,
            semantic_score: semantic,
            ..Verdict::safe_default()
        }
    }

    #[tokio::test]
    async fn safe_input_and_output_complete_with_generated_text() {
        let generator = CountingGenerator::new("hi there");
        let pipeline = ModerationPipeline::new(
            ScriptedFilter::new(vec![Verdict::safe_default(), Verdict::safe_default()]),
            &generator,
        );

        let result = pipeline.submit("hello").await.expect("submit");
        assert_eq!(result.outcome, PipelineOutcome::Completed);
        assert_eq!(result.generated_output, "hi there");
        assert!(result.pre_verdict.safe);
        assert!(result.post_verdict.expect("post verdict").safe);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn unsafe_input_blocks_without_invoking_generator() {
        let generator = CountingGenerator::new("never seen");
        let pipeline =
            ModerationPipeline::new(ScriptedFilter::new(vec![unsafe_verdict(0.9)]), &generator);

        let result = pipeline.submit("<toxic text>").await.expect("submit");
        assert_eq!(result.outcome, PipelineOutcome::Blocked);
        assert_eq!(result.generated_output, "");
        assert!(!result.pre_verdict.safe);
        assert_eq!(result.pre_verdict.semantic_score, 0.9);
        assert!(result.post_verdict.is_none());
        assert_eq!(result.generation_ms, 0);
        assert_eq!(generator.calls(), 0, "generator must never be invoked");
    }

    #[tokio::test]
    async fn unsafe_output_is_redacted_but_verdicts_survive() {
        let generator = CountingGenerator::new("something rude");
        let pipeline = ModerationPipeline::new(
            ScriptedFilter::new(vec![Verdict::safe_default(), unsafe_verdict(0.6)]),
            &generator,
        );

        let result = pipeline.submit("hello").await.expect("submit");
        assert_eq!(result.outcome, PipelineOutcome::Redacted);
        assert_eq!(result.generated_output, "", "raw output must not leak");
        assert!(result.pre_verdict.safe);
        assert!(!result.post_verdict.expect("post verdict").safe);
        assert_eq!(generator.calls(), 1, "generator runs exactly once");
    }

    #[tokio::test]
    async fn generation_failure_is_surfaced_not_swallowed() {
        let generator = CountingGenerator::failing();
        let pipeline = ModerationPipeline::new(
            ScriptedFilter::new(vec![Verdict::safe_default()]),
            &generator,
        );

        let err = pipeline.submit("hello").await.expect_err("must fail");
        assert!(matches!(err, PipelineError::Generation(_)));
    }

    #[tokio::test]
    async fn empty_message_fails_validation_before_any_call() {
        let generator = CountingGenerator::new("unused");
        let pipeline = ModerationPipeline::new(ScriptedFilter::new(vec![]), &generator);

        let err = pipeline.submit("   ").await.expect_err("must fail");
        assert!(matches!(err, PipelineError::Validation));
        assert_eq!(generator.calls(), 0);
    }
}
