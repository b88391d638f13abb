//! Binds the RPC server shell to the classifier collaborator.

use async_trait::async_trait;
use serde_json::Value;
use sift_classifier::Classifier;
use sift_rpc::RequestHandler;
use sift_types::Verdict;
use tracing::warn;

/// Request handler that classifies the `message` field of each payload.
///
/// The handler never fails: payloads without a message field and classifier
/// errors both degrade to the default-unsafe verdict, so every request gets
/// a well-formed verdict document back.
pub struct ClassifierHandler<C> {
    classifier: C,
}

impl<C> ClassifierHandler<C> {
    pub fn new(classifier: C) -> Self {
        Self { classifier }
    }
}

#[async_trait]
impl<C: Classifier> RequestHandler for ClassifierHandler<C> {
    async fn handle(&self, payload: &Value) -> Value {
        let Some(text) = payload.get("message").and_then(Value::as_str) else {
            warn!("request payload has no message field");
            return verdict_value(Verdict::unsafe_fallback(
                "request payload has no message field",
            ));
        };
        let verdict = match self.classifier.classify(text).await {
            Ok(verdict) => verdict,
            Err(err) => {
                warn!(error = %err, "classifier error; degrading to unsafe");
                Verdict::unsafe_fallback(err.to_string())
            }
        };
        verdict_value(verdict)
    }

    fn fallback(&self, reason: &str) -> Value {
        verdict_value(Verdict::unsafe_fallback(reason))
    }
}

fn verdict_value(verdict: Verdict) -> Value {
    serde_json::to_value(&verdict).unwrap_or_else(|_| {
        serde_json::json!({ "safe": false, "error": "verdict serialization failed" })
    })
}
