//! Generator collaborator: the external text-generation backend.
//!
//! Consumed directly over HTTP, not via the broker. A transport failure or
//! non-success status is a hard failure for the pipeline step.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

/// Errors from the generation backend.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// The request never completed (connect, timeout, body read).
    #[error("generator request failed: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("generator returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The backend answered with an unparseable body.
    #[error("invalid generator response: {0}")]
    InvalidResponse(String),
}

/// Result type for generation calls.
pub type GeneratorResult<T> = Result<T, GeneratorError>;

/// Produces text for a prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> GeneratorResult<String>;
}

/// Configuration for the HTTP generation backend.
#[derive(Debug, Clone, serde::Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Base endpoint of the backend, e.g. `http://localhost:11434`.
    pub endpoint: String,

    /// Model identifier passed with every request.
    pub model: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3.1:8b".to_string(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Response body of the generation endpoint.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Ollama-style HTTP backend posting `{model, prompt, stream: false}` to
/// `/api/generate`.
pub struct HttpGenerator {
    client: reqwest::Client,
    config: GeneratorConfig,
}

impl HttpGenerator {
    pub fn new(config: GeneratorConfig) -> GeneratorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| GeneratorError::Transport(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, prompt: &str) -> GeneratorResult<String> {
        let url = format!(
            "{}/api/generate",
            self.config.endpoint.trim_end_matches('/')
        );
        let payload = json!({
            "model": self.config.model,
            "prompt": prompt,
            "stream": false,
        });

        debug!(model = %self.config.model, "sending generation request");
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|err| GeneratorError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Status {
                status: status.as_u16(),
                body: truncate(&body, 320),
            });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|err| GeneratorError::InvalidResponse(err.to_string()))?;
        Ok(body.response)
    }
}

/// Bound error bodies so a failing backend cannot flood the logs.
fn truncate(value: &str, max_chars: usize) -> String {
    let mut chars = value.chars();
    let truncated: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{truncated}...")
    } else {
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_bounds_long_bodies() {
        let long = "x".repeat(400);
        let bounded = truncate(&long, 320);
        assert_eq!(bounded.chars().count(), 323);
        assert!(bounded.ends_with("..."));
        assert_eq!(truncate("short", 320), "short");
    }

    #[test]
    fn default_config_targets_local_backend() {
        let config = GeneratorConfig::default();
        assert!(config.endpoint.starts_with("http://"));
        assert_eq!(config.timeout_secs, 300);
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        // Reserved TEST-NET address: nothing listens there.
        let generator = HttpGenerator::new(GeneratorConfig {
            endpoint: "http://192.0.2.1:1".to_string(),
            model: "test".to_string(),
            timeout_secs: 1,
        })
        .expect("client");
        let err = generator.generate("hello").await.expect_err("must fail");
        assert!(matches!(err, GeneratorError::Transport(_)));
    }
}
