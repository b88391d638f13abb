//! Verdict-typed view over the RPC client.

use async_trait::async_trait;
use serde_json::json;
use sift_rpc::RpcClient;
use sift_types::Verdict;

use crate::error::PipelineError;

/// Obtains a safety verdict for one piece of text.
#[async_trait]
pub trait Filter: Send + Sync {
    async fn check(&self, text: &str) -> Result<Verdict, PipelineError>;
}

/// Filter backed by the RPC engine: each check is one call to the filter
/// worker over the broker, awaited under the client's configured deadline.
pub struct FilterClient {
    rpc: RpcClient,
}

impl FilterClient {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl Filter for FilterClient {
    async fn check(&self, text: &str) -> Result<Verdict, PipelineError> {
        let result = self
            .rpc
            .call(json!({ "message": text }))
            .await
            .map_err(PipelineError::from_call)?;
        Ok(serde_json::from_value(result)?)
    }
}
