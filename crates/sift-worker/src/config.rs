//! Configuration for the filter worker.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Filter worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Per-request classification budget in milliseconds. `None` disables
    /// the budget; the classifier contract still forbids blocking forever.
    #[serde(default = "default_classify_budget_ms")]
    pub classify_budget_ms: Option<u64>,
}

fn default_classify_budget_ms() -> Option<u64> {
    Some(10_000)
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            classify_budget_ms: default_classify_budget_ms(),
        }
    }
}

impl WorkerConfig {
    /// The classification budget as a [`Duration`], if enabled.
    pub fn classify_budget(&self) -> Option<Duration> {
        self.classify_budget_ms.map(Duration::from_millis)
    }
}
