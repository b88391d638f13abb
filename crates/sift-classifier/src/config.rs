//! Decision thresholds for the signal classifier.

use serde::{Deserialize, Serialize};

/// Thresholds applied when combining model scores and text signals into a
/// verdict. A message is unsafe when any threshold is crossed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalThresholds {
    /// A label probability above this marks the message unsafe.
    #[serde(default = "default_label_probability")]
    pub label_probability: f64,

    /// A semantic similarity at or above this marks the message unsafe.
    #[serde(default = "default_semantic")]
    pub semantic: f64,

    /// Most-frequent-token share above this marks the message repetitive.
    #[serde(default = "default_repetition_ratio")]
    pub repetition_ratio: f64,

    /// Messages with fewer tokens than this skip the repetition check; a
    /// two-word greeting trivially exceeds any ratio.
    #[serde(default = "default_repetition_min_tokens")]
    pub repetition_min_tokens: usize,

    /// Character anomaly score above this marks the message unsafe.
    #[serde(default = "default_anomaly")]
    pub anomaly: f64,

    /// Mixed-script token ratio above this marks the message unsafe.
    #[serde(default = "default_mixed_script")]
    pub mixed_script: f64,
}

fn default_label_probability() -> f64 {
    0.5
}

fn default_semantic() -> f64 {
    0.45
}

fn default_repetition_ratio() -> f64 {
    0.2
}

fn default_repetition_min_tokens() -> usize {
    4
}

fn default_anomaly() -> f64 {
    0.4
}

fn default_mixed_script() -> f64 {
    0.35
}

impl Default for SignalThresholds {
    fn default() -> Self {
        Self {
            label_probability: default_label_probability(),
            semantic: default_semantic(),
            repetition_ratio: default_repetition_ratio(),
            repetition_min_tokens: default_repetition_min_tokens(),
            anomaly: default_anomaly(),
            mixed_script: default_mixed_script(),
        }
    }
}
