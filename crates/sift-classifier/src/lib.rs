//! Classifier collaborator for the sift filter worker.
//!
//! The verdict combines opaque model scores (classification probabilities
//! and semantic similarity, behind the [`ScoreProvider`] seam) with local
//! text signals: repetition, character anomalies, and mixed-script tokens.
//! The [`FailSafe`] wrapper guarantees the worker boundary always receives a
//! verdict.

#![deny(unsafe_code)]

mod classifier;
mod config;
mod failsafe;
pub mod signals;

pub use classifier::{
    Classifier, ClassifierError, ClassifierResult, FixedScoreProvider, ModelScores,
    ScoreProvider, SignalClassifier,
};
pub use config::SignalThresholds;
pub use failsafe::FailSafe;
