//! Moderation pipeline for the sift gateway.
//!
//! Composes two correlation-keyed filter calls around one external
//! generation call: pre-filter the raw input, generate, post-filter the
//! generated text. Unsafe content never reaches the caller even when the
//! generator itself produces it.

#![deny(unsafe_code)]

mod error;
mod filter;
mod generator;
mod orchestrator;

pub use error::PipelineError;
pub use filter::{Filter, FilterClient};
pub use generator::{Generator, GeneratorConfig, GeneratorError, GeneratorResult, HttpGenerator};
pub use orchestrator::ModerationPipeline;
