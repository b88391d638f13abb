//! Filter worker for the sift moderation gateway.
//!
//! Wires the broker bring-up state machine, the RPC server shell, and the
//! classifier collaborator into one runnable worker with graceful shutdown.

#![deny(unsafe_code)]

mod config;
mod handler;
mod worker;

pub use config::WorkerConfig;
pub use handler::ClassifierHandler;
pub use worker::{FilterWorker, WorkerError, WorkerHandle, WorkerResult};
