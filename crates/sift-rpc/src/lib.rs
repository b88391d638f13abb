//! Correlation-keyed RPC engine for the sift moderation gateway.
//!
//! Converts the broker's fire-and-forget publish/consume primitives into a
//! call-and-wait primitive with timeout: the client publishes a request
//! carrying a fresh call id and a reply destination, registers a pending
//! slot, and suspends until a matching reply arrives or the deadline
//! elapses. The server shell consumes requests one at a time and publishes
//! exactly one reply per request.

#![deny(unsafe_code)]

mod client;
mod config;
mod error;
mod registry;
mod server;

pub use client::RpcClient;
pub use config::RpcConfig;
pub use error::{CallError, CallResult};
pub use registry::CorrelationRegistry;
pub use server::{RequestHandler, RpcServer};
