//! Broker substrate for the sift moderation gateway.
//!
//! Provides the transport boundary traits, a deterministic in-memory broker,
//! and the connection bring-up state machine that turns a bare connection
//! into a ready consumer. Request/reply semantics live one layer up in
//! `sift-rpc`.

#![deny(unsafe_code)]

mod lifecycle;
mod memory;
mod transport;

pub use lifecycle::{
    BringupError, BringupResult, BringupStep, ConnectionLifecycle, ConnectionState,
    ReadyConnection, Role, PREFETCH_LIMIT,
};
pub use memory::{Fault, MemoryBroker, MemoryChannel};
pub use transport::{
    Connection, Delivery, Transport, TransportChannel, TransportError, TransportResult,
};
