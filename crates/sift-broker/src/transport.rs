//! Transport boundary traits.
//!
//! Adapters are responsible only for delivery mechanics: named direct
//! exchanges, named queues, binding by routing key, per-consumer prefetch,
//! and manual acknowledgment. Request/reply semantics are layered on top by
//! the RPC engine and are not a transport concern.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// One message handed to a consumer, awaiting ack or nack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Channel-scoped tag identifying this delivery for ack/nack.
    pub delivery_tag: u64,

    /// Raw message body.
    pub body: Vec<u8>,
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("broker connect failed: {0}")]
    Connect(String),

    #[error("channel open failed: {0}")]
    ChannelOpen(String),

    #[error("declare failed for {object}: {reason}")]
    Declare { object: String, reason: String },

    #[error("bind failed for queue {queue}: {reason}")]
    Bind { queue: String, reason: String },

    #[error("publish with routing key {routing_key} failed: {reason}")]
    Publish {
        routing_key: String,
        reason: String,
    },

    #[error("consume failed for queue {queue}: {reason}")]
    Consume { queue: String, reason: String },

    #[error("unknown delivery tag {0}")]
    UnknownDeliveryTag(u64),

    #[error("channel is closed")]
    Closed,
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// A broker endpoint that can produce connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish a transport-level connection.
    async fn connect(&self) -> TransportResult<Arc<dyn Connection>>;
}

/// One established broker connection.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Open a logical channel on this connection.
    async fn open_channel(&self) -> TransportResult<Arc<dyn TransportChannel>>;
}

/// One logical channel: declarations, publishing, and consumption.
///
/// Deliveries for a given consumer are serialized; the receiver observes
/// them one at a time in queue order.
#[async_trait]
pub trait TransportChannel: Send + Sync {
    /// Declare a named direct exchange. Idempotent for identical properties.
    async fn declare_exchange(&self, name: &str) -> TransportResult<()>;

    /// Declare a named queue. Redeclaring with a different durability flag
    /// is an error, not a silent overwrite.
    async fn declare_queue(&self, name: &str, durable: bool) -> TransportResult<()>;

    /// Bind a queue to an exchange under a routing key.
    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> TransportResult<()>;

    /// Limit in-flight unacknowledged deliveries for consumers on this
    /// channel. Zero means unlimited. Takes effect for consumers registered
    /// afterwards.
    async fn set_prefetch(&self, count: u16) -> TransportResult<()>;

    /// Publish a message to an exchange under a routing key. Unroutable
    /// messages are dropped, as the broker contract allows.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Vec<u8>,
    ) -> TransportResult<()>;

    /// Register a consumer on a queue and return its delivery stream. The
    /// stream ends when the channel closes.
    async fn consume(&self, queue: &str) -> TransportResult<mpsc::Receiver<Delivery>>;

    /// Acknowledge a delivery, removing it from the unacked window.
    async fn ack(&self, delivery_tag: u64) -> TransportResult<()>;

    /// Negatively acknowledge a delivery, optionally returning it to the
    /// front of its queue for redelivery.
    async fn nack(&self, delivery_tag: u64, requeue: bool) -> TransportResult<()>;

    /// Close the channel. Unacknowledged deliveries return to their queues.
    async fn close(&self) -> TransportResult<()>;
}
