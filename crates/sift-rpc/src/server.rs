//! RPC server shell: bridges inbound request envelopes to a domain handler
//! and publishes exactly one reply per delivered request.
//!
//! The shell processes one request at a time; the request queue's prefetch-1
//! window is the sole backpressure mechanism. Horizontal scaling runs more
//! worker processes against the same queue.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sift_broker::{Delivery, ReadyConnection, TransportChannel};
use sift_types::{CallEnvelope, CallId, ReplyEnvelope, TopologyDescriptor};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Domain collaborator invoked for each well-formed request.
///
/// Handlers are infallible by contract: any internal failure must still
/// yield a result document rather than an error escaping the shell.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Produce the result document for one request payload.
    async fn handle(&self, payload: &Value) -> Value;

    /// Result document for a request whose envelope could not be parsed.
    fn fallback(&self, reason: &str) -> Value;
}

/// Worker-side request/reply shell.
pub struct RpcServer {
    handler: Arc<dyn RequestHandler>,
    exchange: String,
    fallback_reply_key: String,
}

impl RpcServer {
    pub fn new(topology: &TopologyDescriptor, handler: Arc<dyn RequestHandler>) -> Self {
        Self {
            handler,
            exchange: topology.exchange.clone(),
            fallback_reply_key: topology.reply_routing_key.clone(),
        }
    }

    /// Consume requests until the connection closes.
    ///
    /// Every delivered request produces exactly one reply: malformed bodies
    /// get a fallback document addressed to the recoverable reply
    /// destination, or the role's static reply queue when none is
    /// recoverable. The original delivery is acknowledged only after the
    /// reply publish succeeds; a failed publish requeues the request so
    /// another worker instance can retry it.
    pub async fn serve(&self, connection: ReadyConnection) {
        let ReadyConnection {
            channel,
            mut deliveries,
        } = connection;
        info!("worker serving requests");
        while let Some(delivery) = deliveries.recv().await {
            self.process(&channel, delivery).await;
        }
        info!("request stream ended; worker stopping");
    }

    async fn process(&self, channel: &Arc<dyn TransportChannel>, delivery: Delivery) {
        let (call_id, reply_to, result) = match CallEnvelope::from_bytes(&delivery.body) {
            Ok(envelope) => {
                debug!(call_id = %envelope.call_id, "processing request");
                let result = self.handler.handle(&envelope.payload).await;
                (envelope.call_id, envelope.reply_to, result)
            }
            Err(err) => {
                warn!(error = %err, "malformed request; replying with fallback");
                let (recovered_id, recovered_reply_to) = recover_reply_address(&delivery.body);
                (
                    recovered_id.unwrap_or_else(CallId::nil),
                    recovered_reply_to.unwrap_or_else(|| self.fallback_reply_key.clone()),
                    self.handler.fallback(&err.to_string()),
                )
            }
        };

        let reply = ReplyEnvelope::new(call_id, result);
        let body = match reply.to_bytes() {
            Ok(body) => body,
            Err(err) => {
                error!(call_id = %call_id, error = %err, "reply encoding failed; dropping request");
                let _ = channel.ack(delivery.delivery_tag).await;
                return;
            }
        };
        match channel.publish(&self.exchange, &reply_to, body).await {
            Ok(()) => {
                if let Err(err) = channel.ack(delivery.delivery_tag).await {
                    warn!(call_id = %call_id, error = %err, "failed to ack request");
                }
                debug!(call_id = %call_id, "reply published");
            }
            Err(err) => {
                // The request must not be silently lost: requeue it for
                // another worker instance.
                error!(call_id = %call_id, error = %err, "reply publish failed; requeueing request");
                let _ = channel.nack(delivery.delivery_tag, true).await;
            }
        }
    }
}

/// Best-effort extraction of the correlation id and reply destination from a
/// body that failed full envelope decoding.
fn recover_reply_address(body: &[u8]) -> (Option<CallId>, Option<String>) {
    let Ok(value) = serde_json::from_slice::<Value>(body) else {
        return (None, None);
    };
    let call_id = value
        .get("call_id")
        .and_then(Value::as_str)
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .map(CallId::from_uuid);
    let reply_to = value
        .get("reply_to")
        .and_then(Value::as_str)
        .filter(|destination| !destination.trim().is_empty())
        .map(str::to_string);
    (call_id, reply_to)
}
