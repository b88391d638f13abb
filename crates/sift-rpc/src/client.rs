//! RPC client: one publish plus one later delivery, folded into a single
//! awaitable call.
//!
//! Every call registers a pending slot in the correlation registry, publishes
//! a request envelope carrying a fresh call id and the client's reply queue,
//! then suspends until the matching reply arrives or the deadline elapses.
//! Concurrent calls share one connection and one reply queue; independent
//! call ids keep them from interfering.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use sift_broker::{Delivery, ReadyConnection, TransportChannel};
use sift_types::{CallEnvelope, CallId, ReplyEnvelope, TopologyDescriptor};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::RpcConfig;
use crate::error::{CallError, CallResult};
use crate::registry::CorrelationRegistry;

/// Correlation-keyed request/reply client over one broker connection.
pub struct RpcClient {
    channel: Arc<dyn TransportChannel>,
    topology: TopologyDescriptor,
    registry: Arc<CorrelationRegistry>,
    config: RpcConfig,
}

impl RpcClient {
    /// Start the client on a connection that completed bring-up for the
    /// client role. Spawns the reply consumer task.
    pub fn start(
        connection: ReadyConnection,
        topology: TopologyDescriptor,
        config: RpcConfig,
    ) -> Self {
        let ReadyConnection {
            channel,
            deliveries,
        } = connection;
        let registry = Arc::new(CorrelationRegistry::new());
        tokio::spawn(reply_loop(
            deliveries,
            Arc::clone(&registry),
            Arc::clone(&channel),
        ));
        Self {
            channel,
            topology,
            registry,
            config,
        }
    }

    /// Number of calls currently awaiting a reply.
    pub fn pending_calls(&self) -> usize {
        self.registry.pending_calls()
    }

    /// Call with the configured default deadline.
    pub async fn call(&self, payload: Value) -> CallResult<Value> {
        self.call_with_timeout(payload, self.config.call_timeout())
            .await
    }

    /// Publish one request and await its reply or the deadline.
    ///
    /// The pending slot is released on every exit path, including caller
    /// cancellation: a reply arriving afterwards is dropped by the reply
    /// consumer as stale.
    pub async fn call_with_timeout(
        &self,
        payload: Value,
        timeout: Duration,
    ) -> CallResult<Value> {
        let call_id = CallId::generate();
        let result_rx = self
            .registry
            .register(call_id)
            .ok_or(CallError::DuplicateCallId(call_id))?;
        let _guard = PendingGuard {
            registry: self.registry.as_ref(),
            call_id,
        };

        let envelope = CallEnvelope::new(
            payload,
            call_id,
            self.topology.reply_routing_key.clone(),
        );
        let body = envelope.to_bytes()?;
        debug!(call_id = %call_id, "publishing request");
        self.channel
            .publish(
                &self.topology.exchange,
                &self.topology.request_routing_key,
                body,
            )
            .await?;

        match tokio::time::timeout(timeout, result_rx).await {
            Ok(Ok(reply)) => {
                debug!(call_id = %call_id, "call resolved");
                Ok(reply.result)
            }
            Ok(Err(_)) => Err(CallError::ReplySlotDropped(call_id)),
            Err(_) => {
                warn!(call_id = %call_id, "call timed out");
                Err(CallError::Timeout {
                    call_id,
                    timeout_ms: timeout.as_millis().min(u64::MAX as u128) as u64,
                })
            }
        }
    }
}

/// Releases the pending slot when a call exits, however it exits. Resolution
/// already removed the slot on the success path, so the cancel is a no-op
/// there; on timeout or cancellation it revokes the slot so a late reply is
/// dropped as stale.
struct PendingGuard<'a> {
    registry: &'a CorrelationRegistry,
    call_id: CallId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.registry.cancel(&self.call_id);
    }
}

/// Resolves pending calls from the reply queue. Runs on a single task per
/// connection and does nothing long-running: look up the call id, hand over
/// the reply, acknowledge.
async fn reply_loop(
    mut deliveries: mpsc::Receiver<Delivery>,
    registry: Arc<CorrelationRegistry>,
    channel: Arc<dyn TransportChannel>,
) {
    while let Some(delivery) = deliveries.recv().await {
        match ReplyEnvelope::from_bytes(&delivery.body) {
            Ok(reply) => {
                let call_id = reply.call_id;
                if registry.resolve(reply) {
                    if let Err(err) = channel.ack(delivery.delivery_tag).await {
                        warn!(call_id = %call_id, error = %err, "failed to ack reply");
                    }
                } else {
                    // Unknown or already-resolved id: stale. Dropped, never
                    // requeued - requeueing would poison the shared queue.
                    warn!(call_id = %call_id, "dropping stale reply");
                    let _ = channel.nack(delivery.delivery_tag, false).await;
                }
            }
            Err(err) => {
                warn!(error = %err, "dropping undecodable reply");
                let _ = channel.nack(delivery.delivery_tag, false).await;
            }
        }
    }
    debug!("reply consumer stopped");
}
