//! Deterministic in-memory broker.
//!
//! Implements the transport boundary entirely in-process: direct exchange
//! routing, named queues, per-consumer prefetch windows, and manual
//! acknowledgment with requeue. Used by tests and single-process
//! deployments. Delivery is at-least-once: a nacked or orphaned delivery
//! returns to the front of its queue.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify, Semaphore};
use tracing::{debug, warn};

use crate::transport::{
    Connection, Delivery, Transport, TransportChannel, TransportError, TransportResult,
};

/// Injectable one-shot failures for exercising bring-up and publish paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fault {
    /// Fail the next transport connect.
    Connect,

    /// Fail the next channel open.
    OpenChannel,

    /// Fail the next declaration of the named exchange.
    DeclareExchange(String),

    /// Fail the next declaration of the named queue.
    DeclareQueue(String),

    /// Fail the next bind of the named queue.
    BindQueue(String),

    /// Fail the next publish under the given routing key.
    Publish(String),
}

/// One named queue: message backlog plus arrival signaling.
struct QueueState {
    /// Durability flag fixed at declaration time.
    durable: bool,

    /// Pending message bodies in delivery order.
    messages: Mutex<VecDeque<Vec<u8>>>,

    /// Signaled whenever a message becomes available.
    available: Notify,
}

impl QueueState {
    fn new(durable: bool) -> Self {
        Self {
            durable,
            messages: Mutex::new(VecDeque::new()),
            available: Notify::new(),
        }
    }

    fn push_back(&self, body: Vec<u8>) {
        self.messages.lock().unwrap().push_back(body);
        self.available.notify_one();
    }

    fn push_front(&self, body: Vec<u8>) {
        self.messages.lock().unwrap().push_front(body);
        self.available.notify_one();
    }

    fn pop_front(&self) -> Option<Vec<u8>> {
        self.messages.lock().unwrap().pop_front()
    }

    fn depth(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

/// Direct exchange: routing key to bound queue names.
#[derive(Default)]
struct ExchangeState {
    bindings: HashMap<String, Vec<String>>,
}

/// Broker state shared by every connection and channel.
struct BrokerCore {
    exchanges: Mutex<HashMap<String, ExchangeState>>,
    queues: Mutex<HashMap<String, Arc<QueueState>>>,
    faults: Mutex<HashSet<Fault>>,
}

impl BrokerCore {
    /// Consume an injected fault if one is armed for this point.
    fn trigger(&self, fault: &Fault) -> bool {
        self.faults.lock().unwrap().remove(fault)
    }
}

/// In-memory broker endpoint.
pub struct MemoryBroker {
    core: Arc<BrokerCore>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            core: Arc::new(BrokerCore {
                exchanges: Mutex::new(HashMap::new()),
                queues: Mutex::new(HashMap::new()),
                faults: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Arm a one-shot fault; it fires the next time its point is reached.
    pub fn inject_fault(&self, fault: Fault) {
        self.core.faults.lock().unwrap().insert(fault);
    }

    /// Backlog depth of a queue, if it exists. Test observability helper.
    pub fn queue_depth(&self, name: &str) -> Option<usize> {
        self.core
            .queues
            .lock()
            .unwrap()
            .get(name)
            .map(|queue| queue.depth())
    }
}

#[async_trait]
impl Transport for MemoryBroker {
    async fn connect(&self) -> TransportResult<Arc<dyn Connection>> {
        if self.core.trigger(&Fault::Connect) {
            return Err(TransportError::Connect("injected connect failure".to_string()));
        }
        Ok(Arc::new(MemoryConnection {
            core: Arc::clone(&self.core),
        }))
    }
}

/// One in-memory connection. Channels share the broker core.
struct MemoryConnection {
    core: Arc<BrokerCore>,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn open_channel(&self) -> TransportResult<Arc<dyn TransportChannel>> {
        if self.core.trigger(&Fault::OpenChannel) {
            return Err(TransportError::ChannelOpen(
                "injected channel open failure".to_string(),
            ));
        }
        Ok(Arc::new(MemoryChannel::new(Arc::clone(&self.core))))
    }
}

/// One delivered-but-unacknowledged message.
struct UnackedDelivery {
    queue: Arc<QueueState>,
    body: Vec<u8>,
    permits: Arc<Semaphore>,
}

/// One logical channel over the in-memory broker.
pub struct MemoryChannel {
    core: Arc<BrokerCore>,
    prefetch: Mutex<u16>,
    next_tag: Arc<AtomicU64>,
    unacked: Arc<Mutex<HashMap<u64, UnackedDelivery>>>,
    closed: Arc<AtomicBool>,
    close_signal: Arc<Notify>,
}

impl MemoryChannel {
    fn new(core: Arc<BrokerCore>) -> Self {
        Self {
            core,
            prefetch: Mutex::new(0),
            next_tag: Arc::new(AtomicU64::new(0)),
            unacked: Arc::new(Mutex::new(HashMap::new())),
            closed: Arc::new(AtomicBool::new(false)),
            close_signal: Arc::new(Notify::new()),
        }
    }

    fn ensure_open(&self) -> TransportResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    fn take_unacked(&self, delivery_tag: u64) -> TransportResult<UnackedDelivery> {
        self.unacked
            .lock()
            .unwrap()
            .remove(&delivery_tag)
            .ok_or(TransportError::UnknownDeliveryTag(delivery_tag))
    }
}

#[async_trait]
impl TransportChannel for MemoryChannel {
    async fn declare_exchange(&self, name: &str) -> TransportResult<()> {
        self.ensure_open()?;
        if self.core.trigger(&Fault::DeclareExchange(name.to_string())) {
            return Err(TransportError::Declare {
                object: format!("exchange {name}"),
                reason: "injected declare failure".to_string(),
            });
        }
        self.core
            .exchanges
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default();
        debug!(exchange = name, "exchange declared");
        Ok(())
    }

    async fn declare_queue(&self, name: &str, durable: bool) -> TransportResult<()> {
        self.ensure_open()?;
        if self.core.trigger(&Fault::DeclareQueue(name.to_string())) {
            return Err(TransportError::Declare {
                object: format!("queue {name}"),
                reason: "injected declare failure".to_string(),
            });
        }
        let mut queues = self.core.queues.lock().unwrap();
        match queues.get(name) {
            Some(existing) if existing.durable != durable => Err(TransportError::Declare {
                object: format!("queue {name}"),
                reason: format!(
                    "redeclared with conflicting durability (existing durable={})",
                    existing.durable
                ),
            }),
            Some(_) => Ok(()),
            None => {
                queues.insert(name.to_string(), Arc::new(QueueState::new(durable)));
                debug!(queue = name, durable, "queue declared");
                Ok(())
            }
        }
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> TransportResult<()> {
        self.ensure_open()?;
        if self.core.trigger(&Fault::BindQueue(queue.to_string())) {
            return Err(TransportError::Bind {
                queue: queue.to_string(),
                reason: "injected bind failure".to_string(),
            });
        }
        let mut exchanges = self.core.exchanges.lock().unwrap();
        let queues = self.core.queues.lock().unwrap();
        if !queues.contains_key(queue) {
            return Err(TransportError::Bind {
                queue: queue.to_string(),
                reason: "queue does not exist".to_string(),
            });
        }
        let Some(exchange_state) = exchanges.get_mut(exchange) else {
            return Err(TransportError::Bind {
                queue: queue.to_string(),
                reason: format!("exchange {exchange} does not exist"),
            });
        };
        let bound = exchange_state
            .bindings
            .entry(routing_key.to_string())
            .or_default();
        if !bound.iter().any(|name| name == queue) {
            bound.push(queue.to_string());
        }
        debug!(queue, exchange, routing_key, "queue bound");
        Ok(())
    }

    async fn set_prefetch(&self, count: u16) -> TransportResult<()> {
        self.ensure_open()?;
        *self.prefetch.lock().unwrap() = count;
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Vec<u8>,
    ) -> TransportResult<()> {
        self.ensure_open()?;
        if self.core.trigger(&Fault::Publish(routing_key.to_string())) {
            return Err(TransportError::Publish {
                routing_key: routing_key.to_string(),
                reason: "injected publish failure".to_string(),
            });
        }
        let targets: Vec<Arc<QueueState>> = {
            let exchanges = self.core.exchanges.lock().unwrap();
            let queues = self.core.queues.lock().unwrap();
            let Some(exchange_state) = exchanges.get(exchange) else {
                return Err(TransportError::Publish {
                    routing_key: routing_key.to_string(),
                    reason: format!("exchange {exchange} does not exist"),
                });
            };
            exchange_state
                .bindings
                .get(routing_key)
                .map(|names| {
                    names
                        .iter()
                        .filter_map(|name| queues.get(name).cloned())
                        .collect()
                })
                .unwrap_or_default()
        };
        if targets.is_empty() {
            warn!(exchange, routing_key, "dropping unroutable message");
            return Ok(());
        }
        for queue in targets {
            queue.push_back(body.clone());
        }
        Ok(())
    }

    async fn consume(&self, queue: &str) -> TransportResult<mpsc::Receiver<Delivery>> {
        self.ensure_open()?;
        let queue_state = self
            .core
            .queues
            .lock()
            .unwrap()
            .get(queue)
            .cloned()
            .ok_or_else(|| TransportError::Consume {
                queue: queue.to_string(),
                reason: "queue does not exist".to_string(),
            })?;
        let prefetch = *self.prefetch.lock().unwrap();
        let permits = Arc::new(Semaphore::new(if prefetch == 0 {
            Semaphore::MAX_PERMITS
        } else {
            prefetch as usize
        }));
        let (deliveries_tx, deliveries_rx) = mpsc::channel(1);
        tokio::spawn(dispatch_loop(
            queue_state,
            deliveries_tx,
            permits,
            Arc::clone(&self.unacked),
            Arc::clone(&self.next_tag),
            Arc::clone(&self.closed),
            Arc::clone(&self.close_signal),
        ));
        Ok(deliveries_rx)
    }

    async fn ack(&self, delivery_tag: u64) -> TransportResult<()> {
        self.ensure_open()?;
        let entry = self.take_unacked(delivery_tag)?;
        entry.permits.add_permits(1);
        Ok(())
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> TransportResult<()> {
        self.ensure_open()?;
        let entry = self.take_unacked(delivery_tag)?;
        if requeue {
            entry.queue.push_front(entry.body);
        }
        entry.permits.add_permits(1);
        Ok(())
    }

    async fn close(&self) -> TransportResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.close_signal.notify_waiters();
        let orphaned: Vec<UnackedDelivery> =
            self.unacked.lock().unwrap().drain().map(|(_, v)| v).collect();
        for entry in orphaned {
            entry.queue.push_front(entry.body);
        }
        debug!("channel closed");
        Ok(())
    }
}

/// Feeds one consumer from one queue, honoring the prefetch window.
async fn dispatch_loop(
    queue: Arc<QueueState>,
    deliveries: mpsc::Sender<Delivery>,
    permits: Arc<Semaphore>,
    unacked: Arc<Mutex<HashMap<u64, UnackedDelivery>>>,
    next_tag: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
    close_signal: Arc<Notify>,
) {
    loop {
        if closed.load(Ordering::SeqCst) {
            return;
        }
        let permit = tokio::select! {
            acquired = Arc::clone(&permits).acquire_owned() => match acquired {
                Ok(permit) => permit,
                Err(_) => return,
            },
            _ = close_signal.notified() => return,
        };
        // The permit is returned through ack/nack, not by dropping it.
        permit.forget();

        let body = loop {
            let available = queue.available.notified();
            if closed.load(Ordering::SeqCst) {
                permits.add_permits(1);
                return;
            }
            if let Some(body) = queue.pop_front() {
                break body;
            }
            tokio::select! {
                _ = available => {}
                _ = close_signal.notified() => {
                    permits.add_permits(1);
                    return;
                }
            }
        };

        let tag = next_tag.fetch_add(1, Ordering::SeqCst) + 1;
        unacked.lock().unwrap().insert(
            tag,
            UnackedDelivery {
                queue: Arc::clone(&queue),
                body: body.clone(),
                permits: Arc::clone(&permits),
            },
        );
        if deliveries
            .send(Delivery {
                delivery_tag: tag,
                body,
            })
            .await
            .is_err()
        {
            // Consumer went away: put the message back and stop dispatching.
            if let Some(entry) = unacked.lock().unwrap().remove(&tag) {
                entry.queue.push_front(entry.body);
            }
            permits.add_permits(1);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    async fn open_channel(broker: &MemoryBroker) -> Arc<dyn TransportChannel> {
        let connection = broker.connect().await.expect("connect");
        connection.open_channel().await.expect("open channel")
    }

    async fn declare_bound_queue(channel: &Arc<dyn TransportChannel>, queue: &str) {
        channel.declare_exchange("x").await.expect("exchange");
        channel.declare_queue(queue, true).await.expect("queue");
        channel.bind_queue(queue, "x", queue).await.expect("bind");
    }

    #[tokio::test]
    async fn publish_consume_ack_flow() {
        let broker = MemoryBroker::new();
        let channel = open_channel(&broker).await;
        declare_bound_queue(&channel, "q").await;

        channel.publish("x", "q", b"one".to_vec()).await.expect("publish");
        let mut deliveries = channel.consume("q").await.expect("consume");

        let delivery = deliveries.recv().await.expect("delivery");
        assert_eq!(delivery.body, b"one");
        channel.ack(delivery.delivery_tag).await.expect("ack");
        assert_eq!(broker.queue_depth("q"), Some(0));
    }

    #[tokio::test]
    async fn prefetch_one_blocks_until_ack() {
        let broker = MemoryBroker::new();
        let channel = open_channel(&broker).await;
        declare_bound_queue(&channel, "q").await;
        channel.set_prefetch(1).await.expect("prefetch");

        channel.publish("x", "q", b"first".to_vec()).await.expect("publish");
        channel.publish("x", "q", b"second".to_vec()).await.expect("publish");

        let mut deliveries = channel.consume("q").await.expect("consume");
        let first = deliveries.recv().await.expect("first delivery");

        // Second message must not arrive while the first is unacked.
        let second = timeout(Duration::from_millis(50), deliveries.recv()).await;
        assert!(second.is_err(), "prefetch window exceeded");

        channel.ack(first.delivery_tag).await.expect("ack");
        let second = deliveries.recv().await.expect("second delivery");
        assert_eq!(second.body, b"second");
        channel.ack(second.delivery_tag).await.expect("ack");
    }

    #[tokio::test]
    async fn nack_with_requeue_redelivers() {
        let broker = MemoryBroker::new();
        let channel = open_channel(&broker).await;
        declare_bound_queue(&channel, "q").await;
        channel.set_prefetch(1).await.expect("prefetch");

        channel.publish("x", "q", b"retry".to_vec()).await.expect("publish");
        let mut deliveries = channel.consume("q").await.expect("consume");

        let first = deliveries.recv().await.expect("delivery");
        channel.nack(first.delivery_tag, true).await.expect("nack");

        let redelivered = deliveries.recv().await.expect("redelivery");
        assert_eq!(redelivered.body, b"retry");
        assert_ne!(redelivered.delivery_tag, first.delivery_tag);
        channel.ack(redelivered.delivery_tag).await.expect("ack");
    }

    #[tokio::test]
    async fn nack_without_requeue_discards() {
        let broker = MemoryBroker::new();
        let channel = open_channel(&broker).await;
        declare_bound_queue(&channel, "q").await;

        channel.publish("x", "q", b"drop".to_vec()).await.expect("publish");
        let mut deliveries = channel.consume("q").await.expect("consume");

        let delivery = deliveries.recv().await.expect("delivery");
        channel.nack(delivery.delivery_tag, false).await.expect("nack");
        assert_eq!(broker.queue_depth("q"), Some(0));

        let next = timeout(Duration::from_millis(50), deliveries.recv()).await;
        assert!(next.is_err(), "discarded message was redelivered");
    }

    #[tokio::test]
    async fn conflicting_redeclaration_is_rejected() {
        let broker = MemoryBroker::new();
        let channel = open_channel(&broker).await;
        channel.declare_queue("q", true).await.expect("declare");
        channel.declare_queue("q", true).await.expect("identical redeclare");

        let err = channel.declare_queue("q", false).await.expect_err("drift");
        assert!(matches!(err, TransportError::Declare { .. }));
    }

    #[tokio::test]
    async fn injected_fault_fires_once() {
        let broker = MemoryBroker::new();
        broker.inject_fault(Fault::DeclareQueue("q".to_string()));
        let channel = open_channel(&broker).await;

        let err = channel.declare_queue("q", true).await.expect_err("fault");
        assert!(matches!(err, TransportError::Declare { .. }));
        channel.declare_queue("q", true).await.expect("second attempt");
    }

    #[tokio::test]
    async fn publish_fault_surfaces_error() {
        let broker = MemoryBroker::new();
        let channel = open_channel(&broker).await;
        declare_bound_queue(&channel, "q").await;

        broker.inject_fault(Fault::Publish("q".to_string()));
        let err = channel
            .publish("x", "q", b"boom".to_vec())
            .await
            .expect_err("publish fault");
        assert!(matches!(err, TransportError::Publish { .. }));
    }

    #[tokio::test]
    async fn close_returns_unacked_to_queue() {
        let broker = MemoryBroker::new();
        let channel = open_channel(&broker).await;
        declare_bound_queue(&channel, "q").await;

        channel.publish("x", "q", b"pending".to_vec()).await.expect("publish");
        let mut deliveries = channel.consume("q").await.expect("consume");
        let _delivery = deliveries.recv().await.expect("delivery");
        assert_eq!(broker.queue_depth("q"), Some(0));

        channel.close().await.expect("close");
        assert_eq!(broker.queue_depth("q"), Some(1));

        let err = channel.ack(1).await.expect_err("closed");
        assert!(matches!(err, TransportError::Closed));
    }

    #[tokio::test]
    async fn unroutable_publish_is_dropped() {
        let broker = MemoryBroker::new();
        let channel = open_channel(&broker).await;
        channel.declare_exchange("x").await.expect("exchange");

        channel
            .publish("x", "nowhere", b"lost".to_vec())
            .await
            .expect("unroutable publish is not an error");
    }
}
