//! Connection bring-up state machine.
//!
//! Turns a bare broker connection into a ready consumer: connect, open a
//! channel, declare the exchange, declare and bind both queues, set the
//! prefetch limit, register the consumer. The sequence is an explicit enum
//! plus transition function; any failing step lands in the terminal
//! `Failed` state and no later step runs. No message is delivered before
//! `Ready`, and this component never retries on its own - the process owner
//! decides whether to restart.

use std::sync::{Arc, Mutex};

use sift_types::TopologyDescriptor;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::transport::{Delivery, Transport, TransportChannel, TransportError};

/// Prefetch limit applied to every consuming role. One unacknowledged
/// delivery at a time is the sole backpressure mechanism; it is not
/// configurable per call.
pub const PREFETCH_LIMIT: u16 = 1;

/// Lifecycle of one broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Initial state; nothing attempted yet.
    Disconnected,

    /// Attempting the transport-level connection.
    Connecting,

    /// Logical channel established; exchange declaration in flight.
    ChannelOpen,

    /// Declaring queues, bindings, and the prefetch limit.
    TopologyDeclaring,

    /// Consumer registered; deliveries flow.
    Ready,

    /// Explicit shutdown in progress.
    Closing,

    /// Connection closed by either side; deliveries rejected.
    Closed,

    /// Bring-up failed. Terminal: no retry, no backoff.
    Failed,
}

impl ConnectionState {
    /// Whether this state permits advancing to `next`.
    pub fn can_advance_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, ChannelOpen)
                | (ChannelOpen, TopologyDeclaring)
                | (TopologyDeclaring, Ready)
                | (Ready, Closing)
                | (Ready, Closed)
                | (Closing, Closed)
                | (Connecting, Failed)
                | (ChannelOpen, Failed)
                | (TopologyDeclaring, Failed)
        )
    }

    /// Whether the state is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Failed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::ChannelOpen => "channel-open",
            ConnectionState::TopologyDeclaring => "topology-declaring",
            ConnectionState::Ready => "ready",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
            ConnectionState::Failed => "failed",
        };
        write!(f, "{label}")
    }
}

/// Which end of the queue pair this connection serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Consumes requests, publishes replies.
    Worker,

    /// Publishes requests, consumes replies.
    Client,
}

impl Role {
    /// The queue this role consumes from.
    pub fn consume_queue<'a>(&self, topology: &'a TopologyDescriptor) -> &'a str {
        match self {
            Role::Worker => &topology.request_queue,
            Role::Client => &topology.reply_queue,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Role::Worker => "worker",
            Role::Client => "client",
        }
    }
}

/// The discrete bring-up steps, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BringupStep {
    Connect,
    OpenChannel,
    DeclareExchange,
    DeclareRequestQueue,
    DeclareReplyQueue,
    BindRequestQueue,
    BindReplyQueue,
    SetPrefetch,
    RegisterConsumer,
}

impl std::fmt::Display for BringupStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            BringupStep::Connect => "connect",
            BringupStep::OpenChannel => "open-channel",
            BringupStep::DeclareExchange => "declare-exchange",
            BringupStep::DeclareRequestQueue => "declare-request-queue",
            BringupStep::DeclareReplyQueue => "declare-reply-queue",
            BringupStep::BindRequestQueue => "bind-request-queue",
            BringupStep::BindReplyQueue => "bind-reply-queue",
            BringupStep::SetPrefetch => "set-prefetch",
            BringupStep::RegisterConsumer => "register-consumer",
        };
        write!(f, "{label}")
    }
}

/// Bring-up errors. Fatal to the owning connection; never retried here.
#[derive(Debug, thiserror::Error)]
pub enum BringupError {
    /// Bring-up was already attempted on this lifecycle.
    #[error("bring-up already attempted (state {0})")]
    AlreadyStarted(ConnectionState),

    /// A bring-up step failed; later steps were not attempted.
    #[error("bring-up failed at step {step}: {source}")]
    Step {
        step: BringupStep,
        #[source]
        source: TransportError,
    },
}

/// Result type for bring-up operations.
pub type BringupResult<T> = Result<T, BringupError>;

/// A connection that completed bring-up: the channel plus the role's
/// delivery stream.
pub struct ReadyConnection {
    /// Channel for publishing and acknowledgment.
    pub channel: Arc<dyn TransportChannel>,

    /// Deliveries for the role's consume queue. Ends when the channel
    /// closes.
    pub deliveries: mpsc::Receiver<Delivery>,
}

impl std::fmt::Debug for ReadyConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadyConnection").finish_non_exhaustive()
    }
}

/// Owns one broker connection and drives its bring-up.
pub struct ConnectionLifecycle {
    transport: Arc<dyn Transport>,
    topology: TopologyDescriptor,
    state_tx: watch::Sender<ConnectionState>,
    channel: Mutex<Option<Arc<dyn TransportChannel>>>,
}

impl ConnectionLifecycle {
    pub fn new(transport: Arc<dyn Transport>, topology: TopologyDescriptor) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport,
            topology,
            state_tx,
            channel: Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Subscribe to state changes (ready/failed/closed signals).
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// The topology this lifecycle declares.
    pub fn topology(&self) -> &TopologyDescriptor {
        &self.topology
    }

    /// Advance the state machine, enforcing legal transitions.
    fn advance(&self, next: ConnectionState) {
        let current = self.state();
        if !current.can_advance_to(next) {
            warn!(from = %current, to = %next, "ignoring illegal state transition");
            return;
        }
        debug!(from = %current, to = %next, "connection state transition");
        // send_replace updates the value even with no subscribers.
        self.state_tx.send_replace(next);
    }

    /// Record a failed step and surface it. The state machine is left in
    /// `Failed` and the bring-up sequence stops.
    fn fail(&self, step: BringupStep, source: TransportError) -> BringupError {
        error!(step = %step, error = %source, "bring-up failed");
        self.advance(ConnectionState::Failed);
        BringupError::Step { step, source }
    }

    /// Drive the bring-up sequence for the given role.
    ///
    /// On success the lifecycle is `Ready` and the returned connection
    /// carries the role's delivery stream. On failure the lifecycle is
    /// `Failed` and must be discarded; the caller restarts the process or
    /// constructs a fresh lifecycle.
    pub async fn bring_up(&self, role: Role) -> BringupResult<ReadyConnection> {
        let state = self.state();
        if state != ConnectionState::Disconnected {
            return Err(BringupError::AlreadyStarted(state));
        }
        let topology = &self.topology;
        info!(
            role = role.label(),
            exchange = %topology.exchange,
            "starting broker bring-up"
        );

        self.advance(ConnectionState::Connecting);
        let connection = self
            .transport
            .connect()
            .await
            .map_err(|err| self.fail(BringupStep::Connect, err))?;
        let channel = connection
            .open_channel()
            .await
            .map_err(|err| self.fail(BringupStep::OpenChannel, err))?;
        self.advance(ConnectionState::ChannelOpen);

        channel
            .declare_exchange(&topology.exchange)
            .await
            .map_err(|err| self.fail(BringupStep::DeclareExchange, err))?;
        self.advance(ConnectionState::TopologyDeclaring);

        channel
            .declare_queue(&topology.request_queue, topology.durable)
            .await
            .map_err(|err| self.fail(BringupStep::DeclareRequestQueue, err))?;
        channel
            .declare_queue(&topology.reply_queue, topology.durable)
            .await
            .map_err(|err| self.fail(BringupStep::DeclareReplyQueue, err))?;
        channel
            .bind_queue(
                &topology.request_queue,
                &topology.exchange,
                &topology.request_routing_key,
            )
            .await
            .map_err(|err| self.fail(BringupStep::BindRequestQueue, err))?;
        channel
            .bind_queue(
                &topology.reply_queue,
                &topology.exchange,
                &topology.reply_routing_key,
            )
            .await
            .map_err(|err| self.fail(BringupStep::BindReplyQueue, err))?;
        channel
            .set_prefetch(PREFETCH_LIMIT)
            .await
            .map_err(|err| self.fail(BringupStep::SetPrefetch, err))?;

        // Consumption begins only here: no handler can observe a message
        // before the topology exists.
        let deliveries = channel
            .consume(role.consume_queue(topology))
            .await
            .map_err(|err| self.fail(BringupStep::RegisterConsumer, err))?;
        *self.channel.lock().unwrap() = Some(Arc::clone(&channel));
        self.advance(ConnectionState::Ready);
        info!(role = role.label(), "broker bring-up complete");

        Ok(ReadyConnection {
            channel,
            deliveries,
        })
    }

    /// Explicit shutdown: close the channel and settle in `Closed`.
    pub async fn close(&self) {
        let channel = self.channel.lock().unwrap().take();
        if let Some(channel) = channel {
            self.advance(ConnectionState::Closing);
            if let Err(err) = channel.close().await {
                warn!(error = %err, "error closing channel");
            }
            self.advance(ConnectionState::Closed);
            info!("connection closed");
        }
    }

    /// Record a closure initiated by the remote side (delivery stream ended
    /// without an explicit shutdown).
    pub fn remote_closed(&self) {
        if self.state() == ConnectionState::Ready {
            self.advance(ConnectionState::Closed);
            warn!("connection closed by remote side");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Fault, MemoryBroker};

    fn lifecycle_with(broker: MemoryBroker) -> ConnectionLifecycle {
        ConnectionLifecycle::new(Arc::new(broker), TopologyDescriptor::default())
    }

    #[tokio::test]
    async fn bring_up_reaches_ready() {
        let lifecycle = lifecycle_with(MemoryBroker::new());
        let mut states = lifecycle.subscribe();

        let ready = lifecycle.bring_up(Role::Worker).await.expect("bring-up");
        assert_eq!(lifecycle.state(), ConnectionState::Ready);
        drop(ready);

        // The watch channel has seen the terminal Ready value.
        assert_eq!(*states.borrow_and_update(), ConnectionState::Ready);
    }

    #[tokio::test]
    async fn declare_failure_never_reaches_ready() {
        let broker = MemoryBroker::new();
        broker.inject_fault(Fault::DeclareQueue("output".to_string()));
        let lifecycle = lifecycle_with(broker);

        let err = lifecycle.bring_up(Role::Worker).await.expect_err("must fail");
        assert!(matches!(
            err,
            BringupError::Step {
                step: BringupStep::DeclareReplyQueue,
                ..
            }
        ));
        assert_eq!(lifecycle.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn connect_failure_is_terminal() {
        let broker = MemoryBroker::new();
        broker.inject_fault(Fault::Connect);
        let lifecycle = lifecycle_with(broker);

        let err = lifecycle.bring_up(Role::Worker).await.expect_err("must fail");
        assert!(matches!(
            err,
            BringupError::Step {
                step: BringupStep::Connect,
                ..
            }
        ));
        assert_eq!(lifecycle.state(), ConnectionState::Failed);

        // Terminal: a second attempt is rejected, not retried.
        let err = lifecycle.bring_up(Role::Worker).await.expect_err("no retry");
        assert!(matches!(err, BringupError::AlreadyStarted(ConnectionState::Failed)));
    }

    #[tokio::test]
    async fn bind_failure_skips_later_steps() {
        let broker = MemoryBroker::new();
        broker.inject_fault(Fault::BindQueue("task".to_string()));
        let lifecycle = lifecycle_with(broker);

        let err = lifecycle.bring_up(Role::Worker).await.expect_err("must fail");
        assert!(matches!(
            err,
            BringupError::Step {
                step: BringupStep::BindRequestQueue,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn close_transitions_to_closed() {
        let lifecycle = lifecycle_with(MemoryBroker::new());
        let _ready = lifecycle.bring_up(Role::Worker).await.expect("bring-up");

        lifecycle.close().await;
        assert_eq!(lifecycle.state(), ConnectionState::Closed);
    }

    #[test]
    fn transition_table_rejects_skips() {
        use ConnectionState::*;
        assert!(Disconnected.can_advance_to(Connecting));
        assert!(!Disconnected.can_advance_to(Ready));
        assert!(!Failed.can_advance_to(Connecting));
        assert!(!Closed.can_advance_to(Connecting));
        assert!(TopologyDeclaring.can_advance_to(Failed));
        assert!(Ready.can_advance_to(Closed));
        assert!(Failed.is_terminal());
        assert!(Closed.is_terminal());
    }
}
