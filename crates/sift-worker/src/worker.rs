//! Filter worker: bring-up, serving, and shutdown.
//!
//! One worker owns one broker connection with prefetch 1: it processes one
//! request at a time and relies on the queue for backpressure. Horizontal
//! scaling runs more worker processes against the same request queue.
//! Bring-up failure is fatal; the process owner restarts the worker.

use std::sync::Arc;

use sift_broker::{
    BringupError, ConnectionLifecycle, ConnectionState, Role, Transport,
};
use sift_classifier::{Classifier, FailSafe};
use sift_rpc::RpcServer;
use sift_types::TopologyDescriptor;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::WorkerConfig;
use crate::handler::ClassifierHandler;

/// Errors fatal to the worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The broker connection never became ready.
    #[error("worker bring-up failed: {0}")]
    Bringup(#[from] BringupError),
}

/// Result type for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// The filter worker: a classifier collaborator behind the RPC server
/// shell. The classifier handle is constructed by the process owner and
/// passed in; the worker adds the fail-safe wrapper and the serving loop.
pub struct FilterWorker<C> {
    transport: Arc<dyn Transport>,
    topology: TopologyDescriptor,
    classifier: C,
    config: WorkerConfig,
}

impl<C> FilterWorker<C>
where
    C: Classifier + 'static,
{
    pub fn new(transport: Arc<dyn Transport>, topology: TopologyDescriptor, classifier: C) -> Self {
        Self::with_config(transport, topology, classifier, WorkerConfig::default())
    }

    pub fn with_config(
        transport: Arc<dyn Transport>,
        topology: TopologyDescriptor,
        classifier: C,
        config: WorkerConfig,
    ) -> Self {
        Self {
            transport,
            topology,
            classifier,
            config,
        }
    }

    /// Bring the connection up and start serving in a background task.
    ///
    /// Returns once the worker is `Ready`; a bring-up failure is returned
    /// as-is, without retry.
    pub async fn spawn(self) -> WorkerResult<WorkerHandle> {
        let lifecycle = Arc::new(ConnectionLifecycle::new(
            self.transport,
            self.topology.clone(),
        ));
        let ready = lifecycle.bring_up(Role::Worker).await?;

        let classifier = match self.config.classify_budget() {
            Some(budget) => FailSafe::with_budget(self.classifier, budget),
            None => FailSafe::new(self.classifier),
        };
        let handler = Arc::new(ClassifierHandler::new(classifier));
        let server = RpcServer::new(&self.topology, handler);

        let serve_lifecycle = Arc::clone(&lifecycle);
        let join = tokio::spawn(async move {
            server.serve(ready).await;
            serve_lifecycle.remote_closed();
        });
        info!("filter worker started");

        Ok(WorkerHandle { lifecycle, join })
    }
}

/// Handle to a running worker: state observation and graceful shutdown.
pub struct WorkerHandle {
    lifecycle: Arc<ConnectionLifecycle>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    /// Subscribe to connection state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.lifecycle.subscribe()
    }

    /// Close the connection and wait for the serving loop to drain. Further
    /// deliveries are rejected; in-flight unacked requests return to the
    /// queue for another worker instance.
    pub async fn shutdown(self) {
        self.lifecycle.close().await;
        let _ = self.join.await;
        info!("filter worker stopped");
    }
}
