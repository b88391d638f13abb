//! Static description of the exchange/queue/binding set a role needs.

use serde::{Deserialize, Serialize};

/// The exchange, queues, and bindings shared by one client/worker pair.
///
/// Purely descriptive: declaring the topology is the connection lifecycle's
/// job. Both roles declare the same set so either side can start first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyDescriptor {
    /// Direct exchange both queues bind to.
    pub exchange: String,

    /// Queue the worker consumes requests from.
    pub request_queue: String,

    /// Queue the client consumes replies from.
    pub reply_queue: String,

    /// Routing key for requests.
    pub request_routing_key: String,

    /// Routing key for replies.
    pub reply_routing_key: String,

    /// Whether queues are declared durable.
    #[serde(default = "default_durable")]
    pub durable: bool,
}

fn default_durable() -> bool {
    true
}

impl Default for TopologyDescriptor {
    fn default() -> Self {
        Self {
            exchange: "sift.direct".to_string(),
            request_queue: "task".to_string(),
            reply_queue: "output".to_string(),
            request_routing_key: "task".to_string(),
            reply_routing_key: "output".to_string(),
            durable: true,
        }
    }
}

impl TopologyDescriptor {
    /// A topology where routing keys mirror the queue names.
    pub fn new(
        exchange: impl Into<String>,
        request_queue: impl Into<String>,
        reply_queue: impl Into<String>,
    ) -> Self {
        let request_queue = request_queue.into();
        let reply_queue = reply_queue.into();
        Self {
            exchange: exchange.into(),
            request_routing_key: request_queue.clone(),
            reply_routing_key: reply_queue.clone(),
            request_queue,
            reply_queue,
            durable: true,
        }
    }
}
