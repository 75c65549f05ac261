//! Inter-node forward transport seam.
//!
//! The transport delivers one payload to a set of connections on one
//! node. The fan-out router calls it exactly once per distinct owning
//! node; delivery to unreachable nodes fails here, not in the router.

use std::cell::RefCell;
use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::{ConnectionId, NodeAddress};

/// Errors from transport dispatch.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The target node could not be reached.
    #[error("node unreachable: {node}")]
    NodeUnreachable {
        /// The node that did not answer.
        node: NodeAddress,
    },

    /// The target node rejected or failed the delivery.
    #[error("dispatch to {node} failed: {reason}")]
    DispatchFailed {
        /// The node that reported the failure.
        node: NodeAddress,
        /// Node-reported failure detail.
        reason: String,
    },
}

/// Delivers a payload to a list of connections on a single node.
#[async_trait(?Send)]
pub trait ForwardTransport: fmt::Debug {
    /// Deliver `message` to `connections` on `node`.
    ///
    /// Completion means the node accepted the payload; per-connection
    /// delivery beyond that is best-effort.
    async fn forward(
        &self,
        node: &NodeAddress,
        message: &Value,
        connections: &[ConnectionId],
    ) -> Result<(), TransportError>;
}

/// A dispatch observed by [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedDispatch {
    /// Target node of the dispatch.
    pub node: NodeAddress,
    /// The payload that was sent.
    pub message: Value,
    /// Connections the payload was addressed to, in dispatch order.
    pub connections: Vec<ConnectionId>,
}

/// In-memory [`ForwardTransport`] that records dispatches for assertions.
///
/// Nodes marked unreachable fail their dispatch while everything else
/// still goes through, which is exactly the partial-failure shape the
/// router must report.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    dispatches: RefCell<Vec<RecordedDispatch>>,
    unreachable: RefCell<Vec<NodeAddress>>,
}

impl RecordingTransport {
    /// Create a transport with no recorded dispatches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future dispatch to `node` fail.
    pub fn mark_unreachable(&self, node: NodeAddress) {
        self.unreachable.borrow_mut().push(node);
    }

    /// All dispatches recorded so far, in call order.
    pub fn dispatches(&self) -> Vec<RecordedDispatch> {
        self.dispatches.borrow().clone()
    }

    /// Number of dispatches recorded so far.
    pub fn dispatch_count(&self) -> usize {
        self.dispatches.borrow().len()
    }

    /// Dispatches addressed to `node`.
    pub fn dispatches_to(&self, node: &NodeAddress) -> Vec<RecordedDispatch> {
        self.dispatches
            .borrow()
            .iter()
            .filter(|d| &d.node == node)
            .cloned()
            .collect()
    }
}

#[async_trait(?Send)]
impl ForwardTransport for RecordingTransport {
    async fn forward(
        &self,
        node: &NodeAddress,
        message: &Value,
        connections: &[ConnectionId],
    ) -> Result<(), TransportError> {
        if self.unreachable.borrow().contains(node) {
            return Err(TransportError::NodeUnreachable { node: node.clone() });
        }
        self.dispatches.borrow_mut().push(RecordedDispatch {
            node: node.clone(),
            message: message.clone(),
            connections: connections.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_records_dispatch() {
        let transport = RecordingTransport::new();
        transport
            .forward(
                &NodeAddress::new("a:1"),
                &json!({"t": 1}),
                &[ConnectionId::new("c1"), ConnectionId::new("c2")],
            )
            .await
            .expect("dispatch should succeed");

        let dispatches = transport.dispatches();
        assert_eq!(dispatches.len(), 1);
        assert_eq!(dispatches[0].node, NodeAddress::new("a:1"));
        assert_eq!(dispatches[0].connections.len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_node_fails() {
        let transport = RecordingTransport::new();
        transport.mark_unreachable(NodeAddress::new("dead:1"));

        let result = transport
            .forward(&NodeAddress::new("dead:1"), &json!(null), &[])
            .await;
        assert!(matches!(
            result,
            Err(TransportError::NodeUnreachable { .. })
        ));
        assert_eq!(transport.dispatch_count(), 0);
    }
}
