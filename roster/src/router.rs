//! Fan-out router: one message to every connection of a user, one
//! transport call per owning node.
//!
//! # Flow
//!
//! 1. Read the target users' global presence sets (one atomic batch)
//! 2. Resolve each connection to its owning node (one registry call)
//! 3. Group connections by owning node
//! 4. Dispatch once per distinct node via the forward transport
//!
//! Every group is attempted even after a failure; the first error wins
//! and is reported only after all groups have settled. Delivery is
//! best-effort — callers needing a guarantee inspect the result and
//! apply their own retry policy.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::Value;

use crate::keys;
use crate::registry::{NodeRegistry, RegistryError};
use crate::store::{BatchOp, SetStore, StoreError};
use crate::transport::{ForwardTransport, TransportError};
use crate::{ConnectionId, NodeAddress, UserId};

/// Errors from a fan-out operation.
#[derive(Debug, thiserror::Error)]
pub enum FanoutError {
    /// Reading the presence sets failed; nothing was dispatched.
    #[error("fanout store read failed: {0}")]
    Store(#[from] StoreError),

    /// Owner resolution failed; nothing was dispatched.
    #[error("fanout owner resolution failed: {0}")]
    Registry(#[from] RegistryError),

    /// At least one per-node dispatch failed. Other groups were still
    /// attempted; this carries the first failure observed.
    #[error("dispatch to {node} failed: {source}")]
    Dispatch {
        /// First node whose dispatch failed.
        node: NodeAddress,
        /// The underlying transport failure.
        #[source]
        source: TransportError,
    },
}

/// Routes application messages to all live connections of target users.
#[derive(Debug)]
pub struct FanoutRouter {
    store: Rc<dyn SetStore>,
    registry: Rc<dyn NodeRegistry>,
    transport: Rc<dyn ForwardTransport>,
}

impl FanoutRouter {
    /// Create a router over the given collaborators.
    pub fn new(
        store: Rc<dyn SetStore>,
        registry: Rc<dyn NodeRegistry>,
        transport: Rc<dyn ForwardTransport>,
    ) -> Self {
        Self {
            store,
            registry,
            transport,
        }
    }

    /// Send `message` to every live connection of `uid`.
    ///
    /// An offline user is a trivial success with zero dispatches.
    pub async fn send_to_user(&self, uid: &UserId, message: &Value) -> Result<(), FanoutError> {
        let global = keys::global_key(self.registry.namespace(), uid);
        let connections = self
            .store
            .members(&global)
            .await?
            .into_iter()
            .map(ConnectionId::from)
            .collect();
        self.dispatch(connections, message).await
    }

    /// Send `message` to every live connection of every user in `uids`.
    ///
    /// Duplicate and empty uids are dropped before resolution, so a user
    /// listed twice still receives each message at most once per
    /// connection. All member reads run in one atomic batch and the
    /// combined connection list is grouped so one dispatch per node
    /// covers connections of different users. An empty filtered list is
    /// an immediate success.
    pub async fn send_to_users(&self, uids: &[UserId], message: &Value) -> Result<(), FanoutError> {
        let uids = dedup_non_empty(uids);
        if uids.is_empty() {
            return Ok(());
        }

        let ns = self.registry.namespace();
        let ops = uids
            .iter()
            .map(|uid| BatchOp::Members(keys::global_key(ns, uid)))
            .collect();
        let replies = self.store.batch(ops).await.map_err(FanoutError::Store)?;

        let mut connections = Vec::new();
        for (index, reply) in replies.into_iter().enumerate() {
            let members = reply.into_members(index).map_err(FanoutError::Store)?;
            connections.extend(members.into_iter().map(ConnectionId::from));
        }

        self.dispatch(connections, message).await
    }

    /// Resolve owners, group, and dispatch once per distinct node.
    async fn dispatch(
        &self,
        connections: Vec<ConnectionId>,
        message: &Value,
    ) -> Result<(), FanoutError> {
        if connections.is_empty() {
            return Ok(());
        }

        let owners = self.registry.owners(&connections).await?;
        let groups = group_by_owner(connections, owners);

        let mut first_error = None;
        for (node, group) in &groups {
            tracing::debug!("forwarding to {} connections on {}", group.len(), node);
            if let Err(source) = self.transport.forward(node, message, group).await {
                tracing::warn!("dispatch to {} failed: {}", node, source);
                first_error.get_or_insert(FanoutError::Dispatch {
                    node: node.clone(),
                    source,
                });
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Drop empty uids and duplicates, preserving first-occurrence order.
fn dedup_non_empty(uids: &[UserId]) -> Vec<UserId> {
    let mut seen = Vec::new();
    for uid in uids {
        if !uid.is_empty() && !seen.contains(uid) {
            seen.push(uid.clone());
        }
    }
    seen
}

/// Group connections under their owning node.
///
/// Connections the registry no longer knows have no owner and are
/// dropped — there is no node to address them through. Ordering within
/// a group follows the input; group iteration order is by address.
fn group_by_owner(
    connections: Vec<ConnectionId>,
    owners: Vec<Option<NodeAddress>>,
) -> BTreeMap<NodeAddress, Vec<ConnectionId>> {
    let mut groups: BTreeMap<NodeAddress, Vec<ConnectionId>> = BTreeMap::new();
    for (connection, owner) in connections.into_iter().zip(owners) {
        match owner {
            Some(node) => groups.entry(node).or_default().push(connection),
            None => {
                tracing::debug!("dropping unroutable connection {}", connection);
            }
        }
    }
    groups
}
