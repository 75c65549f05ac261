//! Cluster node registry seam.
//!
//! The registry is the roster's view of cluster topology: it knows the
//! cluster namespace prefix, the local node's address, and which node
//! owns any given connection. Node (re)registration events originate
//! here as well — the hosting process observes them and invokes the
//! reclaimer.
//!
//! # Design
//!
//! - [`NodeRegistry`] is a trait so implementations can range from a
//!   shared in-memory map ([`SharedRegistry`], tests and simulation) to
//!   a store-backed registry in production.
//! - Owner resolution is batched: the fan-out router resolves every
//!   connection of a send in one call.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use async_trait::async_trait;

use crate::{ConnectionId, NodeAddress};

/// Errors from registry operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    /// The registry backend could not be reached.
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    /// The registry rejected or failed a lookup.
    #[error("registry lookup failed: {0}")]
    LookupFailed(String),
}

/// Maps connections to their owning nodes and identifies the local node.
#[async_trait(?Send)]
pub trait NodeRegistry: fmt::Debug {
    /// Cluster namespace prefix shared by all store keys.
    fn namespace(&self) -> &str;

    /// Address of the node this process runs as.
    fn local_address(&self) -> &NodeAddress;

    /// Resolve the owning node of each connection, in input order.
    ///
    /// `None` entries are connections the registry no longer knows —
    /// their owning node cannot be determined.
    async fn owners(
        &self,
        connections: &[ConnectionId],
    ) -> Result<Vec<Option<NodeAddress>>, RegistryError>;
}

/// Shared in-memory [`NodeRegistry`] for tests and simulation.
///
/// The connection → node map is behind an `Rc`, so every node in a
/// multi-node test can hold its own `SharedRegistry` (with its own
/// local address) over one consistent cluster view — see
/// [`for_node`](SharedRegistry::for_node). Production deployments
/// replace this with a registry backed by the shared store.
#[derive(Debug)]
pub struct SharedRegistry {
    namespace: String,
    local: NodeAddress,
    owners: Rc<RefCell<HashMap<ConnectionId, NodeAddress>>>,
}

impl SharedRegistry {
    /// Create a registry for a node at `local` inside `namespace`.
    pub fn new(namespace: impl Into<String>, local: NodeAddress) -> Self {
        Self {
            namespace: namespace.into(),
            local,
            owners: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    /// A sibling registry for another node, sharing this cluster view.
    pub fn for_node(&self, local: NodeAddress) -> Self {
        Self {
            namespace: self.namespace.clone(),
            local,
            owners: self.owners.clone(),
        }
    }

    /// Record `connection` as terminating on `node`.
    pub fn assign(&self, connection: ConnectionId, node: NodeAddress) {
        self.owners.borrow_mut().insert(connection, node);
    }

    /// Forget a connection. Returns `false` if it was not assigned.
    pub fn unassign(&self, connection: &ConnectionId) -> bool {
        self.owners.borrow_mut().remove(connection).is_some()
    }

    /// Forget every connection owned by `node` (the node went away).
    pub fn drop_node(&self, node: &NodeAddress) {
        self.owners.borrow_mut().retain(|_, owner| owner != node);
    }
}

#[async_trait(?Send)]
impl NodeRegistry for SharedRegistry {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn local_address(&self) -> &NodeAddress {
        &self.local
    }

    async fn owners(
        &self,
        connections: &[ConnectionId],
    ) -> Result<Vec<Option<NodeAddress>>, RegistryError> {
        let owners = self.owners.borrow();
        Ok(connections
            .iter()
            .map(|conn| owners.get(conn).cloned())
            .collect())
    }
}
