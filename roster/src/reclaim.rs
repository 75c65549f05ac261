//! Stale presence reclamation.
//!
//! A node that (re)registers is either starting fresh or recovering from
//! a crash. Either way, any presence entries still referencing its
//! address belong to a previous incarnation and must be purged before
//! the node's new connections repopulate them — otherwise crashed-away
//! users would keep reporting as online forever.
//!
//! # Design
//!
//! Reclamation runs in three store round-trips: scan the node's local
//! presence keys, read each local set's members, then one atomic batch
//! that strips every member from its global set and deletes the local
//! key. A connection established strictly after the scan can be stripped
//! by the batch; that narrow window is accepted — the connection layer's
//! own disconnect path self-corrects, or the client reconnects.

use std::rc::Rc;

use crate::events::{EventBus, RosterEvent};
use crate::keys;
use crate::store::{BatchOp, SetStore, StoreError};
use crate::NodeAddress;

/// Errors from a reclamation run.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReclaimError {
    /// A store round-trip failed; state is left as the store holds it.
    #[error("reclaim for {node} failed: {source}")]
    Store {
        /// The node whose entries were being reclaimed.
        node: NodeAddress,
        /// The underlying store failure.
        #[source]
        source: StoreError,
    },
}

/// Purges presence entries left behind by a node's previous incarnation.
#[derive(Debug)]
pub struct StalePresenceReclaimer {
    store: Rc<dyn SetStore>,
    events: Rc<EventBus>,
    namespace: String,
}

impl StalePresenceReclaimer {
    /// Create a reclaimer over `store`, publishing outcomes to `events`.
    pub fn new(store: Rc<dyn SetStore>, events: Rc<EventBus>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            events,
            namespace: namespace.into(),
        }
    }

    /// Handle a node (re)registration: purge every presence entry that
    /// still references `node`.
    ///
    /// Emits [`RosterEvent::Wiped`] on success and [`RosterEvent::Error`]
    /// on failure — registration is event-driven background work with no
    /// caller to report to. The `Result` is returned as well for callers
    /// that do want to inspect the outcome directly.
    pub async fn on_node_registered(&self, node: &NodeAddress) -> Result<(), ReclaimError> {
        match self.reclaim(node).await {
            Ok(purged) => {
                tracing::info!("reclaimed {} stale presence keys for {}", purged, node);
                self.events.emit(&RosterEvent::Wiped(node.clone()));
                Ok(())
            }
            Err(source) => {
                let err = ReclaimError::Store {
                    node: node.clone(),
                    source,
                };
                tracing::warn!("stale presence reclamation failed: {}", err);
                self.events.emit(&RosterEvent::Error(err.to_string()));
                Err(err)
            }
        }
    }

    /// Returns the number of local keys purged.
    async fn reclaim(&self, node: &NodeAddress) -> Result<usize, StoreError> {
        let prefix = keys::local_prefix(&self.namespace, node);
        let local_keys = self.store.scan_keys(&prefix).await?;
        if local_keys.is_empty() {
            return Ok(0);
        }

        let read_ops = local_keys
            .iter()
            .map(|key| BatchOp::Members(key.clone()))
            .collect();
        let replies = self.store.batch(read_ops).await?;

        let mut purge = Vec::new();
        for (index, (key, reply)) in local_keys.iter().zip(replies).enumerate() {
            let members = reply.into_members(index)?;
            // The scan returned only keys under our local prefix, so the
            // strip below cannot produce a foreign uid.
            if let Some(uid) = keys::uid_from_key(key, &prefix) {
                let global = keys::global_key(&self.namespace, &uid);
                for member in members {
                    purge.push(BatchOp::RemoveMember(global.clone(), member));
                }
            }
            purge.push(BatchOp::RemoveKey(key.clone()));
        }

        self.store.batch(purge).await?;
        Ok(local_keys.len())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use crate::store::test_support::FailingStore;
    use crate::store::MemoryStore;
    use crate::UserId;

    use super::*;

    struct Fixture {
        store: Rc<MemoryStore>,
        reclaimer: StalePresenceReclaimer,
        events: Rc<RefCell<Vec<RosterEvent>>>,
    }

    fn fixture() -> Fixture {
        let store = Rc::new(MemoryStore::new());
        let bus = Rc::new(EventBus::new());

        let events = Rc::new(RefCell::new(Vec::new()));
        {
            let events = events.clone();
            bus.subscribe(move |event| events.borrow_mut().push(event.clone()));
        }

        Fixture {
            store: store.clone(),
            reclaimer: StalePresenceReclaimer::new(store, bus, "ns:"),
            events,
        }
    }

    async fn seed_connection(store: &MemoryStore, node: &str, uid: &str, conn: &str) {
        let node = NodeAddress::new(node);
        let uid = UserId::new(uid);
        store
            .batch(vec![
                BatchOp::AddMember(keys::local_key("ns:", &node, &uid), conn.to_string()),
                BatchOp::AddMember(keys::global_key("ns:", &uid), conn.to_string()),
            ])
            .await
            .expect("seed");
    }

    #[tokio::test]
    async fn test_reclaim_purges_node_entries() {
        let f = fixture();
        seed_connection(&f.store, "a:1", "42", "c1").await;
        seed_connection(&f.store, "a:1", "7", "c2").await;

        f.reclaimer
            .on_node_registered(&NodeAddress::new("a:1"))
            .await
            .expect("reclaim should succeed");

        assert!(!f
            .store
            .exists(&keys::global_key("ns:", &UserId::new("42")))
            .await
            .expect("query"));
        assert_eq!(f.store.key_count(), 0);
        assert_eq!(
            f.events.borrow().as_slice(),
            &[RosterEvent::Wiped(NodeAddress::new("a:1"))]
        );
    }

    #[tokio::test]
    async fn test_reclaim_leaves_other_nodes_alone() {
        let f = fixture();
        seed_connection(&f.store, "a:1", "42", "c1").await;
        seed_connection(&f.store, "b:1", "42", "c2").await;

        f.reclaimer
            .on_node_registered(&NodeAddress::new("a:1"))
            .await
            .expect("reclaim should succeed");

        // 42 keeps its b:1 connection, so the global set survives with
        // exactly that member.
        let global = keys::global_key("ns:", &UserId::new("42"));
        assert_eq!(
            f.store.members(&global).await.expect("members"),
            vec!["c2".to_string()]
        );
        let b = NodeAddress::new("b:1");
        assert!(f
            .store
            .exists(&keys::local_key("ns:", &b, &UserId::new("42")))
            .await
            .expect("query"));
    }

    #[tokio::test]
    async fn test_reclaim_on_clean_node_is_noop() {
        let f = fixture();

        f.reclaimer
            .on_node_registered(&NodeAddress::new("fresh:1"))
            .await
            .expect("reclaim should succeed");

        assert_eq!(
            f.events.borrow().as_slice(),
            &[RosterEvent::Wiped(NodeAddress::new("fresh:1"))]
        );
    }

    #[tokio::test]
    async fn test_reclaim_failure_emits_error_event() {
        let bus = Rc::new(EventBus::new());
        let events = Rc::new(RefCell::new(Vec::new()));
        {
            let events = events.clone();
            bus.subscribe(move |event| events.borrow_mut().push(event.clone()));
        }
        let reclaimer = StalePresenceReclaimer::new(Rc::new(FailingStore), bus, "ns:");

        let result = reclaimer
            .on_node_registered(&NodeAddress::new("a:1"))
            .await;
        assert!(result.is_err());
        assert!(matches!(events.borrow()[0], RosterEvent::Error(_)));
    }
}
