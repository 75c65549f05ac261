//! Presence directory: who is online, and on which nodes.
//!
//! The directory owns the two-tier presence sets in the shared store —
//! one global set per user plus one subset per (node, user) — and
//! derives online/offline transitions from the batch replies of its own
//! mutations. No transition state is stored anywhere.
//!
//! # Design
//!
//! - `connect` and `disconnect` each issue one atomic three-op batch, so
//!   concurrent calls for the same user can never observe a half-applied
//!   mutation. Atomicity is per batch only: two racing *first*
//!   connections for the same user may both observe "was empty" and both
//!   fire `Online`. This is a known, accepted race inherited from the
//!   design — callers needing stronger guarantees must serialize per
//!   user themselves.
//! - Counts are defined as the length of the corresponding key scan.
//!   There is no separate counter to drift out of sync.

use std::collections::HashSet;
use std::rc::Rc;

use crate::events::{EventBus, RosterEvent};
use crate::keys;
use crate::registry::NodeRegistry;
use crate::session::{RosterConfig, SessionContext};
use crate::store::{BatchOp, SetStore, StoreError};
use crate::{ConnectionId, NodeAddress, UserId};

/// Tracks per-user live connection sets and reports presence transitions.
#[derive(Debug)]
pub struct PresenceDirectory {
    store: Rc<dyn SetStore>,
    registry: Rc<dyn NodeRegistry>,
    events: Rc<EventBus>,
    config: RosterConfig,
}

impl PresenceDirectory {
    /// Create a directory over the given collaborators.
    pub fn new(
        store: Rc<dyn SetStore>,
        registry: Rc<dyn NodeRegistry>,
        events: Rc<EventBus>,
        config: RosterConfig,
    ) -> Self {
        Self {
            store,
            registry,
            events,
            config,
        }
    }

    fn namespace(&self) -> &str {
        self.registry.namespace()
    }

    /// Record a new connection for `uid` on `node`.
    ///
    /// Empty uids are a silent no-op. Emits [`RosterEvent::Online`]
    /// exactly when the user's global set was empty before the batch —
    /// once per transition, never per connection. Duplicate connection
    /// ids are absorbed by set semantics and cannot re-fire `Online`.
    pub async fn connect(
        &self,
        node: &NodeAddress,
        uid: &UserId,
        connection: &ConnectionId,
    ) -> Result<(), StoreError> {
        if uid.is_empty() {
            return Ok(());
        }

        let ns = self.namespace();
        let global = keys::global_key(ns, uid);
        let local = keys::local_key(ns, node, uid);

        let replies = self
            .store
            .batch(vec![
                BatchOp::Exists(global.clone()),
                BatchOp::AddMember(local, connection.as_str().to_string()),
                BatchOp::AddMember(global, connection.as_str().to_string()),
            ])
            .await?;

        let was_online = replies
            .first()
            .cloned()
            .ok_or(StoreError::UnexpectedReply {
                index: 0,
                expected: "bool",
            })?
            .into_bool(0)?;

        if !was_online {
            tracing::debug!("user {} came online via {}", uid, connection);
            self.events.emit(&RosterEvent::Online(uid.clone()));
        }
        Ok(())
    }

    /// Remove a connection for `uid` on `node`.
    ///
    /// Empty uids are a silent no-op. Emits [`RosterEvent::Offline`]
    /// exactly when the user's global set no longer exists after the
    /// batch.
    pub async fn disconnect(
        &self,
        node: &NodeAddress,
        uid: &UserId,
        connection: &ConnectionId,
    ) -> Result<(), StoreError> {
        if uid.is_empty() {
            return Ok(());
        }

        let ns = self.namespace();
        let global = keys::global_key(ns, uid);
        let local = keys::local_key(ns, node, uid);

        let replies = self
            .store
            .batch(vec![
                BatchOp::RemoveMember(local, connection.as_str().to_string()),
                BatchOp::RemoveMember(global.clone(), connection.as_str().to_string()),
                BatchOp::Exists(global),
            ])
            .await?;

        let still_online = replies
            .get(2)
            .cloned()
            .ok_or(StoreError::UnexpectedReply {
                index: 2,
                expected: "bool",
            })?
            .into_bool(2)?;

        if !still_online {
            tracing::debug!("user {} went offline", uid);
            self.events.emit(&RosterEvent::Offline(uid.clone()));
        }
        Ok(())
    }

    /// Intake for the connection layer's "connected" event.
    ///
    /// Extracts the user id from the session's request context under the
    /// configured field and tracks it against the local node. Untracked
    /// sessions are ignored.
    pub async fn connected(&self, session: &dyn SessionContext) -> Result<(), StoreError> {
        match session.user_id(self.config.uid_field_name()) {
            Some(uid) => {
                let node = self.registry.local_address().clone();
                self.connect(&node, &uid, session.connection_id()).await
            }
            None => Ok(()),
        }
    }

    /// Intake for the connection layer's "disconnected" event.
    pub async fn disconnected(&self, session: &dyn SessionContext) -> Result<(), StoreError> {
        match session.user_id(self.config.uid_field_name()) {
            Some(uid) => {
                let node = self.registry.local_address().clone();
                self.disconnect(&node, &uid, session.connection_id()).await
            }
            None => Ok(()),
        }
    }

    /// Whether `uid` has at least one live connection anywhere.
    pub async fn is_online(&self, uid: &UserId) -> Result<bool, StoreError> {
        self.store
            .exists(&keys::global_key(self.namespace(), uid))
            .await
    }

    /// Online state of each uid, in input order.
    ///
    /// One result per input; duplicates are reported independently. All
    /// existence checks run in a single atomic batch.
    pub async fn are_online(&self, uids: &[UserId]) -> Result<Vec<bool>, StoreError> {
        let ns = self.namespace();
        let ops = uids
            .iter()
            .map(|uid| BatchOp::Exists(keys::global_key(ns, uid)))
            .collect();

        let replies = self.store.batch(ops).await?;
        replies
            .into_iter()
            .enumerate()
            .map(|(index, reply)| reply.into_bool(index))
            .collect()
    }

    /// Every user with a live connection anywhere in the cluster.
    pub async fn all_users(&self) -> Result<HashSet<UserId>, StoreError> {
        let prefix = keys::global_prefix(self.namespace());
        self.users_under(&prefix).await
    }

    /// Every user with a live connection on `node`.
    pub async fn users_on_node(&self, node: &NodeAddress) -> Result<HashSet<UserId>, StoreError> {
        let prefix = keys::local_prefix(self.namespace(), node);
        self.users_under(&prefix).await
    }

    /// Number of users online cluster-wide. Always equals
    /// `all_users().len()`.
    pub async fn count_all_users(&self) -> Result<usize, StoreError> {
        Ok(self.all_users().await?.len())
    }

    /// Number of users online on `node`. Always equals
    /// `users_on_node(node).len()`.
    pub async fn count_users_on_node(&self, node: &NodeAddress) -> Result<usize, StoreError> {
        Ok(self.users_on_node(node).await?.len())
    }

    async fn users_under(&self, prefix: &str) -> Result<HashSet<UserId>, StoreError> {
        let scanned = self.store.scan_keys(prefix).await?;
        Ok(scanned
            .iter()
            .filter_map(|key| keys::uid_from_key(key, prefix))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use crate::registry::SharedRegistry;
    use crate::store::MemoryStore;

    use super::*;

    fn node(address: &str) -> NodeAddress {
        NodeAddress::new(address)
    }

    struct Fixture {
        directory: PresenceDirectory,
        events: Rc<RefCell<Vec<RosterEvent>>>,
    }

    fn fixture() -> Fixture {
        let store = Rc::new(MemoryStore::new());
        let registry = Rc::new(SharedRegistry::new("ns:", node("local:1")));
        let bus = Rc::new(EventBus::new());

        let events = Rc::new(RefCell::new(Vec::new()));
        {
            let events = events.clone();
            bus.subscribe(move |event| events.borrow_mut().push(event.clone()));
        }

        Fixture {
            directory: PresenceDirectory::new(store, registry, bus, RosterConfig::new()),
            events,
        }
    }

    #[tokio::test]
    async fn test_connect_then_online() {
        let f = fixture();
        let uid = UserId::new("alice");

        f.directory
            .connect(&node("a:1"), &uid, &ConnectionId::new("c1"))
            .await
            .expect("connect should succeed");

        assert!(f.directory.is_online(&uid).await.expect("query"));
        assert_eq!(
            f.events.borrow().as_slice(),
            &[RosterEvent::Online(uid.clone())]
        );
    }

    #[tokio::test]
    async fn test_online_fires_once_across_n_connects() {
        let f = fixture();
        let uid = UserId::new("alice");

        for i in 0..4 {
            f.directory
                .connect(&node("a:1"), &uid, &ConnectionId::new(format!("c{i}")))
                .await
                .expect("connect should succeed");
        }

        let online_count = f
            .events
            .borrow()
            .iter()
            .filter(|e| matches!(e, RosterEvent::Online(_)))
            .count();
        assert_eq!(online_count, 1);
    }

    #[tokio::test]
    async fn test_duplicate_connect_no_spurious_online() {
        let f = fixture();
        let uid = UserId::new("alice");
        let conn = ConnectionId::new("c1");

        f.directory
            .connect(&node("a:1"), &uid, &conn)
            .await
            .expect("connect");
        f.directory
            .connect(&node("a:1"), &uid, &conn)
            .await
            .expect("connect");

        assert_eq!(f.events.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_offline_only_after_last_disconnect() {
        let f = fixture();
        let uid = UserId::new("alice");
        let a = node("a:1");

        f.directory
            .connect(&a, &uid, &ConnectionId::new("c1"))
            .await
            .expect("connect");
        f.directory
            .connect(&a, &uid, &ConnectionId::new("c2"))
            .await
            .expect("connect");

        f.directory
            .disconnect(&a, &uid, &ConnectionId::new("c1"))
            .await
            .expect("disconnect");
        assert!(f.directory.is_online(&uid).await.expect("query"));
        assert!(!f
            .events
            .borrow()
            .iter()
            .any(|e| matches!(e, RosterEvent::Offline(_))));

        f.directory
            .disconnect(&a, &uid, &ConnectionId::new("c2"))
            .await
            .expect("disconnect");
        assert!(!f.directory.is_online(&uid).await.expect("query"));

        let offline_count = f
            .events
            .borrow()
            .iter()
            .filter(|e| matches!(e, RosterEvent::Offline(_)))
            .count();
        assert_eq!(offline_count, 1);
    }

    #[tokio::test]
    async fn test_empty_uid_is_noop() {
        let f = fixture();
        let uid = UserId::new("");

        f.directory
            .connect(&node("a:1"), &uid, &ConnectionId::new("c1"))
            .await
            .expect("connect should be a no-op");
        f.directory
            .disconnect(&node("a:1"), &uid, &ConnectionId::new("c1"))
            .await
            .expect("disconnect should be a no-op");

        assert!(f.events.borrow().is_empty());
        assert_eq!(f.directory.count_all_users().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn test_are_online_preserves_order_and_duplicates() {
        let f = fixture();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");

        f.directory
            .connect(&node("a:1"), &alice, &ConnectionId::new("c1"))
            .await
            .expect("connect");

        let result = f
            .directory
            .are_online(&[bob.clone(), alice.clone(), bob.clone(), alice.clone()])
            .await
            .expect("are_online");
        assert_eq!(result, vec![false, true, false, true]);
    }

    #[tokio::test]
    async fn test_counts_match_listings() {
        let f = fixture();
        let a = node("a:1");
        let b = node("b:1");

        assert_eq!(f.directory.count_all_users().await.expect("count"), 0);
        assert_eq!(
            f.directory.count_all_users().await.expect("count"),
            f.directory.all_users().await.expect("list").len()
        );

        f.directory
            .connect(&a, &UserId::new("alice"), &ConnectionId::new("c1"))
            .await
            .expect("connect");
        f.directory
            .connect(&b, &UserId::new("bob"), &ConnectionId::new("c2"))
            .await
            .expect("connect");
        f.directory
            .connect(&a, &UserId::new("bob"), &ConnectionId::new("c3"))
            .await
            .expect("connect");

        assert_eq!(f.directory.count_all_users().await.expect("count"), 2);
        assert_eq!(f.directory.count_users_on_node(&a).await.expect("count"), 2);
        assert_eq!(f.directory.count_users_on_node(&b).await.expect("count"), 1);
        assert_eq!(
            f.directory.count_users_on_node(&a).await.expect("count"),
            f.directory.users_on_node(&a).await.expect("list").len()
        );
    }

    #[tokio::test]
    async fn test_session_intake_uses_local_node_and_uid_field() {
        let f = fixture();
        let session =
            crate::session::Session::new(ConnectionId::new("c1")).with_field("uid", "alice");

        f.directory
            .connected(&session)
            .await
            .expect("connected should succeed");
        assert!(f
            .directory
            .is_online(&UserId::new("alice"))
            .await
            .expect("query"));

        let local = node("local:1");
        assert_eq!(
            f.directory
                .users_on_node(&local)
                .await
                .expect("list")
                .len(),
            1
        );

        f.directory
            .disconnected(&session)
            .await
            .expect("disconnected should succeed");
        assert!(!f
            .directory
            .is_online(&UserId::new("alice"))
            .await
            .expect("query"));
    }

    #[tokio::test]
    async fn test_query_errors_surface_to_caller() {
        let directory = PresenceDirectory::new(
            Rc::new(crate::store::test_support::FailingStore),
            Rc::new(SharedRegistry::new("ns:", node("local:1"))),
            Rc::new(EventBus::new()),
            RosterConfig::new(),
        );
        let uid = UserId::new("alice");

        assert!(matches!(
            directory.is_online(&uid).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            directory.are_online(&[uid.clone()]).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            directory.all_users().await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            directory.users_on_node(&node("local:1")).await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_untracked_session_ignored() {
        let f = fixture();
        let session = crate::session::Session::new(ConnectionId::new("c1"));

        f.directory
            .connected(&session)
            .await
            .expect("connected should be a no-op");
        assert_eq!(f.directory.count_all_users().await.expect("count"), 0);
        assert!(f.events.borrow().is_empty());
    }
}
