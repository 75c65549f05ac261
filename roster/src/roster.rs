//! Roster facade: wires the directory, router, and reclaimer over one
//! set of collaborators.
//!
//! The three external collaborators — store, node registry, forward
//! transport — are injected once here and shared via `Rc`; there is no
//! ambient singleton. The hosting process forwards its connection-layer
//! and registry events into the facade and subscribes to the event bus
//! for `Online`/`Offline`/`Wiped`/`Error` notifications.

use std::rc::Rc;

use serde_json::Value;

use crate::directory::PresenceDirectory;
use crate::events::EventBus;
use crate::reclaim::{ReclaimError, StalePresenceReclaimer};
use crate::registry::NodeRegistry;
use crate::router::{FanoutError, FanoutRouter};
use crate::session::{RosterConfig, SessionContext};
use crate::store::{SetStore, StoreError};
use crate::transport::ForwardTransport;
use crate::{NodeAddress, UserId};

/// Presence tracking and fan-out routing over one cluster's collaborators.
///
/// # Example
///
/// ```rust,ignore
/// let roster = Roster::new(store, registry, transport, RosterConfig::new());
///
/// roster.events().subscribe(|event| println!("{event}"));
///
/// // Connection layer glue:
/// roster.connected(&session).await?;
///
/// // Registry glue:
/// roster.handle_node_registered(&address).await;
///
/// // Application sends:
/// roster.send_to_user(&uid, &json!({"t": 1})).await?;
/// ```
#[derive(Debug)]
pub struct Roster {
    directory: PresenceDirectory,
    router: FanoutRouter,
    reclaimer: StalePresenceReclaimer,
    events: Rc<EventBus>,
}

impl Roster {
    /// Wire a roster over the given collaborators.
    pub fn new(
        store: Rc<dyn SetStore>,
        registry: Rc<dyn NodeRegistry>,
        transport: Rc<dyn ForwardTransport>,
        config: RosterConfig,
    ) -> Self {
        let events = Rc::new(EventBus::new());
        let namespace = registry.namespace().to_string();

        Self {
            directory: PresenceDirectory::new(
                store.clone(),
                registry.clone(),
                events.clone(),
                config,
            ),
            router: FanoutRouter::new(store.clone(), registry, transport),
            reclaimer: StalePresenceReclaimer::new(store, events.clone(), namespace),
            events,
        }
    }

    /// The presence directory.
    pub fn directory(&self) -> &PresenceDirectory {
        &self.directory
    }

    /// The fan-out router.
    pub fn router(&self) -> &FanoutRouter {
        &self.router
    }

    /// The stale presence reclaimer.
    pub fn reclaimer(&self) -> &StalePresenceReclaimer {
        &self.reclaimer
    }

    /// The event bus all components publish to.
    pub fn events(&self) -> &Rc<EventBus> {
        &self.events
    }

    /// Connection-layer glue: a session connected on this node.
    pub async fn connected(&self, session: &dyn SessionContext) -> Result<(), StoreError> {
        self.directory.connected(session).await
    }

    /// Connection-layer glue: a session disconnected from this node.
    pub async fn disconnected(&self, session: &dyn SessionContext) -> Result<(), StoreError> {
        self.directory.disconnected(session).await
    }

    /// Registry glue: a node (re)registered; reclaim its stale entries.
    pub async fn handle_node_registered(&self, node: &NodeAddress) -> Result<(), ReclaimError> {
        self.reclaimer.on_node_registered(node).await
    }

    /// Send `message` to every live connection of `uid`.
    pub async fn send_to_user(&self, uid: &UserId, message: &Value) -> Result<(), FanoutError> {
        self.router.send_to_user(uid, message).await
    }

    /// Send `message` to every live connection of every user in `uids`.
    pub async fn send_to_users(&self, uids: &[UserId], message: &Value) -> Result<(), FanoutError> {
        self.router.send_to_users(uids, message).await
    }
}
