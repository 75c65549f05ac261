//! Presence event publication.
//!
//! Components publish [`RosterEvent`]s through an explicit [`EventBus`]
//! rather than an ambient emitter: listeners subscribe with a callback
//! and receive a [`SubscriptionId`] handle for later removal.
//!
//! # Design
//!
//! - `emit` invokes every registered callback synchronously, in
//!   subscription order. Callbacks must not re-enter the bus mutably
//!   (subscribe/unsubscribe from inside a callback is not supported).
//! - The bus is shared via `Rc<EventBus>` between the directory, the
//!   reclaimer, and application code; it carries no store or transport
//!   concerns.

use std::cell::RefCell;
use std::fmt;

use crate::{NodeAddress, UserId};

/// Events observable by application code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterEvent {
    /// First live connection appeared for this user anywhere in the cluster.
    Online(UserId),

    /// Last live connection for this user went away.
    Offline(UserId),

    /// Stale presence entries of this node's previous incarnation were purged.
    Wiped(NodeAddress),

    /// Background work failed with no caller to report to.
    Error(String),
}

impl fmt::Display for RosterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online(uid) => write!(f, "online({uid})"),
            Self::Offline(uid) => write!(f, "offline({uid})"),
            Self::Wiped(node) => write!(f, "wiped({node})"),
            Self::Error(msg) => write!(f, "error({msg})"),
        }
    }
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn Fn(&RosterEvent)>;

/// Synchronous publish/subscribe bus for [`RosterEvent`]s.
pub struct EventBus {
    listeners: RefCell<Vec<(SubscriptionId, Listener)>>,
    next_id: RefCell<u64>,
}

impl EventBus {
    /// Create a bus with no listeners.
    pub fn new() -> Self {
        Self {
            listeners: RefCell::new(Vec::new()),
            next_id: RefCell::new(0),
        }
    }

    /// Register a listener; it receives every event emitted after this call.
    pub fn subscribe(&self, listener: impl Fn(&RosterEvent) + 'static) -> SubscriptionId {
        let mut next_id = self.next_id.borrow_mut();
        let id = SubscriptionId(*next_id);
        *next_id += 1;
        self.listeners.borrow_mut().push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if the handle was already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() < before
    }

    /// Deliver an event to every registered listener.
    pub fn emit(&self, event: &RosterEvent) {
        tracing::debug!("roster event: {}", event);
        for (_, listener) in self.listeners.borrow().iter() {
            listener(event);
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
