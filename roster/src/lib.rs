//! # Roster
//!
//! Presence and fan-out routing for a cluster of real-time connection
//! servers: which users currently have live connections, on which node
//! each connection terminates, and how to deliver a message to every
//! connection of a user with one transport call per node.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     Roster (facade)                      │
//! │  PresenceDirectory   FanoutRouter   StalePresenceReclaimer│
//! │        │ transitions ───► EventBus ◄─── wiped/error      │
//! ├──────────────┬──────────────────┬────────────────────────┤
//! │   SetStore   │   NodeRegistry   │    ForwardTransport    │
//! │ (shared sets,│ (conn → node,    │ (payload → connections │
//! │ atomic batch)│  namespace,      │  on one node)          │
//! │              │  local address)  │                        │
//! └──────────────┴──────────────────┴────────────────────────┘
//! ```
//!
//! The three seams at the bottom are trait objects injected into the
//! facade; in-memory implementations back the test suite. All presence
//! state lives in the shared store as two-tier sets — a global set per
//! user and a per-node subset — so every node in the cluster observes
//! the same directory.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::rc::Rc;
//! use roster::{Roster, RosterConfig, MemoryStore, SharedRegistry, RecordingTransport};
//!
//! let registry = Rc::new(SharedRegistry::new("omega:", "10.0.0.1:4500".into()));
//! let roster = Roster::new(
//!     Rc::new(MemoryStore::new()),
//!     registry,
//!     Rc::new(RecordingTransport::new()),
//!     RosterConfig::new(),
//! );
//! ```
//!
//! ## Concurrency model
//!
//! Single-threaded cooperative execution: every store round-trip and
//! transport dispatch is an async suspension point, nothing blocks, and
//! correctness under interleaving rests on the store applying each
//! batch atomically. Operations on the same user are not serialized
//! beyond that — see [`PresenceDirectory`] for the one accepted race.

#![deny(missing_docs)]

mod types;

pub use types::{ConnectionId, NodeAddress, UserId};

pub mod keys;

mod events;

pub use events::{EventBus, RosterEvent, SubscriptionId};

mod store;

pub use store::{BatchOp, BatchReply, MemoryStore, SetStore, StoreError};

mod registry;

pub use registry::{NodeRegistry, RegistryError, SharedRegistry};

mod transport;

pub use transport::{ForwardTransport, RecordedDispatch, RecordingTransport, TransportError};

mod session;

pub use session::{RosterConfig, Session, SessionContext, DEFAULT_UID_FIELD};

mod directory;

pub use directory::PresenceDirectory;

mod reclaim;

pub use reclaim::{ReclaimError, StalePresenceReclaimer};

mod router;

pub use router::{FanoutError, FanoutRouter};

mod roster;

pub use roster::Roster;
