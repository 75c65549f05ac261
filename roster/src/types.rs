//! Identifier newtypes shared by every roster component.
//!
//! All three identifiers are opaque strings supplied by external layers:
//! the connection layer mints [`ConnectionId`]s and (optionally) attaches
//! a [`UserId`] to each request, while the cluster registry assigns each
//! process its [`NodeAddress`]. The roster never inspects their contents
//! beyond equality and key construction.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical user identity, as extracted from a connection's request context.
///
/// Equality is by value. An empty `UserId` means "not a tracked user" —
/// presence operations treat it as a silent no-op.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create a user id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Whether this id is empty (untracked connection).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The raw string form, as used in store keys.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifier of a single live client connection, unique cluster-wide.
///
/// Assigned by the connection layer; a connection terminates on exactly
/// one node for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Create a connection id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw string form, as stored in presence sets.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ConnectionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Address of one cluster node, stable while the process runs.
///
/// A restarted process may come back under the same or a fresh address;
/// either way its previous incarnation's presence entries are stale and
/// reclaimed on re-registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeAddress(String);

impl NodeAddress {
    /// Create a node address from any string-like value.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// The raw string form, as embedded in local presence keys.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeAddress {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for NodeAddress {
    fn from(address: String) -> Self {
        Self(address)
    }
}
