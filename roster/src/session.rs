//! Connection-layer intake seam.
//!
//! The connection layer raises "connected"/"disconnected" events, each
//! carrying a session object. The roster only needs two things from it:
//! the connection id and a request-context lookup for the configured
//! user-id field. A session without that field is not tracked.

use std::collections::HashMap;
use std::fmt;

use crate::{ConnectionId, UserId};

/// Default request-context field holding the user id.
pub const DEFAULT_UID_FIELD: &str = "uid";

/// Roster configuration.
///
/// # Example
///
/// ```rust,ignore
/// // Track users under the "account" request field instead of "uid".
/// let config = RosterConfig::new().uid_field("account");
/// ```
#[derive(Debug, Clone)]
pub struct RosterConfig {
    uid_field: String,
}

impl RosterConfig {
    /// Configuration with the default uid field.
    pub fn new() -> Self {
        Self {
            uid_field: DEFAULT_UID_FIELD.to_string(),
        }
    }

    /// Use a different request-context field for the user id.
    pub fn uid_field(mut self, field: impl Into<String>) -> Self {
        self.uid_field = field.into();
        self
    }

    /// The configured user-id field name.
    pub fn uid_field_name(&self) -> &str {
        &self.uid_field
    }
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// View of one live session as the connection layer presents it.
pub trait SessionContext: fmt::Debug {
    /// The session's connection id.
    fn connection_id(&self) -> &ConnectionId;

    /// Look up a request-context field by name.
    fn request_field(&self, name: &str) -> Option<&str>;

    /// The user id under `field`, if the session carries one.
    ///
    /// An empty value counts as absent: such sessions are not tracked.
    fn user_id(&self, field: &str) -> Option<UserId> {
        self.request_field(field)
            .filter(|value| !value.is_empty())
            .map(UserId::from)
    }
}

/// Plain [`SessionContext`] built from owned data.
///
/// Adapters for real connection layers implement the trait directly;
/// this type covers tests and simple embeddings.
#[derive(Debug, Clone)]
pub struct Session {
    id: ConnectionId,
    request: HashMap<String, String>,
}

impl Session {
    /// Create a session with an empty request context.
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            request: HashMap::new(),
        }
    }

    /// Attach a request-context field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.insert(name.into(), value.into());
        self
    }
}

impl SessionContext for Session {
    fn connection_id(&self) -> &ConnectionId {
        &self.id
    }

    fn request_field(&self, name: &str) -> Option<&str> {
        self.request.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_from_field() {
        let session = Session::new(ConnectionId::new("c1")).with_field("uid", "alice");
        assert_eq!(session.user_id("uid"), Some(UserId::new("alice")));
    }

    #[test]
    fn test_missing_field_is_untracked() {
        let session = Session::new(ConnectionId::new("c1"));
        assert_eq!(session.user_id("uid"), None);
    }

    #[test]
    fn test_empty_field_is_untracked() {
        let session = Session::new(ConnectionId::new("c1")).with_field("uid", "");
        assert_eq!(session.user_id("uid"), None);
    }

    #[test]
    fn test_config_custom_field() {
        let config = RosterConfig::new().uid_field("account");
        assert_eq!(config.uid_field_name(), "account");

        let session = Session::new(ConnectionId::new("c1")).with_field("account", "7");
        assert_eq!(
            session.user_id(config.uid_field_name()),
            Some(UserId::new("7"))
        );
    }
}
