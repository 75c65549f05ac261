//! Store key layout for presence sets.
//!
//! The layout is fixed for compatibility with other consumers of the
//! shared store, `ns` being the cluster namespace prefix exposed by the
//! node registry:
//!
//! ```text
//! <ns>user:<uid>          global presence set (all nodes)
//! <ns><node>:user:<uid>   local presence set (one node)
//! ```
//!
//! Both keys hold sets of connection ids. A key is absent whenever its
//! set would be empty.

use crate::{NodeAddress, UserId};

/// Key of the cluster-wide presence set for `uid`.
pub fn global_key(ns: &str, uid: &UserId) -> String {
    format!("{ns}user:{uid}")
}

/// Key of the presence subset for `uid` terminating on `node`.
pub fn local_key(ns: &str, node: &NodeAddress, uid: &UserId) -> String {
    format!("{ns}{node}:user:{uid}")
}

/// Prefix matched by every global presence key.
pub fn global_prefix(ns: &str) -> String {
    format!("{ns}user:")
}

/// Prefix matched by every local presence key of `node`.
pub fn local_prefix(ns: &str, node: &NodeAddress) -> String {
    format!("{ns}{node}:user:")
}

/// Recover the uid from a scanned key, given the prefix the scan used.
///
/// Returns `None` if the key does not start with the prefix (a foreign
/// key that slipped into the scan result).
pub fn uid_from_key(key: &str, prefix: &str) -> Option<UserId> {
    key.strip_prefix(prefix).map(UserId::from)
}
