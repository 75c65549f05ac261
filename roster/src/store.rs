//! Shared key-value store seam.
//!
//! The roster keeps all mutable state in an external store of string
//! keys holding sets of members. [`SetStore`] is the trait seam; the
//! production implementation wraps the cluster's shared store, while
//! [`MemoryStore`] backs tests and single-process development.
//!
//! # Design
//!
//! - Every mutation the roster performs goes through [`SetStore::batch`]:
//!   a list of [`BatchOp`]s the store must apply atomically, replying
//!   with one [`BatchReply`] per op in order. Correctness under
//!   concurrent multi-process access rests entirely on that atomicity.
//! - Single-op convenience methods (`exists`, `members`, `scan_keys`)
//!   cover read-only paths that need no atomicity.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use async_trait::async_trait;

/// Errors from store operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store rejected or failed an operation.
    #[error("store operation failed: {0}")]
    OperationFailed(String),

    /// A batch reply did not have the shape the issued op implies.
    #[error("unexpected reply at batch index {index}: expected {expected}")]
    UnexpectedReply {
        /// Position of the op within the batch.
        index: usize,
        /// Reply shape the caller was decoding.
        expected: &'static str,
    },
}

/// One operation inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Does this key exist (i.e. hold a non-empty set)?
    Exists(String),
    /// Add a member to the set at this key, creating the key if absent.
    AddMember(String, String),
    /// Remove a member from the set at this key, deleting the key if the
    /// set becomes empty.
    RemoveMember(String, String),
    /// List all members of the set at this key (empty if absent).
    Members(String),
    /// Delete this key outright.
    RemoveKey(String),
}

/// Reply to a single [`BatchOp`], in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchReply {
    /// `Exists` → key present; `AddMember` → member was newly added;
    /// `RemoveMember` → member was present; `RemoveKey` → key existed.
    Bool(bool),
    /// `Members` → the set's members.
    Members(Vec<String>),
}

impl BatchReply {
    /// Decode this reply as a boolean, or fail with the batch position.
    pub fn into_bool(self, index: usize) -> Result<bool, StoreError> {
        match self {
            Self::Bool(value) => Ok(value),
            Self::Members(_) => Err(StoreError::UnexpectedReply {
                index,
                expected: "bool",
            }),
        }
    }

    /// Decode this reply as a member list, or fail with the batch position.
    pub fn into_members(self, index: usize) -> Result<Vec<String>, StoreError> {
        match self {
            Self::Members(members) => Ok(members),
            Self::Bool(_) => Err(StoreError::UnexpectedReply {
                index,
                expected: "members",
            }),
        }
    }
}

/// Store of string keys holding sets of string members.
///
/// Implementations must apply each [`batch`](SetStore::batch) atomically:
/// no other caller may observe a batch half-applied.
#[async_trait(?Send)]
pub trait SetStore: fmt::Debug {
    /// Execute `ops` atomically, returning one reply per op in order.
    async fn batch(&self, ops: Vec<BatchOp>) -> Result<Vec<BatchReply>, StoreError>;

    /// Whether `key` currently holds a non-empty set.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Members of the set at `key` (empty if the key is absent).
    async fn members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// All keys starting with `prefix`. Ordering unspecified.
    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// In-memory [`SetStore`] for tests and single-node development.
///
/// Keys map to ordered sets; batches execute under a single borrow, so
/// atomicity holds by construction in the single-threaded model. State
/// is lost when the process terminates.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RefCell<BTreeMap<String, BTreeSet<String>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn key_count(&self) -> usize {
        self.data.borrow().len()
    }

    /// Drop all keys.
    pub fn clear(&self) {
        self.data.borrow_mut().clear();
    }

    fn apply(data: &mut BTreeMap<String, BTreeSet<String>>, op: BatchOp) -> BatchReply {
        match op {
            BatchOp::Exists(key) => {
                BatchReply::Bool(data.get(&key).is_some_and(|set| !set.is_empty()))
            }
            BatchOp::AddMember(key, member) => {
                BatchReply::Bool(data.entry(key).or_default().insert(member))
            }
            BatchOp::RemoveMember(key, member) => {
                let mut removed = false;
                let mut now_empty = false;
                if let Some(set) = data.get_mut(&key) {
                    removed = set.remove(&member);
                    now_empty = set.is_empty();
                }
                // No empty-set representation persists.
                if now_empty {
                    data.remove(&key);
                }
                BatchReply::Bool(removed)
            }
            BatchOp::Members(key) => {
                BatchReply::Members(data.get(&key).map(|set| set.iter().cloned().collect()).unwrap_or_default())
            }
            BatchOp::RemoveKey(key) => BatchReply::Bool(data.remove(&key).is_some()),
        }
    }
}

#[async_trait(?Send)]
impl SetStore for MemoryStore {
    async fn batch(&self, ops: Vec<BatchOp>) -> Result<Vec<BatchReply>, StoreError> {
        let mut data = self.data.borrow_mut();
        Ok(ops
            .into_iter()
            .map(|op| Self::apply(&mut data, op))
            .collect())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self
            .data
            .borrow()
            .get(key)
            .is_some_and(|set| !set.is_empty()))
    }

    async fn members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .data
            .borrow()
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .data
            .borrow()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}
