//! Storage contracts
//!
//! `Storage` is the raw backing key/record store (no multi-key
//! transactions assumed). `GraphAdapter` is the graph-shaped surface the
//! store and federation layers speak; `GraphStorageAdapter` bridges the two
//! with an optimistic-concurrency patch loop.

pub mod adapter;
pub mod memory;

use thiserror::Error;

use crate::core::{GraphData, LexQuery, ListOptions, Node, Soul};
use crate::error::Transience;
use crate::validator::ValidateError;
use crate::wire::Originators;

pub use adapter::GraphStorageAdapter;
pub use memory::MemoryStorage;

/// Outcome of an optimistic write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    Written,
    /// Another writer changed the record since it was read.
    Conflict,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("list limit must be positive, got {limit}")]
    InvalidLimit { limit: usize },
    #[error("key `{soul}` is {size} bytes, over the {max}-byte limit")]
    KeyTooLarge {
        soul: String,
        size: usize,
        max: usize,
    },
    #[error("value for `{soul}` is {size} bytes, over the {max}-byte limit")]
    ValueTooLarge {
        soul: String,
        size: usize,
        max: usize,
    },
    #[error("patch for `{soul}` still conflicted after {attempts} attempts")]
    RetriesExhausted { soul: String, attempts: u32 },
    #[error("storage backend error: {reason}")]
    Backend { reason: String },
}

impl StorageError {
    pub fn transience(&self) -> Transience {
        match self {
            StorageError::RetriesExhausted { .. } => Transience::Retryable,
            StorageError::Backend { .. } => Transience::Unknown,
            _ => Transience::Permanent,
        }
    }
}

/// Backing key/record store.
///
/// `list` must preserve byte-wise lexical soul order - the same order the
/// LEX matcher uses; anything else breaks range-query/convergence parity.
pub trait Storage {
    fn get(&self, soul: &Soul) -> Result<Option<Node>, StorageError>;

    fn list(&self, options: &ListOptions) -> Result<GraphData, StorageError>;

    fn put(&mut self, soul: &Soul, node: Option<Node>) -> Result<(), StorageError>;

    /// Optimistic write: succeed only when the current record still equals
    /// `expected`. The default is a best-effort plain `put` for stores with
    /// no conflict detection - a narrow staleness window the CRDT merge
    /// self-heals on the next write or replication pass. Stores with a CAS
    /// primitive must override.
    fn put_if(
        &mut self,
        soul: &Soul,
        expected: Option<&Node>,
        node: Option<Node>,
    ) -> Result<PutOutcome, StorageError> {
        let _ = expected;
        self.put(soul, node)?;
        Ok(PutOutcome::Written)
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AdapterError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Validation(#[from] ValidateError),
    #[error("peer `{peer}` failed: {reason}")]
    Peer { peer: String, reason: String },
}

impl AdapterError {
    pub fn transience(&self) -> Transience {
        match self {
            AdapterError::Storage(e) => e.transience(),
            AdapterError::Validation(_) => Transience::Permanent,
            AdapterError::Peer { .. } => Transience::Retryable,
        }
    }
}

/// Graph-shaped read/write surface.
///
/// `put` returns the union of per-soul diffs that actually changed
/// persisted state, or `None` for a complete no-op - callers must stay
/// silent downstream in that case (no events, no fan-out, no acks that
/// claim changes).
pub trait GraphAdapter {
    fn get(&mut self, query: &LexQuery) -> Result<GraphData, AdapterError>;

    fn put(
        &mut self,
        graph: &GraphData,
        originators: Option<&Originators>,
    ) -> Result<Option<GraphData>, AdapterError>;
}
