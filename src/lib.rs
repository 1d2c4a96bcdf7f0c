#![forbid(unsafe_code)]

//! rhizome - a decentralized, replicated graph database.
//!
//! Nodes ("souls") hold flat attribute sets with per-attribute logical
//! timestamps, merged across replicas using a last-writer-wins CRDT with a
//! deterministic lexical tie-break. Clients query by soul or lexical range
//! and receive live updates as peers and local writes mutate the graph.

pub mod config;
pub mod core;
pub mod error;
pub mod federation;
pub mod storage;
pub mod store;
pub mod telemetry;
pub mod validator;
pub mod wire;

pub use error::{Error, Transience};
pub type Result<T> = std::result::Result<T, Error>;

// Re-export core types at crate root for convenience
pub use crate::core::{
    add_missing_state, diff, merge_graph, merge_node, now_millis, CoreError, DiffOptions, Edge,
    GraphData, LexQuery, ListOptions, MergeMode, Node, ServerName, Soul, Value,
};
pub use crate::federation::{FederationAdapter, Peer, Peers};
pub use crate::storage::{
    AdapterError, GraphAdapter, GraphStorageAdapter, MemoryStorage, PutOutcome, Storage,
    StorageError,
};
pub use crate::store::{
    AdapterConnector, Connector, GraphStore, MiddlewareError, MiddlewareKind, PathSubscription,
    PathValue, PutOptions, PutReceipt, QueryState, QuerySubscription, QueryUpdate, StoreError,
    StoreEvent,
};
pub use crate::validator::{validate_graph, ValidateError};
pub use crate::wire::{message_id, Message, Originators};
