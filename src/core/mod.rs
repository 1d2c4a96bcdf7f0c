//! Core domain types for rhizome
//!
//! Module hierarchy follows type dependency order:
//! - soul: Soul, ServerName identity atoms
//! - value: Value, Edge attribute union
//! - node: Node, GraphData
//! - crdt: diff/merge engine (per-attribute LWW)
//! - lex: query descriptors and byte-wise lexical matching
//! - error: core capability errors

pub mod crdt;
pub mod error;
pub mod lex;
pub mod node;
pub mod soul;
pub mod value;

pub use crdt::{
    add_missing_state, diff, merge_graph, merge_node, now_millis, DiffOptions, MergeMode,
};
pub use error::{CoreError, InvalidId, InvalidPath, UnsupportedValue};
pub use lex::{select_nodes, LexQuery, ListOptions};
pub use node::{GraphData, Node};
pub use soul::{ServerName, Soul};
pub use value::{Edge, Value};
