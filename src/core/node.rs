//! Node and graph containers
//!
//! A node is a flat attribute map plus per-attribute logical timestamps.
//! Wire form carries the metadata under `_`:
//! `{ "_": { "#": "<soul>", ">": { "<attr>": <ms> } }, "<attr>": <value> }`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::soul::Soul;
use super::value::Value;

/// Graph snapshot or diff: soul -> node, `None` marking a tombstone.
///
/// A tombstone ("known deleted") is distinct from an absent key ("unknown").
pub type GraphData = BTreeMap<Soul, Option<Node>>;

/// One graph node.
///
/// Invariant: every attribute present in `attrs` has an entry in `state`
/// once the node has passed through `add_missing_state`; merged state
/// entries never move backward.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "NodeWire", into = "NodeWire")]
pub struct Node {
    soul: Soul,
    attrs: BTreeMap<String, Value>,
    state: BTreeMap<String, u64>,
}

impl Node {
    pub fn new(soul: Soul) -> Self {
        Self {
            soul,
            attrs: BTreeMap::new(),
            state: BTreeMap::new(),
        }
    }

    pub fn soul(&self) -> &Soul {
        &self.soul
    }

    pub fn attrs(&self) -> &BTreeMap<String, Value> {
        &self.attrs
    }

    pub fn state(&self) -> &BTreeMap<String, u64> {
        &self.state
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    pub fn stamp(&self, key: &str) -> Option<u64> {
        self.state.get(key).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// Set an attribute together with its timestamp.
    pub fn insert(&mut self, key: impl Into<String>, value: Value, stamp: u64) {
        let key = key.into();
        self.state.insert(key.clone(), stamp);
        self.attrs.insert(key, value);
    }

    /// Set an attribute without a timestamp; `add_missing_state` stamps it.
    pub fn insert_unstamped(&mut self, key: impl Into<String>, value: Value) {
        self.attrs.insert(key.into(), value);
    }

    /// Stamp every attribute that has no state entry yet. Existing stamps
    /// are never overwritten.
    pub(crate) fn fill_missing_stamps(&mut self, now: u64) {
        for key in self.attrs.keys() {
            self.state.entry(key.clone()).or_insert(now);
        }
    }

    /// Overlay `updates` attribute-by-attribute, state union with `updates`
    /// taking precedence per key. Assumes `updates` was filtered by `diff`.
    pub(crate) fn overlay(&mut self, updates: &Node) {
        for (key, value) in &updates.attrs {
            self.attrs.insert(key.clone(), value.clone());
        }
        for (key, stamp) in &updates.state {
            self.state.insert(key.clone(), *stamp);
        }
    }

    /// Pure join of this node with `updates` into a fresh node sharing no
    /// buffers with either input.
    pub(crate) fn join(&self, updates: &Node) -> Node {
        let mut merged = self.clone();
        merged.overlay(updates);
        merged
    }

    /// If the node is a pure alias - its entire value one edge - return the
    /// target soul. Accepts both the typed edge form and the wire alias form
    /// (single `#` attribute holding a soul string).
    pub fn ref_target(&self) -> Option<Soul> {
        if self.attrs.len() != 1 {
            return None;
        }
        match self.attrs.iter().next()? {
            (_, Value::Edge(edge)) => Some(edge.soul.clone()),
            (key, Value::Text(raw)) if key == "#" && !raw.is_empty() => {
                Some(Soul::from_raw(raw.clone()))
            }
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct MetaWire {
    #[serde(rename = "#")]
    soul: Soul,
    #[serde(rename = ">", default)]
    state: BTreeMap<String, u64>,
}

#[derive(Serialize, Deserialize)]
struct NodeWire {
    #[serde(rename = "_")]
    meta: MetaWire,
    #[serde(flatten)]
    attrs: BTreeMap<String, Value>,
}

impl From<NodeWire> for Node {
    fn from(wire: NodeWire) -> Self {
        Self {
            soul: wire.meta.soul,
            attrs: wire.attrs,
            state: wire.meta.state,
        }
    }
}

impl From<Node> for NodeWire {
    fn from(node: Node) -> Self {
        Self {
            meta: MetaWire {
                soul: node.soul,
                state: node.state,
            },
            attrs: node.attrs,
        }
    }
}
