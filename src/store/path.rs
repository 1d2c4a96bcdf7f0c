//! Path resolution and nested-value flattening.
//!
//! A multi-segment path addresses at most two souls: the joined full path
//! and its parent - deeper ancestors are reached through edges, one hop at
//! a time. Writes flatten nested objects into edge-connected nodes before
//! they enter the CRDT pipeline.

use crate::core::{CoreError, GraphData, InvalidPath, Node, Soul, UnsupportedValue, Value};

/// Resolved view of a path against a snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct PathData {
    /// Souls the path currently depends on (subscription set).
    pub souls: Vec<Soul>,
    pub value: Option<PathValue>,
    /// False when an intermediate soul is not in the snapshot yet.
    pub complete: bool,
}

/// A path resolves to either a whole node or a single attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum PathValue {
    Node(Node),
    Value(Value),
}

/// Candidate souls for a key path: progressive `/`-joins, keeping only the
/// last two (parent and full path).
pub(crate) fn souls_from_keys(keys: &[String]) -> Vec<Soul> {
    let mut souls: Vec<String> = Vec::with_capacity(keys.len());
    for key in keys {
        match souls.last() {
            Some(last) => souls.push(format!("{last}/{key}")),
            None => souls.push(key.clone()),
        }
    }
    if souls.len() > 2 {
        souls = souls.split_off(souls.len() - 2);
    }
    souls.into_iter().map(Soul::from_raw).collect()
}

fn follow_ref(souls: Vec<Soul>, value: Option<PathValue>, complete: bool, graph: &GraphData) -> PathData {
    // one-hop dereference: a value that is an edge (or a whole ref node)
    // resolves to its target node
    let target = match &value {
        Some(PathValue::Value(Value::Edge(edge))) => Some(edge.soul.clone()),
        Some(PathValue::Node(node)) => node.ref_target(),
        _ => None,
    };
    let Some(target) = target else {
        return PathData {
            souls,
            value,
            complete,
        };
    };

    let mut souls = souls;
    souls.push(target.clone());
    let resolved = graph.get(&target);
    PathData {
        complete: resolved.is_some(),
        value: resolved
            .and_then(|entry| entry.clone())
            .map(PathValue::Node),
        souls,
    }
}

/// Resolve a key path against the snapshot.
///
/// Incomplete results mean "not known yet" - the caller keeps the
/// constituent souls subscribed and re-resolves when their data arrives.
pub(crate) fn path_data(keys: &[String], graph: &GraphData) -> PathData {
    let souls = souls_from_keys(keys);
    let last_soul = souls[souls.len() - 1].clone();
    let last_key = &keys[keys.len() - 1];

    let complete = graph.contains_key(&last_soul);
    let value = graph
        .get(&last_soul)
        .and_then(|entry| entry.clone())
        .map(PathValue::Node);

    if souls.len() == 1 || complete {
        return follow_ref(vec![last_soul], value, complete, graph);
    }

    let pre_last_soul = souls[souls.len() - 2].clone();
    let complete = graph.contains_key(&pre_last_soul);
    let value = graph
        .get(&pre_last_soul)
        .and_then(|entry| entry.as_ref())
        .and_then(|node| node.get(last_key))
        .cloned()
        .map(PathValue::Value);

    if complete && value.is_some() {
        return follow_ref(vec![pre_last_soul], value, complete, graph);
    }

    PathData {
        souls,
        value: None,
        complete: false,
    }
}

fn value_of(json: &serde_json::Value, at: &str) -> Result<Value, CoreError> {
    match json {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::Number(n) => {
            n.as_f64().map(Value::Number).ok_or_else(|| {
                UnsupportedValue {
                    kind: "number".into(),
                    at: at.to_string(),
                }
                .into()
            })
        }
        serde_json::Value::String(s) => Ok(Value::Text(s.clone())),
        other => Err(UnsupportedValue {
            kind: kind_of(other).into(),
            at: at.to_string(),
        }
        .into()),
    }
}

fn kind_of(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn flatten_object(
    obj: &serde_json::Map<String, serde_json::Value>,
    path: &[String],
    target: &mut GraphData,
) -> Result<(), CoreError> {
    let soul = Soul::from_raw(path.join("/"));
    let node = match target.entry(soul.clone()) {
        std::collections::btree_map::Entry::Occupied(entry) => entry.into_mut(),
        std::collections::btree_map::Entry::Vacant(entry) => entry.insert(Some(Node::new(soul))),
    };
    // deleted-by-path entries stay tombstones
    let Some(node) = node.as_mut() else {
        return Ok(());
    };

    let mut children: Vec<(Vec<String>, &serde_json::Map<String, serde_json::Value>)> = Vec::new();
    for (key, value) in obj {
        if key == "_" {
            continue;
        }
        let mut child_path = path.to_vec();
        child_path.push(key.clone());
        if let serde_json::Value::Object(child) = value {
            node.insert_unstamped(key.clone(), Value::edge(Soul::from_raw(child_path.join("/"))));
            children.push((child_path, child));
        } else {
            let at = child_path.join(".");
            node.insert_unstamped(key.clone(), value_of(value, &at)?);
        }
    }

    for (child_path, child) in children {
        flatten_object(child, &child_path, target)?;
    }
    Ok(())
}

/// Flatten a nested value written at a path into edge-connected nodes.
///
/// Returns the graph plus the soul the write is anchored at. A bare `null`
/// at a one-segment path tombstones that soul.
pub(crate) fn flatten_value(
    keys: &[String],
    data: &serde_json::Value,
) -> Result<(GraphData, Soul), CoreError> {
    if keys.is_empty() {
        return Err(InvalidPath {
            reason: "no path specified".into(),
        }
        .into());
    }

    match data {
        serde_json::Value::Object(obj) => {
            let soul = Soul::from_raw(keys.join("/"));
            let mut graph = GraphData::new();
            flatten_object(obj, keys, &mut graph)?;
            Ok((graph, soul))
        }
        serde_json::Value::Null if keys.len() == 1 => {
            let soul = Soul::from_raw(keys[0].clone());
            let mut graph = GraphData::new();
            graph.insert(soul.clone(), None);
            Ok((graph, soul))
        }
        scalar => {
            let (last, parent) = keys.split_last().expect("non-empty path");
            if parent.is_empty() {
                return Err(InvalidPath {
                    reason: "scalar write needs a parent path".into(),
                }
                .into());
            }
            let soul = Soul::from_raw(parent.join("/"));
            let mut node = Node::new(soul.clone());
            let at = keys.join(".");
            node.insert_unstamped(last.clone(), value_of(scalar, &at)?);
            let mut graph = GraphData::new();
            graph.insert(soul.clone(), Some(node));
            Ok((graph, soul))
        }
    }
}
