//! Attribute value union
//!
//! Values are flat: null, boolean, number, string, or an edge referencing
//! another soul. Nested objects never reach the core - ingestion flattens
//! them into separate nodes connected by edges.

use serde::{Deserialize, Serialize};

use super::soul::Soul;

/// Reference to another node. Wire form: `{ "#": "<soul>" }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(rename = "#")]
    pub soul: Soul,
}

impl Edge {
    pub fn to(soul: Soul) -> Self {
        Self { soul }
    }
}

/// One attribute value.
///
/// Anything outside these five kinds is rejected at the validation boundary;
/// the CRDT core does not validate deeply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Edge(Edge),
}

impl Value {
    pub fn edge(soul: Soul) -> Self {
        Value::Edge(Edge::to(soul))
    }

    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn as_edge(&self) -> Option<&Edge> {
        match self {
            Value::Edge(edge) => Some(edge),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Canonical bytes for the equal-stamp tie-break.
    ///
    /// Values are flat, so JSON encoding is already canonical; non-finite
    /// numbers collapse to `null` so every replica sees the same bytes.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        match self {
            Value::Number(n) if !n.is_finite() => b"null".to_vec(),
            other => serde_json::to_vec(other).unwrap_or_else(|_| b"null".to_vec()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_wire_form() {
        let value = Value::edge(Soul::new("users/alice").unwrap());
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r##"{"#":"users/alice"}"##);

        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn null_round_trips() {
        let back: Value = serde_json::from_str("null").unwrap();
        assert_eq!(back, Value::Null);
    }

    #[test]
    fn tie_break_bytes_are_ordered() {
        // "b" > "a" byte-wise, quotes included in the encoding on both sides
        assert!(Value::text("b").canonical_bytes() > Value::text("a").canonical_bytes());
        assert_eq!(Value::Number(f64::NAN).canonical_bytes(), b"null".to_vec());
    }
}
