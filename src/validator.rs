//! Graph shape validation, run before data reaches persistence.
//!
//! The CRDT core does not validate deeply; the federation layer calls this
//! on every inbound graph so malformed nodes are rejected before the
//! storage adapter sees them.

use thiserror::Error;

use crate::core::{GraphData, Value};

#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum ValidateError {
    #[error("empty soul in graph")]
    EmptySoul,
    #[error("graph key `{key}` does not match node soul `{soul}`")]
    SoulMismatch { key: String, soul: String },
    #[error("attribute `{attr}` of `{soul}` has no state entry")]
    MissingState { soul: String, attr: String },
    #[error("attribute name of `{soul}` is empty")]
    EmptyAttribute { soul: String },
    #[error("attribute `{attr}` of `{soul}` is not a finite number")]
    NonFiniteNumber { soul: String, attr: String },
    #[error("edge at `{soul}`.`{attr}` points to an empty soul")]
    EmptyEdgeTarget { soul: String, attr: String },
}

/// Validate a graph for persistence.
///
/// Checks: non-empty souls, map key matching node metadata, a state entry
/// for every attribute, finite numbers, non-empty edge targets. Tombstones
/// are always valid.
pub fn validate_graph(graph: &GraphData) -> Result<(), ValidateError> {
    for (key, entry) in graph {
        if key.is_empty() {
            return Err(ValidateError::EmptySoul);
        }
        let Some(node) = entry else {
            continue;
        };
        if node.soul() != key {
            return Err(ValidateError::SoulMismatch {
                key: key.to_string(),
                soul: node.soul().to_string(),
            });
        }
        for (attr, value) in node.attrs() {
            if attr.is_empty() {
                return Err(ValidateError::EmptyAttribute {
                    soul: key.to_string(),
                });
            }
            if node.stamp(attr).is_none() {
                return Err(ValidateError::MissingState {
                    soul: key.to_string(),
                    attr: attr.clone(),
                });
            }
            match value {
                Value::Number(n) if !n.is_finite() => {
                    return Err(ValidateError::NonFiniteNumber {
                        soul: key.to_string(),
                        attr: attr.clone(),
                    });
                }
                Value::Edge(edge) if edge.soul.is_empty() => {
                    return Err(ValidateError::EmptyEdgeTarget {
                        soul: key.to_string(),
                        attr: attr.clone(),
                    });
                }
                _ => {}
            }
        }
    }
    Ok(())
}
