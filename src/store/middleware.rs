//! Read/write middleware pipeline.
//!
//! Each stage receives the candidate diff plus a borrowed view of the
//! authoritative snapshot and returns a possibly-different diff, `None` to
//! veto (silent no-op downstream), or an error that surfaces as the put's
//! failure. Stages run sequentially in registration order; registering the
//! same function twice runs it twice (array semantics, not set semantics).

use std::collections::BTreeMap;

use thiserror::Error;

use crate::core::GraphData;

/// Opaque per-put options, passed through to write middleware (signing
/// layers stash certificates and keys here).
#[derive(Clone, Debug, Default)]
pub struct PutOptions(BTreeMap<String, serde_json::Value>);

impl PutOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Failure raised by a middleware stage; aborts the enclosing put/receive.
#[derive(Debug, Error, Clone)]
#[error("middleware failed: {reason}")]
pub struct MiddlewareError {
    pub reason: String,
}

impl MiddlewareError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// One pipeline stage. Write stages additionally see the put's options.
pub type MiddlewareFn = Box<
    dyn FnMut(
        GraphData,
        &GraphData,
        Option<&PutOptions>,
    ) -> Result<Option<GraphData>, MiddlewareError>,
>;

/// Which chain a stage belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MiddlewareKind {
    Read,
    Write,
}

/// Handle for `unuse_middleware`; closures cannot be compared for identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MiddlewareToken(pub(crate) u64);
