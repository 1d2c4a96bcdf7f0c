//! Core capability errors (identity parsing, descriptor validation, paths).
//!
//! These are bounded and stable: core errors represent domain/refusal
//! states, not library implementation details.

use thiserror::Error;

use crate::error::Transience;

/// Invalid identity string.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum InvalidId {
    #[error("soul `{raw}` is invalid: {reason}")]
    Soul { raw: String, reason: String },
    #[error("server name `{raw}` is invalid: {reason}")]
    Server { raw: String, reason: String },
}

/// Invalid read/write path.
#[derive(Debug, Error, Clone)]
#[error("path is invalid: {reason}")]
pub struct InvalidPath {
    pub reason: String,
}

/// Data of a kind the graph cannot hold (arrays, nested functions, ...).
#[derive(Debug, Error, Clone)]
#[error("unsupported value of kind `{kind}` at `{at}`")]
pub struct UnsupportedValue {
    pub kind: String,
    pub at: String,
}

/// Canonical error enum for the core capability.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum CoreError {
    #[error(transparent)]
    InvalidId(#[from] InvalidId),
    #[error(transparent)]
    InvalidPath(#[from] InvalidPath),
    #[error(transparent)]
    UnsupportedValue(#[from] UnsupportedValue),
}

impl CoreError {
    pub fn transience(&self) -> Transience {
        // Core errors are pure input failures.
        Transience::Permanent
    }
}
