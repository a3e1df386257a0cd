//! Runtime-facing errors.
//!
//! These are the failures a generated program raises when it runs; the
//! compile-time pipeline sees them only when it folds literal constants.

use thiserror::Error;

/// A vector was indexed outside `[0, len)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("index {index} out of bounds for vector of length {len}")]
pub struct IndexError {
    pub index: i64,
    pub len: usize,
}

/// A strict map lookup found no entry for the key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("key {key} not present in map")]
pub struct KeyMiss {
    /// Display form of the missing key.
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    KeyMiss(#[from] KeyMiss),

    #[error("{operation}: unsupported on {found}")]
    TypeMismatch {
        operation: &'static str,
        found: String,
    },
}
