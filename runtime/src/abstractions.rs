//! Clojure-style collection operations over `Value`.
//!
//! These dispatch on the value's kind so generated code (and constant
//! folding) can treat vectors and maps uniformly. None of them mutate their
//! receiver.

use std::sync::Arc;

use crate::error::{IndexError, KeyMiss, RuntimeError};
use crate::value::{MapValue, Value};

// ============================================================================
// Constructors
// ============================================================================

pub fn empty_vector() -> Value {
    Value::vector(std::iter::empty())
}

pub fn empty_map() -> Value {
    Value::Map(Arc::new(MapValue::new()))
}

pub fn hash_map(pairs: Vec<(Value, Value)>) -> Value {
    Value::map(pairs)
}

// ============================================================================
// Queries
// ============================================================================

/// Number of elements, or `None` for values that are not counted.
pub fn count(value: &Value) -> Option<usize> {
    match value {
        Value::Nil => Some(0),
        Value::Vector(vec) => Some(vec.len()),
        Value::Map(map) => Some(map.len()),
        Value::Str(s) => Some(s.chars().count()),
        _ => None,
    }
}

/// Lenient lookup: misses (and non-collections) yield `default`, or nil.
pub fn get(coll: &Value, key: &Value, default_val: Option<&Value>) -> Value {
    let default = default_val.cloned().unwrap_or(Value::Nil);
    match coll {
        Value::Map(map) => map.get(key).cloned().unwrap_or(default),
        Value::Vector(vec) => match key {
            Value::Int(idx) if *idx >= 0 => vec.get(*idx as usize).cloned().unwrap_or(default),
            _ => default,
        },
        _ => default,
    }
}

/// Strict lookup: a missing map key is `KeyMiss`, a bad vector index is `IndexError`.
pub fn fetch(coll: &Value, key: &Value) -> Result<Value, RuntimeError> {
    match coll {
        Value::Map(map) => Ok(map.fetch(key)?.clone()),
        Value::Vector(_) => nth(coll, key),
        Value::Nil => Err(KeyMiss {
            key: key.to_string(),
        }
        .into()),
        _ => Err(RuntimeError::TypeMismatch {
            operation: "fetch",
            found: coll.kind().to_string(),
        }),
    }
}

/// Vector element by integer index.
pub fn nth(coll: &Value, index: &Value) -> Result<Value, RuntimeError> {
    let Value::Vector(vec) = coll else {
        return Err(RuntimeError::TypeMismatch {
            operation: "nth",
            found: coll.kind().to_string(),
        });
    };
    match index {
        Value::Int(idx) if *idx >= 0 => Ok(vec.get(*idx as usize)?.clone()),
        Value::Int(idx) => Err(IndexError {
            index: *idx,
            len: vec.len(),
        }
        .into()),
        other => Err(RuntimeError::TypeMismatch {
            operation: "nth index",
            found: other.kind().to_string(),
        }),
    }
}

// ============================================================================
// Updates
// ============================================================================

/// Map: bind `key`. Vector: replace the element at integer `key`.
/// Nil is treated as the empty map.
pub fn assoc(coll: &Value, key: Value, val: Value) -> Result<Value, RuntimeError> {
    match coll {
        Value::Map(map) => Ok(Value::Map(Arc::new(map.assoc(key, val)))),
        Value::Nil => Ok(Value::Map(Arc::new(MapValue::new().assoc(key, val)))),
        Value::Vector(vec) => match key {
            Value::Int(idx) if idx >= 0 => Ok(Value::Vector(Arc::new(
                vec.update(idx as usize, val)?,
            ))),
            Value::Int(idx) => Err(IndexError {
                index: idx,
                len: vec.len(),
            }
            .into()),
            other => Err(RuntimeError::TypeMismatch {
                operation: "assoc index",
                found: other.kind().to_string(),
            }),
        },
        _ => Err(RuntimeError::TypeMismatch {
            operation: "assoc",
            found: coll.kind().to_string(),
        }),
    }
}

pub fn dissoc(coll: &Value, key: &Value) -> Result<Value, RuntimeError> {
    match coll {
        Value::Map(map) => Ok(Value::Map(Arc::new(map.dissoc(key)))),
        Value::Nil => Ok(Value::Nil),
        _ => Err(RuntimeError::TypeMismatch {
            operation: "dissoc",
            found: coll.kind().to_string(),
        }),
    }
}

/// Vector: append. Map: add a `[key value]` pair. Nil becomes a one-element vector.
pub fn conj(coll: &Value, item: Value) -> Result<Value, RuntimeError> {
    match coll {
        Value::Nil => Ok(Value::vector([item])),
        Value::Vector(vec) => Ok(Value::Vector(Arc::new(vec.conj(item)))),
        Value::Map(map) => match &item {
            Value::Vector(pair) if pair.len() == 2 => {
                let key = pair.get(0)?.clone();
                let val = pair.get(1)?.clone();
                Ok(Value::Map(Arc::new(map.assoc(key, val))))
            }
            _ => Err(RuntimeError::TypeMismatch {
                operation: "map conj (expects [key value])",
                found: item.kind().to_string(),
            }),
        },
        _ => Err(RuntimeError::TypeMismatch {
            operation: "conj",
            found: coll.kind().to_string(),
        }),
    }
}
