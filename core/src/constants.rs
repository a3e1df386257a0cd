//! Compile-time folding of literal collections into runtime values.
//!
//! A vector or map literal whose leaves are all literals or keywords is
//! built once as a persistent `Value`, so the code generator can emit it as
//! a shared constant instead of rebuilding it at run time.

use braid_runtime::Value;
use rustc_hash::FxHashMap;

use crate::ast::{Literal, Node, NodeId, NodeKind};

/// Fold every constant collection literal reachable from `root`.
pub fn fold_constants(root: &Node) -> FxHashMap<NodeId, Value> {
    let mut constants = FxHashMap::default();
    collect(root, &mut constants);
    tracing::debug!(count = constants.len(), "folded constant collections");
    constants
}

fn collect(node: &Node, constants: &mut FxHashMap<NodeId, Value>) {
    if matches!(node.kind, NodeKind::VectorLiteral(_) | NodeKind::MapLiteral(_))
        && let Some(value) = to_value(node)
    {
        constants.insert(node.id, value);
    }
    for child in node.children() {
        collect(child, constants);
    }
}

/// The runtime value of a constant expression, if it is one.
pub fn to_value(node: &Node) -> Option<Value> {
    match &node.kind {
        NodeKind::Literal(lit) => Some(match lit {
            Literal::Int(n) => Value::Int(*n),
            Literal::Float(x) => Value::Float(*x),
            Literal::Str(s) => Value::string(s),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Nil => Value::Nil,
        }),
        NodeKind::KeywordSymbol(name) => Some(Value::keyword(name)),
        NodeKind::VectorLiteral(items) => items
            .iter()
            .map(|item| to_value(item))
            .collect::<Option<Vec<_>>>()
            .map(Value::vector),
        NodeKind::MapLiteral(pairs) => pairs
            .iter()
            .map(|(k, v)| Some((to_value(k)?, to_value(v)?)))
            .collect::<Option<Vec<_>>>()
            .map(Value::map),
        _ => None,
    }
}
