//! The single program representation both surface syntaxes parse into.
//!
//! Nodes are immutable and shared through `Arc`; every rewrite builds new
//! nodes and reuses untouched subtrees. Equality ignores node ids, positions
//! and the originating syntax so that `(+ 1 2)` and `1 + 2` compare equal.

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::types::Type;

// ============================================================================
// Positions and Surface Syntax
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct SourcePos {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl SourcePos {
    pub fn start() -> Self {
        SourcePos {
            line: 1,
            column: 1,
            offset: 0,
        }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Which surface notation produced a token or node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Syntax {
    #[default]
    Brace,
    SExpr,
}

impl fmt::Display for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Syntax::Brace => write!(f, "brace syntax"),
            Syntax::SExpr => write!(f, "s-expression"),
        }
    }
}

// ============================================================================
// Node Identity
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u32);

/// Hands out node ids for one compilation unit.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NodeIdGen {
    next: u32,
}

impl NodeIdGen {
    pub fn fresh(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }

    pub fn issued(&self) -> u32 {
        self.next
    }
}

// ============================================================================
// Node Kinds
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Nil,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(n) => write!(f, "{n}"),
            Literal::Float(x) => write!(f, "{x}"),
            Literal::Str(s) => write!(f, "{s:?}"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Nil => write!(f, "nil"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    /// Binding power for the infix parser; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::Or => 1,
            BinOp::And => 2,
            BinOp::Eq | BinOp::Ne => 3,
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => 4,
            BinOp::Add | BinOp::Sub => 5,
            BinOp::Mul | BinOp::Div | BinOp::Rem => 6,
        }
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem
        )
    }

    pub fn is_ordering(self) -> bool {
        matches!(self, BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge)
    }

    pub fn is_equality(self) -> bool {
        matches!(self, BinOp::Eq | BinOp::Ne)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UnOp {
    Neg,
    Not,
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnOp::Neg => write!(f, "-"),
            UnOp::Not => write!(f, "!"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Param {
    pub name: String,
    pub annotation: Option<Type>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MacroParam {
    pub name: String,
    /// Captures an unevaluated block rather than an expression.
    pub is_block: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum NodeKind {
    Literal(Literal),
    Identifier(String),
    KeywordSymbol(String),
    VectorLiteral(Vec<NodeRef>),
    MapLiteral(Vec<(NodeRef, NodeRef)>),
    Call {
        callee: NodeRef,
        args: Vec<NodeRef>,
    },
    BinaryOp {
        op: BinOp,
        lhs: NodeRef,
        rhs: NodeRef,
    },
    UnaryOp {
        op: UnOp,
        operand: NodeRef,
    },
    If {
        cond: NodeRef,
        then_branch: NodeRef,
        else_branch: Option<NodeRef>,
    },
    /// The declared return type lives in the node's `annotation`.
    FuncDef {
        name: String,
        params: Vec<Param>,
        body: NodeRef,
    },
    /// The declared binding type lives in the node's `annotation`.
    Let {
        name: String,
        value: NodeRef,
    },
    Return(Option<NodeRef>),
    Cast {
        value: NodeRef,
        target: Type,
    },
    MacroDef {
        name: String,
        params: Vec<MacroParam>,
        body: NodeRef,
    },
    MacroInvocation {
        name: String,
        args: Vec<NodeRef>,
    },
    Block(Vec<NodeRef>),
    /// Keyword-headed data form: `(:k m)` or `(:k m default)`.
    SExprForm {
        head: String,
        items: Vec<NodeRef>,
    },
}

// ============================================================================
// Nodes
// ============================================================================

pub type NodeRef = Arc<Node>;

#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub annotation: Option<Type>,
    pub pos: SourcePos,
    pub syntax: Syntax,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind, pos: SourcePos, syntax: Syntax) -> Self {
        Node {
            id,
            kind,
            annotation: None,
            pos,
            syntax,
        }
    }

    pub fn with_annotation(mut self, annotation: Option<Type>) -> Self {
        self.annotation = annotation;
        self
    }

    pub fn is_block(&self) -> bool {
        matches!(self.kind, NodeKind::Block(_))
    }

    /// Statements that bind names rather than produce a value.
    pub fn is_binding(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Let { .. } | NodeKind::FuncDef { .. } | NodeKind::MacroDef { .. }
        )
    }

    /// Direct children in source order.
    pub fn children(&self) -> Vec<&NodeRef> {
        match &self.kind {
            NodeKind::Literal(_) | NodeKind::Identifier(_) | NodeKind::KeywordSymbol(_) => {
                Vec::new()
            }
            NodeKind::VectorLiteral(items)
            | NodeKind::Block(items)
            | NodeKind::MacroInvocation { args: items, .. }
            | NodeKind::SExprForm { items, .. } => items.iter().collect(),
            NodeKind::MapLiteral(pairs) => pairs.iter().flat_map(|(k, v)| [k, v]).collect(),
            NodeKind::Call { callee, args } => std::iter::once(callee).chain(args).collect(),
            NodeKind::BinaryOp { lhs, rhs, .. } => vec![lhs, rhs],
            NodeKind::UnaryOp { operand, .. } => vec![operand],
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => std::iter::once(cond)
                .chain(std::iter::once(then_branch))
                .chain(else_branch.iter())
                .collect(),
            NodeKind::FuncDef { body, .. } | NodeKind::MacroDef { body, .. } => vec![body],
            NodeKind::Let { value, .. } | NodeKind::Cast { value, .. } => vec![value],
            NodeKind::Return(value) => value.iter().collect(),
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.annotation == other.annotation
    }
}

/// The first node, in source order, lying more than `limit` levels below
/// `root`. Walks with an explicit stack so arbitrarily deep trees are safe.
pub fn first_beyond_depth(root: &NodeRef, limit: usize) -> Option<&NodeRef> {
    let mut stack = vec![(root, 0usize)];
    while let Some((node, depth)) = stack.pop() {
        if depth > limit {
            return Some(node);
        }
        stack.extend(node.children().into_iter().rev().map(|child| (child, depth + 1)));
    }
    None
}

/// Rebuild `node` with each child replaced by `f(child)`.
///
/// Returns the original `Arc` when every child comes back pointer-equal, so
/// unchanged subtrees stay shared.
pub fn map_children<E>(
    node: &NodeRef,
    mut f: impl FnMut(&NodeRef) -> Result<NodeRef, E>,
) -> Result<NodeRef, E> {
    let mut changed = false;
    let kind = {
        let mut visit = |child: &NodeRef| -> Result<NodeRef, E> {
            let mapped = f(child)?;
            changed |= !Arc::ptr_eq(&mapped, child);
            Ok(mapped)
        };
        let mut visit_all = |items: &[NodeRef]| -> Result<Vec<NodeRef>, E> {
            items.iter().map(&mut visit).collect()
        };

        match &node.kind {
            NodeKind::Literal(_) | NodeKind::Identifier(_) | NodeKind::KeywordSymbol(_) => {
                return Ok(Arc::clone(node));
            }
            NodeKind::VectorLiteral(items) => NodeKind::VectorLiteral(visit_all(items)?),
            NodeKind::Block(items) => NodeKind::Block(visit_all(items)?),
            NodeKind::MacroInvocation { name, args } => NodeKind::MacroInvocation {
                name: name.clone(),
                args: visit_all(args)?,
            },
            NodeKind::SExprForm { head, items } => NodeKind::SExprForm {
                head: head.clone(),
                items: visit_all(items)?,
            },
            NodeKind::Call { callee, args } => {
                let mut all = visit_all(&[Arc::clone(callee)])?;
                all.extend(visit_all(args)?);
                let callee = all.remove(0);
                NodeKind::Call { callee, args: all }
            }
            NodeKind::MapLiteral(pairs) => {
                let flat: Vec<NodeRef> = pairs
                    .iter()
                    .flat_map(|(k, v)| [Arc::clone(k), Arc::clone(v)])
                    .collect();
                let mapped = visit_all(&flat)?;
                NodeKind::MapLiteral(
                    mapped
                        .chunks_exact(2)
                        .map(|kv| (Arc::clone(&kv[0]), Arc::clone(&kv[1])))
                        .collect(),
                )
            }
            NodeKind::BinaryOp { op, lhs, rhs } => {
                let mapped = visit_all(&[Arc::clone(lhs), Arc::clone(rhs)])?;
                NodeKind::BinaryOp {
                    op: *op,
                    lhs: Arc::clone(&mapped[0]),
                    rhs: Arc::clone(&mapped[1]),
                }
            }
            NodeKind::UnaryOp { op, operand } => NodeKind::UnaryOp {
                op: *op,
                operand: visit_all(std::slice::from_ref(operand))?.remove(0),
            },
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let mut mapped = visit_all(&[Arc::clone(cond), Arc::clone(then_branch)])?;
                let else_branch = match else_branch {
                    Some(e) => Some(visit_all(std::slice::from_ref(e))?.remove(0)),
                    None => None,
                };
                let then_branch = mapped.remove(1);
                NodeKind::If {
                    cond: mapped.remove(0),
                    then_branch,
                    else_branch,
                }
            }
            NodeKind::FuncDef { name, params, body } => NodeKind::FuncDef {
                name: name.clone(),
                params: params.clone(),
                body: visit_all(std::slice::from_ref(body))?.remove(0),
            },
            NodeKind::MacroDef { name, params, body } => NodeKind::MacroDef {
                name: name.clone(),
                params: params.clone(),
                body: visit_all(std::slice::from_ref(body))?.remove(0),
            },
            NodeKind::Let { name, value } => NodeKind::Let {
                name: name.clone(),
                value: visit_all(std::slice::from_ref(value))?.remove(0),
            },
            NodeKind::Cast { value, target } => NodeKind::Cast {
                value: visit_all(std::slice::from_ref(value))?.remove(0),
                target: target.clone(),
            },
            NodeKind::Return(value) => NodeKind::Return(match value {
                Some(v) => Some(visit_all(std::slice::from_ref(v))?.remove(0)),
                None => None,
            }),
        }
    };

    if !changed {
        return Ok(Arc::clone(node));
    }
    Ok(Arc::new(Node {
        id: node.id,
        kind,
        annotation: node.annotation.clone(),
        pos: node.pos,
        syntax: node.syntax,
    }))
}

/// Infallible form of [`map_children`].
pub fn rebuild_children(node: &NodeRef, mut f: impl FnMut(&NodeRef) -> NodeRef) -> NodeRef {
    let Ok(rebuilt) = map_children::<Infallible>(node, |child| Ok(f(child)));
    rebuilt
}

// ============================================================================
// Program
// ============================================================================

/// A parsed compilation unit: the top-level forms in file order, held as
/// one `Block` node.
#[derive(Debug, Clone, Serialize)]
pub struct Program {
    pub root: NodeRef,
    pub ids: NodeIdGen,
}

impl Program {
    pub fn forms(&self) -> &[NodeRef] {
        match &self.root.kind {
            NodeKind::Block(forms) => forms,
            _ => std::slice::from_ref(&self.root),
        }
    }
}

impl PartialEq for Program {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
    }
}
