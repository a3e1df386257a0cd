//! Gradual type checker.
//!
//! A single pass over the expanded tree. Annotations are the only source of
//! static obligations: unannotated bindings and parameters are `Dynamic`,
//! and `Dynamic` is consistent with every type. `as T` narrows a value's
//! static type and records a runtime checkpoint for the code generator.

use braid_runtime::Value;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::ast::{BinOp, Literal, Node, NodeId, NodeKind, NodeRef, Program, SourcePos, UnOp};
use crate::error::{TypeError, TypeErrorReason};
use crate::macros::MacroTable;
use crate::types::Type;

// ============================================================================
// Checker Output
// ============================================================================

/// A check the generated program must perform when an `as` narrows a value
/// whose static type does not already guarantee the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeCheck {
    pub node: NodeId,
    pub target: Type,
    pub pos: SourcePos,
}

/// The expanded program with everything the code generator consumes.
#[derive(Debug, Clone, Serialize)]
pub struct TypedProgram {
    pub program: Program,
    /// Type of every expression node, keyed by node id.
    pub types: FxHashMap<NodeId, Type>,
    pub checkpoints: Vec<RuntimeCheck>,
    pub macros: MacroTable,
    #[serde(skip)]
    pub constants: FxHashMap<NodeId, Value>,
}

impl TypedProgram {
    pub fn type_of(&self, node: &Node) -> Option<&Type> {
        self.types.get(&node.id)
    }
}

// ============================================================================
// Type Checker
// ============================================================================

#[derive(Default)]
pub struct TypeChecker {
    scopes: Vec<FxHashMap<String, Type>>,
    /// Declared return type of each enclosing function, innermost last.
    returns: Vec<Type>,
    types: FxHashMap<NodeId, Type>,
    checkpoints: Vec<RuntimeCheck>,
}

impl TypeChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_parts(self) -> (FxHashMap<NodeId, Type>, Vec<RuntimeCheck>) {
        (self.types, self.checkpoints)
    }

    fn lookup(&self, name: &str) -> Type {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .cloned()
            // host-provided names are unknown statically
            .unwrap_or(Type::Dynamic)
    }

    fn bind(&mut self, name: &str, ty: Type) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), ty);
        }
    }

    /// Infer the type of `node` and record it.
    pub fn check(&mut self, node: &NodeRef) -> Result<Type, TypeError> {
        let ty = self.infer(node)?;
        self.types.insert(node.id, ty.clone());
        Ok(ty)
    }

    fn infer(&mut self, node: &NodeRef) -> Result<Type, TypeError> {
        match &node.kind {
            NodeKind::Literal(lit) => Ok(literal_type(lit)),
            NodeKind::Identifier(name) => Ok(self.lookup(name)),
            NodeKind::KeywordSymbol(_) => Ok(Type::keyword()),
            NodeKind::VectorLiteral(items) => {
                let types = items
                    .iter()
                    .map(|item| self.check(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Type::vector(Type::common(types.iter())))
            }
            NodeKind::MapLiteral(pairs) => {
                let mut keys = Vec::with_capacity(pairs.len());
                let mut values = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    keys.push(self.check(k)?);
                    values.push(self.check(v)?);
                }
                Ok(Type::map(
                    Type::common(keys.iter()),
                    Type::common(values.iter()),
                ))
            }
            NodeKind::Call { callee, args } => self.check_call(node, callee, args),
            NodeKind::BinaryOp { op, lhs, rhs } => {
                let l = self.check(lhs)?;
                let r = self.check(rhs)?;
                binary_type(*op, &l, &r).ok_or_else(|| operand_error(*op, &l, &r, node))
            }
            NodeKind::UnaryOp { op, operand } => {
                let t = self.check(operand)?;
                match op {
                    UnOp::Neg if t.is_dynamic() || t.is_numeric() => Ok(t),
                    UnOp::Not if Type::bool().unify(&t) => Ok(Type::bool()),
                    UnOp::Neg => Err(mismatch("Int or Float", &t, "operand of `-`", node)),
                    UnOp::Not => Err(mismatch("Bool", &t, "operand of `!`", node)),
                }
            }
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let c = self.check(cond)?;
                if !Type::bool().unify(&c) {
                    return Err(mismatch("Bool", &c, "if condition", cond));
                }
                let t = self.check(then_branch)?;
                let e = match else_branch {
                    Some(branch) => self.check(branch)?,
                    None => Type::nil(),
                };
                Ok(if t == e { t } else { Type::Dynamic })
            }
            NodeKind::FuncDef { name, params, body } => {
                let signature = signature(node);
                self.bind(name, signature.clone());
                self.scopes.push(FxHashMap::default());
                for param in params {
                    let ty = param.annotation.clone().unwrap_or(Type::Dynamic);
                    self.bind(&param.name, ty);
                }
                let declared = node.annotation.clone().unwrap_or(Type::Dynamic);
                self.returns.push(declared.clone());
                let result = self.check_function_body(name, body, &declared);
                self.returns.pop();
                self.scopes.pop();
                result?;
                Ok(signature)
            }
            NodeKind::Let { name, value } => {
                let found = self.check(value)?;
                let bound = match &node.annotation {
                    Some(declared) => {
                        if !declared.unify(&found) {
                            return Err(mismatch_types(
                                declared,
                                &found,
                                &format!("binding `{name}`"),
                                value,
                            ));
                        }
                        declared.clone()
                    }
                    None => Type::Dynamic,
                };
                self.bind(name, bound);
                Ok(Type::nil())
            }
            NodeKind::Return(value) => {
                let found = match value {
                    Some(v) => self.check(v)?,
                    None => Type::nil(),
                };
                if let Some(declared) = self.returns.last()
                    && !declared.unify(&found)
                {
                    let at = value.as_ref().unwrap_or(node);
                    return Err(mismatch_types(declared, &found, "return value", at));
                }
                Ok(Type::Dynamic)
            }
            NodeKind::Cast { value, target } => {
                let found = self.check(value)?;
                if !found.unify(target) {
                    return Err(mismatch_types(target, &found, "`as` cast", node));
                }
                if !target.is_dynamic() && &found != target {
                    tracing::trace!(node = node.id.0, %target, "recorded runtime check");
                    self.checkpoints.push(RuntimeCheck {
                        node: node.id,
                        target: target.clone(),
                        pos: node.pos,
                    });
                }
                Ok(target.clone())
            }
            NodeKind::Block(statements) => {
                self.scopes.push(FxHashMap::default());
                let result = self.check_block(statements);
                self.scopes.pop();
                result
            }
            NodeKind::SExprForm { items, .. } => {
                let types = items
                    .iter()
                    .map(|item| self.check(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(match types.as_slice() {
                    [Type::Parameterized(base, args)] if base == "Map" && args.len() == 2 => {
                        args[1].clone()
                    }
                    [Type::Parameterized(base, args), default]
                        if base == "Map" && args.len() == 2 && &args[1] == default =>
                    {
                        args[1].clone()
                    }
                    _ => Type::Dynamic,
                })
            }
            // definitions and invocations are gone after expansion
            NodeKind::MacroDef { .. } => Ok(Type::nil()),
            NodeKind::MacroInvocation { .. } => Ok(Type::Dynamic),
        }
    }

    /// Function headers in a block are bound before its statements so that
    /// calls can precede definitions.
    fn check_block(&mut self, statements: &[NodeRef]) -> Result<Type, TypeError> {
        for stmt in statements {
            if let NodeKind::FuncDef { name, .. } = &stmt.kind {
                self.bind(name, signature(stmt));
            }
        }
        let mut last = Type::nil();
        for stmt in statements {
            last = self.check(stmt)?;
        }
        Ok(last)
    }

    /// With a declared return type, a trailing expression is an implicit
    /// return and must match it. A body that is empty or ends in a binding
    /// falls off the end with `Nil`.
    fn check_function_body(
        &mut self,
        name: &str,
        body: &NodeRef,
        declared: &Type,
    ) -> Result<(), TypeError> {
        let found = self.check(body)?;
        if declared.is_dynamic() {
            return Ok(());
        }
        let NodeKind::Block(statements) = &body.kind else {
            return Ok(());
        };
        let (found, at) = match statements.last() {
            Some(last) if matches!(last.kind, NodeKind::Return(_)) => return Ok(()),
            Some(last) if last.is_binding() => (Type::nil(), last),
            Some(last) => (found, last),
            None => (Type::nil(), body),
        };
        if !declared.unify(&found) {
            return Err(mismatch_types(
                declared,
                &found,
                &format!("result of `{name}`"),
                at,
            ));
        }
        Ok(())
    }

    fn check_call(
        &mut self,
        node: &Node,
        callee: &NodeRef,
        args: &[NodeRef],
    ) -> Result<Type, TypeError> {
        let callee_type = self.check(callee)?;
        let arg_types = args
            .iter()
            .map(|arg| self.check(arg))
            .collect::<Result<Vec<_>, _>>()?;
        let callee_name = match &callee.kind {
            NodeKind::Identifier(name) => format!("`{name}`"),
            _ => "function".to_string(),
        };

        match callee_type {
            Type::Dynamic => Ok(Type::Dynamic),
            Type::Function(params, ret) => {
                if params.len() != arg_types.len() {
                    return Err(TypeError {
                        reason: TypeErrorReason::Arity,
                        expected: format!("{} arguments", params.len()),
                        found: format!("{} arguments", arg_types.len()),
                        context: format!("call to {callee_name}"),
                        pos: node.pos,
                        syntax: node.syntax,
                    });
                }
                for (i, ((param, found), arg)) in params.iter().zip(&arg_types).zip(args).enumerate()
                {
                    if !param.unify(found) {
                        return Err(mismatch_types(
                            param,
                            found,
                            &format!("argument {} of {callee_name}", i + 1),
                            arg,
                        ));
                    }
                }
                Ok(*ret)
            }
            other => Err(TypeError {
                reason: TypeErrorReason::NotCallable,
                expected: "function".to_string(),
                found: other.to_string(),
                context: format!("call to {callee_name}"),
                pos: callee.pos,
                syntax: callee.syntax,
            }),
        }
    }
}

// ============================================================================
// Typing Rules
// ============================================================================

fn literal_type(lit: &Literal) -> Type {
    match lit {
        Literal::Int(_) => Type::int(),
        Literal::Float(_) => Type::float(),
        Literal::Str(_) => Type::string(),
        Literal::Bool(_) => Type::bool(),
        Literal::Nil => Type::nil(),
    }
}

/// `func` signature from annotations alone; missing ones are `Dynamic`.
fn signature(node: &Node) -> Type {
    let NodeKind::FuncDef { params, .. } = &node.kind else {
        return Type::Dynamic;
    };
    Type::function(
        params
            .iter()
            .map(|p| p.annotation.clone().unwrap_or(Type::Dynamic))
            .collect(),
        node.annotation.clone().unwrap_or(Type::Dynamic),
    )
}

fn binary_type(op: BinOp, l: &Type, r: &Type) -> Option<Type> {
    if op.is_logical() {
        return (Type::bool().unify(l) && Type::bool().unify(r)).then(Type::bool);
    }
    if op.is_equality() {
        return (l.unify(r) || (l.is_numeric() && r.is_numeric())).then(Type::bool);
    }
    if l.is_dynamic() || r.is_dynamic() {
        return Some(if op.is_ordering() {
            Type::bool()
        } else {
            Type::Dynamic
        });
    }
    let both_strings = l.is_named("String") && r.is_named("String");
    if op.is_ordering() {
        return ((l.is_numeric() && r.is_numeric()) || both_strings).then(Type::bool);
    }
    if op == BinOp::Add && both_strings {
        return Some(Type::string());
    }
    if l.is_numeric() && r.is_numeric() {
        return Some(if l.is_named("Int") && r.is_named("Int") {
            Type::int()
        } else {
            Type::float()
        });
    }
    None
}

fn operand_error(op: BinOp, l: &Type, r: &Type, node: &Node) -> TypeError {
    let (expected, found) = if op.is_logical() {
        let found = if Type::bool().unify(l) { r } else { l };
        ("Bool".to_string(), found.to_string())
    } else if op.is_equality() {
        (l.to_string(), r.to_string())
    } else if l.is_numeric() {
        (l.to_string(), r.to_string())
    } else if l.is_named("String") {
        ("String".to_string(), r.to_string())
    } else {
        ("Int or Float".to_string(), l.to_string())
    };
    TypeError {
        reason: TypeErrorReason::Mismatch,
        expected,
        found,
        context: format!("operands of `{op}`"),
        pos: node.pos,
        syntax: node.syntax,
    }
}

fn mismatch(expected: &str, found: &Type, context: &str, node: &Node) -> TypeError {
    TypeError {
        reason: TypeErrorReason::Mismatch,
        expected: expected.to_string(),
        found: found.to_string(),
        context: context.to_string(),
        pos: node.pos,
        syntax: node.syntax,
    }
}

fn mismatch_types(expected: &Type, found: &Type, context: &str, node: &Node) -> TypeError {
    mismatch(&expected.to_string(), found, context, node)
}

/// Type-check an expanded program.
pub fn check_program(
    program: Program,
    macros: MacroTable,
) -> Result<TypedProgram, TypeError> {
    let mut checker = TypeChecker::new();
    checker.check(&program.root)?;
    let (types, checkpoints) = checker.into_parts();
    tracing::debug!(
        typed = types.len(),
        checkpoints = checkpoints.len(),
        "type checked program"
    );
    Ok(TypedProgram {
        program,
        types,
        checkpoints,
        macros,
        constants: FxHashMap::default(),
    })
}
