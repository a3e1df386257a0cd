//! Macro table and expander.
//!
//! Definitions are registered in file order into a persistent table; each
//! registration is a new frozen snapshot, so an invocation only ever sees
//! the macros defined before it. Expansion is a pure tree rewrite that
//! substitutes arguments into a copy of the template, outside-in, and
//! re-expands the result until no invocation remains or the depth bound is
//! reached. Arguments count against the depth of the invocation that wrote
//! them, so nested calls such as `f!(f!(x))` do not add up.

use std::sync::Arc;

use rustc_hash::{FxBuildHasher, FxHashMap, FxHashSet};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::ast::{
    MacroParam, Node, NodeId, NodeIdGen, NodeKind, NodeRef, Param, Program, SourcePos, Syntax,
    first_beyond_depth, map_children, rebuild_children,
};
use crate::error::{MacroError, MacroErrorReason};
use crate::options::{CompileOptions, Hygiene};

// ============================================================================
// Definitions and Table
// ============================================================================

#[derive(Debug, Clone, serde::Serialize)]
pub struct MacroDefinition {
    pub name: String,
    pub params: Vec<MacroParam>,
    /// Template body, always a `Block`.
    pub body: NodeRef,
    pub pos: SourcePos,
    /// Snapshot of the table just before this definition.
    #[serde(skip)]
    scope: MacroTable,
}

impl MacroDefinition {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    fn has_param(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name == name)
    }
}

/// Immutable mapping from macro name to definition.
#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    macros: im::HashMap<String, Arc<MacroDefinition>, FxBuildHasher>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<MacroDefinition>> {
        self.macros.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// Names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.macros.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// A new snapshot with `def` added; `self` is unchanged.
    pub fn define(&self, def: Arc<MacroDefinition>) -> MacroTable {
        MacroTable {
            macros: self.macros.update(def.name.clone(), def),
        }
    }
}

impl Serialize for MacroTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.macros.len()))?;
        for name in self.names() {
            if let Some(def) = self.macros.get(name) {
                map.serialize_entry(name, def.as_ref())?;
            }
        }
        map.end()
    }
}

/// Tables visible from inside a definition's template: the definition's
/// own snapshot plus the definition itself.
fn template_scope(def: &Arc<MacroDefinition>) -> MacroTable {
    def.scope.define(Arc::clone(def))
}

// ============================================================================
// Expander
// ============================================================================

pub struct Expander<'a> {
    options: &'a CompileOptions,
    ids: NodeIdGen,
    table: MacroTable,
    /// Invocation nodes copied out of a template resolve in the template's
    /// lexical scope instead of the caller's.
    template_scopes: FxHashMap<NodeId, MacroTable>,
    /// Expansion depth of the invocation each substituted argument came from.
    argument_depths: FxHashMap<NodeId, usize>,
    serial: usize,
}

/// Argument bound to a macro parameter during one instantiation.
struct Binding {
    node: NodeRef,
    is_block: bool,
    used: bool,
}

impl<'a> Expander<'a> {
    pub fn new(options: &'a CompileOptions, ids: NodeIdGen) -> Self {
        Expander {
            options,
            ids,
            table: MacroTable::new(),
            template_scopes: FxHashMap::default(),
            argument_depths: FxHashMap::default(),
            serial: 0,
        }
    }

    /// Expand every top-level form in order, registering definitions as
    /// they are reached. Definitions do not appear in the output.
    pub fn expand_program(mut self, program: Program) -> Result<(Program, MacroTable), MacroError> {
        let mut forms = Vec::with_capacity(program.forms().len());
        for form in program.forms() {
            if let NodeKind::MacroDef { name, params, body } = &form.kind {
                self.register(name, params, body, form)?;
                continue;
            }
            let table = self.table.clone();
            forms.push(self.expand_node(form, &table, 0, 1)?);
        }

        tracing::debug!(
            macros = self.table.len(),
            expansions = self.serial,
            "expanded program"
        );
        let root = Arc::new(Node {
            kind: NodeKind::Block(forms),
            ..Node::clone(&program.root)
        });
        Ok((
            Program {
                root,
                ids: self.ids,
            },
            self.table,
        ))
    }

    fn register(
        &mut self,
        name: &str,
        params: &[MacroParam],
        body: &NodeRef,
        form: &NodeRef,
    ) -> Result<(), MacroError> {
        let def = Arc::new(MacroDefinition {
            name: name.to_string(),
            params: params.to_vec(),
            body: Arc::clone(body),
            pos: form.pos,
            scope: self.table.clone(),
        });
        validate_template(&def, &template_scope(&def))?;
        tracing::debug!(name, arity = def.arity(), "registered macro");
        self.table = self.table.define(def);
        Ok(())
    }

    /// `depth` counts nested expansions, `nesting` the tree level of `node`.
    fn expand_node(
        &mut self,
        node: &NodeRef,
        table: &MacroTable,
        depth: usize,
        nesting: usize,
    ) -> Result<NodeRef, MacroError> {
        let depth = self.argument_depths.get(&node.id).copied().unwrap_or(depth);
        let NodeKind::MacroInvocation { name, args } = &node.kind else {
            return map_children(node, |child| {
                self.expand_node(child, table, depth, nesting + 1)
            });
        };

        let scope = self
            .template_scopes
            .get(&node.id)
            .cloned()
            .unwrap_or_else(|| table.clone());
        let def = scope
            .get(name)
            .cloned()
            .ok_or_else(|| macro_error(name, MacroErrorReason::UndefinedMacro, node))?;

        if depth >= self.options.max_expansion_depth {
            return Err(macro_error(
                name,
                MacroErrorReason::ExpansionDidNotTerminate { depth },
                node,
            ));
        }
        if def.arity() != args.len() {
            return Err(macro_error(
                name,
                MacroErrorReason::ArityMismatch {
                    expected: def.arity(),
                    found: args.len(),
                },
                node,
            ));
        }

        tracing::trace!(name = name.as_str(), depth, "expanding macro invocation");
        let expanded = self.instantiate(&def, args, node, depth);
        let max_nesting = self.options.max_nesting_depth;
        if first_beyond_depth(&expanded, max_nesting.saturating_sub(nesting)).is_some() {
            return Err(macro_error(
                name,
                MacroErrorReason::NestingTooDeep { limit: max_nesting },
                node,
            ));
        }
        self.expand_node(&expanded, table, depth + 1, nesting)
    }

    // ========================================================================
    // Instantiation
    // ========================================================================

    fn instantiate(
        &mut self,
        def: &Arc<MacroDefinition>,
        args: &[NodeRef],
        call: &Node,
        call_depth: usize,
    ) -> NodeRef {
        self.serial += 1;
        let mut bindings: FxHashMap<String, Binding> = def
            .params
            .iter()
            .zip(args)
            .map(|(param, arg)| {
                (
                    param.name.clone(),
                    Binding {
                        node: Arc::clone(arg),
                        is_block: param.is_block,
                        used: false,
                    },
                )
            })
            .collect();

        let renames: FxHashMap<String, String> = match self.options.hygiene {
            Hygiene::Rename => template_binders(def)
                .into_iter()
                .map(|name| {
                    let fresh = format!("{name}#m{}", self.serial);
                    (name, fresh)
                })
                .collect(),
            Hygiene::Unhygienic => FxHashMap::default(),
        };

        let mut copier = TemplateCopy {
            expander: self,
            bindings: &mut bindings,
            renames: &renames,
            scope: template_scope(def),
            call_pos: call.pos,
            call_syntax: call.syntax,
            call_depth,
        };
        copier.copy(&def.body)
    }

    /// Deep copy with fresh ids, keeping template-scope markers attached.
    fn reid(&mut self, node: &NodeRef) -> NodeRef {
        let children = rebuild_children(node, |child| self.reid(child));
        let id = self.ids.fresh();
        if let Some(scope) = self.template_scopes.get(&node.id).cloned() {
            self.template_scopes.insert(id, scope);
        }
        if let Some(&depth) = self.argument_depths.get(&node.id) {
            self.argument_depths.insert(id, depth);
        }
        Arc::new(Node {
            id,
            ..Node::clone(&children)
        })
    }
}

struct TemplateCopy<'e, 'a> {
    expander: &'e mut Expander<'a>,
    bindings: &'e mut FxHashMap<String, Binding>,
    renames: &'e FxHashMap<String, String>,
    scope: MacroTable,
    call_pos: SourcePos,
    call_syntax: Syntax,
    call_depth: usize,
}

impl TemplateCopy<'_, '_> {
    fn fresh(&mut self, kind: NodeKind, template: &Node) -> NodeRef {
        Arc::new(Node {
            id: self.expander.ids.fresh(),
            kind,
            annotation: template.annotation.clone(),
            pos: self.call_pos,
            syntax: self.call_syntax,
        })
    }

    /// The argument for `name`: shared on first use, re-ided afterwards so
    /// every node in the output keeps a distinct id.
    fn argument(&mut self, name: &str) -> Option<NodeRef> {
        let binding = self.bindings.get_mut(name)?;
        let node = Arc::clone(&binding.node);
        let is_block = binding.is_block;
        let first_use = !binding.used;
        binding.used = true;

        let node = if first_use {
            node
        } else {
            self.expander.reid(&node)
        };
        let depths = &mut self.expander.argument_depths;
        depths.insert(node.id, self.call_depth);
        if let NodeKind::Block(statements) = &node.kind {
            // spliced statements lose their block
            for stmt in statements {
                depths.insert(stmt.id, self.call_depth);
            }
        }
        if is_block && !node.is_block() {
            let pos = node.pos;
            let syntax = node.syntax;
            return Some(Arc::new(Node::new(
                self.expander.ids.fresh(),
                NodeKind::Block(vec![node]),
                pos,
                syntax,
            )));
        }
        Some(node)
    }

    /// Name to use for a binder written in the template.
    fn binder(&self, name: &str) -> String {
        if let Some(arg) = self.bindings.get(name)
            && let NodeKind::Identifier(caller_name) = &arg.node.kind
        {
            return caller_name.clone();
        }
        self.renames
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    fn is_block_param(&self, node: &Node) -> Option<String> {
        match &node.kind {
            NodeKind::Identifier(name) if self.bindings.get(name).is_some_and(|b| b.is_block) => {
                Some(name.clone())
            }
            _ => None,
        }
    }

    fn copy(&mut self, node: &NodeRef) -> NodeRef {
        match &node.kind {
            NodeKind::Identifier(name) => {
                if let Some(arg) = self.argument(name) {
                    return arg;
                }
                let name = self.renames.get(name).cloned().unwrap_or_else(|| name.clone());
                self.fresh(NodeKind::Identifier(name), node)
            }
            NodeKind::Block(statements) => {
                let mut out = Vec::with_capacity(statements.len());
                for stmt in statements {
                    match self.is_block_param(stmt).and_then(|p| self.argument(&p)) {
                        Some(arg) => match &arg.kind {
                            NodeKind::Block(spliced) => out.extend(spliced.iter().cloned()),
                            _ => out.push(arg),
                        },
                        None => out.push(self.copy(stmt)),
                    }
                }
                self.fresh(NodeKind::Block(out), node)
            }
            NodeKind::Let { name, value } => {
                let name = self.binder(name);
                let value = self.copy(value);
                self.fresh(NodeKind::Let { name, value }, node)
            }
            NodeKind::FuncDef { name, params, body } => {
                let name = self.binder(name);
                let params = params
                    .iter()
                    .map(|p| Param {
                        name: self.binder(&p.name),
                        annotation: p.annotation.clone(),
                    })
                    .collect();
                let body = self.copy(body);
                self.fresh(NodeKind::FuncDef { name, params, body }, node)
            }
            NodeKind::MacroInvocation { .. } => {
                let copied = self.copy_children(node);
                self.expander
                    .template_scopes
                    .insert(copied.id, self.scope.clone());
                copied
            }
            _ => self.copy_children(node),
        }
    }

    fn copy_children(&mut self, node: &NodeRef) -> NodeRef {
        let copied = rebuild_children(node, |child| self.copy(child));
        self.fresh(copied.kind.clone(), node)
    }
}

/// Names a template binds with `let`, `func` or function parameters,
/// excluding macro parameters (those are supplied by the caller).
fn template_binders(def: &MacroDefinition) -> FxHashSet<String> {
    let mut binders = FxHashSet::default();
    let mut stack = vec![&def.body];
    while let Some(node) = stack.pop() {
        match &node.kind {
            NodeKind::Let { name, .. } => {
                binders.insert(name.clone());
            }
            NodeKind::FuncDef { name, params, .. } => {
                binders.insert(name.clone());
                binders.extend(params.iter().map(|p| p.name.clone()));
            }
            _ => {}
        }
        stack.extend(node.children());
    }
    binders.retain(|name| !def.has_param(name));
    binders
}

/// Every invocation in a template must name a visible macro with the right
/// arity, checked once when the definition is registered.
fn validate_template(def: &MacroDefinition, scope: &MacroTable) -> Result<(), MacroError> {
    let mut stack = vec![&def.body];
    while let Some(node) = stack.pop() {
        if let NodeKind::MacroInvocation { name, args } = &node.kind {
            let Some(target) = scope.get(name) else {
                return Err(macro_error(name, MacroErrorReason::UndefinedMacro, node));
            };
            if target.arity() != args.len() {
                return Err(macro_error(
                    name,
                    MacroErrorReason::ArityMismatch {
                        expected: target.arity(),
                        found: args.len(),
                    },
                    node,
                ));
            }
        }
        // reversed so the leftmost invocation is reported first
        stack.extend(node.children().into_iter().rev());
    }
    Ok(())
}

fn macro_error(name: &str, reason: MacroErrorReason, node: &Node) -> MacroError {
    MacroError {
        name: name.to_string(),
        reason,
        pos: node.pos,
        syntax: node.syntax,
    }
}

/// Expand all macros in `program`, returning the expanded program and the
/// final macro table.
pub fn expand(
    program: Program,
    options: &CompileOptions,
) -> Result<(Program, MacroTable), MacroError> {
    let ids = program.ids.clone();
    Expander::new(options, ids).expand_program(program)
}
