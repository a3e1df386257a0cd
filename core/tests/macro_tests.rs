use braid::ast::{NodeKind, NodeRef};
use braid::options::DEFAULT_MAX_EXPANSION_DEPTH;
use braid::{
    CompileError, CompileOptions, Hygiene, MacroError, MacroErrorReason, NodeId, Type, compile,
    expand_source, parse,
};
use rustc_hash::FxHashSet;

fn expanded(src: &str) -> Vec<NodeRef> {
    expanded_with(src, &CompileOptions::default())
}

fn expanded_with(src: &str, options: &CompileOptions) -> Vec<NodeRef> {
    let (program, _) = expand_source(src, options).unwrap();
    program.forms().to_vec()
}

fn parsed(src: &str) -> Vec<NodeRef> {
    parse(src).unwrap().forms().to_vec()
}

fn macro_error(src: &str) -> MacroError {
    macro_error_with(src, &CompileOptions::default())
}

fn macro_error_with(src: &str, options: &CompileOptions) -> MacroError {
    match expand_source(src, options) {
        Err(CompileError::Macro(err)) => err,
        other => panic!("expected macro error for {src:?}, got {other:?}"),
    }
}

/// Names bound by `let` and identifiers referenced, in source order.
fn names(forms: &[NodeRef]) -> (Vec<String>, Vec<String>) {
    let mut bound = Vec::new();
    let mut used = Vec::new();
    let mut stack: Vec<&NodeRef> = forms.iter().rev().collect();
    while let Some(node) = stack.pop() {
        match &node.kind {
            NodeKind::Let { name, .. } => bound.push(name.clone()),
            NodeKind::Identifier(name) => used.push(name.clone()),
            _ => {}
        }
        stack.extend(node.children().into_iter().rev());
    }
    (bound, used)
}

fn collect_ids(node: &NodeRef, ids: &mut Vec<NodeId>) {
    ids.push(node.id);
    for child in node.children() {
        collect_ids(child, ids);
    }
}

// ============================================================================
// Substitution
// ============================================================================

#[test]
fn test_unless_splices_block_argument() {
    let src = "macro unless(cond, block body) { if !cond { body } }\nunless!(x > 1, { f(x) })";
    assert_eq!(expanded(src), parsed("{ if !(x > 1) { f(x) } }"));
}

#[test]
fn test_sexpr_definition_with_brace_invocation() {
    let src = "(macro twice (block b) b b)\ntwice!({ tick() })";
    assert_eq!(expanded(src), parsed("{ tick() tick() }"));
}

#[test]
fn test_plain_parameter_substitutes_expression() {
    let src = "macro square(x) { x * x } square!(n + 1)";
    assert_eq!(expanded(src), parsed("{ (n + 1) * (n + 1) }"));
}

#[test]
fn test_block_parameter_wraps_plain_argument() {
    let src = "macro keep(block b) { [b] } keep!(1)";
    assert_eq!(expanded(src), parsed("{ [{ 1 }] }"));
}

#[test]
fn test_repeated_argument_gets_distinct_ids() {
    let forms = expanded("macro twice(x) { x + x } twice!(f(1))");
    let mut ids = Vec::new();
    for form in &forms {
        collect_ids(form, &mut ids);
    }
    let unique: FxHashSet<NodeId> = ids.iter().copied().collect();
    assert_eq!(unique.len(), ids.len());
}

#[test]
fn test_expanded_nodes_take_invocation_position() {
    let forms = expanded("macro one() { 1 }\n\n  one!()");
    assert_eq!(forms[0].pos.line, 3);
    assert_eq!(forms[0].pos.column, 3);
}

#[test]
fn test_definitions_do_not_appear_in_output() {
    let forms = expanded("macro id(x) { x } let a = id!(1) macro other() { 2 }");
    assert_eq!(forms.len(), 1);
    assert!(matches!(forms[0].kind, NodeKind::Let { .. }));
}

#[test]
fn test_nested_invocations_expand_fully() {
    let src = "macro inc(x) { x + 1 } macro inc2(x) { inc!(inc!(x)) } inc2!(5)";
    let typed = compile(src).unwrap();
    let form = &typed.program.forms()[0];
    assert_eq!(typed.type_of(form), Some(&Type::int()));
}

// ============================================================================
// Table Snapshots
// ============================================================================

#[test]
fn test_redefinition_does_not_affect_earlier_templates() {
    let src = "macro v() { 1 } macro w() { v!() } macro v() { \"s\" } w!() v!()";
    let typed = compile(src).unwrap();
    let forms = typed.program.forms();
    assert_eq!(typed.type_of(&forms[0]), Some(&Type::int()));
    assert_eq!(typed.type_of(&forms[1]), Some(&Type::string()));
}

#[test]
fn test_final_table_lists_every_macro() {
    let typed = compile("macro b() { 1 } macro a(x) { x } macro b() { 2 }").unwrap();
    assert_eq!(typed.macros.names(), vec!["a", "b"]);
    assert_eq!(typed.macros.get("a").map(|d| d.arity()), Some(1));
}

// ============================================================================
// Hygiene
// ============================================================================

#[test]
fn test_template_bindings_are_renamed() {
    let src = "macro with_tmp(x) { let tmp = x tmp * 2 } with_tmp!(tmp)";
    let (bound, used) = names(&expanded(src));
    assert_eq!(bound, vec!["tmp#m1"]);
    assert_eq!(used, vec!["tmp", "tmp#m1"]);
}

#[test]
fn test_each_expansion_gets_a_fresh_name() {
    let src = "macro with_tmp(x) { let tmp = x tmp } with_tmp!(1) with_tmp!(2)";
    let (bound, used) = names(&expanded(src));
    assert_eq!(bound, vec!["tmp#m1", "tmp#m2"]);
    assert_eq!(used, vec!["tmp#m1", "tmp#m2"]);
}

#[test]
fn test_renamed_binder_cannot_capture_caller_name() {
    let src = "
        macro m(x) { let tmp: Int = 1 x }
        let tmp__m1: String = \"s\"
        let tmp_m1: String = \"s\"
        let r: String = m!(tmp__m1)
        let q: String = m!(tmp_m1)
    ";
    assert!(compile(src).is_ok());
}

#[test]
fn test_unhygienic_mode_keeps_template_names() {
    let options = CompileOptions::default().with_hygiene(Hygiene::Unhygienic);
    let src = "macro with_tmp(x) { let tmp = x tmp * 2 } with_tmp!(tmp)";
    assert_eq!(
        expanded_with(src, &options),
        parsed("{ let tmp = tmp tmp * 2 }")
    );
}

#[test]
fn test_binder_supplied_by_caller_keeps_its_name() {
    let src = "macro define(name, value) { let name = value } define!(answer, 42)";
    assert_eq!(expanded(src), parsed("{ let answer = 42 }"));
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_undefined_macro() {
    let err = macro_error("let a = 1\nnope!(a)");
    assert_eq!(err.name, "nope");
    assert_eq!(err.reason, MacroErrorReason::UndefinedMacro);
    assert_eq!(err.pos.line, 2);
}

#[test]
fn test_macros_cannot_be_forward_referenced() {
    let err = macro_error("later!(1) macro later(x) { x }");
    assert_eq!(err.reason, MacroErrorReason::UndefinedMacro);
}

#[test]
fn test_arity_mismatch() {
    let err = macro_error("macro id(x) { x } id!(1, 2)");
    assert_eq!(
        err.reason,
        MacroErrorReason::ArityMismatch {
            expected: 1,
            found: 2
        }
    );
}

#[test]
fn test_template_is_validated_at_definition() {
    let err = macro_error("macro bad() { missing!() }");
    assert_eq!(err.name, "missing");
    assert_eq!(err.reason, MacroErrorReason::UndefinedMacro);

    let err = macro_error("macro id(x) { x } macro bad() { id!() }");
    assert_eq!(
        err.reason,
        MacroErrorReason::ArityMismatch {
            expected: 1,
            found: 0
        }
    );
}

#[test]
fn test_duplicate_parameters_are_rejected() {
    assert!(matches!(
        expand_source("macro m(x, x) { x } m!(1, 2)", &CompileOptions::default()),
        Err(CompileError::Parse(_))
    ));
}

/// Deep expansions recurse through several frames per level.
fn on_large_stack<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
    std::thread::Builder::new()
        .stack_size(64 * 1024 * 1024)
        .spawn(f)
        .unwrap()
        .join()
        .unwrap()
}

#[test]
fn test_nested_calls_do_not_accumulate_depth() {
    let depth = DEFAULT_MAX_EXPANSION_DEPTH + 2;
    let src = format!(
        "macro id(x) {{ x }}\n{}1{}",
        "id!(".repeat(depth),
        ")".repeat(depth)
    );
    let ty = on_large_stack(move || {
        let typed = compile(&src).unwrap();
        typed.type_of(&typed.program.forms()[0]).cloned()
    });
    assert_eq!(ty, Some(Type::int()));
}

#[test]
fn test_argument_passed_to_recursive_template_still_terminates() {
    let options = CompileOptions::default().with_max_expansion_depth(4);
    let err = macro_error_with("macro loop(x) { loop!(x) } loop!(loop!(1))", &options);
    assert_eq!(
        err.reason,
        MacroErrorReason::ExpansionDidNotTerminate { depth: 4 }
    );
}

#[test]
fn test_expansion_output_respects_nesting_bound() {
    let options = CompileOptions::default().with_max_nesting_depth(16);
    let src = format!("macro wrap(x) {{ [x] }}\n{}1{}", "wrap!(".repeat(8), ")".repeat(8));
    let err = macro_error_with(&src, &options);
    assert_eq!(err.name, "wrap");
    assert_eq!(err.reason, MacroErrorReason::NestingTooDeep { limit: 16 });

    let shallow = format!("macro wrap(x) {{ [x] }}\n{}1{}", "wrap!(".repeat(3), ")".repeat(3));
    assert!(expand_source(&shallow, &options).is_ok());
}

#[test]
fn test_self_recursive_macro_hits_depth_bound() {
    let src = "macro forever(x) { forever!(x) } forever!(1)";
    let err = macro_error(src);
    assert_eq!(
        err.reason,
        MacroErrorReason::ExpansionDidNotTerminate {
            depth: DEFAULT_MAX_EXPANSION_DEPTH
        }
    );

    let options = CompileOptions::default().with_max_expansion_depth(4);
    let err = macro_error_with(src, &options);
    assert_eq!(
        err.reason,
        MacroErrorReason::ExpansionDidNotTerminate { depth: 4 }
    );
}
