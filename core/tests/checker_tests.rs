use braid::{CompileError, Type, TypeError, TypeErrorReason, TypedProgram, compile};

fn typed(src: &str) -> TypedProgram {
    compile(src).unwrap_or_else(|err| panic!("{src:?} failed to compile: {err}"))
}

/// Type of the last top-level form.
fn last_type(src: &str) -> Type {
    let typed = typed(src);
    let last = typed.program.forms().last().expect("no forms");
    typed.type_of(last).cloned().expect("untyped form")
}

fn type_error(src: &str) -> TypeError {
    match compile(src) {
        Err(CompileError::Type(err)) => err,
        other => panic!("expected type error for {src:?}, got {other:?}"),
    }
}

const ADD: &str = "func add(a: Int, b: Int) -> Int { a + b }\n";

// ============================================================================
// Gradual Typing
// ============================================================================

#[test]
fn test_dynamic_argument_satisfies_annotated_parameter() {
    assert_eq!(last_type(&format!("{ADD}add(1, x)")), Type::int());
}

#[test]
fn test_static_mismatch_is_reported() {
    let err = type_error(&format!("{ADD}add(1, \"two\")"));
    assert_eq!(err.reason, TypeErrorReason::Mismatch);
    assert_eq!(err.expected, "Int");
    assert_eq!(err.found, "String");
    assert_eq!(err.context, "argument 2 of `add`");
    assert_eq!(err.pos.line, 2);
    assert_eq!(err.pos.column, 8);
}

#[test]
fn test_unannotated_parameters_are_dynamic() {
    assert_eq!(last_type("func id(x) { x }\nid(\"s\") + 1"), Type::Dynamic);
    assert_eq!(
        last_type("func id(x) { x }\nid"),
        Type::function(vec![Type::Dynamic], Type::Dynamic)
    );
}

#[test]
fn test_unbound_names_are_dynamic() {
    assert_eq!(last_type("print(\"hi\")"), Type::Dynamic);
}

#[test]
fn test_let_annotation_is_enforced() {
    let err = type_error("let x: Int = \"s\"");
    assert_eq!(err.expected, "Int");
    assert_eq!(err.found, "String");
    assert_eq!(err.context, "binding `x`");

    assert_eq!(last_type("let x: Int = 5\nx"), Type::int());
}

#[test]
fn test_unannotated_let_is_dynamic() {
    assert_eq!(last_type("let y = 5\ny"), Type::Dynamic);
    assert_eq!(last_type("let y = 5\ny + \"s\""), Type::Dynamic);
}

#[test]
fn test_parameterized_annotations() {
    assert_eq!(
        last_type("let v: Vector<Int> = [1, 2]\nv"),
        Type::vector(Type::int())
    );
    let err = type_error("let v: Vector<String> = [1, 2]");
    assert_eq!(err.expected, "Vector<String>");
    assert_eq!(err.found, "Vector<Int>");
}

// ============================================================================
// Casts
// ============================================================================

#[test]
fn test_cast_from_dynamic_records_checkpoint() {
    let typed = typed("let v = f()\n(v as Int) + 1");
    assert_eq!(typed.checkpoints.len(), 1);
    assert_eq!(typed.checkpoints[0].target, Type::int());
    assert_eq!(typed.checkpoints[0].pos.line, 2);
    let last = typed.program.forms().last().unwrap();
    assert_eq!(typed.type_of(last), Some(&Type::int()));
}

#[test]
fn test_cast_to_known_type_needs_no_checkpoint() {
    assert!(typed("5 as Int").checkpoints.is_empty());
    assert!(typed("let v = f()\nv as Dynamic").checkpoints.is_empty());
}

#[test]
fn test_impossible_cast_is_rejected() {
    let err = type_error("\"s\" as Int");
    assert_eq!(err.expected, "Int");
    assert_eq!(err.found, "String");
    assert_eq!(err.context, "`as` cast");
}

#[test]
fn test_sexpr_cast_matches_brace_cast() {
    let typed = typed("(as (f) Int)");
    assert_eq!(typed.checkpoints.len(), 1);
}

// ============================================================================
// Functions
// ============================================================================

#[test]
fn test_call_arity() {
    let err = type_error("func f(a: Int) { a }\nf(1, 2)");
    assert_eq!(err.reason, TypeErrorReason::Arity);
    assert_eq!(err.expected, "1 arguments");
    assert_eq!(err.found, "2 arguments");
}

#[test]
fn test_trailing_expression_is_an_implicit_return() {
    let err = type_error("func f() -> Int { \"s\" }");
    assert_eq!(err.context, "result of `f`");
    assert_eq!(err.found, "String");
}

#[test]
fn test_falling_off_the_end_returns_nil() {
    let err = type_error("func f() -> Int { }");
    assert_eq!(err.context, "result of `f`");
    assert_eq!(err.expected, "Int");
    assert_eq!(err.found, "Nil");

    let err = type_error("func f() -> Int {\n    let x = 1\n}");
    assert_eq!(err.found, "Nil");
    assert_eq!(err.pos.line, 2);

    let err = type_error("(func f () -> Int (func g () 1))");
    assert_eq!(err.found, "Nil");

    assert!(compile("func f() -> Nil { let x = 1 }").is_ok());
    assert!(compile("func f() { }").is_ok());
    assert!(compile("func f() -> Int { let x = 1 return x }").is_ok());
}

#[test]
fn test_return_checked_against_declared_type() {
    let err = type_error("func f() -> Int { return \"s\" }");
    assert_eq!(err.context, "return value");
    assert_eq!(err.expected, "Int");
}

#[test]
fn test_calling_a_non_function() {
    let err = type_error("let n: Int = 1\nn(2)");
    assert_eq!(err.reason, TypeErrorReason::NotCallable);
    assert_eq!(err.found, "Int");
    assert_eq!(err.pos.line, 2);
    assert_eq!(err.pos.column, 1);
}

#[test]
fn test_mutual_recursion_through_block_prebinding() {
    let src = "
        func is_even(n: Int) -> Bool { if n == 0 { true } else { is_odd(n - 1) } }
        func is_odd(n: Int) -> Bool { if n == 0 { false } else { is_even(n - 1) } }
        is_even(10)
    ";
    assert_eq!(last_type(src), Type::bool());
}

#[test]
fn test_function_type_annotation() {
    let src = "func apply(f: func(Int) -> Int, x: Int) -> Int { f(x) }\nfunc inc(n: Int) -> Int { n + 1 }\napply(inc, 1)";
    assert_eq!(last_type(src), Type::int());

    let err = type_error("func apply(f: func(Int) -> Int, x: Int) -> Int { f(x) }\napply(1, 1)");
    assert_eq!(err.expected, "Int -> Int");
}

// ============================================================================
// Expressions
// ============================================================================

#[test]
fn test_if_condition_must_be_bool() {
    let err = type_error("if 1 { 2 }");
    assert_eq!(err.expected, "Bool");
    assert_eq!(err.found, "Int");
    assert_eq!(err.context, "if condition");
}

#[test]
fn test_if_branch_types() {
    assert_eq!(last_type("if true { 1 } else { 2 }"), Type::int());
    assert_eq!(last_type("if true { 1 } else { \"s\" }"), Type::Dynamic);
    assert_eq!(last_type("if true { nil }"), Type::nil());
}

#[test]
fn test_collection_literals() {
    assert_eq!(last_type("[1, 2, 3]"), Type::vector(Type::int()));
    assert_eq!(last_type("[1, \"a\"]"), Type::vector(Type::Dynamic));
    assert_eq!(
        last_type("{:a 1, :b 2}"),
        Type::map(Type::keyword(), Type::int())
    );
    assert_eq!(last_type("{}"), Type::map(Type::Dynamic, Type::Dynamic));
}

#[test]
fn test_arithmetic_and_strings() {
    assert_eq!(last_type("\"a\" + \"b\""), Type::string());
    assert_eq!(last_type("1 + 2.5"), Type::float());
    assert_eq!(last_type("7 % 2"), Type::int());
    assert_eq!(last_type("1 < 2 && 2 < 3"), Type::bool());

    let err = type_error("1 < \"a\"");
    assert_eq!(err.context, "operands of `<`");
    assert_eq!(err.found, "String");
}

#[test]
fn test_equality_and_ordering_share_the_numeric_rule() {
    assert_eq!(last_type("1 == 2.0"), Type::bool());
    assert_eq!(last_type("1 != 2.0"), Type::bool());
    assert_eq!(last_type("1 < 2.0"), Type::bool());

    let err = type_error("1 == \"a\"");
    assert_eq!(err.context, "operands of `==`");
    assert_eq!(err.expected, "Int");
    assert_eq!(err.found, "String");
}

#[test]
fn test_unary_operators() {
    assert_eq!(last_type("-(1 + 2)"), Type::int());
    let err = type_error("!5");
    assert_eq!(err.expected, "Bool");
    assert_eq!(err.context, "operand of `!`");
}

#[test]
fn test_keyword_lookup_form() {
    let src = "let m: Map<Keyword, Int> = {:a 1}\n(:a m)";
    assert_eq!(last_type(src), Type::int());
    assert_eq!(last_type("(:a m)"), Type::Dynamic);
}

#[test]
fn test_every_node_is_typed() {
    let typed = typed("func f(x: Int) -> Int { x * 2 }\nlet y = f(3)");
    let mut stack: Vec<_> = typed.program.forms().iter().collect();
    while let Some(node) = stack.pop() {
        assert!(typed.type_of(node).is_some(), "untyped node {:?}", node.kind);
        stack.extend(node.children());
    }
}
