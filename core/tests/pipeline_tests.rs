use braid::ast::NodeKind;
use braid::{CompileError, CompileOptions, Hygiene, Syntax, Type, compile, compile_with};
use braid_runtime::Value;

const FACTORIAL: &str = "
func factorial(n: Int) -> Int {
    if (n <= 1) {
        return 1
    } else {
        return n * factorial(n - 1)
    }
}
factorial(5)
";

#[test]
fn test_factorial_end_to_end() {
    let typed = compile(FACTORIAL).unwrap();
    let forms = typed.program.forms();
    assert_eq!(forms.len(), 2);

    let NodeKind::Call { callee, .. } = &forms[1].kind else {
        panic!("expected call, got {:?}", forms[1].kind);
    };
    let callee_type = typed.type_of(callee).unwrap();
    assert_eq!(callee_type.to_string(), "Int -> Int");
    assert_eq!(typed.type_of(&forms[1]), Some(&Type::int()));
    assert!(typed.checkpoints.is_empty());
}

#[test]
fn test_mixed_syntax_program() {
    let src = "
        macro unless(cond, block body) { if !cond { body } }
        (func clamp (x: Int) -> Int (if (< x 0) 0 x))
        let total: Int = clamp(-5) + (clamp 7)
        unless!(total > 10, { print(total) })
    ";
    let typed = compile(src).unwrap();
    assert_eq!(typed.program.forms().len(), 3);
    assert_eq!(typed.macros.names(), vec!["unless"]);
}

#[test]
fn test_errors_stop_at_first_failing_phase() {
    let err = compile("let x: Int = \"s\" @").unwrap_err();
    assert!(matches!(err, CompileError::Lex(_)));

    let err = compile("let x: Int = \"s\" nope!()").unwrap_err();
    assert!(matches!(err, CompileError::Macro(_)));

    let err = compile("let x: Int = \"s\"").unwrap_err();
    assert!(matches!(err, CompileError::Type(_)));
}

#[test]
fn test_error_display() {
    let err = compile("let = 5").unwrap_err();
    assert_eq!(
        err.to_string(),
        "parse error: 1:5: expected one of identifier, found `=` (brace syntax)"
    );
    assert_eq!(err.pos().column, 5);

    let err = compile("func add(a: Int) { a }\nadd(\"s\")").unwrap_err();
    assert_eq!(
        err.to_string(),
        "type error: 2:5: type mismatch in argument 1 of `add`: expected Int, found String"
    );
}

#[test]
fn test_error_records_failing_syntax() {
    let err = compile("let ok = 1\n(let)").unwrap_err();
    assert_eq!(err.syntax(), Syntax::SExpr);
    assert_eq!(err.pos().line, 2);

    let err = compile("(do (let y = 1))").unwrap_err();
    assert!(matches!(err, CompileError::Parse(_)));
    assert_eq!(err.syntax(), Syntax::SExpr);
}

// ============================================================================
// Constant Folding
// ============================================================================

#[test]
fn test_literal_collections_fold_to_runtime_values() {
    let typed = compile("let v = [1, [2, 3], :k]\nlet m = {:a \"x\"}\nlet w = [x, 1]").unwrap();
    let forms = typed.program.forms();
    let value_of = |i: usize| {
        let NodeKind::Let { value, .. } = &forms[i].kind else {
            panic!("expected let");
        };
        typed.constants.get(&value.id).cloned()
    };

    let expected = Value::vector([
        Value::Int(1),
        Value::vector([Value::Int(2), Value::Int(3)]),
        Value::keyword("k"),
    ]);
    assert_eq!(value_of(0), Some(expected));
    assert_eq!(
        value_of(1),
        Some(Value::map([(Value::keyword("a"), Value::string("x"))]))
    );
    assert_eq!(value_of(2), None);
    // the nested `[2, 3]` is folded on its own as well
    assert_eq!(typed.constants.len(), 3);
}

#[test]
fn test_folding_can_be_disabled() {
    let options = CompileOptions::default().with_fold_constants(false);
    let typed = compile_with("[1, 2]", &options).unwrap();
    assert!(typed.constants.is_empty());
}

// ============================================================================
// Options and Output
// ============================================================================

#[test]
fn test_options_from_json() {
    let options: CompileOptions = serde_json::from_str(r#"{"max_expansion_depth": 4}"#).unwrap();
    assert_eq!(options.max_expansion_depth, 4);
    assert_eq!(options.hygiene, Hygiene::Rename);
    assert!(options.fold_constants);

    let options: CompileOptions = serde_json::from_str(r#"{"hygiene": "unhygienic"}"#).unwrap();
    assert_eq!(options.hygiene, Hygiene::Unhygienic);

    let options: CompileOptions = serde_json::from_str("{}").unwrap();
    assert_eq!(options, CompileOptions::default());
}

#[test]
fn test_typed_program_serializes() {
    let typed = compile("macro id(x) { x }\nlet n = f()\nid!(n as Int)").unwrap();
    let json = serde_json::to_value(&typed).unwrap();

    assert_eq!(json["checkpoints"].as_array().map(Vec::len), Some(1));
    assert_eq!(json["checkpoints"][0]["target"], serde_json::json!({"Named": "Int"}));
    assert!(json["macros"]["id"]["params"].is_array());
    assert!(json["types"].as_object().is_some_and(|types| !types.is_empty()));
    assert!(json.get("constants").is_none());
}
