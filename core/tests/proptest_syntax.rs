use braid::{compile, parse};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

#[derive(Debug, Clone)]
enum Expr {
    Num(u16),
    Var(&'static str),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Bin(&'static str, Box<Expr>, Box<Expr>),
}

const OPERATORS: &[&str] = &["+", "-", "*", "/", "%", "<", "<=", "==", "!=", "&&", "||"];

fn expr() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        (0u16..1000).prop_map(Expr::Num),
        prop::sample::select(vec!["a", "b", "c", "n"]).prop_map(Expr::Var),
    ];
    leaf.prop_recursive(5, 48, 2, |inner| {
        prop_oneof![
            inner.clone().prop_map(|e| Expr::Neg(Box::new(e))),
            inner.clone().prop_map(|e| Expr::Not(Box::new(e))),
            (prop::sample::select(OPERATORS), inner.clone(), inner)
                .prop_map(|(op, l, r)| Expr::Bin(op, Box::new(l), Box::new(r))),
        ]
    })
}

/// Fully parenthesized brace syntax.
fn infix(e: &Expr) -> String {
    match e {
        Expr::Num(n) => n.to_string(),
        Expr::Var(v) => v.to_string(),
        Expr::Neg(inner) => format!("-({})", infix(inner)),
        Expr::Not(inner) => format!("!({})", infix(inner)),
        Expr::Bin(op, l, r) => format!("({} {op} {})", infix(l), infix(r)),
    }
}

fn sexpr(e: &Expr) -> String {
    match e {
        Expr::Num(n) => n.to_string(),
        Expr::Var(v) => v.to_string(),
        Expr::Neg(inner) => format!("(- {})", sexpr(inner)),
        Expr::Not(inner) => format!("(! {})", sexpr(inner)),
        Expr::Bin(op, l, r) => format!("({op} {} {})", sexpr(l), sexpr(r)),
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn both_syntaxes_build_the_same_tree(e in expr()) {
        let brace = parse(&infix(&e)).unwrap();
        let lisp = parse(&sexpr(&e)).unwrap();
        prop_assert_eq!(brace.forms(), lisp.forms());
    }

    #[test]
    fn mixed_nesting_builds_the_same_tree(l in expr(), r in expr()) {
        let mixed = format!("({} + {})", sexpr(&l), infix(&r));
        let brace = format!("({} + {})", infix(&l), infix(&r));
        let mixed_ast = parse(&mixed).unwrap();
        let brace_ast = parse(&brace).unwrap();
        prop_assert_eq!(mixed_ast.forms(), brace_ast.forms());
    }

    #[test]
    fn arbitrary_input_never_panics(src in "[ -~]{0,40}") {
        let _ = compile(&src);
    }
}
