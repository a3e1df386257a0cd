use std::fmt;

use serde::Serialize;

// ============================================================================
// Gradual Type Model
// ============================================================================

/// A static type. `Dynamic` is the unknown type of unannotated code and is
/// consistent with every other type; everything else is consistent only with
/// itself (structurally) or with `Dynamic`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Type {
    Dynamic,
    Named(String),
    Parameterized(String, Vec<Type>),
    Function(Vec<Type>, Box<Type>),
}

impl Type {
    pub fn named(name: &str) -> Self {
        Type::Named(name.to_string())
    }

    pub fn int() -> Self {
        Type::named("Int")
    }

    pub fn float() -> Self {
        Type::named("Float")
    }

    pub fn string() -> Self {
        Type::named("String")
    }

    pub fn bool() -> Self {
        Type::named("Bool")
    }

    pub fn nil() -> Self {
        Type::named("Nil")
    }

    pub fn keyword() -> Self {
        Type::named("Keyword")
    }

    pub fn vector(element: Type) -> Self {
        Type::Parameterized("Vector".to_string(), vec![element])
    }

    pub fn map(key: Type, value: Type) -> Self {
        Type::Parameterized("Map".to_string(), vec![key, value])
    }

    pub fn function(params: Vec<Type>, ret: Type) -> Self {
        Type::Function(params, Box::new(ret))
    }

    /// Build a type from an annotation name, mapping the dynamic spellings.
    pub fn from_name(name: &str, args: Vec<Type>) -> Self {
        match (name, args.is_empty()) {
            ("Dynamic" | "Any", true) => Type::Dynamic,
            (_, true) => Type::named(name),
            (_, false) => Type::Parameterized(name.to_string(), args),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Type::Dynamic)
    }

    pub fn is_named(&self, name: &str) -> bool {
        matches!(self, Type::Named(n) if n == name)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_named("Int") || self.is_named("Float")
    }

    /// Gradual consistency: `Dynamic` unifies with anything, recursively.
    pub fn unify(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Dynamic, _) | (_, Type::Dynamic) => true,
            (Type::Named(a), Type::Named(b)) => a == b,
            (Type::Parameterized(a, xs), Type::Parameterized(b, ys)) => {
                a == b && xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| x.unify(y))
            }
            (Type::Function(p1, r1), Type::Function(p2, r2)) => {
                p1.len() == p2.len() && p1.iter().zip(p2).all(|(x, y)| x.unify(y)) && r1.unify(r2)
            }
            _ => false,
        }
    }

    /// The shared type of a group of expressions: their common type when
    /// they all agree, otherwise `Dynamic`.
    pub fn common<'a>(mut types: impl Iterator<Item = &'a Type>) -> Type {
        let Some(first) = types.next() else {
            return Type::Dynamic;
        };
        if types.all(|t| t == first) {
            first.clone()
        } else {
            Type::Dynamic
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Dynamic => write!(f, "Dynamic"),
            Type::Named(name) => write!(f, "{name}"),
            Type::Parameterized(base, args) => {
                write!(f, "{base}<")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ">")
            }
            Type::Function(params, ret) => {
                if let [single] = params.as_slice()
                    && !matches!(single, Type::Function(..))
                {
                    return write!(f, "{single} -> {ret}");
                }
                write!(f, "(")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, ") -> {ret}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_unifies_with_everything() {
        let samples = [
            Type::int(),
            Type::vector(Type::string()),
            Type::function(vec![Type::int()], Type::bool()),
            Type::Dynamic,
        ];
        for t in &samples {
            assert!(Type::Dynamic.unify(t));
            assert!(t.unify(&Type::Dynamic));
        }
    }

    #[test]
    fn test_named_types_unify_only_with_themselves() {
        assert!(Type::int().unify(&Type::int()));
        assert!(!Type::int().unify(&Type::string()));
    }

    #[test]
    fn test_parameterized_unification_is_structural() {
        assert!(Type::vector(Type::Dynamic).unify(&Type::vector(Type::int())));
        assert!(!Type::vector(Type::int()).unify(&Type::vector(Type::string())));
        assert!(!Type::vector(Type::int()).unify(&Type::map(Type::int(), Type::int())));
    }

    #[test]
    fn test_function_display() {
        assert_eq!(
            Type::function(vec![Type::int()], Type::int()).to_string(),
            "Int -> Int"
        );
        assert_eq!(
            Type::function(vec![Type::int(), Type::Dynamic], Type::int()).to_string(),
            "(Int, Dynamic) -> Int"
        );
        assert_eq!(Type::function(vec![], Type::nil()).to_string(), "() -> Nil");
    }

    #[test]
    fn test_common_type() {
        let same = [Type::int(), Type::int()];
        assert_eq!(Type::common(same.iter()), Type::int());
        let mixed = [Type::int(), Type::string()];
        assert_eq!(Type::common(mixed.iter()), Type::Dynamic);
        assert_eq!(Type::common([].iter()), Type::Dynamic);
    }

    #[test]
    fn test_any_is_dynamic() {
        assert_eq!(Type::from_name("Any", vec![]), Type::Dynamic);
        assert_eq!(
            Type::from_name("Vector", vec![Type::int()]),
            Type::vector(Type::int())
        );
    }
}
