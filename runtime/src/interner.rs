use once_cell::sync::Lazy;
use std::fmt;
use std::sync::{PoisonError, RwLock};
use string_interner::{DefaultBackend, DefaultSymbol, StringInterner};

static KEYWORDS: Lazy<RwLock<StringInterner<DefaultBackend>>> =
    Lazy::new(|| RwLock::new(StringInterner::default()));

/// A keyword symbol (`:name`) interned in the process-wide keyword table.
///
/// Two keywords with the same name are the same `Keyword`, so equality and
/// hashing are a single integer comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Keyword(DefaultSymbol);

impl Keyword {
    /// Intern `name` (without the leading colon).
    pub fn new(name: &str) -> Self {
        let mut table = KEYWORDS.write().unwrap_or_else(PoisonError::into_inner);
        Keyword(table.get_or_intern(name))
    }

    /// The keyword's name without the leading colon.
    pub fn name(&self) -> String {
        self.with_name(str::to_string)
    }

    /// Run `f` against the interned name without allocating.
    pub fn with_name<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&str) -> R,
    {
        let table = KEYWORDS.read().unwrap_or_else(PoisonError::into_inner);
        // Symbols are only minted by `Keyword::new`, so resolution cannot miss.
        f(table.resolve(self.0).unwrap_or_default())
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_name(|name| write!(f, ":{name}"))
    }
}
