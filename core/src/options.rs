use serde::{Deserialize, Serialize};

/// Default bound on nested macro expansions.
pub const DEFAULT_MAX_EXPANSION_DEPTH: usize = 128;

/// Default bound on how deeply forms may nest, before and after expansion.
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 256;

/// How bindings introduced by a macro template interact with caller code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hygiene {
    /// Template binders are renamed `name#mN` per expansion, a spelling no
    /// source identifier can have.
    #[default]
    Rename,
    /// Template binders keep their names and may capture caller identifiers.
    Unhygienic,
}

/// Settings for one compilation. Missing fields take their defaults when
/// deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    pub max_expansion_depth: usize,
    pub max_nesting_depth: usize,
    pub hygiene: Hygiene,
    /// Fold literal vectors and maps into runtime values.
    pub fold_constants: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            max_expansion_depth: DEFAULT_MAX_EXPANSION_DEPTH,
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
            hygiene: Hygiene::default(),
            fold_constants: true,
        }
    }
}

impl CompileOptions {
    pub fn with_max_expansion_depth(mut self, depth: usize) -> Self {
        self.max_expansion_depth = depth;
        self
    }

    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    pub fn with_hygiene(mut self, hygiene: Hygiene) -> Self {
        self.hygiene = hygiene;
        self
    }

    pub fn with_fold_constants(mut self, fold: bool) -> Self {
        self.fold_constants = fold;
        self
    }
}
