//! Compile-time error taxonomy.
//!
//! Each phase fails with its own error type and stops the pipeline; none of
//! them aggregate. Every error carries the source position and the surface
//! syntax of the form that failed, and leaves formatting to the caller.

use serde::Serialize;
use thiserror::Error;

use crate::ast::{SourcePos, Syntax};

// ============================================================================
// Lexing
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Error)]
pub enum LexErrorKind {
    #[error("unterminated string")]
    UnterminatedString,
    #[error("unknown character")]
    UnknownCharacter,
    #[error("invalid escape sequence")]
    InvalidEscape,
    #[error("invalid number")]
    InvalidNumber,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{pos}: {kind} `{input}`")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub pos: SourcePos,
    pub syntax: Syntax,
    /// The offending input text.
    pub input: String,
}

// ============================================================================
// Parsing
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{pos}: expected one of {}, found {found} ({syntax})", .expected_one_of.join(", "))]
pub struct ParseError {
    pub pos: SourcePos,
    pub syntax: Syntax,
    pub expected_one_of: Vec<String>,
    pub found: String,
}

// ============================================================================
// Macro Expansion
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
pub enum MacroErrorReason {
    #[error("undefined macro")]
    UndefinedMacro,
    #[error("expected {expected} arguments, found {found}")]
    ArityMismatch { expected: usize, found: usize },
    #[error("expansion did not terminate within {depth} levels")]
    ExpansionDidNotTerminate { depth: usize },
    #[error("expansion nests deeper than {limit} levels")]
    NestingTooDeep { limit: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{pos}: macro `{name}!`: {reason}")]
pub struct MacroError {
    pub name: String,
    pub reason: MacroErrorReason,
    pub pos: SourcePos,
    pub syntax: Syntax,
}

// ============================================================================
// Type Checking
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Error)]
pub enum TypeErrorReason {
    #[error("type mismatch")]
    Mismatch,
    #[error("wrong number of arguments")]
    Arity,
    #[error("not callable")]
    NotCallable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{pos}: {reason} in {context}: expected {expected}, found {found}")]
pub struct TypeError {
    pub reason: TypeErrorReason,
    pub expected: String,
    pub found: String,
    /// What was being checked, e.g. "argument 1 of `add`".
    pub context: String,
    pub pos: SourcePos,
    pub syntax: Syntax,
}

// ============================================================================
// Pipeline
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
pub enum CompileError {
    #[error("lex error: {0}")]
    Lex(#[from] LexError),
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("macro error: {0}")]
    Macro(#[from] MacroError),
    #[error("type error: {0}")]
    Type(#[from] TypeError),
}

impl CompileError {
    pub fn pos(&self) -> SourcePos {
        match self {
            CompileError::Lex(e) => e.pos,
            CompileError::Parse(e) => e.pos,
            CompileError::Macro(e) => e.pos,
            CompileError::Type(e) => e.pos,
        }
    }

    pub fn syntax(&self) -> Syntax {
        match self {
            CompileError::Lex(e) => e.syntax,
            CompileError::Parse(e) => e.syntax,
            CompileError::Macro(e) => e.syntax,
            CompileError::Type(e) => e.syntax,
        }
    }
}
