//! Braid compiler front end
//!
//! One program representation for two surface syntaxes (brace blocks and
//! S-expressions), hygienic macros expanded before checking, and a gradual
//! type checker. Literal collections fold into the persistent values of
//! `braid-runtime`.

pub mod ast;
pub mod checker;
pub mod compile;
pub mod constants;
pub mod error;
pub mod lexer;
pub mod macros;
pub mod options;
pub mod parser;
pub mod types;

pub use ast::{Node, NodeId, NodeKind, NodeRef, Program, SourcePos, Syntax};
pub use checker::{RuntimeCheck, TypeChecker, TypedProgram};
pub use compile::{compile, compile_with, expand_source, parse};
pub use error::{
    CompileError, LexError, LexErrorKind, MacroError, MacroErrorReason, ParseError, TypeError,
    TypeErrorReason,
};
pub use lexer::{Lexer, Token, TokenKind, tokenize};
pub use macros::{MacroDefinition, MacroTable};
pub use options::{CompileOptions, Hygiene};
pub use types::Type;
