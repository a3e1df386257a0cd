//! Pipeline entry points: lex, parse, expand, check, fold.
//!
//! Each phase either succeeds completely or stops the pipeline with the
//! first error it meets.

use crate::ast::Program;
use crate::checker::{TypedProgram, check_program};
use crate::constants::fold_constants;
use crate::error::CompileError;
use crate::lexer::tokenize;
use crate::macros::{MacroTable, expand};
use crate::options::CompileOptions;
use crate::parser;

/// Lex and parse without expanding macros.
pub fn parse(src: &str) -> Result<Program, CompileError> {
    let tokens = tokenize(src)?;
    Ok(parser::parse(tokens)?)
}

/// Parse and expand macros, stopping before type checking.
pub fn expand_source(
    src: &str,
    options: &CompileOptions,
) -> Result<(Program, MacroTable), CompileError> {
    let tokens = tokenize(src)?;
    let program = parser::parse_with_max_depth(tokens, options.max_nesting_depth)?;
    Ok(expand(program, options)?)
}

/// Compile with default options.
pub fn compile(src: &str) -> Result<TypedProgram, CompileError> {
    compile_with(src, &CompileOptions::default())
}

pub fn compile_with(src: &str, options: &CompileOptions) -> Result<TypedProgram, CompileError> {
    let span = tracing::debug_span!("compile", bytes = src.len());
    let _entered = span.enter();

    let (program, macros) = expand_source(src, options)?;
    let mut typed = check_program(program, macros)?;
    if options.fold_constants {
        typed.constants = fold_constants(&typed.program.root);
    }
    Ok(typed)
}
