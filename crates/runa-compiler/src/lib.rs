//! Runa compiler: lexer, parser, analyzer, and IR emitter.
//!
//! This crate provides the compilation pipeline for Runa source:
//! - `lexer` - tokens and indentation structure
//! - `parser` - AST construction
//! - `types` - type registry, compatibility, overload selection
//! - `flow` - lowering of statements into typed flow graphs
//! - `escape` - escape analysis over flow graphs
//! - `codegen` - textual LLVM IR emission
//! - `module` - whole-unit pipeline
//! - `diagnostics` - error reporting

pub mod ast;
pub mod codegen;
pub mod diagnostics;
pub mod escape;
pub mod flow;
pub mod lexer;
pub mod module;
pub mod parser;
pub mod types;

pub use diagnostics::{Diagnostic, ParseDiagnostic, Span};
pub use module::Module;

/// Compilation failures surfaced to the driver.
///
/// Positioned diagnostics and parse diagnostics propagate uncaught
/// from the passes that raise them; the driver renders them with a
/// source excerpt.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] Diagnostic),

    #[error(transparent)]
    Parse(#[from] ParseDiagnostic),

    #[error("{0}")]
    Codegen(String),

    #[error("unknown pass '{0}'")]
    UnknownPass(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Analysis passes in execution order, named for `--last`.
pub const PASSES: &[&str] = &["module", "flow", "escapes"];

/// The final core pass; the default for `--last`.
pub const DEFAULT_LAST_PASS: &str = "escapes";

/// Tokenize a source text.
pub fn lex_source(source: &str) -> Result<Vec<lexer::Token>> {
    Ok(lexer::lex(source)?)
}

/// Parse a source text into an AST.
pub fn parse_source(source: &str) -> Result<ast::ModuleAst> {
    let tokens = lexer::lex(source)?;
    Ok(parser::Parser::new(source, tokens).parse()?)
}

/// Run every analysis pass over a source text.
pub fn build(source: &str) -> Result<Module> {
    build_until(source, DEFAULT_LAST_PASS)
}

/// Run analysis passes up to and including `last`.
pub fn build_until(source: &str, last: &str) -> Result<Module> {
    if !PASSES.contains(&last) {
        return Err(Error::UnknownPass(last.to_string()));
    }
    let ast = parse_source(source)?;
    Module::build_until(&ast, last)
}

/// Compile a source text to textual IR.
pub fn emit_ir(source: &str) -> Result<String> {
    let module = build(source)?;
    codegen::emit(&module)
}
