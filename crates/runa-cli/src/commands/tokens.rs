use runa_compiler::lexer::token_text;

use crate::cli::Cli;

/// Print each token as `kind text (line, col)`.
pub fn run(source: &str, cli: &Cli) -> runa_compiler::Result<()> {
    let tokens = runa_compiler::lex_source(source)?;
    if cli.test {
        return Ok(());
    }
    for token in &tokens {
        let (line, col) = token.span.line_col(source);
        println!(
            "{} {:?} ({}, {})",
            token.kind.label(),
            token_text(source, token),
            line,
            col
        );
    }
    Ok(())
}
