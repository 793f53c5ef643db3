use crate::cli::Cli;

/// Print the textual IR for a source file.
pub fn run(source: &str, cli: &Cli) -> runa_compiler::Result<()> {
    let ir = runa_compiler::emit_ir(source)?;
    if !cli.test {
        print!("{}", ir);
    }
    Ok(())
}
