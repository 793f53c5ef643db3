use crate::cli::Cli;

/// Print the syntax tree for a source file.
pub fn run(source: &str, cli: &Cli) -> runa_compiler::Result<()> {
    let ast = runa_compiler::parse_source(source)?;
    if !cli.test {
        println!("{:#?}", ast);
    }
    Ok(())
}
