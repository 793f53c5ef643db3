use runa_compiler::flow::dump_function;

use crate::cli::Cli;

/// Print every user function's flow graph after the `--last` pass.
pub fn run(source: &str, cli: &Cli) -> runa_compiler::Result<()> {
    let module = runa_compiler::build_until(source, &cli.last)?;
    if cli.test {
        return Ok(());
    }
    for fun in module.functions.values() {
        if fun.rt {
            continue;
        }
        print!("{}", dump_function(fun, &module.registry));
        println!();
    }
    Ok(())
}
