mod cli;
mod commands;
mod util;

use clap::Parser;

use cli::Cli;

fn main() {
    let cli = Cli::parse();

    let (Some(command), Some(file)) = (cli.command.clone(), cli.file.clone()) else {
        commands::print_summary();
        std::process::exit(1);
    };

    let resolved = match commands::find(&command) {
        Ok(name) => name,
        Err(message) => {
            eprintln!("{}", message);
            std::process::exit(1);
        }
    };

    let source = match std::fs::read_to_string(&file) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: cannot read {}: {}", file.display(), err);
            std::process::exit(1);
        }
    };

    let result = match resolved {
        "tokens" => commands::tokens::run(&source, &cli),
        "parse" => commands::parse::run(&source, &cli),
        "show" => commands::show::run(&source, &cli),
        "generate" => commands::generate::run(&source, &cli),
        "compile" => commands::compile::run(&source, &file, &cli),
        _ => unreachable!("find only returns known commands"),
    };

    if let Err(err) = result {
        util::report(&err, &source, &file, cli.traceback);
        std::process::exit(1);
    }
}
