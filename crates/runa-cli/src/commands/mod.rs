//! Driver subcommands, resolved by unique prefix.

pub mod compile;
pub mod generate;
pub mod parse;
pub mod show;
pub mod tokens;

pub const COMMANDS: &[(&str, &str)] = &[
    ("compile", "Compile the given program to a binary of the same name"),
    ("generate", "Print LLVM IR as generated by the code generation process"),
    ("parse", "Print the syntax tree resulting from parsing the source"),
    ("show", "Print flow graphs after processing the pass specified by --last"),
    ("tokens", "Print a list of tokens and location info"),
];

/// Resolve a command name or any unique prefix of one.
pub fn find(cmd: &str) -> Result<&'static str, String> {
    if let Some((name, _)) = COMMANDS.iter().find(|(name, _)| *name == cmd) {
        return Ok(name);
    }
    let matched: Vec<&'static str> = COMMANDS
        .iter()
        .map(|(name, _)| *name)
        .filter(|name| name.starts_with(cmd))
        .collect();
    match matched.len() {
        1 => Ok(matched[0]),
        0 => Err(format!("no command found: '{}'", cmd)),
        _ => Err(format!("ambiguous command: '{}'", cmd)),
    }
}

pub fn print_summary() {
    println!("The Runa compiler. A command takes a single file as an argument.");
    println!();
    println!("Commands:");
    println!();
    for (name, help) in COMMANDS {
        println!("{}: {}", name, help);
    }
    println!();
    println!("Any unique command abbreviation will also work.");
}

#[cfg(test)]
mod tests {
    use super::find;

    #[test]
    fn exact_names_resolve() {
        assert_eq!(find("compile"), Ok("compile"));
        assert_eq!(find("tokens"), Ok("tokens"));
    }

    #[test]
    fn unique_prefixes_resolve() {
        assert_eq!(find("t"), Ok("tokens"));
        assert_eq!(find("g"), Ok("generate"));
        assert_eq!(find("p"), Ok("parse"));
        assert_eq!(find("s"), Ok("show"));
        assert_eq!(find("co"), Ok("compile"));
    }

    #[test]
    fn ambiguous_prefixes_are_rejected() {
        // Every command is a "match" for the empty prefix.
        assert_eq!(find(""), Err("ambiguous command: ''".to_string()));
    }

    #[test]
    fn unknown_commands_are_rejected() {
        assert_eq!(find("link"), Err("no command found: 'link'".to_string()));
    }
}
