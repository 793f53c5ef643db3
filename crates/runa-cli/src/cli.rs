use std::path::PathBuf;

use clap::Parser;

/// The Runa compiler. A command takes a single file as an argument.
#[derive(Parser)]
#[command(name = "runac", bin_name = "runac")]
#[command(about = "Ahead-of-time compiler for the Runa language")]
pub struct Cli {
    /// Last pass whose output `show` prints
    #[arg(long, value_name = "PASS", default_value = runa_compiler::DEFAULT_LAST_PASS)]
    pub last: String,

    /// Suppress stdout
    #[arg(long)]
    pub test: bool,

    /// Show the structured diagnostic instead of pretty-printing
    #[arg(long)]
    pub traceback: bool,

    /// Command to run (any unique prefix works)
    pub command: Option<String>,

    /// Source file (.rns)
    pub file: Option<PathBuf>,
}
