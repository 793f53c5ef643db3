use std::path::Path;
use std::process::Command;

use crate::cli::Cli;

/// The C runtime linked into every compiled binary.
const RUNTIME: &str = include_str!("../../runtime/runa.c");

/// Compile a source file to a binary named after its stem.
pub fn run(source: &str, file: &Path, _cli: &Cli) -> runa_compiler::Result<()> {
    let ir = runa_compiler::emit_ir(source)?;

    let stem = file
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.strip_suffix(".rns").unwrap_or(n))
        .unwrap_or("a.out")
        .to_string();

    let staging = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(err) => {
            eprintln!("error: cannot create staging directory: {}", err);
            std::process::exit(1);
        }
    };
    let ll_path = staging.path().join("out.ll");
    let rt_path = staging.path().join("runa.c");
    if let Err(err) = std::fs::write(&ll_path, &ir).and_then(|()| std::fs::write(&rt_path, RUNTIME))
    {
        eprintln!("error: cannot stage build inputs: {}", err);
        std::process::exit(1);
    }

    let status = Command::new("clang")
        .arg("-Wno-override-module")
        .arg("-std=gnu99")
        .arg(&ll_path)
        .arg(&rt_path)
        .arg("-o")
        .arg(&stem)
        .status();
    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => {
            eprintln!("error: clang exited with {}", status);
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("error: cannot run clang: {}", err);
            std::process::exit(1);
        }
    }
}
