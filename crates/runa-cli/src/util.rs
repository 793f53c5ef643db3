use std::path::Path;

use runa_compiler::{Error, diagnostics};

/// Render a compilation failure to stderr.
///
/// Positioned diagnostics get a source excerpt; `--traceback` shows the
/// structured form instead.
pub fn report(err: &Error, source: &str, path: &Path, traceback: bool) {
    if traceback {
        eprintln!("{:?}", err);
        return;
    }
    let path_text = path.display().to_string();
    match err {
        Error::Compile(diag) => {
            eprintln!(
                "{}",
                diagnostics::render(&diag.message, diag.span, source, Some(&path_text))
            );
        }
        Error::Parse(diag) => {
            eprintln!(
                "{}",
                diagnostics::render(&diag.message, diag.span, source, Some(&path_text))
            );
        }
        other => eprintln!("error: {}", other),
    }
}
