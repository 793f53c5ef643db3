//! Rendering of diagnostics with a source excerpt.

use annotate_snippets::{AnnotationKind, Group, Level, Renderer, Snippet};

use super::Span;

/// Render a diagnostic message against its source.
///
/// Produces the plain (uncolored) `error:` report with the offending
/// line and a caret under the span.
pub fn render(message: &str, span: Span, source: &str, path: Option<&str>) -> String {
    let renderer = Renderer::plain();
    let range = adjust_range(span, source.len());

    let mut snippet = Snippet::source(source)
        .line_start(1)
        .annotation(AnnotationKind::Primary.span(range).label(message));
    if let Some(p) = path {
        snippet = snippet.path(p);
    }

    let report: Vec<Group> = vec![Level::ERROR.primary_title(message).element(snippet)];
    renderer.render(&report).to_string()
}

fn adjust_range(span: Span, limit: usize) -> std::ops::Range<usize> {
    let start = span.start as usize;
    let end = span.end as usize;
    if start == end {
        return start..(start + 1).min(limit);
    }
    start..end.min(limit)
}
