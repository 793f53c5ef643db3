//! Compiler diagnostics.
//!
//! Exactly two kinds of failure surface from compilation: a positioned
//! [`Diagnostic`] raised by the analysis passes, and a [`ParseDiagnostic`]
//! raised by the lexer or parser. Passes never catch their own
//! diagnostics; they propagate through `Result` to the driver, which
//! renders them with a source excerpt.

mod printer;

pub use printer::render;

/// A half-open byte range into the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn point(offset: u32) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// 1-based line and column of the span start.
    pub fn line_col(self, source: &str) -> (usize, usize) {
        let upto = &source[..(self.start as usize).min(source.len())];
        let line = upto.matches('\n').count() + 1;
        let col = upto.rsplit('\n').next().unwrap_or("").chars().count() + 1;
        (line, col)
    }
}

/// A positioned compile diagnostic: an analysis failure at a source location.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct Diagnostic {
    pub span: Span,
    pub message: String,
}

impl Diagnostic {
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
        }
    }
}

/// A structural diagnostic from the lexer or parser.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ParseDiagnostic {
    pub span: Span,
    pub message: String,
}

impl ParseDiagnostic {
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_is_one_based() {
        let src = "abc\ndef\n";
        assert_eq!(Span::new(0, 1).line_col(src), (1, 1));
        assert_eq!(Span::new(4, 5).line_col(src), (2, 1));
        assert_eq!(Span::new(6, 7).line_col(src), (2, 3));
    }

    #[test]
    fn span_join_covers_both() {
        let joined = Span::new(4, 6).to(Span::new(1, 2));
        assert_eq!(joined, Span::new(1, 6));
    }

    #[test]
    fn render_includes_excerpt() {
        let src = "def main() -> int:\n    return 1 + 'x'\n";
        let out = render("unmatched types 'int', '&str'", Span::new(30, 37), src, None);
        assert!(out.contains("unmatched types 'int', '&str'"));
        assert!(out.contains("return 1 + 'x'"));
    }
}
