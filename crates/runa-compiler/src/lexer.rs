//! Lexer for Runa source.
//!
//! Logos recognizes the raw tokens; a post-pass turns newline runs and
//! their trailing indentation into `Newline`/`Indent`/`Dedent` structure
//! tokens and classifies keywords and word operators. Tokens are
//! span-based; text is sliced from the source only when needed.

use logos::Logos;

use crate::diagnostics::{ParseDiagnostic, Span};

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t]+")]
#[logos(skip(r"#[^\n]*", allow_greedy = true))]
enum RawToken {
    // A newline plus the indentation of the following line.
    #[regex(r"\n[ \t]*")]
    Newline,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Name,

    #[regex(r"[0-9]+\.[0-9]+")]
    Float,

    #[regex(r"[0-9]+")]
    Int,

    #[regex(r"'[^'\n]*'")]
    #[regex(r#""[^"\n]*""#)]
    Str,

    #[token("->")]
    Arrow,
    #[token("==")]
    EqEq,
    #[token("!=")]
    BangEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token(",")]
    Comma,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(":")]
    Colon,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("+")]
    Plus,
    #[token("=")]
    Assign,
    #[token("*")]
    Star,
    #[token("-")]
    Minus,
    #[token("/")]
    Slash,
    #[token(".")]
    Dot,
    #[token("?")]
    Question,
    #[token("$")]
    Dollar,
    #[token("&")]
    Amp,
}

/// Token kinds after keyword classification and indentation synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Name,
    Int,
    Float,
    Str,

    KwDef,
    KwReturn,
    KwIf,
    KwElif,
    KwElse,
    KwWhile,
    KwFor,
    KwIn,
    KwYield,
    KwRaise,
    KwPass,
    KwClass,
    KwTrait,
    KwFrom,
    KwImport,
    KwNot,
    KwAnd,
    KwOr,
    KwTrue,
    KwFalse,

    Arrow,
    EqEq,
    BangEq,
    Lt,
    Gt,
    Comma,
    LBracket,
    RBracket,
    Colon,
    LParen,
    RParen,
    Plus,
    Assign,
    Star,
    Minus,
    Slash,
    Dot,
    Question,
    Dollar,
    Amp,

    Newline,
    Indent,
    Dedent,
    Eof,
}

impl TokenKind {
    /// Token category name for the `tokens` driver command.
    pub fn label(self) -> &'static str {
        use TokenKind::*;
        match self {
            Name => "name",
            Int | Float => "num",
            Str => "str",
            KwDef | KwReturn | KwIf | KwElif | KwElse | KwWhile | KwFor | KwYield | KwRaise
            | KwPass | KwClass | KwTrait | KwFrom | KwImport | KwTrue | KwFalse => "kw",
            KwIn | KwNot | KwAnd | KwOr | Arrow | EqEq | BangEq | Lt | Gt | Comma | LBracket
            | RBracket | Colon | LParen | RParen | Plus | Assign | Star | Minus | Slash | Dot
            | Question | Dollar | Amp => "op",
            Newline => "nl",
            Indent => "indent",
            Dedent => "dedent",
            Eof => "end",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// The text slice for a token. O(1) slice into source.
#[inline]
pub fn token_text<'src>(source: &'src str, token: &Token) -> &'src str {
    &source[token.span.start as usize..token.span.end as usize]
}

fn classify_name(text: &str) -> TokenKind {
    match text {
        "def" => TokenKind::KwDef,
        "return" => TokenKind::KwReturn,
        "if" => TokenKind::KwIf,
        "elif" => TokenKind::KwElif,
        "else" => TokenKind::KwElse,
        "while" => TokenKind::KwWhile,
        "for" => TokenKind::KwFor,
        "in" => TokenKind::KwIn,
        "yield" => TokenKind::KwYield,
        "raise" => TokenKind::KwRaise,
        "pass" => TokenKind::KwPass,
        "class" => TokenKind::KwClass,
        "trait" => TokenKind::KwTrait,
        "from" => TokenKind::KwFrom,
        "import" => TokenKind::KwImport,
        "not" => TokenKind::KwNot,
        "and" => TokenKind::KwAnd,
        "or" => TokenKind::KwOr,
        "True" => TokenKind::KwTrue,
        "False" => TokenKind::KwFalse,
        _ => TokenKind::Name,
    }
}

fn plain_kind(raw: RawToken) -> TokenKind {
    match raw {
        RawToken::Newline | RawToken::Name => unreachable!("handled by caller"),
        RawToken::Float => TokenKind::Float,
        RawToken::Int => TokenKind::Int,
        RawToken::Str => TokenKind::Str,
        RawToken::Arrow => TokenKind::Arrow,
        RawToken::EqEq => TokenKind::EqEq,
        RawToken::BangEq => TokenKind::BangEq,
        RawToken::Lt => TokenKind::Lt,
        RawToken::Gt => TokenKind::Gt,
        RawToken::Comma => TokenKind::Comma,
        RawToken::LBracket => TokenKind::LBracket,
        RawToken::RBracket => TokenKind::RBracket,
        RawToken::Colon => TokenKind::Colon,
        RawToken::LParen => TokenKind::LParen,
        RawToken::RParen => TokenKind::RParen,
        RawToken::Plus => TokenKind::Plus,
        RawToken::Assign => TokenKind::Assign,
        RawToken::Star => TokenKind::Star,
        RawToken::Minus => TokenKind::Minus,
        RawToken::Slash => TokenKind::Slash,
        RawToken::Dot => TokenKind::Dot,
        RawToken::Question => TokenKind::Question,
        RawToken::Dollar => TokenKind::Dollar,
        RawToken::Amp => TokenKind::Amp,
    }
}

/// Tokenize source, synthesizing `Newline`/`Indent`/`Dedent` structure.
///
/// Blank lines and comment-only lines do not produce `Newline` tokens.
/// Indentation must nest: a dedent has to return to a previously seen
/// level. The stream always ends with dedents back to column zero and a
/// final `Eof` token.
pub fn lex(source: &str) -> Result<Vec<Token>, ParseDiagnostic> {
    let mut tokens = Vec::new();
    // Stack of active indentation widths; bottom is always 0.
    let mut levels: Vec<u32> = vec![0];
    // Newline run waiting for the next significant token.
    let mut pending: Option<(Span, u32)> = None;
    let mut seen_any = false;

    let mut lexer = RawToken::lexer(source);
    while let Some(item) = lexer.next() {
        let span = Span::new(lexer.span().start as u32, lexer.span().end as u32);
        let raw = match item {
            Ok(raw) => raw,
            Err(()) => {
                let text = lexer.slice();
                return Err(ParseDiagnostic::new(
                    span,
                    format!("unexpected character {:?}", text),
                ));
            }
        };

        if raw == RawToken::Newline {
            let width = (span.end - span.start) - 1;
            // Consecutive newlines collapse; the last line's indent wins.
            pending = Some((Span::new(span.start, span.start + 1), width));
            continue;
        }

        if let Some((nl_span, width)) = pending.take() {
            tokens.push(Token::new(TokenKind::Newline, nl_span));
            adjust_indent(&mut tokens, &mut levels, width, nl_span)?;
        }

        seen_any = true;
        let kind = match raw {
            RawToken::Name => classify_name(lexer.slice()),
            other => plain_kind(other),
        };
        tokens.push(Token::new(kind, span));
    }

    let end = Span::point(source.len() as u32);
    if seen_any {
        tokens.push(Token::new(TokenKind::Newline, end));
    }
    while levels.len() > 1 {
        levels.pop();
        tokens.push(Token::new(TokenKind::Dedent, end));
    }
    tokens.push(Token::new(TokenKind::Eof, end));
    Ok(tokens)
}

fn adjust_indent(
    tokens: &mut Vec<Token>,
    levels: &mut Vec<u32>,
    width: u32,
    at: Span,
) -> Result<(), ParseDiagnostic> {
    let current = *levels.last().unwrap_or(&0);
    if width > current {
        levels.push(width);
        tokens.push(Token::new(TokenKind::Indent, at));
        return Ok(());
    }
    while width < *levels.last().unwrap_or(&0) {
        levels.pop();
        tokens.push(Token::new(TokenKind::Dedent, at));
    }
    if width != *levels.last().unwrap_or(&0) {
        return Err(ParseDiagnostic::new(at, "inconsistent indentation"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).expect("lex").iter().map(|t| t.kind).collect()
    }

    #[test]
    fn flat_statement() {
        use TokenKind::*;
        assert_eq!(
            kinds("x = 1\n"),
            vec![Name, Assign, Int, Newline, Eof],
        );
    }

    #[test]
    fn indent_and_dedent_pair_up() {
        use TokenKind::*;
        let src = "def f():\n    return 1\n";
        assert_eq!(
            kinds(src),
            vec![
                KwDef, Name, LParen, RParen, Colon, Newline, Indent, KwReturn, Int, Newline,
                Dedent, Eof,
            ],
        );
    }

    #[test]
    fn blank_lines_do_not_emit_newlines() {
        use TokenKind::*;
        let src = "x = 1\n\n\ny = 2\n";
        assert_eq!(
            kinds(src),
            vec![Name, Assign, Int, Newline, Name, Assign, Int, Newline, Eof],
        );
    }

    #[test]
    fn comments_are_skipped() {
        use TokenKind::*;
        let src = "x = 1  # bind x\n# a full-line comment\ny = 2\n";
        assert_eq!(
            kinds(src),
            vec![Name, Assign, Int, Newline, Name, Assign, Int, Newline, Eof],
        );
    }

    #[test]
    fn nested_suites_dedent_in_order() {
        use TokenKind::*;
        let src = "def f():\n    if x:\n        return 1\n    return 2\n";
        assert_eq!(
            kinds(src),
            vec![
                KwDef, Name, LParen, RParen, Colon, Newline, Indent, KwIf, Name, Colon, Newline,
                Indent, KwReturn, Int, Newline, Dedent, KwReturn, Int, Newline, Dedent, Eof,
            ],
        );
    }

    #[test]
    fn keywords_and_word_operators_classify() {
        use TokenKind::*;
        assert_eq!(
            kinds("a and not b or True\n"),
            vec![Name, KwAnd, KwNot, Name, KwOr, KwTrue, Newline, Eof],
        );
    }

    #[test]
    fn inconsistent_dedent_is_rejected() {
        let src = "def f():\n    if x:\n        return 1\n  return 2\n";
        let err = lex(src).unwrap_err();
        assert_eq!(err.message, "inconsistent indentation");
    }

    #[test]
    fn unexpected_character_is_rejected() {
        let err = lex("x = 1 @ 2\n").unwrap_err();
        assert!(err.message.contains("unexpected character"));
    }

    #[test]
    fn string_quotes_both_work() {
        let src = "s = 'hi'\nt = \"yo\"\n";
        let tokens = lex(src).expect("lex");
        let strs: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Str)
            .map(|t| token_text(src, t))
            .collect();
        assert_eq!(strs, vec!["'hi'", "\"yo\""]);
    }
}
