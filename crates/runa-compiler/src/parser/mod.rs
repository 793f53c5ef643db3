//! Recursive-descent parser from the token stream to the AST.
//!
//! The token cursor owns the lexed stream; suites are delimited by the
//! `Newline`/`Indent`/`Dedent` structure the lexer synthesizes. A suite
//! is either an indented block or a single inline statement after the
//! colon. Expression parsing is precedence climbing: ternary, `or`,
//! `and`, `not`, comparison, additive, multiplicative, postfix.


use crate::ast::{
    Arg, AttribDecl, ClassDecl, CmpOp, ConstDecl, Decl, Expr, ExprKind, FunctionDecl, ImportDecl,
    MathOp, ModuleAst, Stmt, StmtKind, Suite, TraitDecl, TypeRef, TypeRefKind,
};
use crate::diagnostics::{ParseDiagnostic, Span};
use crate::lexer::{Token, TokenKind, token_text};

type PResult<T> = Result<T, ParseDiagnostic>;

pub struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
        }
    }

    pub fn parse(mut self) -> PResult<ModuleAst> {
        let mut decls = Vec::new();
        self.skip_newlines();
        while !self.at(TokenKind::Eof) {
            decls.push(self.decl()?);
            self.skip_newlines();
        }
        Ok(ModuleAst { decls })
    }

    // ─── cursor ──────────────────────────────────────────────────────

    fn peek(&self) -> Token {
        self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn nth_is(&self, n: usize, kind: TokenKind) -> bool {
        self.tokens
            .get(self.pos + n)
            .is_some_and(|t| t.kind == kind)
    }

    fn bump(&mut self) -> Token {
        let token = self.peek();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            return true;
        }
        false
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> PResult<Token> {
        if self.at(kind) {
            return Ok(self.bump());
        }
        let got = self.peek();
        Err(ParseDiagnostic::new(
            got.span,
            format!("expected {}, found {}", what, got.kind.label()),
        ))
    }

    fn text(&self, token: Token) -> &'src str {
        token_text(self.source, &token)
    }

    fn name(&mut self, what: &str) -> PResult<(String, Span)> {
        let token = self.expect(TokenKind::Name, what)?;
        Ok((self.text(token).to_string(), token.span))
    }

    fn skip_newlines(&mut self) {
        while self.eat(TokenKind::Newline) {}
    }

    // ─── declarations ────────────────────────────────────────────────

    fn decl(&mut self) -> PResult<Decl> {
        match self.peek().kind {
            TokenKind::KwDef => Ok(Decl::Function(self.function()?)),
            TokenKind::KwClass => Ok(Decl::Class(self.class()?)),
            TokenKind::KwTrait => Ok(Decl::Trait(self.trait_decl()?)),
            TokenKind::KwFrom => Ok(Decl::Import(self.import()?)),
            TokenKind::Name if self.nth_is(1, TokenKind::Assign) => {
                let (name, span) = self.name("constant name")?;
                self.bump();
                let value = self.expr()?;
                self.expect(TokenKind::Newline, "end of line")?;
                Ok(Decl::Const(ConstDecl { name, span, value }))
            }
            _ => Err(ParseDiagnostic::new(
                self.peek().span,
                "expected a declaration",
            )),
        }
    }

    fn function(&mut self) -> PResult<FunctionDecl> {
        self.expect(TokenKind::KwDef, "'def'")?;
        let (name, name_span) = self.name("function name")?;

        self.expect(TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        while !self.at(TokenKind::RParen) {
            let (arg_name, span) = self.name("argument name")?;
            let ty = if self.eat(TokenKind::Colon) {
                Some(self.typeref()?)
            } else {
                None
            };
            args.push(Arg {
                name: arg_name,
                span,
                ty,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'")?;

        let rtype = if self.eat(TokenKind::Arrow) {
            Some(self.typeref()?)
        } else {
            None
        };

        let body = self.suite()?;
        Ok(FunctionDecl {
            name,
            name_span,
            args,
            rtype,
            body,
        })
    }

    fn class(&mut self) -> PResult<ClassDecl> {
        self.expect(TokenKind::KwClass, "'class'")?;
        let (name, name_span) = self.name("class name")?;

        let mut params = Vec::new();
        if self.eat(TokenKind::LBracket) {
            loop {
                let (param, _) = self.name("type parameter")?;
                params.push(param);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RBracket, "']'")?;
        }

        self.expect(TokenKind::Colon, "':'")?;
        self.expect(TokenKind::Newline, "end of line")?;
        self.expect(TokenKind::Indent, "an indented class body")?;

        let mut attribs = Vec::new();
        let mut methods = Vec::new();
        while !self.at(TokenKind::Dedent) {
            match self.peek().kind {
                TokenKind::KwDef => methods.push(self.function()?),
                TokenKind::KwPass => {
                    self.bump();
                    self.expect(TokenKind::Newline, "end of line")?;
                }
                TokenKind::Name => {
                    let (attr_name, span) = self.name("attribute name")?;
                    self.expect(TokenKind::Colon, "':'")?;
                    let ty = self.typeref()?;
                    self.expect(TokenKind::Newline, "end of line")?;
                    attribs.push(AttribDecl {
                        name: attr_name,
                        span,
                        ty,
                    });
                }
                _ => {
                    return Err(ParseDiagnostic::new(
                        self.peek().span,
                        "expected an attribute or method",
                    ));
                }
            }
        }
        self.expect(TokenKind::Dedent, "end of class body")?;

        Ok(ClassDecl {
            name,
            name_span,
            params,
            attribs,
            methods,
        })
    }

    fn trait_decl(&mut self) -> PResult<TraitDecl> {
        self.expect(TokenKind::KwTrait, "'trait'")?;
        let (name, name_span) = self.name("trait name")?;
        self.expect(TokenKind::Colon, "':'")?;
        self.expect(TokenKind::Newline, "end of line")?;
        self.expect(TokenKind::Indent, "an indented trait body")?;

        let mut methods = Vec::new();
        while !self.at(TokenKind::Dedent) {
            if self.eat(TokenKind::KwPass) {
                self.expect(TokenKind::Newline, "end of line")?;
                continue;
            }
            methods.push(self.function()?);
        }
        self.expect(TokenKind::Dedent, "end of trait body")?;

        Ok(TraitDecl {
            name,
            name_span,
            methods,
        })
    }

    fn import(&mut self) -> PResult<ImportDecl> {
        let start = self.expect(TokenKind::KwFrom, "'from'")?;
        let (mut base, _) = self.name("module path")?;
        while self.eat(TokenKind::Dot) {
            let (part, _) = self.name("module path")?;
            base.push('.');
            base.push_str(&part);
        }
        self.expect(TokenKind::KwImport, "'import'")?;
        let mut names = Vec::new();
        loop {
            let (name, _) = self.name("imported name")?;
            names.push(name);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(TokenKind::Newline, "end of line")?;
        Ok(ImportDecl {
            base,
            names,
            span: start.span.to(end.span),
        })
    }

    // ─── statements ──────────────────────────────────────────────────

    fn suite(&mut self) -> PResult<Suite> {
        self.expect(TokenKind::Colon, "':'")?;
        if self.eat(TokenKind::Newline) {
            self.expect(TokenKind::Indent, "an indented suite")?;
            let mut stmts = Vec::new();
            while !self.at(TokenKind::Dedent) {
                stmts.push(self.stmt()?);
            }
            self.expect(TokenKind::Dedent, "end of suite")?;
            return Ok(Suite { stmts });
        }
        // Inline suite: a single simple statement on the same line.
        let stmt = self.simple_stmt()?;
        Ok(Suite { stmts: vec![stmt] })
    }

    fn stmt(&mut self) -> PResult<Stmt> {
        match self.peek().kind {
            TokenKind::KwIf => self.if_stmt(),
            TokenKind::KwWhile => self.while_stmt(),
            TokenKind::KwFor => self.for_stmt(),
            _ => self.simple_stmt(),
        }
    }

    fn simple_stmt(&mut self) -> PResult<Stmt> {
        let start = self.peek().span;
        match self.peek().kind {
            TokenKind::KwReturn => {
                self.bump();
                let value = if self.at(TokenKind::Newline) {
                    None
                } else {
                    Some(self.expr()?)
                };
                let end = self.expect(TokenKind::Newline, "end of line")?;
                Ok(Stmt {
                    span: start.to(end.span),
                    kind: StmtKind::Return(value),
                })
            }
            TokenKind::KwYield => {
                self.bump();
                let value = self.expr()?;
                let end = self.expect(TokenKind::Newline, "end of line")?;
                Ok(Stmt {
                    span: start.to(end.span),
                    kind: StmtKind::Yield(value),
                })
            }
            TokenKind::KwRaise => {
                self.bump();
                let value = self.expr()?;
                let end = self.expect(TokenKind::Newline, "end of line")?;
                Ok(Stmt {
                    span: start.to(end.span),
                    kind: StmtKind::Raise(value),
                })
            }
            TokenKind::KwPass => {
                self.bump();
                let end = self.expect(TokenKind::Newline, "end of line")?;
                Ok(Stmt {
                    span: start.to(end.span),
                    kind: StmtKind::Pass,
                })
            }
            _ => {
                let expr = self.expr()?;
                if self.eat(TokenKind::Assign) {
                    match expr.kind {
                        ExprKind::Name(_) | ExprKind::Attr { .. } => {}
                        _ => {
                            return Err(ParseDiagnostic::new(
                                expr.span,
                                "cannot assign to this expression",
                            ));
                        }
                    }
                    let value = self.expr()?;
                    let end = self.expect(TokenKind::Newline, "end of line")?;
                    return Ok(Stmt {
                        span: start.to(end.span),
                        kind: StmtKind::Assign {
                            target: expr,
                            value,
                        },
                    });
                }
                let end = self.expect(TokenKind::Newline, "end of line")?;
                Ok(Stmt {
                    span: start.to(end.span),
                    kind: StmtKind::Expr(expr),
                })
            }
        }
    }

    fn if_stmt(&mut self) -> PResult<Stmt> {
        let start = self.expect(TokenKind::KwIf, "'if'")?;
        let mut arms = Vec::new();
        let cond = self.expr()?;
        let body = self.suite()?;
        let mut end = start.span;
        if let Some(last) = body.stmts.last() {
            end = last.span;
        }
        arms.push((Some(cond), body));

        while self.at(TokenKind::KwElif) {
            self.bump();
            let cond = self.expr()?;
            let body = self.suite()?;
            if let Some(last) = body.stmts.last() {
                end = last.span;
            }
            arms.push((Some(cond), body));
        }
        if self.eat(TokenKind::KwElse) {
            let body = self.suite()?;
            if let Some(last) = body.stmts.last() {
                end = last.span;
            }
            arms.push((None, body));
        }

        Ok(Stmt {
            span: start.span.to(end),
            kind: StmtKind::If { arms },
        })
    }

    fn while_stmt(&mut self) -> PResult<Stmt> {
        let start = self.expect(TokenKind::KwWhile, "'while'")?;
        let cond = self.expr()?;
        let body = self.suite()?;
        let end = body.stmts.last().map(|s| s.span).unwrap_or(start.span);
        Ok(Stmt {
            span: start.span.to(end),
            kind: StmtKind::While { cond, body },
        })
    }

    fn for_stmt(&mut self) -> PResult<Stmt> {
        let start = self.expect(TokenKind::KwFor, "'for'")?;
        let (var, var_span) = self.name("loop variable")?;
        self.expect(TokenKind::KwIn, "'in'")?;
        let source = self.expr()?;
        let body = self.suite()?;
        let end = body.stmts.last().map(|s| s.span).unwrap_or(start.span);
        Ok(Stmt {
            span: start.span.to(end),
            kind: StmtKind::For {
                var,
                var_span,
                source,
                body,
            },
        })
    }

    // ─── expressions ─────────────────────────────────────────────────

    fn expr(&mut self) -> PResult<Expr> {
        self.ternary()
    }

    fn ternary(&mut self) -> PResult<Expr> {
        let then = self.or_expr()?;
        if !self.eat(TokenKind::KwIf) {
            return Ok(then);
        }
        let cond = self.or_expr()?;
        self.expect(TokenKind::KwElse, "'else'")?;
        let els = self.ternary()?;
        let span = then.span.to(els.span);
        Ok(Expr {
            span,
            kind: ExprKind::Ternary {
                cond: Box::new(cond),
                then: Box::new(then),
                els: Box::new(els),
            },
        })
    }

    fn or_expr(&mut self) -> PResult<Expr> {
        let mut left = self.and_expr()?;
        while self.eat(TokenKind::KwOr) {
            let right = self.and_expr()?;
            let span = left.span.to(right.span);
            left = Expr {
                span,
                kind: ExprKind::Or {
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> PResult<Expr> {
        let mut left = self.not_expr()?;
        while self.eat(TokenKind::KwAnd) {
            let right = self.not_expr()?;
            let span = left.span.to(right.span);
            left = Expr {
                span,
                kind: ExprKind::And {
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> PResult<Expr> {
        if self.at(TokenKind::KwNot) {
            let start = self.bump();
            let value = self.not_expr()?;
            let span = start.span.to(value.span);
            return Ok(Expr {
                span,
                kind: ExprKind::Not {
                    value: Box::new(value),
                },
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> PResult<Expr> {
        let left = self.sum()?;
        let op = match self.peek().kind {
            TokenKind::EqEq => CmpOp::Eq,
            TokenKind::BangEq => CmpOp::Ne,
            TokenKind::Lt => CmpOp::Lt,
            TokenKind::Gt => CmpOp::Gt,
            _ => return Ok(left),
        };
        self.bump();
        let right = self.sum()?;
        let span = left.span.to(right.span);
        Ok(Expr {
            span,
            kind: ExprKind::Compare {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        })
    }

    fn sum(&mut self) -> PResult<Expr> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => MathOp::Add,
                TokenKind::Minus => MathOp::Sub,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.term()?;
            let span = left.span.to(right.span);
            left = Expr {
                span,
                kind: ExprKind::Math {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }
    }

    fn term(&mut self) -> PResult<Expr> {
        let mut left = self.postfix()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => MathOp::Mul,
                TokenKind::Slash => MathOp::Div,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.postfix()?;
            let span = left.span.to(right.span);
            left = Expr {
                span,
                kind: ExprKind::Math {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }
    }

    fn postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.atom()?;
        loop {
            if self.eat(TokenKind::LParen) {
                let mut args = Vec::new();
                while !self.at(TokenKind::RParen) {
                    args.push(self.expr()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                let end = self.expect(TokenKind::RParen, "')'")?;
                let span = expr.span.to(end.span);
                expr = Expr {
                    span,
                    kind: ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                };
            } else if self.eat(TokenKind::Dot) {
                let (attr, attr_span) = self.name("attribute name")?;
                let span = expr.span.to(attr_span);
                expr = Expr {
                    span,
                    kind: ExprKind::Attr {
                        obj: Box::new(expr),
                        attr,
                    },
                };
            } else if self.eat(TokenKind::LBracket) {
                let key = self.expr()?;
                let end = self.expect(TokenKind::RBracket, "']'")?;
                let span = expr.span.to(end.span);
                expr = Expr {
                    span,
                    kind: ExprKind::Index {
                        obj: Box::new(expr),
                        key: Box::new(key),
                    },
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn atom(&mut self) -> PResult<Expr> {
        let token = self.peek();
        match token.kind {
            TokenKind::Name => {
                self.bump();
                Ok(Expr {
                    span: token.span,
                    kind: ExprKind::Name(self.text(token).to_string()),
                })
            }
            TokenKind::Int => {
                self.bump();
                let value: i64 = self.text(token).parse().map_err(|_| {
                    ParseDiagnostic::new(token.span, "integer literal out of range")
                })?;
                Ok(Expr {
                    span: token.span,
                    kind: ExprKind::Int(value),
                })
            }
            TokenKind::Float => {
                self.bump();
                let value: f64 = self
                    .text(token)
                    .parse()
                    .map_err(|_| ParseDiagnostic::new(token.span, "malformed float literal"))?;
                Ok(Expr {
                    span: token.span,
                    kind: ExprKind::Float(value),
                })
            }
            TokenKind::Str => {
                self.bump();
                let text = self.text(token);
                Ok(Expr {
                    span: token.span,
                    kind: ExprKind::Str(text[1..text.len() - 1].to_string()),
                })
            }
            TokenKind::KwTrue => {
                self.bump();
                Ok(Expr {
                    span: token.span,
                    kind: ExprKind::Bool(true),
                })
            }
            TokenKind::KwFalse => {
                self.bump();
                Ok(Expr {
                    span: token.span,
                    kind: ExprKind::Bool(false),
                })
            }
            TokenKind::LParen => {
                self.bump();
                let inner = self.expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            _ => Err(ParseDiagnostic::new(
                token.span,
                format!("expected an expression, found {}", token.kind.label()),
            )),
        }
    }

    // ─── type references ─────────────────────────────────────────────

    fn typeref(&mut self) -> PResult<TypeRef> {
        let token = self.peek();
        if self.eat(TokenKind::Dollar) {
            let inner = self.typeref()?;
            let span = token.span.to(inner.span);
            return Ok(TypeRef {
                span,
                kind: TypeRefKind::Owner(Box::new(inner)),
            });
        }
        if self.eat(TokenKind::Amp) {
            let inner = self.typeref()?;
            let span = token.span.to(inner.span);
            return Ok(TypeRef {
                span,
                kind: TypeRefKind::Ref(Box::new(inner)),
            });
        }

        let (name, name_span) = self.name("type name")?;
        let mut ty = if self.eat(TokenKind::LBracket) {
            let mut args = Vec::new();
            loop {
                args.push(self.typeref()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            let end = self.expect(TokenKind::RBracket, "']'")?;
            TypeRef {
                span: name_span.to(end.span),
                kind: TypeRefKind::Elem { name, args },
            }
        } else {
            TypeRef {
                span: name_span,
                kind: TypeRefKind::Name(name),
            }
        };

        while self.at(TokenKind::Question) {
            let end = self.bump();
            let span = ty.span.to(end.span);
            ty = TypeRef {
                span,
                kind: TypeRefKind::Opt(Box::new(ty)),
            };
        }
        Ok(ty)
    }
}
