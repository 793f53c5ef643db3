//! Abstract syntax tree for Runa modules.
//!
//! Statement and expression kinds are closed tagged unions; every
//! consumer matches exhaustively, so adding a node kind refuses to
//! compile until each pass handles it. Every node carries the byte span
//! it was parsed from for diagnostics.

use crate::diagnostics::Span;

/// A parsed compilation unit: the ordered top-level declarations.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleAst {
    pub decls: Vec<Decl>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Function(FunctionDecl),
    Class(ClassDecl),
    Trait(TraitDecl),
    Const(ConstDecl),
    Import(ImportDecl),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub name_span: Span,
    pub args: Vec<Arg>,
    pub rtype: Option<TypeRef>,
    pub body: Suite,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub name: String,
    pub span: Span,
    /// Absent only for a method receiver (`self`).
    pub ty: Option<TypeRef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub name_span: Span,
    /// Template parameter names, e.g. `class List[T]`.
    pub params: Vec<String>,
    pub attribs: Vec<AttribDecl>,
    pub methods: Vec<FunctionDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttribDecl {
    pub name: String,
    pub span: Span,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraitDecl {
    pub name: String,
    pub name_span: Span,
    pub methods: Vec<FunctionDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstDecl {
    pub name: String,
    pub span: Span,
    pub value: Expr,
}

/// `from a.b import c, d`; names resolve to `a.b.c` and `a.b.d`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub base: String,
    pub names: Vec<String>,
    pub span: Span,
}

/// A reference to a type in source position.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRef {
    pub span: Span,
    pub kind: TypeRefKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeRefKind {
    Name(String),
    Owner(Box<TypeRef>),
    Ref(Box<TypeRef>),
    Opt(Box<TypeRef>),
    /// Template application `Name[T, ...]`.
    Elem { name: String, args: Vec<TypeRef> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Suite {
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub span: Span,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    Assign { target: Expr, value: Expr },
    Return(Option<Expr>),
    Yield(Expr),
    Raise(Expr),
    Pass,
    /// `if`/`elif` arms carry a condition; a trailing `else` arm has none.
    If { arms: Vec<(Option<Expr>, Suite)> },
    While { cond: Expr, body: Suite },
    For { var: String, var_span: Span, source: Expr, body: Suite },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl MathOp {
    pub fn name(self) -> &'static str {
        match self {
            MathOp::Add => "add",
            MathOp::Sub => "sub",
            MathOp::Mul => "mul",
            MathOp::Div => "div",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
}

impl CmpOp {
    pub fn name(self) -> &'static str {
        match self {
            CmpOp::Eq => "eq",
            CmpOp::Ne => "ne",
            CmpOp::Lt => "lt",
            CmpOp::Gt => "gt",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    Attr { obj: Box<Expr>, attr: String },
    Index { obj: Box<Expr>, key: Box<Expr> },
    Call { callee: Box<Expr>, args: Vec<Expr> },
    Math { op: MathOp, left: Box<Expr>, right: Box<Expr> },
    Compare { op: CmpOp, left: Box<Expr>, right: Box<Expr> },
    Not { value: Box<Expr> },
    And { left: Box<Expr>, right: Box<Expr> },
    Or { left: Box<Expr>, right: Box<Expr> },
    Ternary { cond: Box<Expr>, then: Box<Expr>, els: Box<Expr> },
}
