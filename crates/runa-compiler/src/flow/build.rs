//! Lowering of one function body into a typed control-flow graph.
//!
//! Expressions visit to typed [`Value`] trees; statements push steps
//! into the current block and carve new blocks for structured control
//! flow. Name resolution walks the current block's predecessors; the
//! entry block is seeded with the function's arguments and the module
//! constants.

use indexmap::IndexMap;

use crate::ast::{self, Expr, ExprKind, StmtKind, Suite};
use crate::diagnostics::{Diagnostic, Span};
use crate::module::{Constant, FunctionDef};
use crate::types::{FunctionSig, TypeId, TypeKind, TypeRegistry};

use super::cfg::{Block, BlockId, FlowGraph, Literal, PENDING, Step, Value};

pub struct FlowBuilder<'m> {
    registry: &'m mut TypeRegistry,
    functions: &'m IndexMap<String, FunctionDef>,
    constants: &'m IndexMap<String, Constant>,
    graph: FlowGraph,
    cur: BlockId,
}

impl<'m> FlowBuilder<'m> {
    pub fn new(
        registry: &'m mut TypeRegistry,
        functions: &'m IndexMap<String, FunctionDef>,
        constants: &'m IndexMap<String, Constant>,
    ) -> Self {
        Self {
            registry,
            functions,
            constants,
            graph: FlowGraph::new(),
            cur: 0,
        }
    }

    /// Build and finalize the CFG for `sig` with body `body`.
    pub fn build(mut self, sig: &FunctionSig, body: &Suite) -> Result<FlowGraph, Diagnostic> {
        for (name, ty) in &sig.formals {
            self.graph.block_mut(0).defined.insert(
                name.clone(),
                Value::Argument {
                    ty: *ty,
                    name: name.clone(),
                },
            );
        }
        let constants = self.constants;
        for (name, konst) in constants {
            self.graph.block_mut(0).defined.insert(
                name.clone(),
                Value::Constant {
                    ty: konst.ty,
                    lit: konst.lit.clone(),
                    escapes: false,
                },
            );
        }

        self.visit_suite(body)?;
        self.graph.finalize();
        Ok(self.graph)
    }

    // ─── helpers ─────────────────────────────────────────────────────

    fn block(&mut self) -> &mut Block {
        self.graph.block_mut(self.cur)
    }

    fn push(&mut self, step: Step) {
        self.block().push(step);
    }

    fn define(&mut self, name: &str, value: Value) {
        self.block().defined.insert(name.to_string(), value);
    }

    /// Coerce a value into the branch condition position.
    fn boolean(&mut self, val: Value) -> Value {
        let bool_ = self.registry.bool_();
        if val.ty() == bool_ {
            return val;
        }
        let (symbol, formals, ret) = match self.functions.get("bool") {
            Some(f) => (f.sig.symbol.clone(), f.sig.formal_types(), f.sig.ret),
            None => ("bool".to_string(), vec![val.ty()], bool_),
        };
        Value::Call {
            ty: ret,
            symbol,
            formals,
            args: vec![val],
            escapes: false,
        }
    }

    /// Require equal operand types, letting literal placeholders adopt
    /// the concrete side.
    fn unify(
        &mut self,
        mut left: Value,
        mut right: Value,
        span: Span,
    ) -> Result<(Value, Value, TypeId), Diagnostic> {
        let (lt, rt) = (left.ty(), right.ty());
        if lt == rt {
            return Ok((left, right, lt));
        }
        let anyint = self.registry.anyint();
        let anyfloat = self.registry.anyfloat();
        if lt == anyint && self.registry.ints.contains(&rt) {
            left.set_ty(rt);
            return Ok((left, right, rt));
        }
        if rt == anyint && self.registry.ints.contains(&lt) {
            right.set_ty(lt);
            return Ok((left, right, lt));
        }
        if lt == anyfloat && matches!(self.registry.kind(rt), TypeKind::Float) {
            left.set_ty(rt);
            return Ok((left, right, rt));
        }
        if rt == anyfloat && matches!(self.registry.kind(lt), TypeKind::Float) {
            right.set_ty(lt);
            return Ok((left, right, lt));
        }
        Err(Diagnostic::new(
            span,
            format!(
                "unmatched types '{}', '{}'",
                self.registry.display_name(lt),
                self.registry.display_name(rt)
            ),
        ))
    }

    // ─── statements ──────────────────────────────────────────────────

    fn visit_suite(&mut self, suite: &Suite) -> Result<(), Diagnostic> {
        for stmt in &suite.stmts {
            self.visit_stmt(stmt)?;
        }
        Ok(())
    }

    fn visit_stmt(&mut self, stmt: &ast::Stmt) -> Result<(), Diagnostic> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                let value = self.visit_expr(expr)?;
                self.push(Step::Expr(value));
                Ok(())
            }
            StmtKind::Assign { target, value } => self.visit_assign(target, value),
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => Some(self.visit_expr(expr)?),
                    None => None,
                };
                self.push(Step::Return { value });
                Ok(())
            }
            StmtKind::Yield(expr) => {
                let value = self.visit_expr(expr)?;
                self.push(Step::Yield { value });
                Ok(())
            }
            StmtKind::Raise(expr) => {
                let value = self.visit_expr(expr)?;
                self.push(Step::Raise { value });
                Ok(())
            }
            StmtKind::Pass => Ok(()),
            StmtKind::If { arms } => self.visit_if(arms),
            StmtKind::While { cond, body } => self.visit_while(cond, body),
            StmtKind::For {
                var,
                var_span,
                source,
                body,
            } => self.visit_for(var, *var_span, source, body),
        }
    }

    fn visit_assign(&mut self, target: &Expr, value: &Expr) -> Result<(), Diagnostic> {
        let val = self.visit_expr(value)?;
        match &target.kind {
            ExprKind::Name(name) => {
                self.define(name, val.clone());
                self.push(Step::Assign {
                    name: name.clone(),
                    value: val,
                });
                Ok(())
            }
            ExprKind::Attr { obj, attr } => {
                let obj_val = self.visit_expr(obj)?;
                let base = self.registry.unwrap(obj_val.ty());
                if !self.registry.entry(base).attribs.contains_key(attr.as_str()) {
                    return Err(Diagnostic::new(
                        target.span,
                        format!(
                            "type '{}' has no attribute '{}'",
                            self.registry.display_name(base),
                            attr
                        ),
                    ));
                }
                self.push(Step::SetAttr {
                    obj: obj_val,
                    attr: attr.clone(),
                    value: val,
                });
                Ok(())
            }
            _ => unreachable!("parser only produces name and attribute targets"),
        }
    }

    /// Lower an if/elif/else chain into cond-blocks with back-patched
    /// false edges, suite blocks, and a common exit.
    fn visit_if(&mut self, arms: &[(Option<Expr>, Suite)]) -> Result<(), Diagnostic> {
        let mut exiting: Vec<BlockId> = Vec::new();
        let mut prev_cond: Option<BlockId> = None;

        for (i, (cond, suite)) in arms.iter().enumerate() {
            match cond {
                Some(cond_expr) => {
                    let cond_block = if i == 0 {
                        self.cur
                    } else {
                        let prev = prev_cond.expect("elif without preceding condition");
                        let block = self.graph.add_block(Some("if-cond"), vec![prev]);
                        self.graph.set_false_target(prev, block);
                        block
                    };
                    self.cur = cond_block;
                    let cond_val = self.visit_expr(cond_expr)?;
                    let cond_val = self.boolean(cond_val);

                    let then_block = self.graph.add_block(Some("if-suite"), vec![cond_block]);
                    self.graph.block_mut(cond_block).push(Step::CondBranch {
                        cond: cond_val,
                        then_to: then_block,
                        else_to: PENDING,
                    });
                    prev_cond = Some(cond_block);

                    self.cur = then_block;
                    self.visit_suite(suite)?;
                    if !self.block().ends_with_return() {
                        exiting.push(self.cur);
                    }
                }
                None => {
                    let prev = prev_cond.take().expect("else without preceding condition");
                    let else_block = self.graph.add_block(Some("if-suite"), vec![prev]);
                    self.graph.set_false_target(prev, else_block);
                    self.cur = else_block;
                    self.visit_suite(suite)?;
                    if !self.block().ends_with_return() {
                        exiting.push(self.cur);
                    }
                }
            }
        }

        let mut exit_preds = exiting.clone();
        if let Some(prev) = prev_cond {
            exit_preds.push(prev);
        }
        let exit = self.graph.add_block(Some("if-exit"), exit_preds);
        if let Some(prev) = prev_cond {
            self.graph.set_false_target(prev, exit);
        }
        for block in exiting {
            self.graph.block_mut(block).push(Step::Branch { target: exit });
        }
        self.cur = exit;
        Ok(())
    }

    fn visit_while(&mut self, cond: &Expr, body: &Suite) -> Result<(), Diagnostic> {
        let start = self.cur;
        let header = self.graph.add_block(Some("while-header"), vec![start]);
        self.graph.block_mut(start).push(Step::Branch { target: header });

        self.cur = header;
        let cond_val = self.visit_expr(cond)?;
        let cond_val = self.boolean(cond_val);

        let body_block = self.graph.add_block(Some("while-body"), vec![header]);
        self.cur = body_block;
        self.visit_suite(body)?;
        let body_end = self.cur;
        if !self.block().ends_with_return() {
            self.push(Step::Branch { target: header });
        }
        // Back-edge predecessor, so the header sees body definitions.
        self.graph.block_mut(header).preds.push(body_end);

        let exit = self.graph.add_block(Some("while-exit"), vec![header]);
        self.graph.block_mut(header).push(Step::CondBranch {
            cond: cond_val,
            then_to: body_block,
            else_to: exit,
        });
        self.cur = exit;
        Ok(())
    }

    /// Lower a for loop over an iterator source: bind `loop.source`,
    /// call `__next__` in the header, branch on the bound value.
    fn visit_for(
        &mut self,
        var: &str,
        _var_span: Span,
        source: &Expr,
        body: &Suite,
    ) -> Result<(), Diagnostic> {
        let source_val = self.visit_expr(source)?;
        let source_ty = source_val.ty();
        self.define("loop.source", source_val.clone());
        self.push(Step::Assign {
            name: "loop.source".to_string(),
            value: source_val,
        });
        self.push(Step::LoopSetup);

        let start = self.cur;
        let header = self.graph.add_block(Some("for-header"), vec![start]);
        self.graph.block_mut(start).push(Step::Branch { target: header });
        self.cur = header;
        self.push(Step::LoopHeader);

        let sig = self
            .registry
            .select(source_ty, "__next__", &[source_ty])
            .map_err(|e| Diagnostic::new(source.span, e.message()))?;
        let iter_ref = Value::Reference {
            ty: source_ty,
            name: "loop.source".to_string(),
        };
        let next_val = Value::Call {
            ty: sig.ret,
            symbol: sig.symbol.clone(),
            formals: sig.formal_types(),
            args: vec![iter_ref],
            escapes: false,
        };
        self.define(var, next_val.clone());
        self.push(Step::Assign {
            name: var.to_string(),
            value: next_val,
        });

        let body_block = self.graph.add_block(Some("for-body"), vec![header]);
        self.cur = body_block;
        self.visit_suite(body)?;
        let body_end = self.cur;
        if !self.block().ends_with_return() {
            self.push(Step::Branch { target: header });
        }
        self.graph.block_mut(header).preds.push(body_end);

        let exit = self.graph.add_block(Some("for-exit"), vec![header]);
        let var_ref = Value::Reference {
            ty: sig.ret,
            name: var.to_string(),
        };
        let cond = self.boolean(var_ref);
        self.graph.block_mut(header).push(Step::CondBranch {
            cond,
            then_to: body_block,
            else_to: exit,
        });
        self.cur = exit;
        Ok(())
    }

    // ─── expressions ─────────────────────────────────────────────────

    fn visit_expr(&mut self, expr: &Expr) -> Result<Value, Diagnostic> {
        match &expr.kind {
            ExprKind::Bool(value) => Ok(Value::Constant {
                ty: self.registry.bool_(),
                lit: Literal::Bool(*value),
                escapes: false,
            }),
            ExprKind::Int(value) => Ok(Value::Constant {
                ty: self.registry.anyint(),
                lit: Literal::Int(*value),
                escapes: false,
            }),
            ExprKind::Float(value) => Ok(Value::Constant {
                ty: self.registry.anyfloat(),
                lit: Literal::Float(*value),
                escapes: false,
            }),
            ExprKind::Str(value) => {
                let ty = self
                    .registry
                    .get_str("&str", &IndexMap::new())
                    .map_err(|e| Diagnostic::new(expr.span, e.message))?;
                Ok(Value::Constant {
                    ty,
                    lit: Literal::Str(value.clone()),
                    escapes: false,
                })
            }
            ExprKind::Name(name) => {
                let ty = match self.graph.lookup(self.cur, name) {
                    Some(value) => value.ty(),
                    None => {
                        return Err(Diagnostic::new(
                            expr.span,
                            format!("undefined name '{}'", name),
                        ));
                    }
                };
                self.block().uses.insert(name.clone());
                Ok(Value::Reference {
                    ty,
                    name: name.clone(),
                })
            }
            ExprKind::Attr { obj, attr } => {
                let obj_val = self.visit_expr(obj)?;
                let base = self.registry.unwrap(obj_val.ty());
                let Some(&field_ty) = self.registry.entry(base).attribs.get(attr.as_str()) else {
                    return Err(Diagnostic::new(
                        expr.span,
                        format!(
                            "type '{}' has no attribute '{}'",
                            self.registry.display_name(base),
                            attr
                        ),
                    ));
                };
                Ok(Value::GetAttr {
                    ty: field_ty,
                    obj: Box::new(obj_val),
                    attr: attr.clone(),
                })
            }
            ExprKind::Index { obj, key } => {
                let obj_val = self.visit_expr(obj)?;
                let key_val = self.visit_expr(key)?;
                let base = self.registry.unwrap(obj_val.ty());
                let elem = match self.registry.kind(base) {
                    TypeKind::Concrete { params, .. } if !params.is_empty() => params[0],
                    _ => {
                        return Err(Diagnostic::new(
                            expr.span,
                            format!(
                                "type '{}' is not indexable",
                                self.registry.display_name(base)
                            ),
                        ));
                    }
                };
                Ok(Value::GetItem {
                    ty: elem,
                    obj: Box::new(obj_val),
                    key: Box::new(key_val),
                })
            }
            ExprKind::Math { op, left, right } => {
                let left = self.visit_expr(left)?;
                let right = self.visit_expr(right)?;
                let (left, right, ty) = self.unify(left, right, expr.span)?;
                Ok(Value::Math {
                    ty,
                    op: *op,
                    left: Box::new(left),
                    right: Box::new(right),
                })
            }
            ExprKind::Compare { op, left, right } => {
                let left = self.visit_expr(left)?;
                let right = self.visit_expr(right)?;
                let (left, right, _) = self.unify(left, right, expr.span)?;
                Ok(Value::Compare {
                    ty: self.registry.bool_(),
                    op: *op,
                    left: Box::new(left),
                    right: Box::new(right),
                })
            }
            ExprKind::Not { value } => {
                let bool_ = self.registry.bool_();
                let inner = self.visit_expr(value)?;
                let cond = self.boolean(inner);
                Ok(Value::Select {
                    ty: bool_,
                    cond: Box::new(cond),
                    left: Box::new(Value::Constant {
                        ty: bool_,
                        lit: Literal::Bool(false),
                        escapes: false,
                    }),
                    right: Box::new(Value::Constant {
                        ty: bool_,
                        lit: Literal::Bool(true),
                        escapes: false,
                    }),
                })
            }
            ExprKind::And { left, right } => {
                let left = self.visit_expr(left)?;
                let right = self.visit_expr(right)?;
                let cond = self.boolean(left.clone());
                if left.ty() == right.ty() {
                    Ok(Value::Select {
                        ty: left.ty(),
                        cond: Box::new(cond),
                        left: Box::new(right),
                        right: Box::new(left),
                    })
                } else {
                    let right = self.boolean(right);
                    Ok(Value::Select {
                        ty: self.registry.bool_(),
                        cond: Box::new(cond.clone()),
                        left: Box::new(right),
                        right: Box::new(cond),
                    })
                }
            }
            ExprKind::Or { left, right } => {
                let left = self.visit_expr(left)?;
                let right = self.visit_expr(right)?;
                let cond = self.boolean(left.clone());
                if left.ty() == right.ty() {
                    Ok(Value::Select {
                        ty: left.ty(),
                        cond: Box::new(cond),
                        left: Box::new(left),
                        right: Box::new(right),
                    })
                } else {
                    let right = self.boolean(right);
                    Ok(Value::Select {
                        ty: self.registry.bool_(),
                        cond: Box::new(cond.clone()),
                        left: Box::new(cond),
                        right: Box::new(right),
                    })
                }
            }
            ExprKind::Ternary { cond, then, els } => {
                let then = self.visit_expr(then)?;
                let els = self.visit_expr(els)?;
                let (then, els, ty) = self.unify(then, els, expr.span)?;
                let cond = self.visit_expr(cond)?;
                let cond = self.boolean(cond);
                Ok(Value::Select {
                    ty,
                    cond: Box::new(cond),
                    left: Box::new(then),
                    right: Box::new(els),
                })
            }
            ExprKind::Call { callee, args } => self.visit_call(expr.span, callee, args),
        }
    }

    /// The three call dispatch arms: method call, direct function call,
    /// and type-name-as-constructor.
    fn visit_call(
        &mut self,
        span: Span,
        callee: &Expr,
        args: &[Expr],
    ) -> Result<Value, Diagnostic> {
        let mut arg_vals = Vec::with_capacity(args.len());
        for arg in args {
            arg_vals.push(self.visit_expr(arg)?);
        }

        match &callee.kind {
            ExprKind::Attr { obj, attr } => {
                let obj_val = self.visit_expr(obj)?;
                let recv_ty = obj_val.ty();
                let mut actuals = vec![recv_ty];
                actuals.extend(arg_vals.iter().map(Value::ty));
                let sig = self
                    .registry
                    .select(recv_ty, attr, &actuals)
                    .map_err(|e| Diagnostic::new(span, e.message()))?;

                let mut call_args = vec![obj_val];
                call_args.extend(arg_vals);
                Ok(Value::Call {
                    ty: sig.ret,
                    symbol: sig.symbol.clone(),
                    formals: sig.formal_types(),
                    args: call_args,
                    escapes: false,
                })
            }
            ExprKind::Name(name) => {
                if let Some(fun) = self.functions.get(name.as_str()) {
                    let formals = fun.sig.formal_types();
                    self.check_call_args(span, name, args, &mut arg_vals, &formals)?;
                    return Ok(Value::Call {
                        ty: fun.sig.ret,
                        symbol: fun.sig.symbol.clone(),
                        formals,
                        args: arg_vals,
                        escapes: false,
                    });
                }

                if let Some(tid) = self.registry.lookup(name) {
                    return self.visit_init(span, tid, arg_vals);
                }

                Err(Diagnostic::new(span, "not a function or method"))
            }
            _ => Err(Diagnostic::new(span, "not a function or method")),
        }
    }

    fn check_call_args(
        &mut self,
        span: Span,
        name: &str,
        args: &[Expr],
        arg_vals: &mut [Value],
        formals: &[TypeId],
    ) -> Result<(), Diagnostic> {
        let varargs = formals
            .last()
            .is_some_and(|&f| matches!(self.registry.kind(f), TypeKind::VarArgs));
        let fixed = if varargs { formals.len() - 1 } else { formals.len() };

        if (varargs && arg_vals.len() < fixed) || (!varargs && arg_vals.len() != fixed) {
            let expected = if varargs {
                format!("at least {}", fixed)
            } else {
                fixed.to_string()
            };
            return Err(Diagnostic::new(
                span,
                format!(
                    "'{}' takes {} arguments ({} given)",
                    name,
                    expected,
                    arg_vals.len()
                ),
            ));
        }

        let anyint = self.registry.anyint();
        for (i, val) in arg_vals.iter_mut().enumerate().take(fixed) {
            let formal = formals[i];
            let actual = val.ty();
            if !self.registry.compat(actual, formal) {
                let arg_span = args.get(i).map(|a| a.span).unwrap_or(span);
                return Err(Diagnostic::new(
                    arg_span,
                    format!(
                        "argument {} to '{}' has type '{}', expected '{}'",
                        i + 1,
                        name,
                        self.registry.display_name(actual),
                        self.registry.display_name(formal)
                    ),
                ));
            }
            if actual == anyint && self.registry.ints.contains(&formal) {
                val.set_ty(formal);
            }
        }
        Ok(())
    }

    /// A type name in call position constructs a value of that type.
    fn visit_init(
        &mut self,
        span: Span,
        tid: TypeId,
        arg_vals: Vec<Value>,
    ) -> Result<Value, Diagnostic> {
        match self.registry.kind(tid) {
            TypeKind::Record { .. } | TypeKind::Concrete { .. } => {}
            _ => return Err(Diagnostic::new(span, "not a function or method")),
        }

        let has_init = {
            let methods = &self.registry.entry(tid).methods;
            methods.contains_key("__init__") || methods.contains_key("__new__")
        };
        let symbol = if has_init || !arg_vals.is_empty() {
            let recv = self.registry.ref_(tid);
            let mut actuals = vec![recv];
            actuals.extend(arg_vals.iter().map(Value::ty));
            let sig = self
                .registry
                .select(tid, "__init__", &actuals)
                .map_err(|e| Diagnostic::new(span, e.message()))?;
            Some(sig.symbol)
        } else {
            None
        };

        Ok(Value::Init {
            ty: tid,
            symbol,
            args: arg_vals,
            escapes: false,
        })
    }
}
