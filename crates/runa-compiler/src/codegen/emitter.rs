//! Single-pass IR emission over finalized flow graphs.

use std::fmt::Write;

use indexmap::{IndexMap, IndexSet};

use crate::flow::{FlowGraph, Literal, Step, Value};
use crate::module::{FunctionDef, Module};
use crate::types::{TypeId, TypeKind, TypeRegistry};
use crate::Error;

/// Rewrite a symbol into an identifier the assembler and the C runtime
/// both accept.
pub fn mangle(symbol: &str) -> String {
    symbol
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Emit the whole module as textual IR.
pub fn emit(module: &Module) -> crate::Result<String> {
    let mut emitter = Emitter::new(module);
    emitter.run()?;
    Ok(emitter.finish())
}

struct Emitter<'m> {
    module: &'m Module,
    declares: IndexMap<String, String>,
    globals: String,
    body: String,
    nstr: usize,
    tmp: usize,
    uses_strdup: bool,
}

impl<'m> Emitter<'m> {
    fn new(module: &'m Module) -> Self {
        Self {
            module,
            declares: IndexMap::new(),
            globals: String::new(),
            body: String::new(),
            nstr: 0,
            tmp: 0,
            uses_strdup: false,
        }
    }

    fn registry(&self) -> &TypeRegistry {
        &self.module.registry
    }

    fn run(&mut self) -> crate::Result<()> {
        for fun in self.module.functions.values() {
            if fun.rt {
                self.declare_function(fun);
            }
        }
        self.declare_scanned()?;

        let defs: Vec<&FunctionDef> = self
            .module
            .functions
            .values()
            .filter(|f| !f.rt && f.graph.is_some())
            .collect();
        for fun in defs {
            self.emit_function(fun)?;
        }
        Ok(())
    }

    fn finish(self) -> String {
        let mut out = String::new();
        for line in self.declares.values() {
            out.push_str(line);
            out.push('\n');
        }
        if self.uses_strdup {
            out.push_str("declare ptr @runa_strdup(ptr)\n");
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&self.globals);
        if !self.globals.is_empty() {
            out.push('\n');
        }
        out.push_str(&self.body);
        out
    }

    // ─── declarations ────────────────────────────────────────────────

    fn declare_function(&mut self, fun: &FunctionDef) {
        let symbol = mangle(&fun.sig.symbol);
        let params = fun
            .sig
            .formals
            .iter()
            .map(|(_, t)| self.ty_ir(*t))
            .collect::<Vec<_>>()
            .join(", ");
        let line = format!("declare {} @{}({})", self.ty_ir(fun.sig.ret), symbol, params);
        self.declares.entry(symbol).or_insert(line);
    }

    /// Declare call targets with no definition in this unit (prelude
    /// methods such as `intiter.__next__`).
    fn declare_scanned(&mut self) -> crate::Result<()> {
        let mut defined: IndexSet<String> = IndexSet::new();
        for fun in self.module.functions.values() {
            if !fun.rt && fun.graph.is_some() {
                defined.insert(mangle(&fun.sig.symbol));
            }
        }

        let mut seen: Vec<(String, String, Vec<String>)> = Vec::new();
        for fun in self.module.functions.values() {
            let Some(graph) = &fun.graph else { continue };
            for block in graph.blocks.values() {
                for step in &block.steps {
                    scan_step(self, step, &mut seen);
                }
            }
        }
        for (symbol, ret, params) in seen {
            if defined.contains(&symbol) || self.declares.contains_key(&symbol) {
                continue;
            }
            let line = format!("declare {} @{}({})", ret, symbol, params.join(", "));
            self.declares.insert(symbol, line);
        }
        Ok(())
    }

    // ─── types ───────────────────────────────────────────────────────

    fn ty_ir(&self, ty: TypeId) -> String {
        match self.registry().kind(ty) {
            TypeKind::Void => "void".to_string(),
            TypeKind::Bool => "i1".to_string(),
            TypeKind::Int { bits: 8, .. } => "i8".to_string(),
            TypeKind::Int { bits: 32, .. } => "i32".to_string(),
            TypeKind::Int { .. } => "i64".to_string(),
            TypeKind::Float | TypeKind::AnyFloat => "double".to_string(),
            TypeKind::AnyInt => "i64".to_string(),
            _ => "ptr".to_string(),
        }
    }

    fn is_signed(&self, ty: TypeId) -> bool {
        match self.registry().kind(ty) {
            TypeKind::Int { signed, .. } => *signed,
            TypeKind::AnyInt => true,
            _ => true,
        }
    }

    fn is_float(&self, ty: TypeId) -> bool {
        matches!(
            self.registry().kind(ty),
            TypeKind::Float | TypeKind::AnyFloat
        )
    }

    // ─── functions ───────────────────────────────────────────────────

    fn emit_function(&mut self, fun: &FunctionDef) -> crate::Result<()> {
        let graph = fun.graph.as_ref().expect("built function has a graph");
        self.tmp = 0;

        let is_main = fun.name == "main";
        let ret_ir = if is_main {
            "i32".to_string()
        } else {
            self.ty_ir(fun.sig.ret)
        };
        let params = fun
            .sig
            .formals
            .iter()
            .map(|(name, t)| format!("{} %{}", self.ty_ir(*t), mangle(name)))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(
            self.body,
            "define {} @{}({}) {{",
            ret_ir,
            mangle(&fun.sig.symbol),
            params
        );

        let slots = self.collect_slots(fun, graph);
        // Prologue: a stack slot per named value; arguments spill into
        // theirs so references are uniform loads.
        for (name, ty) in &slots {
            let _ = writeln!(self.body, "  %{}.addr = alloca {}", mangle(name), ty);
        }
        for (name, t) in &fun.sig.formals {
            let _ = writeln!(
                self.body,
                "  store {} %{}, ptr %{}.addr",
                self.ty_ir(*t),
                mangle(name),
                mangle(name)
            );
        }
        let _ = writeln!(self.body, "  br label %b0");

        for block in graph.blocks.values() {
            let _ = writeln!(self.body, "b{}:", block.id);
            for step in &block.steps {
                self.emit_step(fun, step, &slots, is_main)?;
            }
        }
        let _ = writeln!(self.body, "}}");
        self.body.push('\n');
        Ok(())
    }

    /// Stack slots: one per formal plus one per assigned name.
    fn collect_slots(&self, fun: &FunctionDef, graph: &FlowGraph) -> IndexMap<String, String> {
        let mut slots = IndexMap::new();
        for (name, t) in &fun.sig.formals {
            slots.insert(name.clone(), self.ty_ir(*t));
        }
        for block in graph.blocks.values() {
            for step in &block.steps {
                if let Step::Assign { name, value } = step {
                    let ir_ty = self.ty_ir(value.ty());
                    if ir_ty != "void" {
                        slots.entry(name.clone()).or_insert(ir_ty);
                    }
                }
            }
        }
        slots
    }

    fn emit_step(
        &mut self,
        fun: &FunctionDef,
        step: &Step,
        slots: &IndexMap<String, String>,
        is_main: bool,
    ) -> crate::Result<()> {
        match step {
            Step::Expr(value) => {
                self.emit_value(value, slots)?;
                Ok(())
            }
            Step::Assign { name, value } => {
                let (repr, ty) = self.emit_value(value, slots)?;
                if ty != "void" {
                    let _ = writeln!(
                        self.body,
                        "  store {} {}, ptr %{}.addr",
                        ty,
                        repr,
                        mangle(name)
                    );
                }
                Ok(())
            }
            Step::SetAttr { obj, attr, value } => {
                let (obj_repr, _) = self.emit_value(obj, slots)?;
                let (val_repr, val_ty) = self.emit_value(value, slots)?;
                let offset = self.attr_offset(obj.ty(), attr);
                let ptr = self.fresh();
                let _ = writeln!(
                    self.body,
                    "  {} = getelementptr i8, ptr {}, i64 {}",
                    ptr, obj_repr, offset
                );
                let _ = writeln!(self.body, "  store {} {}, ptr {}", val_ty, val_repr, ptr);
                Ok(())
            }
            Step::Return { value } => {
                match value {
                    None if is_main => {
                        let _ = writeln!(self.body, "  ret i32 0");
                    }
                    None => {
                        let _ = writeln!(self.body, "  ret void");
                    }
                    Some(v) => {
                        let (repr, ty) = self.emit_value(v, slots)?;
                        if is_main && ty != "i32" {
                            let t = self.fresh();
                            if ty == "i1" {
                                let _ = writeln!(self.body, "  {} = zext i1 {} to i32", t, repr);
                            } else {
                                let _ =
                                    writeln!(self.body, "  {} = trunc {} {} to i32", t, ty, repr);
                            }
                            let _ = writeln!(self.body, "  ret i32 {}", t);
                        } else if ty == "void" {
                            let _ = writeln!(self.body, "  ret void");
                        } else {
                            let _ = writeln!(self.body, "  ret {} {}", ty, repr);
                        }
                    }
                }
                Ok(())
            }
            Step::Yield { .. } => Err(Error::Codegen(format!(
                "'{}' uses yield, which this backend does not lower",
                fun.name
            ))),
            Step::Raise { .. } => Err(Error::Codegen(format!(
                "'{}' uses raise, which this backend does not lower",
                fun.name
            ))),
            Step::Branch { target } => {
                let _ = writeln!(self.body, "  br label %b{}", target);
                Ok(())
            }
            Step::CondBranch {
                cond,
                then_to,
                else_to,
            } => {
                let (repr, _) = self.emit_value(cond, slots)?;
                let _ = writeln!(
                    self.body,
                    "  br i1 {}, label %b{}, label %b{}",
                    repr, then_to, else_to
                );
                Ok(())
            }
            Step::LoopSetup | Step::LoopHeader => Ok(()),
        }
    }

    // ─── values ──────────────────────────────────────────────────────

    fn fresh(&mut self) -> String {
        let t = format!("%t{}", self.tmp);
        self.tmp += 1;
        t
    }

    /// Bridge an emitted value to the IR type a call site expects.
    fn coerce(&mut self, repr: String, from: &str, to: &str) -> String {
        if from == to {
            return repr;
        }
        let t = self.fresh();
        match (from, to) {
            ("ptr", _) => {
                let _ = writeln!(self.body, "  {} = ptrtoint ptr {} to {}", t, repr, to);
            }
            (_, "ptr") => {
                let _ = writeln!(self.body, "  {} = inttoptr {} {} to ptr", t, from, repr);
            }
            ("i1", _) | ("i8", "i32") | ("i8", "i64") | ("i32", "i64") => {
                let _ = writeln!(self.body, "  {} = zext {} {} to {}", t, from, repr, to);
            }
            _ => {
                let _ = writeln!(self.body, "  {} = trunc {} {} to {}", t, from, repr, to);
            }
        }
        t
    }

    fn attr_offset(&self, obj_ty: TypeId, attr: &str) -> usize {
        let base = self.registry().unwrap(obj_ty);
        let index = self
            .registry()
            .entry(base)
            .attribs
            .get_index_of(attr)
            .unwrap_or(0);
        index * 8
    }

    fn emit_value(
        &mut self,
        value: &Value,
        slots: &IndexMap<String, String>,
    ) -> crate::Result<(String, String)> {
        match value {
            Value::Constant { ty, lit, escapes } => self.emit_constant(*ty, lit, *escapes),
            Value::Reference { ty, name } | Value::Argument { ty, name } => {
                if slots.contains_key(name.as_str()) {
                    let ir_ty = self.ty_ir(*ty);
                    let t = self.fresh();
                    let _ = writeln!(
                        self.body,
                        "  {} = load {}, ptr %{}.addr",
                        t,
                        ir_ty,
                        mangle(name)
                    );
                    Ok((t, ir_ty))
                } else {
                    let module = self.module;
                    match module.constants.get(name.as_str()) {
                        Some(konst) => self.emit_constant(konst.ty, &konst.lit, false),
                        None => Err(Error::Codegen(format!(
                            "reference to unbound name '{}'",
                            name
                        ))),
                    }
                }
            }
            Value::GetAttr { ty, obj, attr } => {
                let (obj_repr, _) = self.emit_value(obj, slots)?;
                let offset = self.attr_offset(obj.ty(), attr);
                let ir_ty = self.ty_ir(*ty);
                let ptr = self.fresh();
                let _ = writeln!(
                    self.body,
                    "  {} = getelementptr i8, ptr {}, i64 {}",
                    ptr, obj_repr, offset
                );
                let t = self.fresh();
                let _ = writeln!(self.body, "  {} = load {}, ptr {}", t, ir_ty, ptr);
                Ok((t, ir_ty))
            }
            Value::GetItem { ty, obj, key } => {
                let (obj_repr, _) = self.emit_value(obj, slots)?;
                let (key_repr, _) = self.emit_value(key, slots)?;
                let ir_ty = self.ty_ir(*ty);
                let off = self.fresh();
                let _ = writeln!(self.body, "  {} = mul i64 {}, 8", off, key_repr);
                let ptr = self.fresh();
                let _ = writeln!(
                    self.body,
                    "  {} = getelementptr i8, ptr {}, i64 {}",
                    ptr, obj_repr, off
                );
                let t = self.fresh();
                let _ = writeln!(self.body, "  {} = load {}, ptr {}", t, ir_ty, ptr);
                Ok((t, ir_ty))
            }
            Value::Call {
                ty,
                symbol,
                formals,
                args,
                ..
            } => {
                let mut rendered = Vec::new();
                for (i, arg) in args.iter().enumerate() {
                    let (repr, ir_ty) = self.emit_value(arg, slots)?;
                    // Coerce to the declared formal so the call matches
                    // the callee's signature.
                    let want = match formals.get(i) {
                        Some(&f) if !matches!(self.registry().kind(f), TypeKind::VarArgs) => {
                            self.ty_ir(f)
                        }
                        _ => ir_ty.clone(),
                    };
                    let repr = self.coerce(repr, &ir_ty, &want);
                    rendered.push(format!("{} {}", want, repr));
                }
                let ret_ir = self.ty_ir(*ty);
                if ret_ir == "void" {
                    let _ = writeln!(
                        self.body,
                        "  call void @{}({})",
                        mangle(symbol),
                        rendered.join(", ")
                    );
                    Ok(("0".to_string(), "void".to_string()))
                } else {
                    let t = self.fresh();
                    let _ = writeln!(
                        self.body,
                        "  {} = call {} @{}({})",
                        t,
                        ret_ir,
                        mangle(symbol),
                        rendered.join(", ")
                    );
                    Ok((t, ret_ir))
                }
            }
            Value::Init {
                ty, symbol, args, ..
            } => {
                let base = self.registry().unwrap(*ty);
                let size = self.registry().entry(base).attribs.len().max(1) * 8;
                let obj = self.fresh();
                let _ = writeln!(
                    self.body,
                    "  {} = call ptr @runa_malloc(i64 {})",
                    obj, size
                );
                if let Some(init_symbol) = symbol {
                    let mut rendered = vec![format!("ptr {}", obj)];
                    for arg in args {
                        let (repr, ir_ty) = self.emit_value(arg, slots)?;
                        rendered.push(format!("{} {}", ir_ty, repr));
                    }
                    let _ = writeln!(
                        self.body,
                        "  call void @{}({})",
                        mangle(init_symbol),
                        rendered.join(", ")
                    );
                }
                Ok((obj, "ptr".to_string()))
            }
            Value::Select {
                cond, left, right, ..
            } => {
                let (cond_repr, _) = self.emit_value(cond, slots)?;
                let (l, ir_ty) = self.emit_value(left, slots)?;
                let (r, _) = self.emit_value(right, slots)?;
                let t = self.fresh();
                let _ = writeln!(
                    self.body,
                    "  {} = select i1 {}, {} {}, {} {}",
                    t, cond_repr, ir_ty, l, ir_ty, r
                );
                Ok((t, ir_ty))
            }
            Value::Math {
                ty, op, left, right,
            } => {
                let (l, ir_ty) = self.emit_value(left, slots)?;
                let (r, _) = self.emit_value(right, slots)?;
                let instr = if self.is_float(*ty) {
                    match op.name() {
                        "add" => "fadd",
                        "sub" => "fsub",
                        "mul" => "fmul",
                        _ => "fdiv",
                    }
                } else {
                    match op.name() {
                        "add" => "add",
                        "sub" => "sub",
                        "mul" => "mul",
                        _ if self.is_signed(*ty) => "sdiv",
                        _ => "udiv",
                    }
                };
                let t = self.fresh();
                let _ = writeln!(self.body, "  {} = {} {} {}, {}", t, instr, ir_ty, l, r);
                Ok((t, ir_ty))
            }
            Value::Compare {
                op, left, right, ..
            } => {
                let operand_ty = left.ty();
                let (l, ir_ty) = self.emit_value(left, slots)?;
                let (r, _) = self.emit_value(right, slots)?;
                let t = self.fresh();
                if self.is_float(operand_ty) {
                    let cc = match op.name() {
                        "eq" => "oeq",
                        "ne" => "one",
                        "lt" => "olt",
                        _ => "ogt",
                    };
                    let _ = writeln!(self.body, "  {} = fcmp {} {} {}, {}", t, cc, ir_ty, l, r);
                } else {
                    let signed = self.is_signed(operand_ty);
                    let cc = match op.name() {
                        "eq" => "eq",
                        "ne" => "ne",
                        "lt" if signed => "slt",
                        "lt" => "ult",
                        _ if signed => "sgt",
                        _ => "ugt",
                    };
                    let _ = writeln!(self.body, "  {} = icmp {} {} {}, {}", t, cc, ir_ty, l, r);
                }
                Ok((t, "i1".to_string()))
            }
            Value::Phi { .. } => Err(Error::Codegen(
                "phi nodes are not produced by this front end".to_string(),
            )),
        }
    }

    fn emit_constant(
        &mut self,
        ty: TypeId,
        lit: &Literal,
        escapes: bool,
    ) -> crate::Result<(String, String)> {
        match lit {
            Literal::Bool(b) => Ok(((if *b { "1" } else { "0" }).to_string(), "i1".to_string())),
            Literal::Int(i) => Ok((i.to_string(), self.ty_ir(ty))),
            Literal::Float(f) => Ok((format!("0x{:016X}", f.to_bits()), "double".to_string())),
            Literal::Str(s) => {
                let name = format!("@.str{}", self.nstr);
                self.nstr += 1;
                let bytes = s.as_bytes();
                let _ = writeln!(
                    self.globals,
                    "{} = private unnamed_addr constant [{} x i8] c\"{}\\00\"",
                    name,
                    bytes.len() + 1,
                    c_escape(bytes)
                );
                if escapes {
                    self.uses_strdup = true;
                    let t = self.fresh();
                    let _ = writeln!(
                        self.body,
                        "  {} = call ptr @runa_strdup(ptr {})",
                        t, name
                    );
                    Ok((t, "ptr".to_string()))
                } else {
                    Ok((name, "ptr".to_string()))
                }
            }
        }
    }
}

/// Escape bytes for an LLVM `c"..."` string constant.
fn c_escape(bytes: &[u8]) -> String {
    let mut out = String::new();
    for &b in bytes {
        if (b' '..=b'~').contains(&b) && b != b'"' && b != b'\\' {
            out.push(b as char);
        } else {
            let _ = write!(out, "\\{:02X}", b);
        }
    }
    out
}

/// Collect call targets from a step for up-front declaration.
fn scan_step(emitter: &Emitter<'_>, step: &Step, seen: &mut Vec<(String, String, Vec<String>)>) {
    match step {
        Step::Expr(v) | Step::Yield { value: v } | Step::Raise { value: v } => {
            scan_value(emitter, v, seen)
        }
        Step::Assign { value, .. } => scan_value(emitter, value, seen),
        Step::SetAttr { obj, value, .. } => {
            scan_value(emitter, obj, seen);
            scan_value(emitter, value, seen);
        }
        Step::Return { value: Some(v) } => scan_value(emitter, v, seen),
        Step::CondBranch { cond, .. } => scan_value(emitter, cond, seen),
        Step::Return { value: None }
        | Step::Branch { .. }
        | Step::LoopSetup
        | Step::LoopHeader => {}
    }
}

fn scan_value(emitter: &Emitter<'_>, value: &Value, seen: &mut Vec<(String, String, Vec<String>)>) {
    match value {
        Value::Call {
            ty,
            symbol,
            formals,
            args,
            ..
        } => {
            seen.push((
                mangle(symbol),
                emitter.ty_ir(*ty),
                formals.iter().map(|&f| emitter.ty_ir(f)).collect(),
            ));
            for arg in args {
                scan_value(emitter, arg, seen);
            }
        }
        Value::Init { symbol, args, .. } => {
            seen.push((
                "runa_malloc".to_string(),
                "ptr".to_string(),
                vec!["i64".to_string()],
            ));
            if let Some(init_symbol) = symbol {
                let params: Vec<String> = std::iter::once("ptr".to_string())
                    .chain(args.iter().map(|a| emitter.ty_ir(a.ty())))
                    .collect();
                seen.push((mangle(init_symbol), "void".to_string(), params));
            }
            for arg in args {
                scan_value(emitter, arg, seen);
            }
        }
        Value::Select {
            cond, left, right, ..
        } => {
            scan_value(emitter, cond, seen);
            scan_value(emitter, left, seen);
            scan_value(emitter, right, seen);
        }
        Value::Phi { left, right, .. } => {
            scan_value(emitter, &left.1, seen);
            scan_value(emitter, &right.1, seen);
        }
        Value::Math { left, right, .. } | Value::Compare { left, right, .. } => {
            scan_value(emitter, left, seen);
            scan_value(emitter, right, seen);
        }
        Value::GetAttr { obj, .. } => scan_value(emitter, obj, seen),
        Value::GetItem { obj, key, .. } => {
            scan_value(emitter, obj, seen);
            scan_value(emitter, key, seen);
        }
        Value::Constant { .. } | Value::Reference { .. } | Value::Argument { .. } => {}
    }
}
