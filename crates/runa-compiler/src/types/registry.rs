//! Type interning, resolution, compatibility, and overload selection.

use indexmap::{IndexMap, IndexSet};

use crate::ast::{self, TypeRefKind};
use crate::diagnostics::Diagnostic;

use super::{FunctionSig, MethodKind, TypeEntry, TypeId, TypeKind};

/// Failure while resolving a textual type descriptor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TypeError {
    pub message: String,
}

impl TypeError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Failure of overload selection; the caller attaches the position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectError {
    NoMatch { name: String, tried: Vec<String> },
    Ambiguous { name: String, candidates: Vec<String> },
}

impl SelectError {
    pub fn message(&self) -> String {
        match self {
            SelectError::NoMatch { name, tried } if tried.is_empty() => {
                format!("no method '{}'", name)
            }
            SelectError::NoMatch { name, tried } => {
                format!("no matching overload for '{}', tried: {}", name, tried.join(", "))
            }
            SelectError::Ambiguous { name, candidates } => {
                format!(
                    "ambiguous overload for '{}', candidates: {}",
                    name,
                    candidates.join(", ")
                )
            }
        }
    }
}

/// A type-introducing declaration, for two-phase registration.
#[derive(Debug, Clone, Copy)]
pub enum TypeDecl<'a> {
    Class(&'a ast::ClassDecl),
    Trait(&'a ast::TraitDecl),
}

impl TypeDecl<'_> {
    fn name(&self) -> &str {
        match self {
            TypeDecl::Class(c) => &c.name,
            TypeDecl::Trait(t) => &t.name,
        }
    }

    fn name_span(&self) -> crate::diagnostics::Span {
        match self {
            TypeDecl::Class(c) => c.name_span,
            TypeDecl::Trait(t) => t.name_span,
        }
    }
}

/// The arena of interned types and the operations over them.
///
/// Populated monotonically during a single compilation; the downstream
/// passes treat it as read-only apart from wrapper interning.
#[derive(Debug)]
pub struct TypeRegistry {
    entries: Vec<TypeEntry>,
    by_name: IndexMap<String, TypeId>,
    pub ints: IndexSet<TypeId>,
    pub sints: IndexSet<TypeId>,
    pub uints: IndexSet<TypeId>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut reg = Self {
            entries: Vec::new(),
            by_name: IndexMap::new(),
            ints: IndexSet::new(),
            sints: IndexSet::new(),
            uints: IndexSet::new(),
        };

        reg.register("void", TypeKind::Void, true);
        reg.register("bool", TypeKind::Bool, true);
        reg.register("float", TypeKind::Float, true);
        reg.register("anyint", TypeKind::AnyInt, true);
        reg.register("anyfloat", TypeKind::AnyFloat, true);
        reg.register("module", TypeKind::Module, false);
        reg.register("...", TypeKind::VarArgs, false);

        for (name, signed, bits) in [
            ("byte", false, 8),
            ("i32", true, 32),
            ("u32", false, 32),
            ("int", true, 64),
            ("uint", false, 64),
        ] {
            let id = reg.register(name, TypeKind::Int { signed, bits }, true);
            reg.ints.insert(id);
            if signed {
                reg.sints.insert(id);
            } else {
                reg.uints.insert(id);
            }
        }
        let anyint = reg.lookup("anyint").expect("anyint is pre-registered");
        reg.sints.insert(anyint);

        reg
    }

    // ─── arena access ────────────────────────────────────────────────

    fn register(&mut self, name: &str, kind: TypeKind, byval: bool) -> TypeId {
        let id = TypeId::from_raw(self.entries.len() as u32);
        self.entries.push(TypeEntry::new(name, kind, byval));
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Arena slot without a name-table entry; used for template stubs,
    /// which are only reachable through the `stubs` map of one `fill`.
    fn fresh(&mut self, name: &str, kind: TypeKind) -> TypeId {
        let id = TypeId::from_raw(self.entries.len() as u32);
        self.entries.push(TypeEntry::new(name, kind, false));
        id
    }

    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    pub fn entry(&self, id: TypeId) -> &TypeEntry {
        &self.entries[id.index()]
    }

    pub fn entry_mut(&mut self, id: TypeId) -> &mut TypeEntry {
        &mut self.entries[id.index()]
    }

    pub fn name(&self, id: TypeId) -> &str {
        &self.entry(id).name
    }

    /// Name used in diagnostics: literal placeholders print as the
    /// concrete type a reader expects.
    pub fn display_name(&self, id: TypeId) -> &str {
        match self.entry(id).kind {
            TypeKind::AnyInt => "int",
            TypeKind::AnyFloat => "float",
            _ => self.name(id),
        }
    }

    pub fn kind(&self, id: TypeId) -> &TypeKind {
        &self.entry(id).kind
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &TypeEntry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| (TypeId::from_raw(i as u32), e))
    }

    /// Ids of every name-registered type.
    pub fn named_ids(&self) -> Vec<TypeId> {
        self.by_name.values().copied().collect()
    }

    // ─── well-known types and wrappers ───────────────────────────────

    pub fn void(&self) -> TypeId {
        self.lookup("void").expect("void is pre-registered")
    }

    pub fn bool_(&self) -> TypeId {
        self.lookup("bool").expect("bool is pre-registered")
    }

    pub fn anyint(&self) -> TypeId {
        self.lookup("anyint").expect("anyint is pre-registered")
    }

    pub fn anyfloat(&self) -> TypeId {
        self.lookup("anyfloat").expect("anyfloat is pre-registered")
    }

    pub fn varargs(&self) -> TypeId {
        self.lookup("...").expect("varargs is pre-registered")
    }

    pub fn owner(&mut self, over: TypeId) -> TypeId {
        let name = format!("${}", self.name(over));
        match self.lookup(&name) {
            Some(id) => id,
            None => self.register(&name, TypeKind::Owner(over), false),
        }
    }

    pub fn ref_(&mut self, over: TypeId) -> TypeId {
        let name = format!("&{}", self.name(over));
        match self.lookup(&name) {
            Some(id) => id,
            None => self.register(&name, TypeKind::Ref(over), false),
        }
    }

    pub fn opt(&mut self, over: TypeId) -> TypeId {
        let name = format!("{}?", self.name(over));
        match self.lookup(&name) {
            Some(id) => id,
            None => self.register(&name, TypeKind::Opt(over), false),
        }
    }

    pub fn function(&mut self, ret: TypeId, formals: Vec<TypeId>) -> TypeId {
        let name = format!(
            "({}) -> {}",
            formals.iter().map(|t| self.name(*t)).collect::<Vec<_>>().join(", "),
            self.name(ret)
        );
        match self.lookup(&name) {
            Some(id) => id,
            None => self.register(&name, TypeKind::Function { ret, formals }, false),
        }
    }

    pub fn is_wrapper(&self, id: TypeId) -> bool {
        matches!(
            self.kind(id),
            TypeKind::Owner(_) | TypeKind::Ref(_) | TypeKind::Opt(_)
        )
    }

    pub fn is_owner(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Owner(_))
    }

    /// Peel all wrappers.
    pub fn unwrap(&self, mut id: TypeId) -> TypeId {
        loop {
            match self.kind(id) {
                TypeKind::Owner(t) | TypeKind::Ref(t) | TypeKind::Opt(t) => id = *t,
                _ => return id,
            }
        }
    }

    fn unwrap_one(&self, id: TypeId) -> TypeId {
        match self.kind(id) {
            TypeKind::Owner(t) | TypeKind::Ref(t) | TypeKind::Opt(t) => *t,
            _ => id,
        }
    }

    // ─── resolution ──────────────────────────────────────────────────

    /// Resolve a textual type descriptor.
    ///
    /// Recognizes the `$`/`&` prefixes, the `?` suffix, `...`,
    /// bracketed template application `Name[T]`, and parenthesized
    /// tuples. Free names resolve through `stubs` first.
    pub fn get_str(
        &mut self,
        spec: &str,
        stubs: &IndexMap<String, TypeId>,
    ) -> Result<TypeId, TypeError> {
        let s = spec.trim();
        if s.is_empty() {
            return Err(TypeError::new("empty type descriptor"));
        }
        if s == "..." {
            return Ok(self.varargs());
        }
        if let Some(rest) = s.strip_prefix('$') {
            let inner = self.get_str(rest, stubs)?;
            return Ok(self.owner(inner));
        }
        if let Some(rest) = s.strip_prefix('&') {
            let inner = self.get_str(rest, stubs)?;
            return Ok(self.ref_(inner));
        }
        if let Some(rest) = s.strip_suffix('?') {
            let inner = self.get_str(rest, stubs)?;
            return Ok(self.opt(inner));
        }
        if let Some(rest) = s.strip_prefix('(') {
            let Some(inner) = rest.strip_suffix(')') else {
                return Err(TypeError::new(format!("malformed type '{}'", s)));
            };
            let mut params = Vec::new();
            for part in split_params(inner) {
                params.push(self.get_str(part, stubs)?);
            }
            return Ok(self.build_tuple(&params));
        }
        if let Some(open) = s.find('[') {
            let Some(body) = s[open + 1..].strip_suffix(']') else {
                return Err(TypeError::new(format!("malformed type '{}'", s)));
            };
            let template = self.get_str(&s[..open], stubs)?;
            let mut params = Vec::new();
            for part in split_params(body) {
                params.push(self.get_str(part, stubs)?);
            }
            return self.apply(template, &params);
        }
        if let Some(&id) = stubs.get(s) {
            return Ok(id);
        }
        self.lookup(s)
            .ok_or_else(|| TypeError::new(format!("unknown type '{}'", s)))
    }

    /// Resolve an AST type reference, attaching positions to failures.
    pub fn get_ast(
        &mut self,
        ty: &ast::TypeRef,
        stubs: &IndexMap<String, TypeId>,
    ) -> Result<TypeId, Diagnostic> {
        match &ty.kind {
            TypeRefKind::Name(name) => {
                if let Some(&id) = stubs.get(name.as_str()) {
                    return Ok(id);
                }
                self.lookup(name)
                    .ok_or_else(|| Diagnostic::new(ty.span, format!("unknown type '{}'", name)))
            }
            TypeRefKind::Owner(inner) => {
                let t = self.get_ast(inner, stubs)?;
                Ok(self.owner(t))
            }
            TypeRefKind::Ref(inner) => {
                let t = self.get_ast(inner, stubs)?;
                Ok(self.ref_(t))
            }
            TypeRefKind::Opt(inner) => {
                let t = self.get_ast(inner, stubs)?;
                Ok(self.opt(t))
            }
            TypeRefKind::Elem { name, args } => {
                let template = self
                    .lookup(name)
                    .ok_or_else(|| Diagnostic::new(ty.span, format!("unknown type '{}'", name)))?;
                let mut params = Vec::new();
                for arg in args {
                    params.push(self.get_ast(arg, stubs)?);
                }
                self.apply(template, &params)
                    .map_err(|e| Diagnostic::new(ty.span, e.message))
            }
        }
    }

    // ─── two-phase registration ──────────────────────────────────────

    /// Phase one: insert a skeleton so mutually-referential types can
    /// resolve during `fill`.
    pub fn add(&mut self, decl: &TypeDecl<'_>) -> Result<TypeId, Diagnostic> {
        let name = decl.name();
        if self.lookup(name).is_some() {
            return Err(Diagnostic::new(
                decl.name_span(),
                format!("type '{}' already defined", name),
            ));
        }
        let kind = match decl {
            TypeDecl::Trait(_) => TypeKind::Trait { filled: false },
            TypeDecl::Class(c) if !c.params.is_empty() => TypeKind::Template {
                params: c.params.clone(),
            },
            TypeDecl::Class(_) => TypeKind::Record { filled: false },
        };
        Ok(self.register(name, kind, false))
    }

    /// Phase two: populate attributes and methods.
    ///
    /// Must be called exactly once per added declaration.
    pub fn fill(&mut self, decl: &TypeDecl<'_>) -> Result<TypeId, Diagnostic> {
        let id = self
            .lookup(decl.name())
            .unwrap_or_else(|| panic!("fill before add for '{}'", decl.name()));

        match decl {
            TypeDecl::Class(class) => self.fill_class(id, class)?,
            TypeDecl::Trait(tr) => self.fill_trait(id, tr)?,
        }
        Ok(id)
    }

    fn fill_class(&mut self, id: TypeId, class: &ast::ClassDecl) -> Result<(), Diagnostic> {
        let params = match self.kind(id) {
            TypeKind::Record { filled } => {
                debug_assert!(!*filled, "fill called twice for '{}'", class.name);
                Vec::new()
            }
            TypeKind::Template { params } => params.clone(),
            other => panic!("fill on non-record kind {:?}", other),
        };

        let mut stubs = IndexMap::new();
        for param in &params {
            let stub = self.fresh(param, TypeKind::Stub(param.clone()));
            stubs.insert(param.clone(), stub);
        }

        for attrib in &class.attribs {
            let ty = self.get_ast(&attrib.ty, &stubs)?;
            self.entry_mut(id).attribs.insert(attrib.name.clone(), ty);
        }

        for method in &class.methods {
            let sig = self.realize_method(id, &class.name, method, &stubs)?;
            self.add_method(id, sig);
        }

        if let TypeKind::Record { filled } = &mut self.entry_mut(id).kind {
            *filled = true;
        }
        Ok(())
    }

    fn fill_trait(&mut self, id: TypeId, tr: &ast::TraitDecl) -> Result<(), Diagnostic> {
        for method in &tr.methods {
            let sig = self.realize_method(id, &tr.name, method, &IndexMap::new())?;
            let slot = self.entry_mut(id).methods.entry(method.name.clone()).or_default();
            if !slot.is_empty() {
                return Err(Diagnostic::new(
                    method.name_span,
                    format!("trait method '{}' declared twice", method.name),
                ));
            }
            slot.push(sig);
        }
        if let TypeKind::Trait { filled } = &mut self.entry_mut(id).kind {
            *filled = true;
        }
        Ok(())
    }

    /// Insert a method overload, disambiguating the symbol when the
    /// name is already taken. Integer methods are mirrored into
    /// `anyint` so literal receivers resolve.
    pub fn add_method(&mut self, id: TypeId, mut sig: FunctionSig) {
        let method_name = method_name_of(&sig.symbol);
        let taken = self
            .entry(id)
            .methods
            .get(&method_name)
            .is_some_and(|list| !list.is_empty());
        if taken {
            let suffix = self.overload_suffix(&sig);
            sig.symbol = format!("{}${}", sig.symbol, suffix);
        }

        let mirror = self.ints.contains(&id);
        self.entry_mut(id)
            .methods
            .entry(method_name.clone())
            .or_default()
            .push(sig.clone());

        if mirror {
            let anyint = self.anyint();
            self.entry_mut(anyint)
                .methods
                .entry(method_name)
                .or_default()
                .push(sig);
        }
    }

    fn overload_suffix(&self, sig: &FunctionSig) -> String {
        sig.formals
            .iter()
            .skip(1)
            .map(|(_, t)| self.name(*t).to_string())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Convert a method declaration into a typed signature.
    ///
    /// The receiver is wrapped as `$Self` for destructors and `&Self`
    /// otherwise; `__init__` must return void.
    fn realize_method(
        &mut self,
        self_id: TypeId,
        type_name: &str,
        method: &ast::FunctionDecl,
        stubs: &IndexMap<String, TypeId>,
    ) -> Result<FunctionSig, Diagnostic> {
        let kind = match method.name.as_str() {
            "__init__" => MethodKind::Init,
            "__del__" => MethodKind::Del,
            _ => MethodKind::Plain,
        };

        let ret = match &method.rtype {
            None => self.void(),
            Some(ty) => self.get_ast(ty, stubs)?,
        };
        if kind == MethodKind::Init && ret != self.void() {
            let span = method.rtype.as_ref().map(|t| t.span).unwrap_or(method.name_span);
            return Err(Diagnostic::new(
                span,
                "__init__() method return type must be 'void'",
            ));
        }

        let mut formals = Vec::new();
        for (i, arg) in method.args.iter().enumerate() {
            if i == 0 && arg.name == "self" {
                let receiver = if kind == MethodKind::Del {
                    self.owner(self_id)
                } else {
                    self.ref_(self_id)
                };
                formals.push(("self".to_string(), receiver));
                continue;
            }
            let Some(ty) = &arg.ty else {
                return Err(Diagnostic::new(
                    arg.span,
                    format!("missing type for argument '{}'", arg.name),
                ));
            };
            let ty = self.get_ast(ty, stubs)?;
            formals.push((arg.name.clone(), ty));
        }

        Ok(FunctionSig {
            symbol: format!("{}.{}", type_name, method.name),
            ret,
            formals,
            kind,
        })
    }

    /// Convert a free-function declaration into a typed signature.
    pub fn realize(&mut self, decl: &ast::FunctionDecl) -> Result<FunctionSig, Diagnostic> {
        let ret = match &decl.rtype {
            None => self.void(),
            Some(ty) => self.get_ast(ty, &IndexMap::new())?,
        };
        let mut formals = Vec::new();
        for arg in &decl.args {
            let Some(ty) = &arg.ty else {
                return Err(Diagnostic::new(
                    arg.span,
                    format!("missing type for argument '{}'", arg.name),
                ));
            };
            let ty = self.get_ast(ty, &IndexMap::new())?;
            formals.push((arg.name.clone(), ty));
        }
        Ok(FunctionSig {
            symbol: decl.name.clone(),
            ret,
            formals,
            kind: MethodKind::Plain,
        })
    }

    // ─── template instantiation ──────────────────────────────────────

    /// Instantiate a template at fixed parameters, memoized on the
    /// printed name `Name[p, ...]`.
    pub fn apply(&mut self, template: TypeId, params: &[TypeId]) -> Result<TypeId, TypeError> {
        let tparams = match self.kind(template) {
            TypeKind::Template { params } => params.clone(),
            _ => {
                return Err(TypeError::new(format!(
                    "'{}' is not a template type",
                    self.name(template)
                )));
            }
        };
        if tparams.len() != params.len() {
            return Err(TypeError::new(format!(
                "'{}' takes {} type parameters ({} given)",
                self.name(template),
                tparams.len(),
                params.len()
            )));
        }

        let tname = self.name(template).to_string();
        let param_names: Vec<String> = params.iter().map(|t| self.name(*t).to_string()).collect();
        let name = format!("{}[{}]", tname, param_names.join(", "));
        if let Some(id) = self.lookup(&name) {
            return Ok(id);
        }

        let symbol = format!("{}${}", tname, param_names.join("."));
        let trans: IndexMap<String, TypeId> = tparams
            .iter()
            .cloned()
            .zip(params.iter().copied())
            .collect();

        let id = self.register(
            &name,
            TypeKind::Concrete {
                template: Some(template),
                params: params.to_vec(),
                symbol: symbol.clone(),
            },
            false,
        );

        let attribs: Vec<(String, TypeId)> = self
            .entry(template)
            .attribs
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        for (attr_name, attr_ty) in attribs {
            let substituted = self.substitute(attr_ty, &trans);
            self.entry_mut(id).attribs.insert(attr_name, substituted);
        }

        let methods: Vec<FunctionSig> = self
            .entry(template)
            .methods
            .values()
            .flatten()
            .cloned()
            .collect();
        for mut sig in methods {
            let receiver = if sig.kind == MethodKind::Del {
                self.owner(id)
            } else {
                self.ref_(id)
            };
            if let Some(first) = sig.formals.first_mut() {
                first.1 = receiver;
            }
            if sig.ret == template {
                sig.ret = id;
            }
            if let Some(rest) = sig.symbol.strip_prefix(tname.as_str()) {
                sig.symbol = format!("{}{}", symbol, rest);
            }
            let method_name = method_name_of(&sig.symbol);
            self.entry_mut(id)
                .methods
                .entry(method_name)
                .or_default()
                .push(sig);
        }

        Ok(id)
    }

    /// Rewrite `Stub` leaves to actual parameters, through wrappers.
    fn substitute(&mut self, ty: TypeId, trans: &IndexMap<String, TypeId>) -> TypeId {
        match self.kind(ty).clone() {
            TypeKind::Stub(name) => *trans.get(&name).unwrap_or(&ty),
            TypeKind::Owner(t) => {
                let inner = self.substitute(t, trans);
                self.owner(inner)
            }
            TypeKind::Ref(t) => {
                let inner = self.substitute(t, trans);
                self.ref_(inner)
            }
            TypeKind::Opt(t) => {
                let inner = self.substitute(t, trans);
                self.opt(inner)
            }
            _ => ty,
        }
    }

    /// Intern a tuple as a concrete record with fields `v0, v1, ...`.
    pub fn build_tuple(&mut self, params: &[TypeId]) -> TypeId {
        let names: Vec<String> = params.iter().map(|t| self.name(*t).to_string()).collect();
        let name = format!("({})", names.join(", "));
        if let Some(id) = self.lookup(&name) {
            return id;
        }
        let symbol = format!("tuple${}", names.join("."));
        let id = self.register(
            &name,
            TypeKind::Concrete {
                template: None,
                params: params.to_vec(),
                symbol,
            },
            false,
        );
        for (i, &param) in params.iter().enumerate() {
            self.entry_mut(id).attribs.insert(format!("v{}", i), param);
        }
        id
    }

    // ─── overload selection ──────────────────────────────────────────

    /// Pick the unique viable overload of `name` on `receiver` for the
    /// actual argument types (receiver included).
    ///
    /// Scoring per parameter: +10 exact, +1 compatible, short-circuit
    /// on incompatible. Non-positive candidates are discarded; of the
    /// survivors the highest total must be unique.
    pub fn select(
        &self,
        receiver: TypeId,
        name: &str,
        actuals: &[TypeId],
    ) -> Result<FunctionSig, SelectError> {
        let base = self.unwrap(receiver);
        let table = &self.entry(base).methods;

        let mut candidates: Vec<&FunctionSig> =
            table.get(name).map(|v| v.iter().collect()).unwrap_or_default();
        if name == "__init__" {
            if let Some(extra) = table.get("__new__") {
                candidates.extend(extra.iter());
            }
        }
        if candidates.is_empty() {
            return Err(SelectError::NoMatch {
                name: format!("{}.{}", self.name(base), name),
                tried: Vec::new(),
            });
        }

        let mut scored: Vec<(i32, &FunctionSig)> = Vec::new();
        for sig in &candidates {
            let formals = sig.formal_types();
            if !arity_matches(self, &formals, actuals.len()) {
                continue;
            }
            let mut score = 0i32;
            let mut viable = true;
            for (i, &actual) in actuals.iter().enumerate() {
                let formal = formals[i.min(formals.len() - 1)];
                if actual == formal {
                    score += 10;
                } else if self.compat(actual, formal) {
                    score += 1;
                } else {
                    viable = false;
                    break;
                }
            }
            if viable && score > 0 {
                scored.push((score, sig));
            }
        }

        let describe = |sigs: &[&FunctionSig]| {
            sigs.iter().map(|s| self.describe_sig(s)).collect::<Vec<_>>()
        };

        match scored.len() {
            0 => Err(SelectError::NoMatch {
                name: format!("{}.{}", self.name(base), name),
                tried: describe(&candidates),
            }),
            1 => Ok(scored[0].1.clone()),
            _ => {
                let best = scored.iter().map(|(s, _)| *s).max().unwrap_or(0);
                let mut winners: Vec<&FunctionSig> = scored
                    .iter()
                    .filter(|(s, _)| *s == best)
                    .map(|(_, sig)| *sig)
                    .collect();
                if winners.len() == 1 {
                    return Ok(winners.remove(0).clone());
                }
                Err(SelectError::Ambiguous {
                    name: format!("{}.{}", self.name(base), name),
                    candidates: describe(&winners),
                })
            }
        }
    }

    fn describe_sig(&self, sig: &FunctionSig) -> String {
        format!(
            "({})",
            sig.formals
                .iter()
                .skip(1)
                .map(|(_, t)| self.display_name(*t).to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }

    // ─── compatibility ───────────────────────────────────────────────

    pub fn compat(&self, actual: TypeId, formal: TypeId) -> bool {
        self.compat_at(actual, formal, false)
    }

    pub fn compat_strict(&self, actual: TypeId, formal: TypeId) -> bool {
        self.compat_at(actual, formal, true)
    }

    /// Elementwise compatibility of argument lists; a trailing varargs
    /// formal absorbs any remaining actuals.
    pub fn compat_args(&self, actuals: &[TypeId], formals: &[TypeId]) -> bool {
        let varargs = formals
            .last()
            .is_some_and(|&f| matches!(self.kind(f), TypeKind::VarArgs));
        if varargs {
            if actuals.len() < formals.len() - 1 {
                return false;
            }
            return actuals
                .iter()
                .zip(&formals[..formals.len() - 1])
                .all(|(&a, &f)| self.compat(a, f));
        }
        actuals.len() == formals.len()
            && actuals.iter().zip(formals).all(|(&a, &f)| self.compat(a, f))
    }

    fn compat_at(&self, a: TypeId, f: TypeId, strict: bool) -> bool {
        if a == f {
            return true;
        }

        if matches!(self.kind(f), TypeKind::VarArgs) {
            return true;
        }
        if matches!(self.kind(a), TypeKind::AnyInt) && self.ints.contains(&f) {
            return true;
        }
        if matches!(self.kind(a), TypeKind::AnyFloat) && matches!(self.kind(f), TypeKind::Float) {
            return true;
        }
        // Ownership cannot be conjured from a borrow.
        if matches!(self.kind(a), TypeKind::Ref(_)) && matches!(self.kind(f), TypeKind::Owner(_)) {
            return false;
        }
        if let TypeKind::Opt(inner) = self.kind(f) {
            if self.compat_at(a, *inner, strict) {
                return true;
            }
        }

        let wrapped_a = self.is_wrapper(a);
        let wrapped_f = self.is_wrapper(f);
        if wrapped_a || wrapped_f {
            if strict {
                if wrapped_a && wrapped_f && same_wrapper(self.kind(a), self.kind(f)) {
                    return self.compat_at(self.unwrap_one(a), self.unwrap_one(f), true);
                }
                return false;
            }
            return self.compat_at(self.unwrap(a), self.unwrap(f), false);
        }

        if self.uints.contains(&a) && self.uints.contains(&f) {
            return int_bits(self.kind(a)) < int_bits(self.kind(f));
        }

        if matches!(self.kind(f), TypeKind::Trait { .. }) {
            return self.trait_compat(a, f);
        }

        if let (
            TypeKind::Concrete {
                template: ta,
                params: pa,
                ..
            },
            TypeKind::Concrete {
                template: tf,
                params: pf,
                ..
            },
        ) = (self.kind(a), self.kind(f))
        {
            return ta == tf
                && pa.len() == pf.len()
                && pa.iter().zip(pf).all(|(&x, &y)| self.compat_strict(x, y));
        }

        false
    }

    /// Every trait method must exist on the actual with a compatible
    /// return type and an identical argument-tuple set after stripping
    /// the receiver.
    fn trait_compat(&self, a: TypeId, tr: TypeId) -> bool {
        for (mname, tsigs) in &self.entry(tr).methods {
            let tsig = &tsigs[0];
            let Some(asigs) = self.entry(a).methods.get(mname) else {
                return false;
            };
            if asigs.len() != 1 {
                return false;
            }
            let asig = &asigs[0];
            let atuple: Vec<TypeId> = asig.formals.iter().skip(1).map(|(_, t)| *t).collect();
            let ttuple: Vec<TypeId> = tsig.formals.iter().skip(1).map(|(_, t)| *t).collect();
            if atuple != ttuple {
                return false;
            }
            if !self.compat(asig.ret, tsig.ret) {
                return false;
            }
        }
        true
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn arity_matches(reg: &TypeRegistry, formals: &[TypeId], nactuals: usize) -> bool {
    let varargs = formals
        .last()
        .is_some_and(|&f| matches!(reg.kind(f), TypeKind::VarArgs));
    if varargs {
        nactuals >= formals.len() - 1
    } else {
        nactuals == formals.len()
    }
}

fn same_wrapper(a: &TypeKind, b: &TypeKind) -> bool {
    matches!(
        (a, b),
        (TypeKind::Owner(_), TypeKind::Owner(_))
            | (TypeKind::Ref(_), TypeKind::Ref(_))
            | (TypeKind::Opt(_), TypeKind::Opt(_))
    )
}

fn int_bits(kind: &TypeKind) -> u8 {
    match kind {
        TypeKind::Int { bits, .. } => *bits,
        _ => 0,
    }
}

/// The unqualified method name of a mangled symbol.
fn method_name_of(symbol: &str) -> String {
    let base = symbol.split('$').next().unwrap_or(symbol);
    base.rsplit('.').next().unwrap_or(base).to_string()
}

/// Split `a, b[c, d], e` at top-level commas.
fn split_params(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '[' | '(' => depth += 1,
            ']' | ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if !s[start..].trim().is_empty() {
        parts.push(&s[start..]);
    }
    parts
}
