//! Whole-module compilation.
//!
//! A [`Module`] owns the type registry, the interned constants, the
//! import references, and the function table, in declaration order.
//! Building runs the passes in sequence: collect declarations (two-phase
//! type registration plus signature realization), lower each body to a
//! flow graph, then run escape analysis. The builtin library and the
//! prelude types are installed before user declarations.

use indexmap::IndexMap;

use crate::ast::{Decl, ExprKind, ModuleAst, Suite};
use crate::diagnostics::{Diagnostic, Span};
use crate::flow::{BlockId, FlowBuilder, FlowGraph, Literal};
use crate::lexer::lex;
use crate::parser::Parser;
use crate::types::{FunctionSig, MethodKind, TypeDecl, TypeId, TypeRegistry};

/// A top-level literal binding.
#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    pub ty: TypeId,
    pub lit: Literal,
}

/// Where an escaping value was observed: block, step index, type.
#[derive(Debug, Clone, PartialEq)]
pub struct EscapeNote {
    pub block: BlockId,
    pub step: usize,
    pub ty: TypeId,
}

/// A declared function: signature, runtime flag, and (after the flow
/// pass) its CFG and escape map. Runtime functions have no body.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub sig: FunctionSig,
    pub rt: bool,
    pub graph: Option<FlowGraph>,
    pub escapes: IndexMap<String, Vec<EscapeNote>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Const,
    Class,
    Trait,
    Fun,
}

/// One compilation unit.
#[derive(Debug)]
pub struct Module {
    pub registry: TypeRegistry,
    /// Imported names resolved to dotted paths.
    pub refs: IndexMap<String, String>,
    pub constants: IndexMap<String, Constant>,
    /// Functions keyed by mangled symbol (`name` or `Type.method`).
    pub functions: IndexMap<String, FunctionDef>,
    /// Declarations in source order, for deterministic iteration.
    pub order: Vec<(DeclKind, String)>,
}

/// Builtin types the registry carries before user declarations.
const PRELUDE: &str = "\
trait IStr:
    def __str__(self) -> $str:
        pass

trait IBool:
    def __bool__(self) -> bool:
        pass

class str:
    def __str__(self) -> $str:
        pass

class file:
    pass

class intiter:
    def __next__(self) -> int:
        pass
";

/// Runtime-provided functions: name, emitted symbol, return type,
/// arguments. Their bodies are never built.
const LIBRARY: &[(&str, &str, &str, &[(&str, &str)])] = &[
    ("print", "print", "void", &[("s", "IStr")]),
    ("str", "str", "$str", &[("v", "IStr")]),
    ("bool", "bool", "bool", &[("v", "IBool")]),
    (
        "range",
        "range",
        "intiter",
        &[("start", "int"), ("stop", "int"), ("step", "int")],
    ),
    ("open", "fopen", "file", &[("fn", "&str")]),
    ("strtoi", "strtoi", "int", &[("s", "&str")]),
    ("runa.malloc", "runa.malloc", "$byte", &[("size", "uint")]),
    ("runa.free", "runa.free", "void", &[("ptr", "$byte")]),
];

impl Module {
    /// An empty module with the prelude types and runtime library
    /// installed.
    pub fn new() -> crate::Result<Self> {
        let mut registry = TypeRegistry::new();
        install_prelude(&mut registry)?;

        let mut module = Self {
            registry,
            refs: IndexMap::new(),
            constants: IndexMap::new(),
            functions: IndexMap::new(),
            order: Vec::new(),
        };
        module.install_library()?;
        Ok(module)
    }

    /// Run every pass over a parsed unit.
    pub fn build(ast: &ModuleAst) -> crate::Result<Self> {
        Self::build_until(ast, "escapes")
    }

    /// Run passes up to and including `last` (`module`, `flow`, or
    /// `escapes`).
    pub fn build_until(ast: &ModuleAst, last: &str) -> crate::Result<Self> {
        let mut module = Self::new()?;
        let bodies = module.collect(ast)?;
        if last == "module" {
            return Ok(module);
        }
        module.build_flow(&bodies)?;
        if last == "flow" {
            return Ok(module);
        }
        crate::escape::escapes(&module.registry, &mut module.functions);
        Ok(module)
    }

    fn install_library(&mut self) -> crate::Result<()> {
        for (name, symbol, ret, args) in LIBRARY {
            let ret = self
                .registry
                .get_str(ret, &IndexMap::new())
                .map_err(|e| Diagnostic::new(Span::default(), e.message))?;
            let mut formals = Vec::new();
            for (arg_name, arg_ty) in *args {
                let ty = self
                    .registry
                    .get_str(arg_ty, &IndexMap::new())
                    .map_err(|e| Diagnostic::new(Span::default(), e.message))?;
                formals.push((arg_name.to_string(), ty));
            }
            let sig = FunctionSig {
                symbol: symbol.to_string(),
                ret,
                formals,
                kind: MethodKind::Plain,
            };
            self.functions.insert(
                name.to_string(),
                FunctionDef {
                    name: name.to_string(),
                    sig,
                    rt: true,
                    graph: None,
                    escapes: IndexMap::new(),
                },
            );
        }
        Ok(())
    }

    /// The module pass: imports, constants, two-phase type
    /// registration, and signature realization. Returns each built
    /// function's body keyed by function-table symbol.
    fn collect<'a>(&mut self, ast: &'a ModuleAst) -> crate::Result<Vec<(String, &'a Suite)>> {
        for decl in &ast.decls {
            match decl {
                Decl::Import(imp) => {
                    for name in &imp.names {
                        self.refs
                            .insert(name.clone(), format!("{}.{}", imp.base, name));
                    }
                }
                Decl::Const(konst) => {
                    let (ty, lit) = self.literal(&konst.value)?;
                    self.constants
                        .insert(konst.name.clone(), Constant { ty, lit });
                    self.order.push((DeclKind::Const, konst.name.clone()));
                }
                Decl::Class(class) => {
                    self.registry.add(&TypeDecl::Class(class))?;
                    self.order.push((DeclKind::Class, class.name.clone()));
                    for method in &class.methods {
                        self.order.push((
                            DeclKind::Fun,
                            format!("{}.{}", class.name, method.name),
                        ));
                    }
                }
                Decl::Trait(tr) => {
                    self.registry.add(&TypeDecl::Trait(tr))?;
                    self.order.push((DeclKind::Trait, tr.name.clone()));
                }
                Decl::Function(fun) => {
                    self.order.push((DeclKind::Fun, fun.name.clone()));
                }
            }
        }

        for decl in &ast.decls {
            match decl {
                Decl::Class(class) => {
                    self.registry.fill(&TypeDecl::Class(class))?;
                }
                Decl::Trait(tr) => {
                    self.registry.fill(&TypeDecl::Trait(tr))?;
                }
                _ => {}
            }
        }

        let mut bodies = Vec::new();
        for decl in &ast.decls {
            match decl {
                Decl::Function(fun) => {
                    let sig = self.registry.realize(fun)?;
                    let key = sig.symbol.clone();
                    if self.functions.contains_key(&key) {
                        return Err(Diagnostic::new(
                            fun.name_span,
                            format!("function '{}' already defined", fun.name),
                        )
                        .into());
                    }
                    self.functions.insert(
                        key.clone(),
                        FunctionDef {
                            name: fun.name.clone(),
                            sig,
                            rt: false,
                            graph: None,
                            escapes: IndexMap::new(),
                        },
                    );
                    bodies.push((key, &fun.body));
                }
                Decl::Class(class) => {
                    let tid = self
                        .registry
                        .lookup(&class.name)
                        .expect("class was registered in the first pass");
                    // Overloads land in the method table in declaration
                    // order; pair each declaration with its entry.
                    let mut counters: IndexMap<&str, usize> = IndexMap::new();
                    for method in &class.methods {
                        let slot = counters.entry(method.name.as_str()).or_insert(0);
                        let idx = *slot;
                        *slot += 1;
                        let sig = self.registry.entry(tid).methods[method.name.as_str()][idx]
                            .clone();
                        let key = sig.symbol.clone();
                        self.functions.insert(
                            key.clone(),
                            FunctionDef {
                                name: key.clone(),
                                sig,
                                rt: false,
                                graph: None,
                                escapes: IndexMap::new(),
                            },
                        );
                        bodies.push((key, &method.body));
                    }
                }
                _ => {}
            }
        }
        Ok(bodies)
    }

    /// The flow pass: lower every collected body.
    fn build_flow(&mut self, bodies: &[(String, &Suite)]) -> crate::Result<()> {
        let mut graphs: Vec<(String, FlowGraph)> = Vec::new();
        {
            let Self {
                registry,
                functions,
                constants,
                ..
            } = self;
            for (key, body) in bodies {
                let sig = functions
                    .get(key.as_str())
                    .expect("function was realized in the module pass")
                    .sig
                    .clone();
                let builder = FlowBuilder::new(&mut *registry, &*functions, &*constants);
                let graph = builder.build(&sig, body)?;
                graphs.push((key.clone(), graph));
            }
        }
        for (key, graph) in graphs {
            if let Some(fun) = self.functions.get_mut(&key) {
                fun.graph = Some(graph);
            }
        }
        Ok(())
    }

    fn literal(&mut self, expr: &crate::ast::Expr) -> Result<(TypeId, Literal), Diagnostic> {
        match &expr.kind {
            ExprKind::Bool(b) => Ok((self.registry.bool_(), Literal::Bool(*b))),
            ExprKind::Int(i) => Ok((self.registry.anyint(), Literal::Int(*i))),
            ExprKind::Float(f) => Ok((self.registry.anyfloat(), Literal::Float(*f))),
            ExprKind::Str(s) => {
                let ty = self
                    .registry
                    .get_str("&str", &IndexMap::new())
                    .map_err(|e| Diagnostic::new(expr.span, e.message))?;
                Ok((ty, Literal::Str(s.clone())))
            }
            _ => Err(Diagnostic::new(
                expr.span,
                "constant initializer must be a literal",
            )),
        }
    }
}

/// Register and fill the prelude types, then attach the integer and
/// boolean conversion methods (mirrored into `anyint` for literals).
fn install_prelude(registry: &mut TypeRegistry) -> crate::Result<()> {
    let tokens = lex(PRELUDE).expect("the prelude lexes");
    let ast = Parser::new(PRELUDE, tokens)
        .parse()
        .expect("the prelude parses");

    let decls: Vec<TypeDecl<'_>> = ast
        .decls
        .iter()
        .filter_map(|d| match d {
            Decl::Class(c) => Some(TypeDecl::Class(c)),
            Decl::Trait(t) => Some(TypeDecl::Trait(t)),
            _ => None,
        })
        .collect();
    for decl in &decls {
        registry.add(decl)?;
    }
    for decl in &decls {
        registry.fill(decl)?;
    }

    let str_ = registry.lookup("str").expect("prelude declares str");
    let owner_str = registry.owner(str_);
    let bool_ = registry.bool_();
    for int_name in ["int", "bool"] {
        let tid = registry.lookup(int_name).expect("pre-registered");
        let receiver = registry.ref_(tid);
        registry.add_method(
            tid,
            FunctionSig {
                symbol: format!("{}.__str__", int_name),
                ret: owner_str,
                formals: vec![("self".to_string(), receiver)],
                kind: MethodKind::Plain,
            },
        );
        registry.add_method(
            tid,
            FunctionSig {
                symbol: format!("{}.__bool__", int_name),
                ret: bool_,
                formals: vec![("self".to_string(), receiver)],
                kind: MethodKind::Plain,
            },
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    fn parse(source: &str) -> ModuleAst {
        let tokens = lex(source).expect("lex should succeed");
        Parser::new(source, tokens)
            .parse()
            .expect("parse should succeed")
    }

    #[test]
    fn library_functions_are_runtime() {
        let module = Module::new().expect("module setup");
        for name in ["print", "str", "bool", "range", "open", "strtoi"] {
            let fun = &module.functions[name];
            assert!(fun.rt, "{} should be a runtime function", name);
            assert!(fun.graph.is_none());
        }
        assert_eq!(module.functions["open"].sig.symbol, "fopen");
        assert!(module.functions.contains_key("runa.malloc"));
        assert!(module.functions.contains_key("runa.free"));
    }

    #[test]
    fn anyint_carries_the_integer_conversions() {
        let module = Module::new().expect("module setup");
        let anyint = module.registry.anyint();
        let istr = module.registry.lookup("IStr").unwrap();
        let ibool = module.registry.lookup("IBool").unwrap();
        assert!(module.registry.compat(anyint, istr));
        assert!(module.registry.compat(anyint, ibool));
    }

    #[test]
    fn declarations_collect_in_order() {
        let src = indoc! {"
            LIMIT = 10

            class Point:
                x: int
                y: int

                def norm(self) -> int:
                    return self.x * self.x + self.y * self.y

            def main() -> int:
                return 0
        "};
        let module = Module::build(&parse(src)).expect("build should succeed");
        assert_eq!(
            module.order,
            vec![
                (DeclKind::Const, "LIMIT".to_string()),
                (DeclKind::Class, "Point".to_string()),
                (DeclKind::Fun, "Point.norm".to_string()),
                (DeclKind::Fun, "main".to_string()),
            ]
        );
        assert!(module.functions.contains_key("Point.norm"));
        assert!(module.functions["Point.norm"].graph.is_some());
    }

    #[test]
    fn imports_resolve_to_dotted_paths() {
        let src = "from os.path import join, split\n";
        let module = Module::build(&parse(src)).expect("build should succeed");
        assert_eq!(module.refs["join"], "os.path.join");
        assert_eq!(module.refs["split"], "os.path.split");
    }

    #[test]
    fn constants_bind_in_every_function() {
        let src = indoc! {"
            LIMIT = 10

            def main() -> int:
                return LIMIT
        "};
        let module = Module::build(&parse(src)).expect("build should succeed");
        let graph = module.functions["main"].graph.as_ref().unwrap();
        assert!(graph.block(0).defined.contains_key("LIMIT"));
    }

    #[test]
    fn duplicate_functions_are_rejected() {
        let src = "def f() -> int: return 0\ndef f() -> int: return 1\n";
        let err = Module::build(&parse(src)).unwrap_err();
        assert!(err.to_string().contains("already defined"));
    }

    #[test]
    fn non_literal_constant_is_rejected() {
        let src = "X = 1 + 2\n";
        let err = Module::build(&parse(src)).unwrap_err();
        assert!(err.to_string().contains("must be a literal"));
    }
}
