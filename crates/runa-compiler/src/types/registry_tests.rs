//! Tests for type interning, compatibility, templates, and selection.

use indexmap::IndexMap;
use indoc::indoc;

use crate::ast::{Decl, ModuleAst};
use crate::lexer::lex;
use crate::parser::Parser;
use crate::types::{TypeDecl, TypeKind, TypeRegistry};

fn parse_module(source: &str) -> ModuleAst {
    let tokens = lex(source).expect("lex should succeed");
    Parser::new(source, tokens).parse().expect("parse should succeed")
}

/// Two-phase registration of every type declaration in `module`.
fn load(reg: &mut TypeRegistry, module: &ModuleAst) {
    let decls: Vec<TypeDecl<'_>> = module
        .decls
        .iter()
        .filter_map(|d| match d {
            Decl::Class(c) => Some(TypeDecl::Class(c)),
            Decl::Trait(t) => Some(TypeDecl::Trait(t)),
            _ => None,
        })
        .collect();
    for decl in &decls {
        reg.add(decl).expect("add should succeed");
    }
    for decl in &decls {
        reg.fill(decl).expect("fill should succeed");
    }
}

fn no_stubs() -> IndexMap<String, crate::types::TypeId> {
    IndexMap::new()
}

#[test]
fn compat_is_reflexive_for_every_registered_type() {
    let reg = TypeRegistry::new();
    for id in reg.named_ids() {
        assert!(reg.compat(id, id), "compat({0}, {0}) failed", reg.name(id));
        assert!(
            reg.compat_strict(id, id),
            "strict compat({0}, {0}) failed",
            reg.name(id)
        );
    }
}

#[test]
fn anyint_is_compatible_with_registered_integers() {
    let reg = TypeRegistry::new();
    let anyint = reg.anyint();
    for name in ["byte", "i32", "u32", "int", "uint"] {
        let id = reg.lookup(name).unwrap();
        assert!(reg.compat(anyint, id), "anyint vs {}", name);
    }
    let float = reg.lookup("float").unwrap();
    assert!(!reg.compat(anyint, float));
}

#[test]
fn ownership_cannot_be_conjured_from_a_borrow() {
    let mut reg = TypeRegistry::new();
    let int = reg.lookup("int").unwrap();
    let r = reg.ref_(int);
    let o = reg.owner(int);
    assert!(!reg.compat(r, o));
    // The other direction peels the wrapper.
    assert!(reg.compat(o, r));
}

#[test]
fn opt_accepts_the_wrapped_type() {
    let mut reg = TypeRegistry::new();
    let int = reg.lookup("int").unwrap();
    let opt = reg.opt(int);
    assert!(reg.compat(int, opt));
    // The opt wrapper peels in lenient mode, so the reverse also holds.
    assert!(reg.compat(opt, int));
    let bool_ = reg.bool_();
    assert!(!reg.compat(bool_, opt));
}

#[test]
fn wrappers_peel_in_lenient_mode_only() {
    let mut reg = TypeRegistry::new();
    let int = reg.lookup("int").unwrap();
    let r = reg.ref_(int);
    assert!(reg.compat(r, int));
    assert!(reg.compat(int, r));
    assert!(!reg.compat_strict(r, int));
    assert!(!reg.compat_strict(int, r));
    assert!(reg.compat_strict(r, r));
}

#[test]
fn unsigned_integers_only_widen() {
    let reg = TypeRegistry::new();
    let byte = reg.lookup("byte").unwrap();
    let u32_ = reg.lookup("u32").unwrap();
    let uint = reg.lookup("uint").unwrap();
    assert!(reg.compat(byte, u32_));
    assert!(reg.compat(byte, uint));
    assert!(reg.compat(u32_, uint));
    assert!(!reg.compat(uint, u32_));
    assert!(!reg.compat(u32_, byte));
}

#[test]
fn varargs_absorbs_trailing_actuals() {
    let mut reg = TypeRegistry::new();
    let int = reg.lookup("int").unwrap();
    let varargs = reg.varargs();
    let formals = vec![int, varargs];
    assert!(reg.compat_args(&[int], &formals));
    assert!(reg.compat_args(&[int, int, int], &formals));
    let bool_ = reg.bool_();
    assert!(!reg.compat_args(&[bool_, int], &formals));
    assert!(!reg.compat_args(&[], &formals));
}

#[test]
fn textual_descriptors_resolve() {
    let mut reg = TypeRegistry::new();
    let int = reg.lookup("int").unwrap();

    let owner = reg.get_str("$int", &no_stubs()).unwrap();
    assert!(matches!(reg.kind(owner), TypeKind::Owner(t) if *t == int));
    assert_eq!(reg.name(owner), "$int");

    let opt = reg.get_str("int?", &no_stubs()).unwrap();
    assert!(matches!(reg.kind(opt), TypeKind::Opt(t) if *t == int));

    let wrapped = reg.get_str("$int?", &no_stubs()).unwrap();
    let TypeKind::Owner(inner) = reg.kind(wrapped) else {
        panic!("expected owner outermost");
    };
    assert!(matches!(reg.kind(*inner), TypeKind::Opt(_)));

    assert_eq!(reg.get_str("...", &no_stubs()).unwrap(), reg.varargs());

    let err = reg.get_str("missing", &no_stubs()).unwrap_err();
    assert_eq!(err.message, "unknown type 'missing'");
}

#[test]
fn interning_is_by_printed_name() {
    let mut reg = TypeRegistry::new();
    let int = reg.lookup("int").unwrap();
    let a = reg.owner(int);
    let b = reg.get_str("$int", &no_stubs()).unwrap();
    assert_eq!(a, b);
}

#[test]
fn mutually_referential_records_fill() {
    let src = indoc! {"
        class Node:
            next: &Tree

        class Tree:
            root: &Node
    "};
    let module = parse_module(src);
    let mut reg = TypeRegistry::new();
    load(&mut reg, &module);

    let node = reg.lookup("Node").unwrap();
    let tree = reg.lookup("Tree").unwrap();
    assert!(matches!(reg.kind(node), TypeKind::Record { filled: true }));
    let next = reg.entry(node).attribs["next"];
    assert!(matches!(reg.kind(next), TypeKind::Ref(t) if *t == tree));
}

#[test]
fn template_applies_with_substitution_and_memoizes() {
    let src = indoc! {"
        class List[T]:
            len: uint
            data: $T

            def head(self) -> T:
                pass
    "};
    let module = parse_module(src);
    let mut reg = TypeRegistry::new();
    load(&mut reg, &module);

    let template = reg.lookup("List").unwrap();
    let int = reg.lookup("int").unwrap();
    let concrete = reg.apply(template, &[int]).unwrap();
    assert_eq!(reg.name(concrete), "List[int]");

    let TypeKind::Concrete { symbol, params, .. } = reg.kind(concrete) else {
        panic!("expected a concrete type");
    };
    assert_eq!(symbol, "List$int");
    assert_eq!(params, &[int]);

    // Stub leaves are rewritten, through wrappers.
    let uint = reg.lookup("uint").unwrap();
    assert_eq!(reg.entry(concrete).attribs["len"], uint);
    let data = reg.entry(concrete).attribs["data"];
    assert!(matches!(reg.kind(data), TypeKind::Owner(t) if *t == int));

    // The receiver is rewritten to the concrete type.
    let head = &reg.entry(concrete).methods["head"][0];
    let recv = head.formals[0].1;
    assert!(matches!(reg.kind(recv), TypeKind::Ref(t) if *t == concrete));
    assert_eq!(head.symbol, "List$int.head");

    // Memoized on (name, params).
    assert_eq!(reg.apply(template, &[int]).unwrap(), concrete);
}

#[test]
fn apply_rejects_wrong_parameter_count() {
    let src = "class Pair[A, B]:\n    first: A\n    second: B\n";
    let module = parse_module(src);
    let mut reg = TypeRegistry::new();
    load(&mut reg, &module);

    let template = reg.lookup("Pair").unwrap();
    let int = reg.lookup("int").unwrap();
    let err = reg.apply(template, &[int]).unwrap_err();
    assert_eq!(err.message, "'Pair' takes 2 type parameters (1 given)");
}

#[test]
fn tuples_intern_as_concrete_records() {
    let mut reg = TypeRegistry::new();
    let int = reg.lookup("int").unwrap();
    let bool_ = reg.bool_();
    let tup = reg.build_tuple(&[int, bool_]);
    assert_eq!(reg.name(tup), "(int, bool)");
    assert_eq!(reg.entry(tup).attribs["v0"], int);
    assert_eq!(reg.entry(tup).attribs["v1"], bool_);
    assert_eq!(reg.build_tuple(&[int, bool_]), tup);
}

#[test]
fn select_prefers_the_exact_overload() {
    let src = indoc! {"
        class Vec:
            def push(self, item: int):
                pass
            def push(self, item: byte):
                pass
    "};
    let module = parse_module(src);
    let mut reg = TypeRegistry::new();
    load(&mut reg, &module);

    let vec = reg.lookup("Vec").unwrap();
    let int = reg.lookup("int").unwrap();
    let recv = reg.ref_(vec);

    let chosen = reg.select(vec, "push", &[recv, int]).unwrap();
    assert_eq!(chosen.formals[1].1, int);

    // Overloads sharing a name get disambiguated symbols.
    let overloads = &reg.entry(vec).methods["push"];
    assert_eq!(overloads[0].symbol, "Vec.push");
    assert_eq!(overloads[1].symbol, "Vec.push$byte");
}

#[test]
fn select_reports_no_match_with_candidates() {
    let src = indoc! {"
        class Vec:
            def push(self, item: int):
                pass
    "};
    let module = parse_module(src);
    let mut reg = TypeRegistry::new();
    load(&mut reg, &module);

    let vec = reg.lookup("Vec").unwrap();
    let bool_ = reg.bool_();
    let recv = reg.ref_(vec);
    let err = reg.select(vec, "push", &[recv, bool_]).unwrap_err();
    assert_eq!(
        err.message(),
        "no matching overload for 'Vec.push', tried: (int)"
    );
}

#[test]
fn select_reports_ambiguity_on_tied_scores() {
    let src = indoc! {"
        class Vec:
            def push(self, item: u32):
                pass
            def push(self, item: uint):
                pass
    "};
    let module = parse_module(src);
    let mut reg = TypeRegistry::new();
    load(&mut reg, &module);

    let vec = reg.lookup("Vec").unwrap();
    let byte = reg.lookup("byte").unwrap();
    let recv = reg.ref_(vec);
    // byte widens into both overloads with equal score.
    let err = reg.select(vec, "push", &[recv, byte]).unwrap_err();
    assert!(matches!(
        err,
        crate::types::SelectError::Ambiguous { .. }
    ));
}

#[test]
fn select_is_deterministic_across_argument_orderings() {
    let src = indoc! {"
        class Vec:
            def push(self, item: int):
                pass
            def push(self, item: byte):
                pass
    "};
    let module = parse_module(src);
    let mut reg = TypeRegistry::new();
    load(&mut reg, &module);

    let vec = reg.lookup("Vec").unwrap();
    let byte = reg.lookup("byte").unwrap();
    let recv = reg.ref_(vec);
    for _ in 0..3 {
        let chosen = reg.select(vec, "push", &[recv, byte]).unwrap();
        assert_eq!(chosen.symbol, "Vec.push$byte");
    }
}

#[test]
fn trait_satisfaction_requires_exact_tuples() {
    let src = indoc! {"
        trait IStr:
            def __str__(self) -> $str:
                pass

        class str:
            def __str__(self) -> $str:
                pass

        class Point:
            def __str__(self, pad: int) -> $str:
                pass
    "};
    let module = parse_module(src);
    let mut reg = TypeRegistry::new();
    load(&mut reg, &module);

    let istr = reg.lookup("IStr").unwrap();
    let str_ = reg.lookup("str").unwrap();
    let point = reg.lookup("Point").unwrap();
    assert!(reg.compat(str_, istr));
    // Extra arguments make the tuple set differ.
    assert!(!reg.compat(point, istr));
}

#[test]
fn destructor_receiver_is_owning() {
    let src = indoc! {"
        class Buf:
            def __del__(self):
                pass
            def len(self) -> uint:
                pass
    "};
    let module = parse_module(src);
    let mut reg = TypeRegistry::new();
    load(&mut reg, &module);

    let buf = reg.lookup("Buf").unwrap();
    let del = &reg.entry(buf).methods["__del__"][0];
    assert!(matches!(reg.kind(del.formals[0].1), TypeKind::Owner(t) if *t == buf));
    let len = &reg.entry(buf).methods["len"][0];
    assert!(matches!(reg.kind(len.formals[0].1), TypeKind::Ref(t) if *t == buf));
}

#[test]
fn init_must_return_void() {
    let src = indoc! {"
        class Bad:
            def __init__(self) -> int:
                pass
    "};
    let module = parse_module(src);
    let mut reg = TypeRegistry::new();
    let Decl::Class(class) = &module.decls[0] else {
        panic!("expected a class");
    };
    let decl = TypeDecl::Class(class);
    reg.add(&decl).unwrap();
    let err = reg.fill(&decl).unwrap_err();
    assert_eq!(err.message, "__init__() method return type must be 'void'");
}

#[test]
fn duplicate_type_names_are_rejected() {
    let src = "class Dup:\n    pass\n";
    let module = parse_module(src);
    let Decl::Class(class) = &module.decls[0] else {
        panic!("expected a class");
    };
    let mut reg = TypeRegistry::new();
    let decl = TypeDecl::Class(class);
    reg.add(&decl).unwrap();
    let err = reg.add(&decl).unwrap_err();
    assert_eq!(err.message, "type 'Dup' already defined");
}
