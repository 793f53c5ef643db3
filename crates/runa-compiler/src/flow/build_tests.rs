//! Tests for statement and expression lowering.

use indoc::indoc;

use crate::flow::{FlowGraph, Step, Value};
use crate::module::Module;

fn build(source: &str) -> Module {
    crate::build(source).expect("build should succeed")
}

fn build_err(source: &str) -> String {
    crate::build(source).unwrap_err().to_string()
}

fn graph<'m>(module: &'m Module, name: &str) -> &'m FlowGraph {
    module.functions[name].graph.as_ref().expect("graph built")
}

fn dump(source: &str, name: &str) -> String {
    let module = build(source);
    crate::flow::dump_function(&module.functions[name], &module.registry)
}

#[test]
fn straight_line_body_is_one_block() {
    let src = indoc! {"
        def main() -> int:
            print('hello, world')
            return 0
    "};
    let module = build(src);
    let g = graph(&module, "main");
    assert_eq!(g.blocks.len(), 1);
    let entry = g.block(0);
    assert!(matches!(entry.steps[0], Step::Expr(Value::Call { .. })));
    assert!(matches!(entry.steps[1], Step::Return { value: Some(_) }));
    assert_eq!(g.exits.len(), 1);
}

#[test]
fn arithmetic_lowering_keeps_precedence() {
    let src = "def main() -> int:\n    return 1 + 2 * 3\n";
    let module = build(src);
    let g = graph(&module, "main");
    let Step::Return { value: Some(Value::Math { op, right, .. }) } = &g.block(0).steps[0] else {
        panic!("expected return of a math node");
    };
    assert_eq!(op.name(), "add");
    assert!(matches!(**right, Value::Math { .. }));
}

#[test]
fn ternary_lowers_to_select() {
    let src = indoc! {"
        def main() -> int:
            x = 1 if True else 2
            return x
    "};
    let module = build(src);
    let g = graph(&module, "main");
    let Step::Assign { value, .. } = &g.block(0).steps[0] else {
        panic!("expected assignment");
    };
    assert!(matches!(value, Value::Select { .. }));
}

#[test]
fn if_chain_shape() {
    let src = indoc! {"
        def main() -> int:
            x = 5
            if x < 3: return 1
            elif x < 7: return 2
            else: return 3
    "};
    let module = build(src);
    let g = graph(&module, "main");

    // Entry conditions on block 0, one cond block, three suites; the
    // empty exit block is unreachable and pruned.
    assert_eq!(g.blocks.len(), 5);
    assert_eq!(g.edges[&0], vec![1, 2]);
    assert_eq!(g.edges[&2], vec![3, 4]);
    assert!(g.exits.contains(&1));
    assert!(g.exits.contains(&3));
    assert!(g.exits.contains(&4));
}

#[test]
fn if_chain_dump() {
    let src = indoc! {"
        def main() -> int:
            x = 5
            if x < 3: return 1
            elif x < 7: return 2
            else: return 3
    "};
    insta::assert_snapshot!(dump(src, "main"), @r"
    def main() -> int:
      b0 (entry):
        %x = const 5
        branch lt(%x, const 3) ? b1 : b2
      b1 (if-suite):
        return const 1
      b2 (if-cond):
        branch lt(%x, const 7) ? b3 : b4
      b3 (if-suite):
        return const 2
      b4 (if-suite):
        return const 3
    ");
}

#[test]
fn if_without_else_falls_through_to_exit() {
    let src = indoc! {"
        def main() -> int:
            x = 5
            if x < 3:
                x = 1
            return x
    "};
    let module = build(src);
    let g = graph(&module, "main");
    // Entry, suite, exit.
    assert_eq!(g.blocks.len(), 3);
    assert_eq!(g.edges[&0], vec![1, 2]);
    assert_eq!(g.edges[&1], vec![2]);
    assert!(g.exits.contains(&2));
}

#[test]
fn while_loop_shape() {
    let src = indoc! {"
        def main() -> int:
            a = 0
            while a < 3:
                a = a + 1
            return a
    "};
    let module = build(src);
    let g = graph(&module, "main");
    assert_eq!(g.edges[&0], vec![1]);
    assert_eq!(g.edges[&1], vec![2, 3]);
    assert_eq!(g.edges[&2], vec![1]);
    assert!(g.exits.contains(&3));
    // The loop body's definition of `a` is visible after the loop.
    let Step::Return { value: Some(Value::Reference { name, .. }) } = &g.block(3).steps[0] else {
        panic!("expected return of a reference");
    };
    assert_eq!(name, "a");
}

#[test]
fn for_loop_binds_source_and_calls_next() {
    let src = indoc! {"
        def main() -> int:
            for i in range(0, 10, 1):
                print(str(i))
            return 0
    "};
    let module = build(src);
    let g = graph(&module, "main");

    let entry = g.block(0);
    let Step::Assign { name, value } = &entry.steps[0] else {
        panic!("expected the loop source binding");
    };
    assert_eq!(name, "loop.source");
    assert!(matches!(value, Value::Call { symbol, .. } if symbol == "range"));
    assert!(matches!(entry.steps[1], Step::LoopSetup));

    let header = g.block(1);
    assert!(matches!(header.steps[0], Step::LoopHeader));
    let Step::Assign { name, value } = &header.steps[1] else {
        panic!("expected the loop variable binding");
    };
    assert_eq!(name, "i");
    assert!(matches!(value, Value::Call { symbol, .. } if symbol == "intiter.__next__"));
    assert!(matches!(header.steps[2], Step::CondBranch { .. }));

    // body -> header back edge, header -> exit
    assert_eq!(g.edges[&1], vec![2, 3]);
    assert_eq!(g.edges[&2], vec![1]);
}

#[test]
fn boolean_operators_lower_to_select() {
    let src = indoc! {"
        def check(a: bool, b: bool) -> bool:
            return a and b or not a
    "};
    let module = build(src);
    let g = graph(&module, "check");
    let Step::Return { value: Some(Value::Select { .. }) } = &g.block(0).steps[0] else {
        panic!("expected a select tree");
    };
}

#[test]
fn method_calls_resolve_through_the_receiver() {
    let src = indoc! {"
        class Point:
            x: int
            y: int

            def norm(self) -> int:
                return self.x * self.x + self.y * self.y

        def main() -> int:
            p = Point()
            return p.norm()
    "};
    let module = build(src);
    let g = graph(&module, "main");
    let Step::Return { value: Some(Value::Call { symbol, args, .. }) } = &g.block(0).steps[1]
    else {
        panic!("expected a method call");
    };
    assert_eq!(symbol, "Point.norm");
    assert_eq!(args.len(), 1);
}

#[test]
fn constructor_call_lowers_to_init() {
    let src = indoc! {"
        class Point:
            x: int
            y: int

        def main() -> int:
            p = Point()
            return 0
    "};
    let module = build(src);
    let g = graph(&module, "main");
    let Step::Assign { value, .. } = &g.block(0).steps[0] else {
        panic!("expected assignment");
    };
    let Value::Init { symbol, .. } = value else {
        panic!("expected a constructor");
    };
    assert!(symbol.is_none());
}

#[test]
fn attribute_store_checks_the_field() {
    let src = indoc! {"
        class Point:
            x: int
            y: int

        def main() -> int:
            p = Point()
            p.z = 1
            return 0
    "};
    assert_eq!(build_err(src), "type 'Point' has no attribute 'z'");
}

#[test]
fn unmatched_operand_types_are_positioned() {
    let src = "def main() -> int: return 1 + 'x'\n";
    let err = crate::build(src).unwrap_err();
    assert_eq!(err.to_string(), "unmatched types 'int', '&str'");
    let crate::Error::Compile(diag) = err else {
        panic!("expected a compile diagnostic");
    };
    let (line, col) = diag.span.line_col(src);
    assert_eq!(line, 1);
    assert!(col > 20);
}

#[test]
fn undefined_names_are_reported() {
    assert_eq!(build_err("def f() -> int: return y\n"), "undefined name 'y'");
}

#[test]
fn calling_a_non_function_is_rejected() {
    assert_eq!(
        build_err("def f() -> int: return y()\n"),
        "not a function or method"
    );
}

#[test]
fn call_arity_is_checked() {
    let src = indoc! {"
        def add(a: int, b: int) -> int: return a + b
        def main() -> int: return add(1)
    "};
    assert_eq!(build_err(src), "'add' takes 2 arguments (1 given)");
}

#[test]
fn call_argument_types_are_checked() {
    let src = indoc! {"
        def add(a: int, b: int) -> int: return a + b
        def main() -> int: return add(1, 'x')
    "};
    assert_eq!(
        build_err(src),
        "argument 2 to 'add' has type '&str', expected 'int'"
    );
}

#[test]
fn every_reachable_block_ends_in_one_terminator() {
    let src = indoc! {"
        def main() -> int:
            x = 0
            while x < 3:
                if x > 1:
                    x = x + 2
                else:
                    x = x + 1
            return x
    "};
    let module = build(src);
    let g = graph(&module, "main");
    for block in g.blocks.values() {
        assert!(block.terminated(), "block {} lacks a terminator", block.id);
        let terminators = block
            .steps
            .iter()
            .filter(|s| s.is_terminator())
            .count();
        assert_eq!(terminators, 1, "block {} has {} terminators", block.id, terminators);
    }
}
