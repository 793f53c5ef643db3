//! Tests for IR emission.

use indoc::indoc;

use super::mangle;

fn ir(source: &str) -> String {
    crate::emit_ir(source).expect("emission should succeed")
}

#[test]
fn mangle_rewrites_special_characters() {
    assert_eq!(mangle("runa.malloc"), "runa_malloc");
    assert_eq!(mangle("List$int.head"), "List_int_head");
    assert_eq!(mangle("Vec.push$&str"), "Vec_push__str");
    assert_eq!(mangle("main"), "main");
}

#[test]
fn hello_world_ir() {
    let src = indoc! {"
        def main() -> int:
            print('hello, world')
            return 0
    "};
    let out = ir(src);
    assert!(out.contains("declare void @print(ptr)"));
    assert!(out.contains(
        "@.str0 = private unnamed_addr constant [13 x i8] c\"hello, world\\00\""
    ));
    assert!(out.contains("define i32 @main()"));
    assert!(out.contains("call void @print(ptr @.str0)"));
    assert!(out.contains("ret i32"));
}

#[test]
fn arithmetic_emits_typed_instructions() {
    let src = "def main() -> int:\n    return 1 + 2 * 3\n";
    let out = ir(src);
    assert!(out.contains("mul i64 2, 3"));
    assert!(out.contains("add i64 1,"));
    // main returns i32 to the OS.
    assert!(out.contains("trunc i64"));
    assert!(out.contains("ret i32"));
}

#[test]
fn ternary_emits_select() {
    let src = indoc! {"
        def main() -> int:
            x = 1 if True else 2
            return x
    "};
    let out = ir(src);
    assert!(out.contains("select i1 1, i64 1, i64 2"));
    assert!(out.contains("store i64"));
    assert!(out.contains("load i64, ptr %x.addr"));
}

#[test]
fn functions_define_and_call() {
    let src = indoc! {"
        def add(a: int, b: int) -> int: return a + b
        def main() -> int: return add(2, 3)
    "};
    let out = ir(src);
    assert!(out.contains("define i64 @add(i64 %a, i64 %b)"));
    assert!(out.contains("call i64 @add(i64 2, i64 3)"));
    assert!(out.contains("store i64 %a, ptr %a.addr"));
}

#[test]
fn branches_emit_conditional_jumps() {
    let src = indoc! {"
        def main() -> int:
            x = 5
            if x < 3: return 1
            elif x < 7: return 2
            else: return 3
    "};
    let out = ir(src);
    assert!(out.contains("icmp slt i64"));
    assert!(out.contains("br i1"));
    assert!(out.contains("label %b1"));
}

#[test]
fn trait_formals_coerce_integer_arguments() {
    let src = indoc! {"
        def main() -> int:
            print(str(42))
            return 0
    "};
    let out = ir(src);
    // str takes its IStr argument as a pointer-sized value.
    assert!(out.contains("inttoptr i64 42 to ptr"));
    assert!(out.contains("call ptr @str(ptr"));
}

#[test]
fn runtime_functions_are_declared_not_defined() {
    let src = "def main() -> int:\n    return strtoi('7')\n";
    let out = ir(src);
    assert!(out.contains("declare i64 @strtoi(ptr)"));
    assert!(!out.contains("define i64 @strtoi"));
}

#[test]
fn yield_is_rejected_by_the_backend() {
    let src = "def gen() -> int:\n    yield 1\n";
    let err = crate::emit_ir(src).unwrap_err();
    assert!(err.to_string().contains("yield"));
}

#[test]
fn while_loop_branches_back() {
    let src = indoc! {"
        def main() -> int:
            a = 0
            while a < 3:
                a = a + 1
            return a
    "};
    let out = ir(src);
    assert!(out.contains("br label %b1"));
    assert!(out.contains("br i1"));
    assert!(out.contains("load i64, ptr %a.addr"));
}
