//! Formatted CFG output for inspection and testing.

use std::fmt::Write;

use crate::module::FunctionDef;
use crate::types::TypeRegistry;

use super::cfg::{FlowGraph, Literal, Step, Value};

/// Render one function: signature, blocks, and escape notes.
pub fn dump_function(fun: &FunctionDef, registry: &TypeRegistry) -> String {
    let mut out = String::new();
    let formals = fun
        .sig
        .formals
        .iter()
        .map(|(name, ty)| format!("{}: {}", name, registry.display_name(*ty)))
        .collect::<Vec<_>>()
        .join(", ");
    let _ = writeln!(
        out,
        "def {}({}) -> {}:",
        fun.name,
        formals,
        registry.display_name(fun.sig.ret)
    );

    match &fun.graph {
        None if fun.rt => {
            let _ = writeln!(out, "  <runtime>");
        }
        None => {
            let _ = writeln!(out, "  <not built>");
        }
        Some(graph) => {
            out.push_str(&dump_graph(graph, registry));
        }
    }

    for (name, notes) in &fun.escapes {
        for note in notes {
            let _ = writeln!(
                out,
                "  escapes: {} @ b{}[{}] {}",
                name,
                note.block,
                note.step,
                registry.display_name(note.ty)
            );
        }
    }
    out
}

/// Render the blocks of a graph in id order.
pub fn dump_graph(graph: &FlowGraph, registry: &TypeRegistry) -> String {
    let mut out = String::new();
    for block in graph.blocks.values() {
        match block.anno {
            Some(anno) => {
                let _ = writeln!(out, "  b{} ({}):", block.id, anno);
            }
            None => {
                let _ = writeln!(out, "  b{}:", block.id);
            }
        }
        for step in &block.steps {
            let _ = writeln!(out, "    {}", render_step(step, registry));
        }
    }
    out
}

fn render_step(step: &Step, registry: &TypeRegistry) -> String {
    match step {
        Step::Expr(value) => render_value(value, registry),
        Step::Assign { name, value } => {
            format!("%{} = {}", name, render_value(value, registry))
        }
        Step::SetAttr { obj, attr, value } => format!(
            "{}.{} = {}",
            render_value(obj, registry),
            attr,
            render_value(value, registry)
        ),
        Step::Return { value: None } => "return".to_string(),
        Step::Return { value: Some(v) } => format!("return {}", render_value(v, registry)),
        Step::Yield { value } => format!("yield {}", render_value(value, registry)),
        Step::Raise { value } => format!("raise {}", render_value(value, registry)),
        Step::Branch { target } => format!("branch → b{}", target),
        Step::CondBranch {
            cond,
            then_to,
            else_to,
        } => format!(
            "branch {} ? b{} : b{}",
            render_value(cond, registry),
            then_to,
            else_to
        ),
        Step::LoopSetup => "loop.setup".to_string(),
        Step::LoopHeader => "loop.header".to_string(),
    }
}

fn render_value(value: &Value, registry: &TypeRegistry) -> String {
    match value {
        Value::Constant { lit, escapes, .. } => {
            let text = match lit {
                Literal::Bool(b) => b.to_string(),
                Literal::Int(i) => i.to_string(),
                Literal::Float(f) => format!("{:?}", f),
                Literal::Str(s) => format!("'{}'", s),
            };
            if *escapes {
                format!("const {} (escapes)", text)
            } else {
                format!("const {}", text)
            }
        }
        Value::Reference { name, .. } => format!("%{}", name),
        Value::Argument { name, .. } => format!("arg %{}", name),
        Value::GetAttr { obj, attr, .. } => {
            format!("{}.{}", render_value(obj, registry), attr)
        }
        Value::GetItem { obj, key, .. } => format!(
            "{}[{}]",
            render_value(obj, registry),
            render_value(key, registry)
        ),
        Value::Call {
            symbol,
            args,
            escapes,
            ..
        } => {
            let rendered = args
                .iter()
                .map(|a| render_value(a, registry))
                .collect::<Vec<_>>()
                .join(", ");
            if *escapes {
                format!("call {}({}) (escapes)", symbol, rendered)
            } else {
                format!("call {}({})", symbol, rendered)
            }
        }
        Value::Init {
            ty, args, escapes, ..
        } => {
            let rendered = args
                .iter()
                .map(|a| render_value(a, registry))
                .collect::<Vec<_>>()
                .join(", ");
            if *escapes {
                format!("init {}({}) (escapes)", registry.display_name(*ty), rendered)
            } else {
                format!("init {}({})", registry.display_name(*ty), rendered)
            }
        }
        Value::Select {
            cond, left, right, ..
        } => format!(
            "select({}, {}, {})",
            render_value(cond, registry),
            render_value(left, registry),
            render_value(right, registry)
        ),
        Value::Math {
            op, left, right, ..
        } => format!(
            "{}({}, {})",
            op.name(),
            render_value(left, registry),
            render_value(right, registry)
        ),
        Value::Compare {
            op, left, right, ..
        } => format!(
            "{}({}, {})",
            op.name(),
            render_value(left, registry),
            render_value(right, registry)
        ),
        Value::Phi { left, right, .. } => format!(
            "phi(b{}: {}, b{}: {})",
            left.0,
            render_value(&left.1, registry),
            right.0,
            render_value(&right.1, registry)
        ),
    }
}
