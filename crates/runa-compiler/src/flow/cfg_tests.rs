//! Tests for graph normalization, reachability, and edge maps.

use indexmap::IndexSet;

use crate::flow::{FlowGraph, Literal, Step, Value};
use crate::types::TypeRegistry;

fn bool_const(reg: &TypeRegistry, value: bool) -> Value {
    Value::Constant {
        ty: reg.bool_(),
        lit: Literal::Bool(value),
        escapes: false,
    }
}

#[test]
fn empty_blocks_are_padded_with_void_return() {
    let mut graph = FlowGraph::new();
    graph.finalize();
    let entry = graph.block(0);
    assert_eq!(entry.steps.len(), 1);
    assert!(matches!(entry.steps[0], Step::Return { value: None }));
    assert_eq!(graph.exits, IndexSet::from([0]));
}

#[test]
fn unterminated_blocks_get_an_auto_return() {
    let reg = TypeRegistry::new();
    let mut graph = FlowGraph::new();
    graph.block_mut(0).push(Step::Expr(bool_const(&reg, true)));
    graph.finalize();
    assert!(graph.block(0).terminated());
}

#[test]
fn unreachable_blocks_are_pruned() {
    let mut graph = FlowGraph::new();
    let reached = graph.add_block(None, vec![0]);
    let orphan = graph.add_block(None, vec![]);
    graph.block_mut(0).push(Step::Branch { target: reached });
    graph.block_mut(orphan).push(Step::Return { value: None });
    graph.finalize();

    assert!(graph.blocks.contains_key(&0));
    assert!(graph.blocks.contains_key(&reached));
    assert!(!graph.blocks.contains_key(&orphan));
}

#[test]
fn pruning_twice_equals_pruning_once() {
    let reg = TypeRegistry::new();
    let mut graph = FlowGraph::new();
    let then_b = graph.add_block(None, vec![0]);
    let else_b = graph.add_block(None, vec![0]);
    let orphan = graph.add_block(None, vec![]);
    graph.block_mut(0).push(Step::CondBranch {
        cond: bool_const(&reg, true),
        then_to: then_b,
        else_to: else_b,
    });
    graph.block_mut(orphan).push(Step::Branch { target: then_b });
    graph.finalize();

    let once = graph.clone();
    graph.compute_edges();
    graph.prune_unreachable();
    graph.compute_redges();
    assert_eq!(once.blocks, graph.blocks);
    assert_eq!(once.edges, graph.edges);
    assert_eq!(once.redges, graph.redges);
}

#[test]
fn reverse_edges_are_the_transpose() {
    let reg = TypeRegistry::new();
    let mut graph = FlowGraph::new();
    let header = graph.add_block(None, vec![0]);
    let body = graph.add_block(None, vec![header]);
    let exit = graph.add_block(None, vec![header]);
    graph.block_mut(0).push(Step::Branch { target: header });
    graph.block_mut(header).push(Step::CondBranch {
        cond: bool_const(&reg, false),
        then_to: body,
        else_to: exit,
    });
    graph.block_mut(body).push(Step::Branch { target: header });
    graph.finalize();

    // Forward: 0→1, 1→{2,3}, 2→1. Reverse must be the transpose.
    assert_eq!(graph.redges[&header], vec![0, body]);
    assert_eq!(graph.redges[&body], vec![header]);
    assert_eq!(graph.redges[&exit], vec![header]);
    assert!(graph.redges[&0].is_empty());
    assert_eq!(graph.exits, IndexSet::from([exit]));
}

#[test]
fn lookup_walks_predecessors_through_cycles() {
    let reg = TypeRegistry::new();
    let mut graph = FlowGraph::new();
    graph.block_mut(0).defined.insert(
        "x".to_string(),
        Value::Argument {
            ty: reg.bool_(),
            name: "x".to_string(),
        },
    );
    let header = graph.add_block(None, vec![0]);
    let body = graph.add_block(None, vec![header]);
    // Loop back-edge: header also has the body as a predecessor.
    graph.block_mut(header).preds.push(body);

    let found = graph.lookup(body, "x").expect("x resolves through the loop");
    assert_eq!(found.ty(), reg.bool_());
    assert!(graph.lookup(body, "y").is_none());
}

#[test]
fn closest_definition_shadows() {
    let reg = TypeRegistry::new();
    let mut graph = FlowGraph::new();
    let anyint = reg.anyint();
    graph.block_mut(0).defined.insert(
        "x".to_string(),
        Value::Argument {
            ty: reg.bool_(),
            name: "x".to_string(),
        },
    );
    let next = graph.add_block(None, vec![0]);
    graph.block_mut(next).defined.insert(
        "x".to_string(),
        Value::Constant {
            ty: anyint,
            lit: Literal::Int(1),
            escapes: false,
        },
    );
    assert_eq!(graph.lookup(next, "x").unwrap().ty(), anyint);
    assert_eq!(graph.lookup(0, "x").unwrap().ty(), reg.bool_());
}
