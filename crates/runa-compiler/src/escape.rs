//! Escape analysis over finalized flow graphs.
//!
//! Walks each function's blocks in reverse, and each block's steps in
//! reverse, carrying the set of names known to escape. Owner-typed
//! values that are returned, yielded, raised, or passed to owner
//! formals must outlive the frame; their producers are flagged so the
//! backend chooses heap storage. String literals stay borrowed unless
//! observed to escape.

use indexmap::{IndexMap, IndexSet};

use crate::flow::{BlockId, FlowGraph, Literal, Step, Value};
use crate::module::{EscapeNote, FunctionDef};
use crate::types::TypeRegistry;

/// Run the pass over every built function in the module.
pub fn escapes(registry: &TypeRegistry, functions: &mut IndexMap<String, FunctionDef>) {
    for fun in functions.values_mut() {
        let in_del = fun.name.ends_with("__del__");
        let Some(graph) = fun.graph.as_mut() else {
            continue;
        };
        let mut finder = EscapeFinder::new(registry, in_del);
        finder.find(graph);
        fun.escapes = finder.notes;
    }
}

struct EscapeFinder<'m> {
    registry: &'m TypeRegistry,
    in_del: bool,
    track: IndexSet<String>,
    notes: IndexMap<String, Vec<EscapeNote>>,
    cur: (BlockId, usize),
}

impl<'m> EscapeFinder<'m> {
    fn new(registry: &'m TypeRegistry, in_del: bool) -> Self {
        Self {
            registry,
            in_del,
            track: IndexSet::new(),
            notes: IndexMap::new(),
            cur: (0, 0),
        }
    }

    fn find(&mut self, graph: &mut FlowGraph) {
        let ids: Vec<BlockId> = graph.blocks.keys().copied().collect();
        for &block_id in ids.iter().rev() {
            let len = graph.block(block_id).steps.len();
            for idx in (0..len).rev() {
                self.cur = (block_id, idx);
                let block = graph.blocks.get_mut(&block_id).expect("block exists");
                self.visit_step(&mut block.steps[idx]);
            }
        }
    }

    fn visit_step(&mut self, step: &mut Step) {
        match step {
            Step::Return { value: Some(value) }
            | Step::Yield { value }
            | Step::Raise { value } => {
                if self.registry.is_owner(value.ty()) {
                    self.visit_value(value, true);
                    self.note(value);
                }
            }
            Step::Return { value: None } => {}
            Step::Assign { name, value } => {
                let escape = self.track.contains(name.as_str());
                self.visit_value(value, escape);
            }
            Step::SetAttr { obj, value, .. } => {
                let escaping = self.value_escapes(obj);
                self.visit_value(value, escaping);
            }
            Step::Expr(value) => self.visit_value(value, false),
            Step::Branch { .. }
            | Step::CondBranch { .. }
            | Step::LoopSetup
            | Step::LoopHeader => {}
        }
    }

    fn visit_value(&mut self, value: &mut Value, escape: bool) {
        match value {
            Value::Constant {
                lit: Literal::Str(_),
                escapes,
                ..
            } => {
                // Escape-or-borrow: literals are '&str' until observed
                // to outlive the frame, then heap-promoted.
                if escape {
                    *escapes = true;
                }
            }
            Value::Constant { .. } => {}
            Value::Reference { name, .. } | Value::Argument { name, .. } => {
                if escape {
                    self.track.insert(name.clone());
                }
            }
            Value::Select {
                left, right, ..
            } => {
                self.visit_value(left, escape);
                self.visit_value(right, escape);
            }
            Value::Phi { left, right, .. } => {
                self.visit_value(&mut left.1, escape);
                self.visit_value(&mut right.1, escape);
            }
            Value::Call {
                symbol,
                formals,
                args,
                escapes,
                ..
            } => {
                // Freeing self inside a destructor is not an escape.
                if symbol.as_str() == "runa.free" && self.in_del {
                    return;
                }
                for (i, arg) in args.iter_mut().enumerate() {
                    let owner_formal = formals
                        .get(i)
                        .is_some_and(|&f| self.registry.is_owner(f));
                    if owner_formal {
                        self.visit_value(arg, true);
                        self.note(arg);
                    } else {
                        self.visit_value(arg, false);
                    }
                }
                if !escape {
                    return;
                }
                if symbol.as_str() == "runa.malloc" {
                    *escapes = true;
                    return;
                }
                let base = symbol.split('$').next().unwrap_or(symbol);
                if base.ends_with(".__init__") {
                    if let Some(receiver) = args.first_mut() {
                        self.mark(receiver);
                    }
                }
            }
            Value::Init { escapes, .. } => {
                if escape {
                    *escapes = true;
                }
            }
            Value::GetAttr { ty, .. } | Value::GetItem { ty, .. } => {
                debug_assert!(
                    !escape || !self.registry.is_wrapper(*ty),
                    "owning value escaping through an aggregate load"
                );
            }
            Value::Math { .. } | Value::Compare { .. } => {}
        }
    }

    /// Record an escape for the producer of `value`: names go into the
    /// per-function escape map, allocation sites get their flag set.
    fn note(&mut self, value: &mut Value) {
        match value {
            Value::Constant {
                lit: Literal::Str(_),
                ..
            } => {}
            Value::Reference { name, ty } | Value::Argument { name, ty } => {
                self.notes.entry(name.clone()).or_default().push(EscapeNote {
                    block: self.cur.0,
                    step: self.cur.1,
                    ty: *ty,
                });
            }
            other => self.mark(other),
        }
    }

    /// Flag a value as escaping at its producer.
    fn mark(&mut self, value: &mut Value) {
        match value {
            Value::Call { escapes, .. }
            | Value::Init { escapes, .. }
            | Value::Constant { escapes, .. } => *escapes = true,
            Value::Reference { name, .. } | Value::Argument { name, .. } => {
                self.track.insert(name.clone());
            }
            _ => {}
        }
    }

    /// Whether a stored-into object is already known to escape.
    fn value_escapes(&self, value: &Value) -> bool {
        match value {
            Value::Reference { name, .. } | Value::Argument { name, .. } => {
                self.track.contains(name.as_str())
            }
            Value::Call { escapes, .. }
            | Value::Init { escapes, .. }
            | Value::Constant { escapes, .. } => *escapes,
            _ => false,
        }
    }
}
