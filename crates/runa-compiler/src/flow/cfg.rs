//! Typed control-flow graphs.
//!
//! Blocks are stored in an id-keyed map inside [`FlowGraph`]; block 0 is
//! the entry. Predecessors are kept as ids, so name lookup walks the
//! predecessor graph without back-pointers. Finalization pads
//! unterminated blocks, computes the edge maps from terminators, prunes
//! blocks unreachable from entry, and collects the exit set.

use indexmap::{IndexMap, IndexSet};

use crate::ast::{CmpOp, MathOp};
use crate::types::TypeId;

pub type BlockId = u32;

/// Sentinel for a branch target patched later in construction.
pub const PENDING: BlockId = BlockId::MAX;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// A value-producing node. Every variant carries its resolved type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Constant {
        ty: TypeId,
        lit: Literal,
        /// Set by escape analysis on string literals that must be
        /// heap-promoted.
        escapes: bool,
    },
    Reference {
        ty: TypeId,
        name: String,
    },
    Argument {
        ty: TypeId,
        name: String,
    },
    GetAttr {
        ty: TypeId,
        obj: Box<Value>,
        attr: String,
    },
    GetItem {
        ty: TypeId,
        obj: Box<Value>,
        key: Box<Value>,
    },
    Call {
        ty: TypeId,
        symbol: String,
        /// Formal parameter types of the callee, for the escape pass.
        formals: Vec<TypeId>,
        args: Vec<Value>,
        escapes: bool,
    },
    /// Constructor: allocate a `ty` and run its initializer, if any.
    Init {
        ty: TypeId,
        symbol: Option<String>,
        args: Vec<Value>,
        escapes: bool,
    },
    Select {
        ty: TypeId,
        cond: Box<Value>,
        left: Box<Value>,
        right: Box<Value>,
    },
    Math {
        ty: TypeId,
        op: MathOp,
        left: Box<Value>,
        right: Box<Value>,
    },
    Compare {
        ty: TypeId,
        op: CmpOp,
        left: Box<Value>,
        right: Box<Value>,
    },
    Phi {
        ty: TypeId,
        left: (BlockId, Box<Value>),
        right: (BlockId, Box<Value>),
    },
}

impl Value {
    pub fn ty(&self) -> TypeId {
        match self {
            Value::Constant { ty, .. }
            | Value::Reference { ty, .. }
            | Value::Argument { ty, .. }
            | Value::GetAttr { ty, .. }
            | Value::GetItem { ty, .. }
            | Value::Call { ty, .. }
            | Value::Init { ty, .. }
            | Value::Select { ty, .. }
            | Value::Math { ty, .. }
            | Value::Compare { ty, .. }
            | Value::Phi { ty, .. } => *ty,
        }
    }

    /// Retype a node in place; literal placeholders adopt the concrete
    /// type at their use site.
    pub fn set_ty(&mut self, new: TypeId) {
        match self {
            Value::Constant { ty, .. }
            | Value::Reference { ty, .. }
            | Value::Argument { ty, .. }
            | Value::GetAttr { ty, .. }
            | Value::GetItem { ty, .. }
            | Value::Call { ty, .. }
            | Value::Init { ty, .. }
            | Value::Select { ty, .. }
            | Value::Math { ty, .. }
            | Value::Compare { ty, .. }
            | Value::Phi { ty, .. } => *ty = new,
        }
    }
}

/// One instruction in a block.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// An expression evaluated for effect.
    Expr(Value),
    Assign {
        name: String,
        value: Value,
    },
    SetAttr {
        obj: Value,
        attr: String,
        value: Value,
    },
    Return {
        value: Option<Value>,
    },
    Yield {
        value: Value,
    },
    Raise {
        value: Value,
    },
    Branch {
        target: BlockId,
    },
    CondBranch {
        cond: Value,
        then_to: BlockId,
        else_to: BlockId,
    },
    LoopSetup,
    LoopHeader,
}

impl Step {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Step::Return { .. } | Step::Branch { .. } | Step::CondBranch { .. }
        )
    }

    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Step::Branch { target } => vec![*target],
            Step::CondBranch {
                then_to, else_to, ..
            } => vec![*then_to, *else_to],
            _ => Vec::new(),
        }
    }
}

/// A basic block: annotated step sequence plus the name environment it
/// defines and uses. `preds` are construction-time predecessors used
/// for name lookup; the authoritative edges live on the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: BlockId,
    pub anno: Option<&'static str>,
    pub steps: Vec<Step>,
    pub defined: IndexMap<String, Value>,
    pub uses: IndexSet<String>,
    pub preds: Vec<BlockId>,
}

impl Block {
    fn new(id: BlockId, anno: Option<&'static str>, preds: Vec<BlockId>) -> Self {
        Self {
            id,
            anno,
            steps: Vec::new(),
            defined: IndexMap::new(),
            uses: IndexSet::new(),
            preds,
        }
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn terminated(&self) -> bool {
        self.steps.last().is_some_and(Step::is_terminator)
    }

    pub fn ends_with_return(&self) -> bool {
        matches!(self.steps.last(), Some(Step::Return { .. }))
    }
}

/// The control-flow graph of one function.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlowGraph {
    pub blocks: IndexMap<BlockId, Block>,
    pub edges: IndexMap<BlockId, Vec<BlockId>>,
    pub redges: IndexMap<BlockId, Vec<BlockId>>,
    pub exits: IndexSet<BlockId>,
}

impl FlowGraph {
    pub fn new() -> Self {
        let mut blocks = IndexMap::new();
        blocks.insert(0, Block::new(0, Some("entry"), Vec::new()));
        Self {
            blocks,
            edges: IndexMap::new(),
            redges: IndexMap::new(),
            exits: IndexSet::new(),
        }
    }

    pub fn add_block(&mut self, anno: Option<&'static str>, preds: Vec<BlockId>) -> BlockId {
        let id = self.blocks.len() as BlockId;
        self.blocks.insert(id, Block::new(id, anno, preds));
        id
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[&id]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        self.blocks.get_mut(&id).expect("block id out of range")
    }

    /// Resolve a name from `from`, walking predecessors transitively.
    /// The defining block closest to `from` wins.
    pub fn lookup(&self, from: BlockId, name: &str) -> Option<&Value> {
        let mut queue = vec![from];
        let mut visited = IndexSet::new();
        while let Some(id) = queue.pop() {
            if !visited.insert(id) {
                continue;
            }
            let block = self.block(id);
            if let Some(value) = block.defined.get(name) {
                return Some(value);
            }
            queue.extend(block.preds.iter().copied());
        }
        None
    }

    /// Patch the false edge of the `CondBranch` terminating `block`.
    pub fn set_false_target(&mut self, block: BlockId, target: BlockId) {
        match self.block_mut(block).steps.last_mut() {
            Some(Step::CondBranch { else_to, .. }) => *else_to = target,
            other => panic!("expected CondBranch terminator, found {:?}", other),
        }
    }

    /// Normalize and close the graph: auto-return, edges, pruning,
    /// reverse edges, exits.
    pub fn finalize(&mut self) {
        for block in self.blocks.values_mut() {
            if !block.terminated() {
                block.push(Step::Return { value: None });
            }
        }
        self.compute_edges();
        self.prune_unreachable();
        self.compute_redges();
        self.compute_exits();
        self.verify();
    }

    /// Forward edges from each block's terminator.
    pub fn compute_edges(&mut self) {
        self.edges = self
            .blocks
            .values()
            .map(|b| {
                let succs = b.steps.last().map(Step::successors).unwrap_or_default();
                (b.id, succs)
            })
            .collect();
    }

    fn reachable(&self) -> IndexSet<BlockId> {
        let mut seen = IndexSet::new();
        let mut queue = vec![0];
        while let Some(id) = queue.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(succs) = self.edges.get(&id) {
                queue.extend(succs.iter().copied());
            }
        }
        seen
    }

    /// Drop blocks not reachable from entry. Idempotent.
    pub fn prune_unreachable(&mut self) {
        let keep = self.reachable();
        self.blocks.retain(|id, _| keep.contains(id));
        self.edges.retain(|id, _| keep.contains(id));
        for block in self.blocks.values_mut() {
            block.preds.retain(|p| keep.contains(p));
        }
    }

    /// The transpose of the forward edge map.
    pub fn compute_redges(&mut self) {
        self.redges = self.blocks.keys().map(|&id| (id, Vec::new())).collect();
        for (&src, dsts) in &self.edges {
            for &dst in dsts {
                if let Some(preds) = self.redges.get_mut(&dst) {
                    preds.push(src);
                }
            }
        }
    }

    fn compute_exits(&mut self) {
        self.exits = self
            .blocks
            .keys()
            .filter(|id| self.edges.get(*id).is_none_or(|e| e.is_empty()))
            .copied()
            .collect();
    }

    /// Invariant checks; a violation is a compiler bug, not a user
    /// error. Free in release builds.
    pub fn verify(&self) {
        #[cfg(debug_assertions)]
        {
            for block in self.blocks.values() {
                debug_assert!(
                    block.terminated(),
                    "block {} does not end in a terminator",
                    block.id
                );
                for step in &block.steps {
                    for succ in step.successors() {
                        debug_assert!(
                            succ != PENDING && self.blocks.contains_key(&succ),
                            "block {} branches to unknown block {}",
                            block.id,
                            succ
                        );
                    }
                }
            }
            let mut transposed: IndexMap<BlockId, Vec<BlockId>> =
                self.blocks.keys().map(|&id| (id, Vec::new())).collect();
            for (&src, dsts) in &self.edges {
                for &dst in dsts {
                    if let Some(preds) = transposed.get_mut(&dst) {
                        preds.push(src);
                    }
                }
            }
            for (id, preds) in &self.redges {
                debug_assert_eq!(
                    Some(preds),
                    transposed.get(id),
                    "reverse edges are not the transpose of forward edges"
                );
            }
        }
    }
}
