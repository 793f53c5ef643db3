//! Flow-graph construction and inspection.
//!
//! - `cfg` - blocks, steps, edges, normalization
//! - `build` - lowering of statement trees into typed CFGs
//! - `dump` - formatted output for the `show` driver command

mod build;
mod cfg;
mod dump;

#[cfg(test)]
mod build_tests;
#[cfg(test)]
mod cfg_tests;

pub use build::FlowBuilder;
pub use cfg::{Block, BlockId, FlowGraph, Literal, PENDING, Step, Value};
pub use dump::{dump_function, dump_graph};
