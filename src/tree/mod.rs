//! Test tree model
//!
//! Turns the caller's nested sequence into an immutable execution tree.

mod node;
mod sequence;

pub use node::{
    build, trim_description, GroupKind, Leaf, LeafState, Node, NodeKind, StructureError, TestTree,
};
pub use sequence::Sequence;
