// It's not a bad lint, but not one worth dealing with here.
#![allow(clippy::too_many_arguments)]

pub mod explore;
pub mod graph;

pub use explore::ReachState;
pub use graph::{Graph, GraphError, Node, NodeIdx, NodeType, PlayerIdx, RupeeValue};
