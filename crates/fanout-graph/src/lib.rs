//! fanout-graph — the submitted dependency graph.
//!
//! A submitted graph is a weighted DAG of project names with a synthetic
//! `root` node representing the total distributable amount. This crate
//! holds the graph types, the structural validator that gates submission,
//! and the topological weight propagation that turns edge fractions into
//! each node's absolute share of the root.
//!
//! Everything here is pure computation; persistence and job scheduling
//! live elsewhere.

pub mod propagate;
pub mod validator;

mod error;

pub use error::{GraphError, GraphResult};
pub use propagate::propagate_weights;
pub use validator::validate;

use serde::{Deserialize, Serialize};

/// Name of the synthetic root node. Always present in a valid graph.
pub const ROOT_NODE: &str = "root";

/// Hard cap on submitted graph size (matches the two-level splits
/// capacity of 200 × 200).
pub const MAX_NODE_COUNT: usize = 40_000;

/// Tolerance when checking that root's outgoing weights sum to 1.
pub const ROOT_WEIGHT_TOLERANCE: f64 = 1e-4;

/// A node in a submitted graph, identified by its project name
/// (e.g. `owner/repo`, or the literal `root`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GraphNode {
    pub project_name: String,
}

/// A directed, weighted edge. `weight` is the fraction of the source's
/// distribution flowing to the target, in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub weight: f64,
}

/// A submitted dependency graph: flat node list plus directed weighted edges.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl Graph {
    /// Iterate node names.
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.project_name.as_str())
    }
}
