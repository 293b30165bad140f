//! Weight propagation through a validated graph.
//!
//! Turns per-edge fractions into each node's absolute share of the root
//! distribution. Kahn-style topological propagation: a node is only
//! processed once every parent has contributed, which is exactly when its
//! remaining in-degree reaches zero. Terminates because validation
//! guarantees the graph is acyclic.

use std::collections::HashMap;

use tracing::debug;

use crate::{GraphEdge, GraphError, GraphResult, ROOT_NODE};

struct NodeEntry {
    outgoing: Vec<(usize, f64)>,
    in_degree: usize,
    absolute_weight: f64,
}

/// Compute every node's absolute weight (fraction of root, which is
/// seeded at 1.0). A node's final weight is the sum of the contributions
/// from all of its parents; nothing is rounded here.
///
/// `nodes` must contain `root` and every edge endpoint — a miss is an
/// internal-consistency error, unreachable after validation.
pub fn propagate_weights(
    nodes: &[String],
    edges: &[GraphEdge],
) -> GraphResult<HashMap<String, f64>> {
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let mut entries: Vec<NodeEntry> = nodes
        .iter()
        .map(|_| NodeEntry {
            outgoing: Vec::new(),
            in_degree: 0,
            absolute_weight: 0.0,
        })
        .collect();

    for edge in edges {
        let source = *index
            .get(edge.source.as_str())
            .ok_or_else(|| GraphError::MissingEndpoint(edge.source.clone()))?;
        let target = *index
            .get(edge.target.as_str())
            .ok_or_else(|| GraphError::MissingEndpoint(edge.target.clone()))?;

        entries[source].outgoing.push((target, edge.weight));
        entries[target].in_degree += 1;
    }

    let root = *index.get(ROOT_NODE).ok_or(GraphError::MissingRoot)?;
    entries[root].absolute_weight = 1.0;

    // Index-pointer iteration instead of a destructive dequeue: `queue`
    // only ever grows, and `pointer` walks it front to back.
    let mut queue = vec![root];
    let mut pointer = 0;

    while pointer < queue.len() {
        let current = queue[pointer];
        pointer += 1;

        let weight = entries[current].absolute_weight;
        let outgoing = entries[current].outgoing.clone();

        for (target, edge_weight) in outgoing {
            entries[target].absolute_weight += weight * edge_weight;
            entries[target].in_degree -= 1;
            if entries[target].in_degree == 0 {
                queue.push(target);
            }
        }
    }

    debug!(
        nodes = nodes.len(),
        processed = queue.len(),
        "weight propagation complete"
    );

    Ok(nodes
        .iter()
        .zip(entries)
        .map(|(name, entry)| (name.clone(), entry.absolute_weight))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges(list: &[(&str, &str, f64)]) -> Vec<GraphEdge> {
        list.iter()
            .map(|(s, t, w)| GraphEdge {
                source: s.to_string(),
                target: t.to_string(),
                weight: *w,
            })
            .collect()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn propagates_through_chain() {
        // root -> a (0.6), root -> b (0.4), a -> c (1.0).
        // c inherits all of a's share; a's own weight stays 0.6.
        let weights = propagate_weights(
            &names(&["root", "a", "b", "c"]),
            &edges(&[
                ("root", "a", 0.6),
                ("root", "b", 0.4),
                ("a", "c", 1.0),
            ]),
        )
        .unwrap();

        assert!((weights["root"] - 1.0).abs() < 1e-9);
        assert!((weights["a"] - 0.6).abs() < 1e-9);
        assert!((weights["b"] - 0.4).abs() < 1e-9);
        assert!((weights["c"] - 0.6).abs() < 1e-9);
    }

    #[test]
    fn sums_contributions_from_all_parents() {
        // Diamond: root -> a (0.5), root -> b (0.5), a -> c (0.4), b -> c (0.2).
        let weights = propagate_weights(
            &names(&["root", "a", "b", "c"]),
            &edges(&[
                ("root", "a", 0.5),
                ("root", "b", 0.5),
                ("a", "c", 0.4),
                ("b", "c", 0.2),
            ]),
        )
        .unwrap();

        // c = 0.5 * 0.4 + 0.5 * 0.2
        assert!((weights["c"] - 0.3).abs() < 1e-9);
    }

    #[test]
    fn waits_for_all_parents_before_processing() {
        // c must not be processed until both a and b contributed, even
        // though a alone would bring its in-degree path forward. c's
        // downstream d must see the fully accumulated weight.
        let weights = propagate_weights(
            &names(&["root", "a", "b", "c", "d"]),
            &edges(&[
                ("root", "a", 0.5),
                ("root", "b", 0.5),
                ("a", "c", 1.0),
                ("b", "c", 1.0),
                ("c", "d", 0.5),
            ]),
        )
        .unwrap();

        assert!((weights["c"] - 1.0).abs() < 1e-9);
        assert!((weights["d"] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn single_node_graph() {
        let weights = propagate_weights(
            &names(&["root", "a"]),
            &edges(&[("root", "a", 1.0)]),
        )
        .unwrap();
        assert!((weights["a"] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn missing_root_is_internal_error() {
        let result = propagate_weights(&names(&["a", "b"]), &edges(&[("a", "b", 1.0)]));
        assert!(matches!(result, Err(GraphError::MissingRoot)));
    }

    #[test]
    fn missing_endpoint_is_internal_error() {
        let result = propagate_weights(
            &names(&["root", "a"]),
            &edges(&[("root", "ghost", 1.0)]),
        );
        assert!(matches!(result, Err(GraphError::MissingEndpoint(name)) if name == "ghost"));
    }
}
