//! Structural validation of a submitted graph.
//!
//! All checks run and all violations are collected (no short-circuit), so
//! a submitter sees every problem at once. The single exception is cycle
//! detection, which reports only the first cycle found. Check order is
//! fixed so the violation list is deterministic for a given graph.

use std::collections::{HashMap, HashSet};

use crate::{Graph, MAX_NODE_COUNT, ROOT_NODE, ROOT_WEIGHT_TOLERANCE};

/// Validate a submitted graph against the structural invariants.
///
/// Returns `Ok(())` for a valid graph, or the ordered list of
/// human-readable violations otherwise.
pub fn validate(graph: &Graph) -> Result<(), Vec<String>> {
    let checks: &[fn(&Graph) -> Vec<String>] = &[
        check_root_node_exists,
        check_total_root_weight,
        check_disconnected_nodes,
        check_cycles,
        check_edges_into_root,
        check_duplicate_nodes,
        check_duplicate_edges,
        check_reciprocal_edges,
        check_dangling_endpoints,
        check_orphan_nodes,
        check_max_node_count,
        check_edge_weight_range,
    ];

    let violations: Vec<String> = checks.iter().flat_map(|check| check(graph)).collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

fn check_root_node_exists(graph: &Graph) -> Vec<String> {
    let root_count = graph
        .node_names()
        .filter(|name| *name == ROOT_NODE)
        .count();

    match root_count {
        0 => vec!["Root node not found.".to_string()],
        1 => vec![],
        _ => vec!["More than one root node found.".to_string()],
    }
}

fn check_total_root_weight(graph: &Graph) -> Vec<String> {
    let total: f64 = graph
        .edges
        .iter()
        .filter(|e| e.source == ROOT_NODE)
        .map(|e| e.weight)
        .sum();

    if (total - 1.0).abs() > ROOT_WEIGHT_TOLERANCE {
        vec![format!(
            "Total weight of edges from 'root' must sum to 1, but got {total}."
        )]
    } else {
        vec![]
    }
}

fn check_disconnected_nodes(graph: &Graph) -> Vec<String> {
    let mut connected = HashSet::new();
    for edge in &graph.edges {
        connected.insert(edge.source.as_str());
        connected.insert(edge.target.as_str());
    }

    let disconnected: Vec<&str> = graph
        .node_names()
        .filter(|name| !connected.contains(name))
        .collect();

    if disconnected.is_empty() {
        vec![]
    } else {
        vec![format!(
            "Nodes without any edges: {}.",
            disconnected.join(", ")
        )]
    }
}

/// Depth-first cycle search with an explicit stack so deep graphs don't
/// overflow the call stack. Reports only the first cycle found.
fn check_cycles(graph: &Graph) -> Vec<String> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &graph.edges {
        adjacency
            .entry(edge.source.as_str())
            .or_default()
            .push(edge.target.as_str());
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut in_stack: HashSet<&str> = HashSet::new();

    for start in graph.node_names() {
        if visited.contains(start) {
            continue;
        }

        // Each frame is (node, next child index to explore).
        let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
        in_stack.insert(start);
        visited.insert(start);

        while let Some((node, child_idx)) = stack.last_mut() {
            let neighbors = adjacency.get(*node).map(Vec::as_slice).unwrap_or(&[]);

            if let Some(&next) = neighbors.get(*child_idx) {
                *child_idx += 1;
                if in_stack.contains(next) {
                    return vec![format!("Cycle detected starting from node '{start}'.")];
                }
                if !visited.contains(next) {
                    visited.insert(next);
                    in_stack.insert(next);
                    stack.push((next, 0));
                }
            } else {
                in_stack.remove(*node);
                stack.pop();
            }
        }
    }

    vec![]
}

fn check_edges_into_root(graph: &Graph) -> Vec<String> {
    let invalid: Vec<String> = graph
        .edges
        .iter()
        .filter(|e| e.target == ROOT_NODE)
        .map(|e| format!("{} -> {}", e.source, e.target))
        .collect();

    if invalid.is_empty() {
        vec![]
    } else {
        vec![format!(
            "Edges targeting 'root' are not allowed: {}.",
            invalid.join(", ")
        )]
    }
}

fn check_duplicate_nodes(graph: &Graph) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut violations = vec![];

    for name in graph.node_names() {
        if !seen.insert(name) {
            violations.push(format!("Duplicate node found: {name}."));
        }
    }

    violations
}

fn check_duplicate_edges(graph: &Graph) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut violations = vec![];

    for edge in &graph.edges {
        let key = format!("{}->{}", edge.source, edge.target);
        if !seen.insert(key.clone()) {
            violations.push(format!("Duplicate edge found: {key}."));
        }
    }

    violations
}

fn check_reciprocal_edges(graph: &Graph) -> Vec<String> {
    let pairs: HashSet<(&str, &str)> = graph
        .edges
        .iter()
        .map(|e| (e.source.as_str(), e.target.as_str()))
        .collect();

    graph
        .edges
        .iter()
        .filter(|e| pairs.contains(&(e.target.as_str(), e.source.as_str())))
        .map(|e| format!("Two-way edge detected: {} <-> {}.", e.source, e.target))
        .collect()
}

fn check_dangling_endpoints(graph: &Graph) -> Vec<String> {
    let names: HashSet<&str> = graph.node_names().collect();
    let mut violations = vec![];

    for edge in &graph.edges {
        if edge.source != ROOT_NODE && !names.contains(edge.source.as_str()) {
            violations.push(format!(
                "Edge source '{}' does not exist in nodes.",
                edge.source
            ));
        }
        if edge.target != ROOT_NODE && !names.contains(edge.target.as_str()) {
            violations.push(format!(
                "Edge target '{}' does not exist in nodes.",
                edge.target
            ));
        }
    }

    violations
}

fn check_orphan_nodes(graph: &Graph) -> Vec<String> {
    let with_incoming: HashSet<&str> =
        graph.edges.iter().map(|e| e.target.as_str()).collect();

    let orphans: Vec<&str> = graph
        .node_names()
        .filter(|name| *name != ROOT_NODE && !with_incoming.contains(name))
        .collect();

    if orphans.is_empty() {
        vec![]
    } else {
        vec![format!(
            "Nodes with no incoming edges detected: {}.",
            orphans.join(", ")
        )]
    }
}

fn check_max_node_count(graph: &Graph) -> Vec<String> {
    if graph.nodes.len() > MAX_NODE_COUNT {
        vec![format!("Maximum number of nodes is {MAX_NODE_COUNT}.")]
    } else {
        vec![]
    }
}

fn check_edge_weight_range(graph: &Graph) -> Vec<String> {
    graph
        .edges
        .iter()
        .filter(|e| !(0.0..=1.0).contains(&e.weight))
        .map(|e| {
            format!(
                "Edge {} -> {} has weight {} outside [0, 1].",
                e.source, e.target, e.weight
            )
        })
        .collect()
}
