//! Bounded breadth-first expansion from a seed set.

use crate::graph::Graph;
use std::collections::HashSet;

/// Induced subgraph over `seeds` plus every node within `depth` hops.
///
/// Each round replaces the frontier with the neighbours of the current
/// frontier that have not been visited yet, so a node is expanded at most
/// once and self-loops are harmless. Seeds that are not in `graph` are
/// ignored. The returned graph is an independent copy.
pub fn expand<'a, I>(graph: &Graph, seeds: I, depth: usize) -> Graph
where
    I: IntoIterator<Item = &'a str>,
{
    let mut visited: HashSet<&str> = HashSet::new();
    let mut frontier: Vec<&str> = Vec::new();
    for seed in seeds {
        if let Some(node) = graph.node(seed) {
            if visited.insert(node.label.as_str()) {
                frontier.push(node.label.as_str());
            }
        }
    }

    for _ in 0..depth {
        if frontier.is_empty() {
            break;
        }
        let mut next = Vec::new();
        for label in &frontier {
            for neighbor in graph.neighbors(label) {
                if visited.insert(neighbor) {
                    next.push(neighbor);
                }
            }
        }
        frontier = next;
    }

    graph.induced(|label| visited.contains(label))
}
