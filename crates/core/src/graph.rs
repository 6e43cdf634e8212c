//! Undirected labeled graph built from triples.
//!
//! Nodes are keyed by their label (byte-exact, no normalisation). Each node
//! carries the descriptive sentences attached to it. Edges are undirected and
//! carry the predicate of the first triple that named their endpoint pair;
//! later triples over the same unordered pair leave the edge untouched.
//!
//! Iteration order is creation order. Downstream code uses it for display and
//! for deterministic tie-breaking, never for correctness.

use crate::dataset::{TextMap, Triple};
use serde::Serialize;
use std::collections::HashMap;

/// A graph vertex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub label: String,
    /// Descriptive text snippets. Never empty: defaults to `[label]`.
    pub sentences: Vec<String>,
}

impl Node {
    fn new(label: &str, texts: &TextMap) -> Self {
        let sentences = match texts.get(label) {
            Some(s) if !s.is_empty() => s.to_vec(),
            _ => vec![label.to_string()],
        };
        Self {
            label: label.to_string(),
            sentences,
        }
    }

    /// The indexer input for this node: `"{label}: {sentences joined by ' '}"`.
    pub fn document(&self) -> String {
        format!("{}: {}", self.label, self.sentences.join(" "))
    }
}

/// An undirected edge between node positions `a` and `b` (`a <= b`).
#[derive(Debug, Clone, PartialEq, Eq)]
struct EdgeSlot {
    a: usize,
    b: usize,
    predicate: String,
}

/// A borrowed view of one edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Edge<'g> {
    pub source: &'g str,
    pub target: &'g str,
    pub predicate: &'g str,
}

/// An undirected labeled graph with at most one edge per unordered node pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    nodes: Vec<Node>,
    by_label: HashMap<String, usize>,
    edges: Vec<EdgeSlot>,
    by_pair: HashMap<(usize, usize), usize>,
    /// Neighbour positions per node, in edge creation order. A self-loop lists
    /// the node once in its own adjacency.
    adjacency: Vec<Vec<usize>>,
}

/// Build a graph from `triples` in input order.
///
/// Nodes are created on first sight with sentences from `texts` (or
/// `[label]`). An edge is created on first sight of its unordered endpoint
/// pair; a repeated pair keeps the first predicate. Never fails: empty
/// labels and self-loops are accepted as-is.
pub fn build(triples: &[Triple], texts: &TextMap) -> Graph {
    let mut graph = Graph::default();
    for t in triples {
        let s = graph.ensure_node(&t.subject, texts);
        let o = graph.ensure_node(&t.object, texts);
        graph.ensure_edge(s, o, &t.predicate);
    }
    graph
}

impl Graph {
    fn ensure_node(&mut self, label: &str, texts: &TextMap) -> usize {
        if let Some(&pos) = self.by_label.get(label) {
            return pos;
        }
        self.push_node(Node::new(label, texts))
    }

    fn push_node(&mut self, node: Node) -> usize {
        let pos = self.nodes.len();
        self.by_label.insert(node.label.clone(), pos);
        self.nodes.push(node);
        self.adjacency.push(Vec::new());
        pos
    }

    fn ensure_edge(&mut self, u: usize, v: usize, predicate: &str) {
        let key = (u.min(v), u.max(v));
        if self.by_pair.contains_key(&key) {
            return;
        }
        self.by_pair.insert(key, self.edges.len());
        self.edges.push(EdgeSlot {
            a: key.0,
            b: key.1,
            predicate: predicate.to_string(),
        });
        self.adjacency[u].push(v);
        if u != v {
            self.adjacency[v].push(u);
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.by_label.contains_key(label)
    }

    pub fn node(&self, label: &str) -> Option<&Node> {
        self.by_label.get(label).map(|&pos| &self.nodes[pos])
    }

    /// All nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// All edges in creation order.
    pub fn edges(&self) -> impl Iterator<Item = Edge<'_>> {
        self.edges.iter().map(|e| self.view(e))
    }

    /// The edge between `u` and `v` in either direction.
    pub fn edge(&self, u: &str, v: &str) -> Option<Edge<'_>> {
        let (&pu, &pv) = (self.by_label.get(u)?, self.by_label.get(v)?);
        let slot = self.by_pair.get(&(pu.min(pv), pu.max(pv)))?;
        Some(self.view(&self.edges[*slot]))
    }

    /// Labels adjacent to `label`; empty if `label` is not in the graph.
    pub fn neighbors<'g>(&'g self, label: &str) -> impl Iterator<Item = &'g str> + 'g {
        let adjacent: &'g [usize] = self
            .by_label
            .get(label)
            .map(|&pos| self.adjacency[pos].as_slice())
            .unwrap_or(&[]);
        adjacent.iter().map(|&pos| self.nodes[pos].label.as_str())
    }

    /// Copy of this graph restricted to nodes accepted by `keep`, with every
    /// parent edge whose two endpoints survive. Creation order is preserved.
    pub fn induced(&self, mut keep: impl FnMut(&str) -> bool) -> Graph {
        let mut sub = Graph::default();
        let mut remap: Vec<Option<usize>> = vec![None; self.nodes.len()];
        for (pos, node) in self.nodes.iter().enumerate() {
            if keep(&node.label) {
                remap[pos] = Some(sub.push_node(node.clone()));
            }
        }
        for edge in &self.edges {
            if let (Some(a), Some(b)) = (remap[edge.a], remap[edge.b]) {
                sub.ensure_edge(a, b, &edge.predicate);
            }
        }
        sub
    }

    fn view<'g>(&'g self, e: &'g EdgeSlot) -> Edge<'g> {
        Edge {
            source: &self.nodes[e.a].label,
            target: &self.nodes[e.b].label,
            predicate: &e.predicate,
        }
    }
}
