//! Hand-off from the engine to a display layer.
//!
//! The engine never inspects what a renderer produces. [`VisNetworkRenderer`]
//! is the stock implementation: a JSON-serialisable node/edge payload in the
//! shape vis-network style front ends consume.

use crate::graph::Graph;
use serde::Serialize;

/// Turns a graph into something a UI can display.
pub trait RenderAdapter {
    type Output;

    fn render(&self, graph: &Graph, height: u32) -> Self::Output;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisNode {
    pub id: String,
    pub label: String,
    /// Tooltip: the node's sentences joined by a space.
    pub title: String,
    pub color: String,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisEdge {
    pub from: String,
    pub to: String,
    /// Tooltip: the edge predicate.
    pub title: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisNetwork {
    /// CSS height, e.g. `"600px"`.
    pub height: String,
    pub background: String,
    pub font_color: String,
    pub nodes: Vec<VisNode>,
    pub edges: Vec<VisEdge>,
}

/// Palette and sizing for [`VisNetwork`] payloads.
#[derive(Debug, Clone, PartialEq)]
pub struct VisNetworkRenderer {
    pub background: String,
    pub font_color: String,
    pub node_color: String,
    pub edge_color: String,
    pub node_size: u32,
}

impl Default for VisNetworkRenderer {
    fn default() -> Self {
        Self {
            background: "#222222".to_string(),
            font_color: "white".to_string(),
            node_color: "#87ceeb".to_string(),
            edge_color: "#7fffd4".to_string(),
            node_size: 20,
        }
    }
}

impl RenderAdapter for VisNetworkRenderer {
    type Output = VisNetwork;

    fn render(&self, graph: &Graph, height: u32) -> VisNetwork {
        let nodes = graph
            .nodes()
            .map(|n| VisNode {
                id: n.label.clone(),
                label: n.label.clone(),
                title: n.sentences.join(" "),
                color: self.node_color.clone(),
                size: self.node_size,
            })
            .collect();
        let edges = graph
            .edges()
            .map(|e| VisEdge {
                from: e.source.to_string(),
                to: e.target.to_string(),
                title: e.predicate.to_string(),
                color: self.edge_color.clone(),
            })
            .collect();
        VisNetwork {
            height: format!("{height}px"),
            background: self.background.clone(),
            font_color: self.font_color.clone(),
            nodes,
            edges,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{TextMap, Triple};
    use crate::graph::build;

    #[test]
    fn renders_nodes_and_edges_with_tooltips() {
        let mut texts = TextMap::new();
        texts.push("Sun", "A star.");
        texts.push("Sun", "Very hot.");
        let g = build(&[Triple::new("Sun", "is_a", "Star")], &texts);

        let out = VisNetworkRenderer::default().render(&g, 400);
        assert_eq!(out.height, "400px");
        assert_eq!(out.nodes.len(), 2);
        assert_eq!(out.nodes[0].id, "Sun");
        assert_eq!(out.nodes[0].title, "A star. Very hot.");
        assert_eq!(out.nodes[1].title, "Star");
        assert_eq!(out.nodes[0].size, 20);
        assert_eq!(out.edges.len(), 1);
        assert_eq!(out.edges[0].title, "is_a");
        assert_eq!((out.edges[0].from.as_str(), out.edges[0].to.as_str()), ("Sun", "Star"));
    }

    #[test]
    fn serializes_to_json() {
        let g = build(&[Triple::new("A", "p", "B")], &TextMap::new());
        let json = serde_json::to_value(VisNetworkRenderer::default().render(&g, 600)).unwrap();
        assert_eq!(json["background"], "#222222");
        assert_eq!(json["font_color"], "white");
        assert_eq!(json["nodes"][0]["color"], "#87ceeb");
        assert_eq!(json["edges"][0]["color"], "#7fffd4");
    }

    #[test]
    fn empty_graph_renders_empty_payload() {
        let out = VisNetworkRenderer::default().render(&Graph::default(), 600);
        assert!(out.nodes.is_empty() && out.edges.is_empty());
    }
}
