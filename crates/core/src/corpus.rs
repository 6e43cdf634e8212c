//! Node documents and their embeddings.
//!
//! An [`EmbeddingIndex`] is built in one go and never mutated afterwards:
//! callers share it behind an `Arc` and replace it wholesale when the graph
//! changes.

use crate::embedder::{BackendKind, BackendSelector, Embedder};
use crate::graph::Graph;
use crate::{KgError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Summary of a built index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexStats {
    pub backend: BackendKind,
    pub nodes: usize,
    /// Vector length; `0` for an empty graph or an empty vocabulary.
    pub dim: usize,
    pub built_at: DateTime<Utc>,
}

/// Parallel arrays of node label, document and vector, plus the embedder
/// that maps queries into the same space.
pub struct EmbeddingIndex {
    nodes: Vec<String>,
    docs: Vec<String>,
    vectors: Vec<Vec<f32>>,
    embedder: Box<dyn Embedder>,
    stats: IndexStats,
}

impl fmt::Debug for EmbeddingIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingIndex")
            .field("nodes", &self.nodes)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl EmbeddingIndex {
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn docs(&self) -> &[String] {
        &self.docs
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn kind(&self) -> BackendKind {
        self.embedder.kind()
    }

    pub fn stats(&self) -> &IndexStats {
        &self.stats
    }

    /// Map a query into this index's vector space.
    pub fn encode_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder.encode_query(text)
    }
}

/// Build an index over every node of `graph` with the selector's backend.
///
/// If the dense backend fails while encoding the corpus it is disabled on
/// `selector` and the index is rebuilt with TF-IDF, so this never fails.
pub fn index(graph: &Graph, selector: &mut BackendSelector) -> EmbeddingIndex {
    let embedder = selector.select();
    let kind = embedder.kind();
    match index_with(graph, embedder) {
        Ok(index) => index,
        Err(err) => {
            debug_assert_eq!(kind, BackendKind::Dense, "sparse indexing is infallible");
            selector.disable_dense(&err.to_string());
            let (nodes, docs) = documents(graph);
            sparse_index(nodes, docs)
        }
    }
}

/// Build an index with an explicit embedder.
pub fn index_with(graph: &Graph, embedder: Box<dyn Embedder>) -> Result<EmbeddingIndex> {
    let (nodes, docs) = documents(graph);
    build(nodes, docs, embedder)
}

fn documents(graph: &Graph) -> (Vec<String>, Vec<String>) {
    graph
        .nodes()
        .map(|node| (node.label.clone(), node.document()))
        .unzip()
}

fn build(
    nodes: Vec<String>,
    docs: Vec<String>,
    mut embedder: Box<dyn Embedder>,
) -> Result<EmbeddingIndex> {
    let vectors = embedder.encode_corpus(&docs)?;
    if vectors.len() != docs.len() {
        return Err(KgError::Encoding(format!(
            "{} vectors for {} documents",
            vectors.len(),
            docs.len()
        )));
    }
    let stats = IndexStats {
        backend: embedder.kind(),
        nodes: nodes.len(),
        dim: vectors.first().map_or(0, Vec::len),
        built_at: Utc::now(),
    };
    tracing::info!(
        backend = %stats.backend,
        nodes = stats.nodes,
        dim = stats.dim,
        "built embedding index"
    );
    Ok(EmbeddingIndex {
        nodes,
        docs,
        vectors,
        embedder,
        stats,
    })
}

fn sparse_index(nodes: Vec<String>, docs: Vec<String>) -> EmbeddingIndex {
    let mut embedder = crate::embedder::SparseEmbedder::new();
    let vectors = match embedder.encode_corpus(&docs) {
        Ok(vectors) => vectors,
        // Only reachable on a refit, which cannot happen on a fresh embedder.
        Err(_) => vec![Vec::new(); docs.len()],
    };
    let stats = IndexStats {
        backend: BackendKind::Sparse,
        nodes: nodes.len(),
        dim: vectors.first().map_or(0, Vec::len),
        built_at: Utc::now(),
    };
    tracing::info!(nodes = stats.nodes, dim = stats.dim, "built sparse fallback index");
    EmbeddingIndex {
        nodes,
        docs,
        vectors,
        embedder: Box::new(embedder),
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendPreference;
    use crate::dataset::{TextMap, Triple};
    use crate::embedder::testing::{FlakyEncoder, HashingEncoder, DIM};
    use crate::embedder::{DenseEmbedder, SentenceEncoder, SparseEmbedder};
    use crate::graph::build as build_graph;
    use std::sync::Arc;

    fn sun_graph() -> Graph {
        let triples = vec![
            Triple::new("Sun", "is_a", "Star"),
            Triple::new("Sun", "related_to", "Astrophysics"),
        ];
        let texts: TextMap = [("Star", "A luminous ball of plasma.")].into_iter().collect();
        build_graph(&triples, &texts)
    }

    struct Broken;

    impl SentenceEncoder for Broken {
        fn encode(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(KgError::Encoding("out of memory".into()))
        }
    }

    #[test]
    fn documents_follow_node_order() {
        let idx = index_with(&sun_graph(), Box::new(SparseEmbedder::new())).unwrap();
        assert_eq!(idx.nodes(), ["Sun", "Star", "Astrophysics"]);
        assert_eq!(idx.docs()[0], "Sun: Sun");
        assert_eq!(idx.docs()[1], "Star: A luminous ball of plasma.");
        assert_eq!(idx.vectors().len(), 3);
        assert_eq!(idx.stats().backend, BackendKind::Sparse);
    }

    #[test]
    fn dense_index_records_dimension() {
        let embedder = DenseEmbedder::new(Arc::new(HashingEncoder));
        let idx = index_with(&sun_graph(), Box::new(embedder)).unwrap();
        assert_eq!(idx.kind(), BackendKind::Dense);
        assert_eq!(idx.stats().dim, DIM);
        assert_eq!(idx.stats().nodes, 3);
    }

    #[test]
    fn empty_graph_builds_empty_index() {
        let idx = index_with(&Graph::default(), Box::new(SparseEmbedder::new())).unwrap();
        assert!(idx.is_empty());
        assert_eq!(idx.stats().dim, 0);
    }

    #[test]
    fn corpus_encoding_failure_falls_back_to_sparse() {
        let mut selector = BackendSelector::with_loader(
            BackendPreference::Auto,
            Box::new(|| Ok(Arc::new(Broken) as Arc<dyn SentenceEncoder>)),
        );
        let idx = index(&sun_graph(), &mut selector);
        assert_eq!(idx.kind(), BackendKind::Sparse);
        assert_eq!(idx.len(), 3);
        assert_eq!(selector.warnings().len(), 1);
        assert!(selector.warnings()[0].contains("out of memory"));

        // Dense stays off for later builds.
        assert_eq!(index(&sun_graph(), &mut selector).kind(), BackendKind::Sparse);
        assert_eq!(selector.warnings().len(), 1);
    }

    #[test]
    fn query_encoding_after_corpus_success_can_fail() {
        let embedder = DenseEmbedder::new(Arc::new(FlakyEncoder::default()));
        let idx = index_with(&sun_graph(), Box::new(embedder)).unwrap();
        assert!(matches!(idx.encode_query("sun"), Err(KgError::Encoding(_))));
    }
}
