//! kglens: graph-grounded semantic retrieval over a small knowledge graph.
//!
//! The core primitive is a [`Triple`]: a subject-predicate-object record. A
//! list of triples plus an optional per-entity [`TextMap`] becomes an
//! undirected labeled [`Graph`]. Each node is turned into a text document and
//! embedded, a free-text query is ranked against those embeddings, and the
//! best matches are grown into a bounded-radius subgraph for display.
//!
//! Two embedding backends exist behind one [`Embedder`] capability:
//!
//! - **dense**: a pretrained sentence-embedding model (feature `dense`),
//!   scored with cosine similarity;
//! - **sparse**: a TF-IDF vectorizer fitted once over the node documents,
//!   scored with a linear kernel (dot product).
//!
//! Dense is attempted first. If the model is unavailable or fails to encode,
//! the session falls back to sparse for the rest of its lifetime and records
//! a warning.
//!
//! # Quick start
//!
//! ```rust
//! use kglens::{dataset, EngineConfig, Session};
//!
//! let mut session = Session::new(EngineConfig::sparse_only());
//! let status = session.load(dataset::Dataset::demo());
//! assert_eq!(status, "Loaded 36 triples from built-in demo dataset.");
//!
//! let outcome = session.search("solar activity", 3, 1).unwrap();
//! assert_eq!(outcome.matches.len(), 3);
//! assert!(outcome.subgraph.node_count() >= 3);
//! ```

pub mod config;
pub mod corpus;
pub mod dataset;
pub mod embedder;
pub mod expand;
pub mod graph;
pub mod rank;
pub mod render;
pub mod session;
pub mod text;
pub mod tfidf;

pub use config::{BackendPreference, EngineConfig, QueryLimits};
pub use corpus::{index, index_with, EmbeddingIndex, IndexStats};
pub use dataset::{Dataset, TextMap, Triple};
pub use embedder::{BackendKind, BackendSelector, Embedder, SentenceEncoder};
pub use expand::expand;
pub use graph::{build, Edge, Graph, Node};
pub use rank::{rank, Match};
pub use render::{RenderAdapter, VisEdge, VisNetwork, VisNetworkRenderer, VisNode};
pub use session::{SearchOutcome, Session, SessionStatus};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum KgError {
    /// The dense backend could not be loaded (missing feature, model
    /// download or initialisation failure).
    #[error("configuration error: {0}")]
    Configuration(String),
    /// An embedder failed while encoding text.
    #[error("encoding error: {0}")]
    Encoding(String),
    /// Dataset rows do not expose the required columns.
    #[error("schema error: {0}")]
    Schema(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, KgError>;
