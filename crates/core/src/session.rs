//! Per-session engine context.
//!
//! A [`Session`] owns everything one user's queries need: the current graph,
//! the key of the data it was built from, the backend decision and the
//! embedding index cache. Nothing here is process-global; hosts create one
//! session per client.
//!
//! The index is built on first use, then reused for every query until the
//! data changes. A rebuild constructs a complete new index before replacing
//! the cached one, and readers holding the previous `Arc` keep a consistent
//! view.

use crate::config::EngineConfig;
use crate::corpus::{self, EmbeddingIndex, IndexStats};
use crate::dataset::Dataset;
use crate::embedder::{BackendKind, BackendSelector};
use crate::expand::expand;
use crate::graph::{build, Graph};
use crate::rank::{rank, Match};
use crate::{KgError, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

pub const EMPTY_QUERY_STATUS: &str = "Please enter a query to search.";
pub const NO_MATCHES_STATUS: &str = "No matches found.";

/// Result of one search: ranked matches, the expanded subgraph around them
/// and a human-readable status line.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub matches: Vec<Match>,
    pub subgraph: Graph,
    pub status: String,
}

/// Snapshot of a session for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub source: String,
    pub triples: usize,
    pub nodes: usize,
    pub edges: usize,
    pub content_key: String,
    /// `None` until the first search builds the index.
    pub index: Option<IndexStats>,
    pub warnings: Vec<String>,
}

struct CacheEntry {
    content_key: String,
    kind: BackendKind,
    index: Arc<EmbeddingIndex>,
}

pub struct Session {
    config: EngineConfig,
    dataset: Dataset,
    graph: Graph,
    content_key: String,
    selector: BackendSelector,
    cache: Option<CacheEntry>,
    builds: usize,
}

impl Session {
    /// A session over the built-in demo dataset.
    pub fn new(config: EngineConfig) -> Self {
        let selector = BackendSelector::new(&config);
        Self::with_selector(config, selector)
    }

    /// A session with a caller-supplied backend selector.
    pub fn with_selector(config: EngineConfig, selector: BackendSelector) -> Self {
        let mut session = Self {
            config,
            dataset: Dataset::new(Vec::new(), Default::default(), ""),
            graph: Graph::default(),
            content_key: String::new(),
            selector,
            cache: None,
            builds: 0,
        };
        session.load(Dataset::demo());
        session
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Key of the data the current graph was built from.
    pub fn content_key(&self) -> &str {
        &self.content_key
    }

    /// Replace the session's data. The cached index is dropped; the next
    /// search rebuilds it. Returns the load status line.
    pub fn load(&mut self, dataset: Dataset) -> String {
        let status = dataset.status();
        self.graph = build(&dataset.triples, &dataset.texts);
        self.content_key = dataset.content_key();
        tracing::info!(
            source = %dataset.source,
            triples = dataset.triples.len(),
            nodes = self.graph.node_count(),
            edges = self.graph.edge_count(),
            "loaded dataset"
        );
        self.dataset = dataset;
        self.invalidate_index();
        status
    }

    /// Parse and load a JSON dataset document. On error the current data is
    /// kept.
    pub fn load_json(&mut self, raw: &str, source: &str) -> Result<String> {
        let dataset = Dataset::from_json(raw, source)?;
        Ok(self.load(dataset))
    }

    /// Read and load a JSON dataset file. On error the current data is kept.
    pub fn load_path(&mut self, path: impl AsRef<Path>) -> Result<String> {
        let dataset = Dataset::load(path)?;
        Ok(self.load(dataset))
    }

    /// Drop the cached index.
    pub fn invalidate_index(&mut self) {
        if self.cache.take().is_some() {
            tracing::debug!("embedding index invalidated");
        }
    }

    /// The index for the current data, building it if the cache is empty or
    /// was built from other data or another backend.
    pub fn index(&mut self) -> Arc<EmbeddingIndex> {
        let kind = self.selector.active_kind();
        if let Some(entry) = &self.cache {
            if entry.content_key == self.content_key && entry.kind == kind {
                tracing::debug!(backend = %kind, "embedding index cache hit");
                return Arc::clone(&entry.index);
            }
        }

        let built = Arc::new(corpus::index(&self.graph, &mut self.selector));
        self.builds += 1;
        self.cache = Some(CacheEntry {
            content_key: self.content_key.clone(),
            kind: built.kind(),
            index: Arc::clone(&built),
        });
        built
    }

    /// Rank `query`, then expand the top matches `depth` hops.
    ///
    /// A blank query or an empty ranking is not an error; the outcome then
    /// carries no matches, an empty subgraph and a status explaining why.
    /// If the dense backend fails to encode the query, the session switches
    /// to TF-IDF, rebuilds, and answers from the new index.
    pub fn search(&mut self, query: &str, top_k: usize, depth: usize) -> Result<SearchOutcome> {
        if query.trim().is_empty() {
            return Ok(SearchOutcome::empty(EMPTY_QUERY_STATUS));
        }

        let index = self.index();
        let matches = match rank(query, &index, top_k) {
            Ok(matches) => matches,
            Err(KgError::Encoding(reason)) if index.kind() == BackendKind::Dense => {
                self.selector.disable_dense(&reason);
                self.invalidate_index();
                let index = self.index();
                rank(query, &index, top_k)?
            }
            Err(err) => return Err(err),
        };

        if matches.is_empty() {
            return Ok(SearchOutcome::empty(NO_MATCHES_STATUS));
        }

        let subgraph = expand(
            &self.graph,
            matches.iter().map(|m| m.label.as_str()),
            depth,
        );
        let status = format!(
            "Top {} matches; subgraph has {} nodes and {} edges.",
            matches.len(),
            subgraph.node_count(),
            subgraph.edge_count()
        );
        Ok(SearchOutcome {
            matches,
            subgraph,
            status,
        })
    }

    /// Degraded-path messages collected so far.
    pub fn warnings(&self) -> &[String] {
        self.selector.warnings()
    }

    /// Number of index builds performed by this session.
    pub fn index_builds(&self) -> usize {
        self.builds
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            source: self.dataset.source.clone(),
            triples: self.dataset.triples.len(),
            nodes: self.graph.node_count(),
            edges: self.graph.edge_count(),
            content_key: self.content_key.clone(),
            index: self.cache.as_ref().map(|e| e.index.stats().clone()),
            warnings: self.warnings().to_vec(),
        }
    }
}

impl SearchOutcome {
    fn empty(status: &str) -> Self {
        Self {
            matches: Vec::new(),
            subgraph: Graph::default(),
            status: status.to_string(),
        }
    }
}
