//! Embedding backends.
//!
//! [`Embedder`] is the single capability the indexer and ranker talk to:
//! encode the corpus once, then encode queries into the same space. Two
//! implementations exist:
//!
//! - [`DenseEmbedder`] wraps a [`SentenceEncoder`] (a pretrained model). No
//!   corpus-wide fitting; each text is encoded independently.
//! - [`SparseEmbedder`] fits a [`TfidfVectorizer`] on the corpus and keeps
//!   it for transform-only query projection.
//!
//! [`BackendSelector`] decides which one an index gets. The dense model is
//! loaded at most once per selector; a load failure is cached and never
//! retried, and a runtime encoding failure disables dense for good.

use crate::config::{BackendPreference, EngineConfig};
use crate::rank::{cosine_similarity, dot, l2_norm};
use crate::tfidf::TfidfVectorizer;
use crate::{KgError, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The vector space an index lives in, and how it is scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Dense,
    Sparse,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Dense => "dense",
            BackendKind::Sparse => "sparse",
        }
    }

    /// Score `doc` against `query`: cosine for dense vectors, linear kernel
    /// (dot product) for TF-IDF rows.
    pub fn similarity(self, query: &[f32], doc: &[f32]) -> f32 {
        match self {
            BackendKind::Dense => cosine_similarity(query, doc, l2_norm(query)),
            BackendKind::Sparse => dot(query, doc),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps documents and queries into one vector space.
pub trait Embedder: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Encode the full corpus, one vector per document, in order. Called
    /// exactly once per index; backends that fit on the corpus do so here.
    fn encode_corpus(&mut self, docs: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Encode a held-out query into the corpus space.
    fn encode_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// A pretrained text → dense vector model.
pub trait SentenceEncoder: Send + Sync {
    /// Encode `texts`, returning one vector per input in order.
    fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

// ---------------------------------------------------------------------------
// Dense
// ---------------------------------------------------------------------------

pub struct DenseEmbedder {
    encoder: Arc<dyn SentenceEncoder>,
    /// Corpus dimension, set by `encode_corpus`. Query vectors must match it.
    dim: Option<usize>,
}

impl DenseEmbedder {
    pub fn new(encoder: Arc<dyn SentenceEncoder>) -> Self {
        Self { encoder, dim: None }
    }
}

/// Reject vectors carrying NaN or infinite components.
fn check_finite(v: &[f32]) -> Result<()> {
    match v.iter().position(|x| !x.is_finite()) {
        Some(pos) => Err(KgError::Encoding(format!(
            "encoder returned a non-finite value at component {pos}"
        ))),
        None => Ok(()),
    }
}

impl Embedder for DenseEmbedder {
    fn kind(&self) -> BackendKind {
        BackendKind::Dense
    }

    fn encode_corpus(&mut self, docs: &[String]) -> Result<Vec<Vec<f32>>> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.encoder.encode(docs)?;
        if vectors.len() != docs.len() {
            return Err(KgError::Encoding(format!(
                "encoder returned {} vectors for {} documents",
                vectors.len(),
                docs.len()
            )));
        }
        let dim = vectors[0].len();
        if dim == 0 {
            return Err(KgError::Encoding("encoder returned empty vectors".into()));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            return Err(KgError::Encoding(format!(
                "embedding dimension mismatch: expected {dim}, got {}",
                bad.len()
            )));
        }
        for v in &vectors {
            check_finite(v)?;
        }
        self.dim = Some(dim);
        Ok(vectors)
    }

    fn encode_query(&self, text: &str) -> Result<Vec<f32>> {
        let q = self
            .encoder
            .encode(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| KgError::Encoding("encoder returned no vector for query".into()))?;
        if let Some(dim) = self.dim {
            if q.len() != dim {
                return Err(KgError::Encoding(format!(
                    "query dimension mismatch: expected {dim}, got {}",
                    q.len()
                )));
            }
        }
        check_finite(&q)?;
        Ok(q)
    }
}

// ---------------------------------------------------------------------------
// Sparse
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct SparseEmbedder {
    vectorizer: Option<TfidfVectorizer>,
}

impl SparseEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fitted vectorizer, once the corpus has been encoded.
    pub fn vectorizer(&self) -> Option<&TfidfVectorizer> {
        self.vectorizer.as_ref()
    }
}

impl Embedder for SparseEmbedder {
    fn kind(&self) -> BackendKind {
        BackendKind::Sparse
    }

    fn encode_corpus(&mut self, docs: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.vectorizer.is_some() {
            return Err(KgError::Encoding("vectorizer is already fitted".into()));
        }
        let (vectorizer, rows) = TfidfVectorizer::fit_transform(docs);
        self.vectorizer = Some(vectorizer);
        Ok(rows)
    }

    fn encode_query(&self, text: &str) -> Result<Vec<f32>> {
        self.vectorizer
            .as_ref()
            .map(|v| v.transform(text))
            .ok_or_else(|| KgError::Encoding("vectorizer has not been fitted".into()))
    }
}

// ---------------------------------------------------------------------------
// Dense model loading
// ---------------------------------------------------------------------------

#[cfg(feature = "dense")]
mod fastembed_encoder {
    use super::SentenceEncoder;
    use crate::{KgError, Result};
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

    pub struct FastEmbedEncoder {
        model: TextEmbedding,
    }

    fn model_for(name: &str) -> Result<EmbeddingModel> {
        match name {
            "all-MiniLM-L6-v2" | "sentence-transformers/all-MiniLM-L6-v2" => {
                Ok(EmbeddingModel::AllMiniLML6V2)
            }
            "bge-small-en-v1.5" | "BAAI/bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
            other => Err(KgError::Configuration(format!(
                "unsupported dense model '{other}'"
            ))),
        }
    }

    impl FastEmbedEncoder {
        pub fn load(name: &str) -> Result<Self> {
            let options = InitOptions::new(model_for(name)?).with_show_download_progress(false);
            let model = TextEmbedding::try_new(options).map_err(|e| {
                KgError::Configuration(format!("failed to load model '{name}': {e}"))
            })?;
            Ok(Self { model })
        }
    }

    impl SentenceEncoder for FastEmbedEncoder {
        fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.model
                .embed(texts.to_vec(), None)
                .map_err(|e| KgError::Encoding(e.to_string()))
        }
    }
}

#[cfg(feature = "dense")]
pub use fastembed_encoder::FastEmbedEncoder;

/// Load the named dense model.
///
/// # Errors
///
/// [`KgError::Configuration`] if the crate was built without the `dense`
/// feature, the model name is unknown, or the model fails to initialise.
pub fn load_dense(model: &str) -> Result<Arc<dyn SentenceEncoder>> {
    #[cfg(feature = "dense")]
    {
        tracing::info!(model, "loading dense sentence encoder");
        let encoder: Arc<dyn SentenceEncoder> = Arc::new(FastEmbedEncoder::load(model)?);
        Ok(encoder)
    }
    #[cfg(not(feature = "dense"))]
    {
        Err(KgError::Configuration(format!(
            "dense backend not compiled in (model '{model}'); rebuild with the `dense` feature"
        )))
    }
}

// ---------------------------------------------------------------------------
// Backend selection
// ---------------------------------------------------------------------------

/// Produces the dense encoder on first use.
pub type EncoderLoader = Box<dyn Fn() -> Result<Arc<dyn SentenceEncoder>> + Send + Sync>;

/// Chooses the backend for new indexes and remembers the outcome.
///
/// The dense load is attempted at most once; its result (success or failure)
/// is cached. Every fallback to sparse is recorded as a warning exactly once.
pub struct BackendSelector {
    preference: BackendPreference,
    loader: EncoderLoader,
    encoder: OnceCell<std::result::Result<Arc<dyn SentenceEncoder>, String>>,
    /// Set when dense encoding failed at runtime.
    disabled: Option<String>,
    warnings: Vec<String>,
}

impl fmt::Debug for BackendSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSelector")
            .field("preference", &self.preference)
            .field("loaded", &self.encoder.get().map(|r| r.is_ok()))
            .field("disabled", &self.disabled)
            .field("warnings", &self.warnings)
            .finish()
    }
}

impl BackendSelector {
    /// Selector loading `config.model` through [`load_dense`].
    pub fn new(config: &EngineConfig) -> Self {
        let model = config.model.clone();
        Self::with_loader(config.backend, Box::new(move || load_dense(&model)))
    }

    /// Selector with a custom dense loader.
    pub fn with_loader(preference: BackendPreference, loader: EncoderLoader) -> Self {
        Self {
            preference,
            loader,
            encoder: OnceCell::new(),
            disabled: None,
            warnings: Vec::new(),
        }
    }

    pub fn preference(&self) -> BackendPreference {
        self.preference
    }

    /// True once the dense load has been attempted.
    pub fn dense_attempted(&self) -> bool {
        self.encoder.get().is_some()
    }

    /// The kind of backend [`select`](Self::select) would hand out now.
    /// Loads the dense model if this is the first call.
    pub fn active_kind(&mut self) -> BackendKind {
        match self.resolve() {
            Some(_) => BackendKind::Dense,
            None => BackendKind::Sparse,
        }
    }

    /// A fresh embedder for the next index, loading the dense model if this
    /// is the first call.
    pub fn select(&mut self) -> Box<dyn Embedder> {
        match self.resolve() {
            Some(encoder) => Box::new(DenseEmbedder::new(encoder)),
            None => Box::new(SparseEmbedder::new()),
        }
    }

    fn resolve(&mut self) -> Option<Arc<dyn SentenceEncoder>> {
        match self.dense_encoder() {
            Ok(encoder) => Some(encoder),
            Err(None) => None,
            Err(Some(reason)) => {
                self.fall_back(&reason);
                None
            }
        }
    }

    /// Give up on dense for the rest of this selector's life.
    pub fn disable_dense(&mut self, reason: &str) {
        if self.disabled.is_none() {
            self.disabled = Some(reason.to_string());
            self.fall_back(reason);
        }
    }

    /// Degraded-path messages, oldest first.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// `Err(None)` when dense is not wanted, `Err(Some(reason))` when it is
    /// wanted but unavailable.
    fn dense_encoder(&self) -> std::result::Result<Arc<dyn SentenceEncoder>, Option<String>> {
        if self.preference == BackendPreference::Sparse || self.disabled.is_some() {
            return Err(None);
        }
        let loader = &self.loader;
        self.encoder
            .get_or_init(|| loader().map_err(|e| e.to_string()))
            .clone()
            .map_err(Some)
    }

    fn fall_back(&mut self, reason: &str) {
        let message = format!("falling back to sparse backend: {reason}");
        if self.warnings.contains(&message) {
            return;
        }
        if self.preference == BackendPreference::Dense {
            tracing::error!(reason, "dense backend requested but unavailable; using sparse");
        } else {
            tracing::warn!(reason, "dense backend unavailable; using sparse");
        }
        self.warnings.push(message);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Deterministic stand-ins for a sentence model.

    use super::SentenceEncoder;
    use crate::{KgError, Result};

    pub const DIM: usize = 64;

    /// Hashes lowercase word trigrams of characters into a fixed-size
    /// vector. Identical texts encode identically; texts sharing words
    /// land close together.
    #[derive(Debug, Default)]
    pub struct HashingEncoder;

    impl HashingEncoder {
        pub fn vector(text: &str) -> Vec<f32> {
            let mut v = vec![0.0f32; DIM];
            for word in text.to_lowercase().split_whitespace() {
                let padded: Vec<char> = format!("#{word}#").chars().collect();
                for gram in padded.windows(3) {
                    let mut h: u64 = 0xcbf29ce484222325;
                    for c in gram {
                        h ^= *c as u64;
                        h = h.wrapping_mul(0x100000001b3);
                    }
                    v[(h % DIM as u64) as usize] += 1.0;
                }
            }
            v
        }
    }

    impl SentenceEncoder for HashingEncoder {
        fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| Self::vector(t)).collect())
        }
    }

    /// Encodes the corpus, then fails every later call.
    #[derive(Debug, Default)]
    pub struct FlakyEncoder {
        pub calls: std::sync::atomic::AtomicUsize,
    }

    impl SentenceEncoder for FlakyEncoder {
        fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n == 0 {
                HashingEncoder.encode(texts)
            } else {
                Err(KgError::Encoding("device lost".into()))
            }
        }
    }

    /// Encodes the corpus normally, then answers queries with a vector of
    /// the wrong length.
    #[derive(Debug, Default)]
    pub struct ShortQueryEncoder {
        pub calls: std::sync::atomic::AtomicUsize,
    }

    impl SentenceEncoder for ShortQueryEncoder {
        fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n == 0 {
                HashingEncoder.encode(texts)
            } else {
                Ok(texts.iter().map(|_| vec![1.0]).collect())
            }
        }
    }

    /// Encodes every text normally except those containing `poison`, which
    /// come back as NaN vectors.
    #[derive(Debug)]
    pub struct NanEncoder {
        pub poison: &'static str,
    }

    impl SentenceEncoder for NanEncoder {
        fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains(self.poison) {
                        vec![f32::NAN; DIM]
                    } else {
                        HashingEncoder::vector(t)
                    }
                })
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::HashingEncoder;
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn docs(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn counting_loader(calls: Arc<AtomicUsize>, ok: bool) -> EncoderLoader {
        Box::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            if ok {
                Ok(Arc::new(HashingEncoder) as Arc<dyn SentenceEncoder>)
            } else {
                Err(KgError::Configuration("model not found".into()))
            }
        })
    }

    #[test]
    fn similarity_dispatches_per_backend() {
        let a = [3.0f32, 4.0];
        let b = [6.0f32, 8.0];
        assert!((BackendKind::Dense.similarity(&a, &b) - 1.0).abs() < 1e-6);
        assert!((BackendKind::Sparse.similarity(&a, &b) - 50.0).abs() < 1e-4);
    }

    #[test]
    fn sparse_query_before_fit_is_an_error() {
        let embedder = SparseEmbedder::new();
        assert!(matches!(
            embedder.encode_query("sun"),
            Err(KgError::Encoding(_))
        ));
    }

    #[test]
    fn sparse_fits_exactly_once() {
        let mut embedder = SparseEmbedder::new();
        let rows = embedder.encode_corpus(&docs(&["sun star", "moon"])).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(embedder.vectorizer().unwrap().dim(), 3);
        assert!(embedder.encode_corpus(&docs(&["other"])).is_err());
        assert_eq!(embedder.encode_query("sun").unwrap().len(), 3);
    }

    #[test]
    fn dense_encodes_each_document() {
        let mut embedder = DenseEmbedder::new(Arc::new(HashingEncoder));
        let rows = embedder.encode_corpus(&docs(&["sun", "moon"])).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], embedder.encode_query("sun").unwrap());
        assert!(embedder.encode_corpus(&[]).unwrap().is_empty());
    }

    #[test]
    fn dense_rejects_query_of_wrong_dimension() {
        let mut embedder = DenseEmbedder::new(Arc::new(testing::ShortQueryEncoder::default()));
        embedder.encode_corpus(&docs(&["a", "b"])).unwrap();
        let err = embedder.encode_query("q").unwrap_err();
        assert!(matches!(err, KgError::Encoding(ref m) if m.contains("query dimension mismatch")));
    }

    #[test]
    fn dense_rejects_non_finite_vectors() {
        let mut corpus = DenseEmbedder::new(Arc::new(testing::NanEncoder { poison: "bad" }));
        assert!(matches!(
            corpus.encode_corpus(&docs(&["good", "bad doc"])),
            Err(KgError::Encoding(_))
        ));

        let mut query = DenseEmbedder::new(Arc::new(testing::NanEncoder { poison: "bad" }));
        query.encode_corpus(&docs(&["good", "fine"])).unwrap();
        assert!(query.encode_query("good").is_ok());
        assert!(matches!(query.encode_query("bad"), Err(KgError::Encoding(_))));
    }

    #[test]
    fn sparse_preference_never_loads_dense() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut selector =
            BackendSelector::with_loader(BackendPreference::Sparse, counting_loader(calls.clone(), true));
        assert_eq!(selector.select().kind(), BackendKind::Sparse);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(selector.warnings().is_empty());
    }

    #[test]
    fn dense_load_is_attempted_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut selector =
            BackendSelector::with_loader(BackendPreference::Auto, counting_loader(calls.clone(), true));
        assert_eq!(selector.select().kind(), BackendKind::Dense);
        assert_eq!(selector.select().kind(), BackendKind::Dense);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn load_failure_is_cached_and_warned_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut selector =
            BackendSelector::with_loader(BackendPreference::Auto, counting_loader(calls.clone(), false));
        assert!(!selector.dense_attempted());
        assert_eq!(selector.select().kind(), BackendKind::Sparse);
        assert_eq!(selector.select().kind(), BackendKind::Sparse);
        assert!(selector.dense_attempted());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(selector.warnings().len(), 1);
        assert!(selector.warnings()[0].starts_with("falling back to sparse backend"));
    }

    #[test]
    fn disabling_dense_switches_to_sparse() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut selector =
            BackendSelector::with_loader(BackendPreference::Dense, counting_loader(calls.clone(), true));
        assert_eq!(selector.select().kind(), BackendKind::Dense);
        selector.disable_dense("device lost");
        selector.disable_dense("device lost again");
        assert_eq!(selector.select().kind(), BackendKind::Sparse);
        assert_eq!(selector.warnings().len(), 1);
    }

    #[cfg(not(feature = "dense"))]
    #[test]
    fn dense_unavailable_without_feature() {
        let err = load_dense("all-MiniLM-L6-v2").err().unwrap();
        assert!(matches!(err, KgError::Configuration(_)));
    }
}
